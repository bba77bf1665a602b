// src/rl/learner_rand.rs
//
// Synthetic learner randomisation for the behavior simulator.
//
// Each synthetic learner gets a tier and latent traits (ability, engagement)
// drawn from normal distributions parameterised by the tier's aggregate
// statistics. Spread can be scaled down for stable training or collapsed
// entirely for deterministic tests.
//
// Sampling is deterministic given a seed and learner id, independent of
// the order learners are sampled in.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterClassifier, TierStatistics};
use crate::types::{Tier, TierValues};

/// How synthetic learners are assigned to tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierAssignment {
    /// weak, medium, strong, weak, ... by learner id.
    Cycle,
    /// Drawn in proportion to learners per tier.
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerRandConfig {
    pub tier_assignment: TierAssignment,
    /// Multiplier on the tier's score std when drawing ability.
    pub ability_spread: f64,
    /// Multiplier on the tier's engagement std.
    pub engagement_spread: f64,
    /// Range for sampled traits.
    pub trait_bounds: (f64, f64),
}

impl Default for LearnerRandConfig {
    fn default() -> Self {
        Self {
            tier_assignment: TierAssignment::Weighted,
            ability_spread: 1.0,
            engagement_spread: 1.0,
            trait_bounds: (0.05, 0.99),
        }
    }
}

impl LearnerRandConfig {
    /// Every learner sits exactly at its tier means; tiers cycle.
    pub fn deterministic() -> Self {
        Self {
            tier_assignment: TierAssignment::Cycle,
            ability_spread: 0.0,
            engagement_spread: 0.0,
            ..Self::default()
        }
    }

    /// Half the natural spread (for stable training).
    pub fn mild() -> Self {
        Self {
            ability_spread: 0.5,
            engagement_spread: 0.5,
            ..Self::default()
        }
    }

    /// `default`, `mild` or `deterministic`.
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::default()),
            "mild" => Some(Self::mild()),
            "deterministic" => Some(Self::deterministic()),
            _ => None,
        }
    }
}

/// Sampled traits for one synthetic learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: u32,
    pub tier: Tier,
    /// Latent skill in trait bounds.
    pub ability: f64,
    /// Latent engagement in trait bounds.
    pub engagement: f64,
    /// Median minutes per module for the learner's tier.
    pub median_module_minutes: f64,
}

/// Per-learner RNG seed: SplitMix64 mix of the run seed and learner id.
pub fn learner_seed(seed: u64, learner_id: u32) -> u64 {
    let mut z = seed ^ (learner_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct LearnerSampler {
    config: LearnerRandConfig,
    stats: TierValues<TierStatistics>,
    weights: TierValues<f64>,
}

impl LearnerSampler {
    pub fn new(config: LearnerRandConfig, classifier: &ClusterClassifier) -> Self {
        Self {
            config,
            stats: TierValues::new(
                *classifier.tier_statistics(Tier::Weak),
                *classifier.tier_statistics(Tier::Medium),
                *classifier.tier_statistics(Tier::Strong),
            ),
            weights: classifier.learner_weights(),
        }
    }

    pub fn config(&self) -> &LearnerRandConfig {
        &self.config
    }

    /// RNG for one learner's episode.
    pub fn rng_for(&self, seed: u64, learner_id: u32) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(learner_seed(seed, learner_id))
    }

    pub fn tier_for(&self, learner_id: u32, rng: &mut ChaCha8Rng) -> Tier {
        match self.config.tier_assignment {
            TierAssignment::Cycle => Tier::ALL[learner_id as usize % 3],
            TierAssignment::Weighted => {
                let w = [self.weights.weak, self.weights.medium, self.weights.strong];
                let total: f64 = w.iter().sum();
                if !(total > 0.0) {
                    return Tier::ALL[learner_id as usize % 3];
                }
                let mut x = rng.gen::<f64>() * total;
                for (tier, weight) in Tier::ALL.iter().zip(w) {
                    if x < weight {
                        return *tier;
                    }
                    x -= weight;
                }
                Tier::Strong
            }
        }
    }

    fn sample_trait(&self, rng: &mut ChaCha8Rng, mean: f64, std: f64) -> f64 {
        let (lo, hi) = self.config.trait_bounds;
        let x = if std > 0.0 && std.is_finite() {
            match Normal::new(mean, std) {
                Ok(d) => d.sample(rng),
                Err(_) => mean,
            }
        } else {
            mean
        };
        x.clamp(lo, hi)
    }

    /// Draw tier and traits. Consumes from `rng` in a fixed order.
    pub fn sample(&self, learner_id: u32, rng: &mut ChaCha8Rng) -> LearnerProfile {
        let tier = self.tier_for(learner_id, rng);
        let s = self.stats.get(tier);
        let ability = self.sample_trait(rng, s.mean_score, s.score_std * self.config.ability_spread);
        let engagement = self.sample_trait(
            rng,
            s.mean_engagement,
            s.engagement_std * self.config.engagement_spread,
        );
        LearnerProfile {
            learner_id,
            tier,
            ability,
            engagement,
            median_module_minutes: s.median_module_minutes,
        }
    }
}
