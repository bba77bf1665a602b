// src/cluster.rs
//
// Performance-group classification.
//
// Groups are ranked by mean score and split into three equal partitions
// (weak / medium / strong). Per-tier aggregate statistics are kept
// alongside so the simulator and the stuck detector can read them without
// going back to the raw batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClusterError;
use crate::metrics::median;
use crate::types::{Tier, TierValues};

fn default_score_std() -> f64 {
    0.12
}

fn default_engagement() -> f64 {
    0.5
}

fn default_engagement_std() -> f64 {
    0.15
}

fn default_module_minutes() -> f64 {
    90.0
}

fn default_learners() -> u32 {
    1
}

/// Aggregate statistics for one performance group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub group_id: String,
    /// Mean normalized score in [0, 1].
    pub mean_score: f64,
    #[serde(default = "default_score_std")]
    pub score_std: f64,
    /// Mean normalized engagement in [0, 1].
    #[serde(default = "default_engagement")]
    pub mean_engagement: f64,
    #[serde(default = "default_engagement_std")]
    pub engagement_std: f64,
    /// Median minutes spent on a module before moving on.
    #[serde(default = "default_module_minutes")]
    pub median_module_minutes: f64,
    #[serde(default = "default_learners")]
    pub learners: u32,
}

impl ClusterProfile {
    /// Profile with only a mean score; other statistics use defaults.
    pub fn from_score(group_id: &str, mean_score: f64) -> Self {
        Self {
            group_id: group_id.to_string(),
            mean_score,
            score_std: default_score_std(),
            mean_engagement: default_engagement(),
            engagement_std: default_engagement_std(),
            median_module_minutes: default_module_minutes(),
            learners: default_learners(),
        }
    }
}

/// Pooled statistics for all groups in one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStatistics {
    pub groups: usize,
    pub learners: u64,
    pub mean_score: f64,
    pub score_std: f64,
    pub mean_engagement: f64,
    pub engagement_std: f64,
    pub median_module_minutes: f64,
}

impl TierStatistics {
    fn pooled(profiles: &[&ClusterProfile]) -> Self {
        let weights: Vec<f64> = profiles.iter().map(|p| p.learners.max(1) as f64).collect();
        let total: f64 = weights.iter().sum();

        let weighted_mean = |f: &dyn Fn(&ClusterProfile) -> f64| -> f64 {
            profiles
                .iter()
                .zip(&weights)
                .map(|(p, w)| f(*p) * w)
                .sum::<f64>()
                / total
        };

        let mean_score = weighted_mean(&|p| p.mean_score);
        let mean_engagement = weighted_mean(&|p| p.mean_engagement);

        // Pooled std: within-group variance plus between-group spread.
        let score_var = weighted_mean(&|p| p.score_std.powi(2) + (p.mean_score - mean_score).powi(2));
        let engagement_var = weighted_mean(&|p| {
            p.engagement_std.powi(2) + (p.mean_engagement - mean_engagement).powi(2)
        });

        let minutes: Vec<f64> = profiles.iter().map(|p| p.median_module_minutes).collect();

        Self {
            groups: profiles.len(),
            learners: profiles.iter().map(|p| p.learners.max(1) as u64).sum(),
            mean_score,
            score_std: score_var.sqrt(),
            mean_engagement,
            engagement_std: engagement_var.sqrt(),
            median_module_minutes: median(&minutes).unwrap_or_else(default_module_minutes),
        }
    }
}

/// Partitions performance groups into ordinal tiers.
#[derive(Debug, Clone)]
pub struct ClusterClassifier {
    tiers: HashMap<String, Tier>,
    /// Group ids in ascending score order.
    ranking: Vec<String>,
    stats: TierValues<TierStatistics>,
}

impl ClusterClassifier {
    /// Build from (group id, mean score) pairs. Input order breaks ties.
    pub fn from_scores(scores: &[(String, f64)]) -> Result<Self, ClusterError> {
        let profiles: Vec<ClusterProfile> = scores
            .iter()
            .map(|(id, score)| ClusterProfile::from_score(id, *score))
            .collect();
        Self::from_profiles(&profiles)
    }

    /// Build from full profiles. Input order breaks ties.
    ///
    /// Degenerate batches: one group is classified `Medium`; two groups
    /// become `Weak` and `Strong`.
    pub fn from_profiles(profiles: &[ClusterProfile]) -> Result<Self, ClusterError> {
        if profiles.is_empty() {
            return Err(ClusterError::Empty);
        }

        let mut seen = HashMap::with_capacity(profiles.len());
        for p in profiles {
            if !p.mean_score.is_finite() {
                return Err(ClusterError::InvalidScore {
                    group: p.group_id.clone(),
                    score: p.mean_score,
                });
            }
            if seen.insert(p.group_id.as_str(), ()).is_some() {
                return Err(ClusterError::DuplicateGroup(p.group_id.clone()));
            }
        }

        // Stable sort keeps input order for equal scores.
        let mut order: Vec<&ClusterProfile> = profiles.iter().collect();
        order.sort_by(|a, b| a.mean_score.total_cmp(&b.mean_score));

        let n = order.len();
        let mut tiers = HashMap::with_capacity(n);
        for (rank, p) in order.iter().enumerate() {
            tiers.insert(p.group_id.clone(), tier_for_rank(rank, n));
        }

        let all = TierStatistics::pooled(&order);
        let stats_for = |tier: Tier| {
            let members: Vec<&ClusterProfile> = order
                .iter()
                .copied()
                .filter(|p| tiers.get(&p.group_id) == Some(&tier))
                .collect();
            if members.is_empty() {
                all
            } else {
                TierStatistics::pooled(&members)
            }
        };
        let stats = TierValues::new(
            stats_for(Tier::Weak),
            stats_for(Tier::Medium),
            stats_for(Tier::Strong),
        );

        debug!(
            groups = n,
            weak = stats.weak.groups,
            medium = stats.medium.groups,
            strong = stats.strong.groups,
            "cluster classifier built"
        );

        Ok(Self {
            tiers,
            ranking: order.iter().map(|p| p.group_id.clone()).collect(),
            stats,
        })
    }

    pub fn tier_of(&self, group_id: &str) -> Result<Tier, ClusterError> {
        self.tiers
            .get(group_id)
            .copied()
            .ok_or_else(|| ClusterError::UnknownGroup(group_id.to_string()))
    }

    /// Group ids in ascending score order.
    pub fn ranking(&self) -> &[String] {
        &self.ranking
    }

    pub fn tier_statistics(&self, tier: Tier) -> &TierStatistics {
        match tier {
            Tier::Weak => &self.stats.weak,
            Tier::Medium => &self.stats.medium,
            Tier::Strong => &self.stats.strong,
        }
    }

    /// Median module minutes per tier, for stuck detection.
    pub fn median_module_minutes(&self) -> TierValues<f64> {
        TierValues::new(
            self.stats.weak.median_module_minutes,
            self.stats.medium.median_module_minutes,
            self.stats.strong.median_module_minutes,
        )
    }

    /// Learner share per tier, used to draw synthetic learner tiers.
    pub fn learner_weights(&self) -> TierValues<f64> {
        let count = |s: &TierStatistics| if s.groups == 0 { 0.0 } else { s.learners as f64 };
        TierValues::new(
            count(&self.stats.weak),
            count(&self.stats.medium),
            count(&self.stats.strong),
        )
    }

    pub fn len(&self) -> usize {
        self.ranking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }
}

fn tier_for_rank(rank: usize, n: usize) -> Tier {
    match n {
        1 => Tier::Medium,
        2 => {
            if rank == 0 {
                Tier::Weak
            } else {
                Tier::Strong
            }
        }
        _ => match (3 * rank) / n {
            0 => Tier::Weak,
            1 => Tier::Medium,
            _ => Tier::Strong,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn six_groups_split_into_equal_thirds() {
        let c = ClusterClassifier::from_scores(&scores(&[
            ("a", 0.9),
            ("b", 0.2),
            ("c", 0.5),
            ("d", 0.1),
            ("e", 0.7),
            ("f", 0.6),
        ]))
        .unwrap();

        assert_eq!(c.tier_of("d").unwrap(), Tier::Weak);
        assert_eq!(c.tier_of("b").unwrap(), Tier::Weak);
        assert_eq!(c.tier_of("c").unwrap(), Tier::Medium);
        assert_eq!(c.tier_of("f").unwrap(), Tier::Medium);
        assert_eq!(c.tier_of("e").unwrap(), Tier::Strong);
        assert_eq!(c.tier_of("a").unwrap(), Tier::Strong);
    }

    #[test]
    fn ties_keep_input_order() {
        let c = ClusterClassifier::from_scores(&scores(&[
            ("x", 0.5),
            ("y", 0.5),
            ("z", 0.5),
        ]))
        .unwrap();
        assert_eq!(c.ranking(), &["x", "y", "z"]);
        assert_eq!(c.tier_of("x").unwrap(), Tier::Weak);
        assert_eq!(c.tier_of("y").unwrap(), Tier::Medium);
        assert_eq!(c.tier_of("z").unwrap(), Tier::Strong);
    }

    #[test]
    fn tiers_are_monotonic_in_score() {
        for n in 1..20 {
            let pairs: Vec<(String, f64)> = (0..n)
                .map(|i| (format!("g{i}"), ((i * 7919) % 101) as f64 / 100.0))
                .collect();
            let c = ClusterClassifier::from_scores(&pairs).unwrap();
            let tiers: Vec<Tier> = c.ranking().iter().map(|g| c.tier_of(g).unwrap()).collect();
            assert!(tiers.windows(2).all(|w| w[0] <= w[1]), "n={n}: {tiers:?}");
        }
    }

    #[test]
    fn degenerate_group_counts() {
        let one = ClusterClassifier::from_scores(&scores(&[("solo", 0.4)])).unwrap();
        assert_eq!(one.tier_of("solo").unwrap(), Tier::Medium);

        let two = ClusterClassifier::from_scores(&scores(&[("hi", 0.8), ("lo", 0.3)])).unwrap();
        assert_eq!(two.tier_of("lo").unwrap(), Tier::Weak);
        assert_eq!(two.tier_of("hi").unwrap(), Tier::Strong);

        // Empty tiers fall back to the pooled statistics.
        assert_eq!(two.tier_statistics(Tier::Medium).groups, 2);

        assert_eq!(
            ClusterClassifier::from_scores(&[]).unwrap_err(),
            ClusterError::Empty
        );
    }

    #[test]
    fn rejects_bad_input() {
        let err = ClusterClassifier::from_scores(&scores(&[("a", f64::NAN)])).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidScore { .. }));

        let err = ClusterClassifier::from_scores(&scores(&[("a", 0.1), ("a", 0.2)])).unwrap_err();
        assert_eq!(err, ClusterError::DuplicateGroup("a".to_string()));

        let c = ClusterClassifier::from_scores(&scores(&[("a", 0.1)])).unwrap();
        assert_eq!(
            c.tier_of("missing").unwrap_err(),
            ClusterError::UnknownGroup("missing".to_string())
        );
    }

    #[test]
    fn tier_statistics_pool_members() {
        let mut weak = ClusterProfile::from_score("w", 0.3);
        weak.median_module_minutes = 120.0;
        let mut mid = ClusterProfile::from_score("m", 0.6);
        mid.median_module_minutes = 80.0;
        let mut strong = ClusterProfile::from_score("s", 0.85);
        strong.median_module_minutes = 50.0;

        let c = ClusterClassifier::from_profiles(&[weak, mid, strong]).unwrap();
        assert_eq!(c.tier_statistics(Tier::Weak).mean_score, 0.3);
        assert_eq!(c.median_module_minutes().strong, 50.0);
        assert_eq!(c.learner_weights().medium, 1.0);
    }
}
