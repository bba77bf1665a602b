// src/rl/sim_env.rs
//
// Behavior simulator: manufactures learner trajectories for offline
// pretraining of the value table.
//
// One episode = one synthetic learner working through the catalog module by
// module. Each step:
//   1. encode the learner's current state
//   2. candidates = unfinished actions of the current module
//   3. policy picks one
//   4. sample success from ability, difficulty, engagement and the learning
//      curve; derive score and time spent
//   5. reward from the pre-step state and recent history
//   6. update the learner context; success completes the action and, when
//      the module is done, advances to the next one
//
// Episodes end when every module is done or the step budget runs out.
// Deterministic given the seed and learner id.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::learner_rand::{LearnerProfile, LearnerSampler};
use super::policy::Policy;
use crate::catalog::ActionCatalog;
use crate::error::ValidationError;
use crate::reward::{RewardComponents, RewardModel};
use crate::state::{LearnerContext, StateEncoder};
use crate::types::{Action, Difficulty, Outcome, TimestampMs, Transition};

/// Shape of improvement over repeated attempts on one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCurve {
    Logistic,
    Exponential,
}

impl LearningCurve {
    /// Mastery in [0, 1) after `attempts` prior attempts.
    pub fn gain(&self, attempts: u32, rate: f64, midpoint: f64) -> f64 {
        let n = attempts as f64;
        match self {
            LearningCurve::Logistic => {
                // shifted so that zero attempts gives zero gain
                let f = |x: f64| 1.0 / (1.0 + (-rate * (x - midpoint)).exp());
                let base = f(0.0);
                ((f(n) - base) / (1.0 - base)).clamp(0.0, 1.0)
            }
            LearningCurve::Exponential => 1.0 - (-rate * n).exp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Step budget per episode.
    pub max_steps: u32,
    pub curve: LearningCurve,
    pub curve_rate: f64,
    /// Logistic midpoint in attempts.
    pub curve_midpoint: f64,
    /// Score at or above which an activity counts as successful.
    pub success_threshold: f64,
    /// Std of additive score noise.
    pub score_noise: f64,
    /// Std of multiplicative time noise.
    pub time_noise: f64,
    /// Success-probability penalty per difficulty level above easy.
    pub difficulty_penalty: f64,
    /// Episode start time.
    pub start_timestamp_ms: TimestampMs,
    /// Idle gap between steps.
    pub step_gap_ms: TimestampMs,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_steps: 60,
            curve: LearningCurve::Logistic,
            curve_rate: 1.2,
            curve_midpoint: 1.5,
            success_threshold: 0.6,
            score_noise: 0.08,
            time_noise: 0.15,
            difficulty_penalty: 0.15,
            start_timestamp_ms: 1_700_000_000_000,
            step_gap_ms: 5 * 60 * 1000,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_steps == 0 {
            return Err(ValidationError::new("simulator.max_steps", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.success_threshold) {
            return Err(ValidationError::new(
                "simulator.success_threshold",
                "must be in [0, 1]",
            ));
        }
        let non_negative = [
            ("simulator.curve_rate", self.curve_rate),
            ("simulator.score_noise", self.score_noise),
            ("simulator.time_noise", self.time_noise),
            ("simulator.difficulty_penalty", self.difficulty_penalty),
        ];
        for (field, x) in non_negative {
            if !x.is_finite() || x < 0.0 {
                return Err(ValidationError::new(field, "must be finite and >= 0"));
            }
        }
        if self.step_gap_ms < 0 {
            return Err(ValidationError::new("simulator.step_gap_ms", "must be >= 0"));
        }
        Ok(())
    }
}

/// One simulated learner's episode.
#[derive(Debug, Clone)]
pub struct Episode {
    pub profile: LearnerProfile,
    pub transitions: Vec<Transition>,
    pub components: Vec<RewardComponents>,
    pub completed_modules: usize,
    /// All modules finished before the step budget ran out.
    pub finished: bool,
}

impl Episode {
    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

pub struct BehaviorSimulator<'a> {
    catalog: &'a ActionCatalog,
    encoder: &'a StateEncoder,
    reward: &'a RewardModel,
    sampler: &'a LearnerSampler,
    config: SimulatorConfig,
}

impl<'a> BehaviorSimulator<'a> {
    pub fn new(
        catalog: &'a ActionCatalog,
        encoder: &'a StateEncoder,
        reward: &'a RewardModel,
        sampler: &'a LearnerSampler,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            catalog,
            encoder,
            reward,
            sampler,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn module_sizes(&self) -> Vec<usize> {
        (0..self.catalog.module_count())
            .map(|m| self.catalog.by_module(m).len())
            .collect()
    }

    /// Simulate one learner end to end.
    pub fn run_episode(
        &self,
        learner_id: u32,
        seed: u64,
        policy: &dyn Policy,
    ) -> Result<Episode, ValidationError> {
        let mut rng = self.sampler.rng_for(seed, learner_id);
        let profile = self.sampler.sample(learner_id, &mut rng);
        let mut ctx = LearnerContext::new(profile.tier, self.module_sizes());

        let mut transitions = Vec::new();
        let mut components = Vec::new();
        let mut now = self.config.start_timestamp_ms;

        while transitions.len() < self.config.max_steps as usize && !ctx.is_finished() {
            let candidates: Vec<&Action> = self
                .catalog
                .by_module(ctx.module_index())
                .into_iter()
                .filter(|a| !ctx.is_completed(&a.id))
                .collect();
            if candidates.is_empty() {
                ctx.advance_module();
                continue;
            }

            let state = self.encoder.encode(&ctx.encoder_input())?;
            let Some(action) = policy.choose(&state, &candidates, &mut rng) else {
                break;
            };

            let prior_attempts = ctx.attempts_on(&action.id);
            let outcome = self.sample_outcome(&profile, action, prior_attempts, ctx.avg_score(), &mut rng);
            let breakdown = self.reward.reward(
                profile.tier,
                action,
                &outcome,
                &state,
                ctx.recent_actions(),
            );

            ctx.record(action, &outcome);
            if outcome.success {
                ctx.complete_action(action);
                if ctx.module_progress() >= 1.0 {
                    ctx.advance_module();
                }
            }

            let step = transitions.len() as u32;
            let terminal = ctx.is_finished() || step + 1 >= self.config.max_steps;
            let next_state = self.encoder.encode(&ctx.encoder_input())?;

            transitions.push(Transition {
                learner_id,
                step,
                timestamp_ms: now,
                state,
                action_id: action.id.clone(),
                action_type: action.action_type,
                reward: breakdown.total(),
                next_state,
                terminal,
            });
            components.push(breakdown);

            let spent_ms = (outcome.time_spent_minutes * 60_000.0).round() as TimestampMs;
            now += spent_ms.max(0) + self.config.step_gap_ms;
        }

        Ok(Episode {
            profile,
            transitions,
            components,
            completed_modules: ctx.completed_modules(),
            finished: ctx.is_finished(),
        })
    }

    /// Success probability for one attempt.
    pub fn success_probability(
        &self,
        profile: &LearnerProfile,
        difficulty: Difficulty,
        gain: f64,
        avg_score: f64,
    ) -> f64 {
        let p = 0.5 * profile.ability + 0.2 * profile.engagement + 0.2 * avg_score + 0.3 * gain
            - self.config.difficulty_penalty * difficulty.level() as f64;
        p.clamp(0.02, 0.98)
    }

    fn sample_outcome(
        &self,
        profile: &LearnerProfile,
        action: &Action,
        prior_attempts: u32,
        avg_score: f64,
        rng: &mut ChaCha8Rng,
    ) -> Outcome {
        let c = &self.config;
        let gain = c.curve.gain(prior_attempts, c.curve_rate, c.curve_midpoint);
        let p = self.success_probability(profile, action.difficulty, gain, avg_score);
        let success = rng.gen::<f64>() < p;

        let noise = gaussian(rng, c.score_noise);
        let base = (profile.ability * (0.7 + 0.3 * gain) + noise).clamp(0.0, 1.0);
        let score = if success {
            base.max(c.success_threshold)
        } else {
            base.min((c.success_threshold - 0.05).max(0.0))
        };

        // slower when unpracticed and disengaged
        let pace = (1.3 - 0.5 * gain) * (1.0 + 0.5 * (1.0 - profile.engagement));
        let time_noise = (1.0 + gaussian(rng, c.time_noise)).max(0.2);
        let time_spent_minutes = (action.expected_minutes * pace * time_noise).max(0.5);

        Outcome {
            score,
            prev_score: avg_score,
            time_spent_minutes,
            expected_minutes: action.expected_minutes,
            completed: success,
            success,
            attempts: prior_attempts + 1,
        }
    }
}

fn gaussian(rng: &mut ChaCha8Rng, std: f64) -> f64 {
    if std <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, std).map(|d| d.sample(rng)).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterClassifier;
    use crate::rl::learner_rand::LearnerRandConfig;
    use crate::rl::policy::HeuristicPolicy;
    use crate::state::EncoderConfig;

    const COURSE: &str = r#"{
        "course_id": "c1",
        "sections": [
            {"id": "s1", "name": "Intro", "subsections": [{"id": "ss1", "name": "Basics", "resources": [
                {"id": "v1", "name": "Welcome video", "kind": "video"},
                {"id": "q1", "name": "Basics quiz", "kind": "quiz"}
            ]}]},
            {"id": "s2", "name": "Core", "subsections": [{"id": "ss2", "name": "Deep", "resources": [
                {"id": "r2", "name": "Reading", "kind": "page"},
                {"id": "a2", "name": "Advanced project", "kind": "assign"}
            ]}]}
        ]
    }"#;

    fn fixtures() -> (ActionCatalog, StateEncoder, RewardModel, LearnerSampler) {
        let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
        let classifier = ClusterClassifier::from_scores(&[
            ("g1".into(), 0.35),
            ("g2".into(), 0.6),
            ("g3".into(), 0.85),
        ])
        .unwrap();
        let encoder = StateEncoder::new(EncoderConfig::default(), catalog.module_count())
            .with_classifier(&classifier);
        let sampler = LearnerSampler::new(LearnerRandConfig::default(), &classifier);
        (catalog, encoder, RewardModel::default(), sampler)
    }

    #[test]
    fn curves_start_at_zero_and_increase() {
        for curve in [LearningCurve::Logistic, LearningCurve::Exponential] {
            assert!(curve.gain(0, 1.2, 1.5).abs() < 1e-12);
            let mut prev = 0.0;
            for n in 1..10 {
                let g = curve.gain(n, 1.2, 1.5);
                assert!(g > prev && g < 1.0);
                prev = g;
            }
        }
    }

    #[test]
    fn episode_is_bounded_and_deterministic() {
        let (catalog, encoder, reward, sampler) = fixtures();
        let config = SimulatorConfig {
            max_steps: 7,
            ..SimulatorConfig::default()
        };
        let sim = BehaviorSimulator::new(&catalog, &encoder, &reward, &sampler, config);
        let policy = HeuristicPolicy::default();

        for id in 0..20 {
            let a = sim.run_episode(id, 99, &policy).unwrap();
            let b = sim.run_episode(id, 99, &policy).unwrap();
            assert!(a.len() <= 7);
            assert!(!a.is_empty());
            assert_eq!(a.transitions, b.transitions);
            assert!(a.transitions.last().unwrap().terminal);
            assert!(a.transitions[..a.len() - 1].iter().all(|t| !t.terminal));
        }
    }

    #[test]
    fn module_index_never_decreases() {
        let (catalog, encoder, reward, sampler) = fixtures();
        let sim = BehaviorSimulator::new(
            &catalog,
            &encoder,
            &reward,
            &sampler,
            SimulatorConfig::default(),
        );
        let policy = HeuristicPolicy::default();
        for id in 0..10 {
            let ep = sim.run_episode(id, 5, &policy).unwrap();
            for t in &ep.transitions {
                assert!(t.next_state.module_index >= t.state.module_index);
                assert!(t.reward.is_finite());
            }
            for w in ep.transitions.windows(2) {
                assert!(w[1].timestamp_ms > w[0].timestamp_ms);
            }
        }
    }
}
