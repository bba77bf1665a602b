// src/reward.rs
//
// Tier-scaled reward shaping for learning activities.
//
// The reward for one step is a sum of named components, then clipped:
//   + completion bonus            (weak > medium > strong)
//   + w * (score - prev_score)
//   - stuck penalty               (weak > medium > strong)
//   + challenge bonus on hard     (strong > medium > weak)
//   + efficiency bonus            (strong only)
//   + high-score bonus            (weak > medium > strong)
//   - repetition penalty
//   + sequence bonus              (static pair table, tier-scaled)
//
// Magnitudes are configuration; the orderings are validated.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::state::RecentAction;
use crate::types::{Action, ActionType, Difficulty, LearnerState, Outcome, Tier, TierValues};

/// (previous type, current type) -> base bonus.
pub const SEQUENCE_BONUS: &[(ActionType, ActionType, f64)] = &[
    (ActionType::ReadResource, ActionType::DoQuiz, 0.3),
    (ActionType::WatchVideo, ActionType::DoQuiz, 0.3),
    (ActionType::DoQuiz, ActionType::ReviewQuiz, 0.25),
    (ActionType::ReviewQuiz, ActionType::DoQuiz, 0.2),
    (ActionType::ReadResource, ActionType::DoAssignment, 0.2),
    (ActionType::WatchVideo, ActionType::DoAssignment, 0.2),
    (ActionType::ForumPost, ActionType::DoAssignment, 0.15),
];

pub fn sequence_bonus(prev: ActionType, curr: ActionType) -> f64 {
    SEQUENCE_BONUS
        .iter()
        .find(|(p, c, _)| *p == prev && *c == curr)
        .map(|(_, _, b)| *b)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub completion_bonus: TierValues<f64>,
    /// Multiplier on score improvement (all tiers).
    pub improvement_weight: f64,
    /// Penalty magnitude when the state is flagged stuck.
    pub stuck_penalty: TierValues<f64>,
    /// Bonus for succeeding on a hard activity.
    pub challenge_bonus: TierValues<f64>,
    /// Strong-tier bonus for finishing faster than expected.
    pub efficiency_bonus: f64,
    /// Efficiency applies when time < ratio * expected.
    pub efficiency_ratio: f64,
    pub high_score_bonus: TierValues<f64>,
    pub high_score_threshold: f64,
    pub repetition_penalty: f64,
    /// Consecutive actions of one type that trigger the repetition penalty.
    pub same_type_run: usize,
    pub sequence_scale: TierValues<f64>,
    pub clip_min: f64,
    pub clip_max: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            completion_bonus: TierValues::new(1.0, 0.7, 0.4),
            improvement_weight: 2.0,
            stuck_penalty: TierValues::new(0.8, 0.5, 0.3),
            challenge_bonus: TierValues::new(0.0, 0.3, 0.6),
            efficiency_bonus: 0.3,
            efficiency_ratio: 0.8,
            high_score_bonus: TierValues::new(0.6, 0.4, 0.2),
            high_score_threshold: 0.9,
            repetition_penalty: 0.5,
            same_type_run: 3,
            sequence_scale: TierValues::new(1.2, 1.0, 0.8),
            clip_min: -5.0,
            clip_max: 5.0,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let tiered = [
            ("reward.completion_bonus", &self.completion_bonus),
            ("reward.stuck_penalty", &self.stuck_penalty),
            ("reward.challenge_bonus", &self.challenge_bonus),
            ("reward.high_score_bonus", &self.high_score_bonus),
            ("reward.sequence_scale", &self.sequence_scale),
        ];
        for (field, v) in tiered {
            if Tier::ALL.iter().any(|t| !v.get(*t).is_finite() || v.get(*t) < 0.0) {
                return Err(ValidationError::new(field, "values must be finite and >= 0"));
            }
        }

        if !self.completion_bonus.is_descending() {
            return Err(ValidationError::new(
                "reward.completion_bonus",
                "must satisfy weak > medium > strong",
            ));
        }
        if !self.stuck_penalty.is_descending() {
            return Err(ValidationError::new(
                "reward.stuck_penalty",
                "must satisfy weak > medium > strong",
            ));
        }
        if !self.challenge_bonus.is_ascending() {
            return Err(ValidationError::new(
                "reward.challenge_bonus",
                "must satisfy strong > medium > weak",
            ));
        }
        if !self.high_score_bonus.is_descending() {
            return Err(ValidationError::new(
                "reward.high_score_bonus",
                "must satisfy weak > medium > strong",
            ));
        }

        let scalars = [
            ("reward.improvement_weight", self.improvement_weight),
            ("reward.efficiency_bonus", self.efficiency_bonus),
            ("reward.repetition_penalty", self.repetition_penalty),
        ];
        for (field, x) in scalars {
            if !x.is_finite() || x < 0.0 {
                return Err(ValidationError::new(field, "must be finite and >= 0"));
            }
        }
        if !(self.efficiency_ratio > 0.0 && self.efficiency_ratio <= 1.0) {
            return Err(ValidationError::new("reward.efficiency_ratio", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.high_score_threshold) {
            return Err(ValidationError::new(
                "reward.high_score_threshold",
                "must be in [0, 1]",
            ));
        }
        if self.same_type_run < 2 {
            return Err(ValidationError::new("reward.same_type_run", "must be >= 2"));
        }
        if !(self.clip_min.is_finite() && self.clip_max.is_finite() && self.clip_min < self.clip_max)
        {
            return Err(ValidationError::new(
                "reward.clip_min",
                "clip bounds must be finite with clip_min < clip_max",
            ));
        }
        Ok(())
    }
}

/// Per-step reward breakdown. Penalties are stored as negative values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    pub completion: f64,
    pub improvement: f64,
    pub stuck: f64,
    pub challenge: f64,
    pub efficiency: f64,
    pub high_score: f64,
    pub repetition: f64,
    pub sequence: f64,
    clip_min: f64,
    clip_max: f64,
}

impl RewardComponents {
    pub fn raw_sum(&self) -> f64 {
        self.completion
            + self.improvement
            + self.stuck
            + self.challenge
            + self.efficiency
            + self.high_score
            + self.repetition
            + self.sequence
    }

    /// Clipped scalar reward.
    pub fn total(&self) -> f64 {
        self.raw_sum().clamp(self.clip_min, self.clip_max)
    }
}

/// Clamp to [0,1]; NaN counts as 0.
fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct RewardModel {
    config: RewardConfig,
}

impl Default for RewardModel {
    fn default() -> Self {
        Self {
            config: RewardConfig::default(),
        }
    }
}

impl RewardModel {
    pub fn new(config: RewardConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reward for taking `action` in `state` with the given `outcome`.
    ///
    /// `history` is the learner's recent actions before this one, oldest
    /// first. Pure: no state is kept between calls.
    pub fn reward(
        &self,
        tier: Tier,
        action: &Action,
        outcome: &Outcome,
        state: &LearnerState,
        history: &[RecentAction],
    ) -> RewardComponents {
        let c = &self.config;
        let score = unit(outcome.score);
        let prev = unit(outcome.prev_score);

        let completion = if outcome.completed {
            c.completion_bonus.get(tier)
        } else {
            0.0
        };

        let improvement = c.improvement_weight * (score - prev);

        let stuck = if state.stuck {
            -c.stuck_penalty.get(tier)
        } else {
            0.0
        };

        let challenge = if outcome.success && action.difficulty == Difficulty::Hard {
            c.challenge_bonus.get(tier)
        } else {
            0.0
        };

        let efficiency = if tier == Tier::Strong
            && outcome.expected_minutes > 0.0
            && outcome.time_spent_minutes.is_finite()
            && outcome.time_spent_minutes < c.efficiency_ratio * outcome.expected_minutes
        {
            c.efficiency_bonus
        } else {
            0.0
        };

        let high_score = if score >= c.high_score_threshold {
            c.high_score_bonus.get(tier)
        } else {
            0.0
        };

        let repetition = if self.is_repetition(action, history) {
            -c.repetition_penalty
        } else {
            0.0
        };

        let sequence = history
            .last()
            .map(|prev| sequence_bonus(prev.action_type, action.action_type))
            .unwrap_or(0.0)
            * c.sequence_scale.get(tier);

        RewardComponents {
            completion,
            improvement,
            stuck,
            challenge,
            efficiency,
            high_score,
            repetition,
            sequence,
            clip_min: c.clip_min,
            clip_max: c.clip_max,
        }
    }

    /// Same action id as the last one, or the action would complete a run of
    /// `same_type_run` consecutive same-type actions.
    fn is_repetition(&self, action: &Action, history: &[RecentAction]) -> bool {
        let Some(last) = history.last() else {
            return false;
        };
        if last.id == action.id {
            return true;
        }
        let need = self.config.same_type_run - 1;
        history.len() >= need
            && history[history.len() - need..]
                .iter()
                .all(|r| r.action_type == action.action_type)
    }
}
