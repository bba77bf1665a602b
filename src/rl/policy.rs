// src/rl/policy.rs
//
// Action-selection policies shared by the simulator and the recommender.
//
// - HeuristicScorer: rule-based score in [0, 1] for (state, action)
// - Policy: trait for choosing one action among candidates
// - HeuristicPolicy: always the top heuristic choice (pre-training)
// - EpsilonGreedyPolicy: explore uniformly with probability epsilon, else
//   exploit the value table (heuristic order when the table knows nothing)

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::value_table::ValueTable;
use crate::error::ValidationError;
use crate::reward::sequence_bonus;
use crate::types::{Action, ActionType, Difficulty, LearnerState, Quartile, Tier};

pub const HEURISTIC_POLICY_VERSION: &str = "heuristic-v1";
pub const EPSILON_GREEDY_POLICY_VERSION: &str = "q-egreedy-v1";

/// Weights of the four heuristic terms. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub difficulty_match: f64,
    pub type_match: f64,
    pub engagement_boost: f64,
    pub struggle_mitigation: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            difficulty_match: 0.4,
            type_match: 0.3,
            engagement_boost: 0.2,
            struggle_mitigation: 0.1,
        }
    }
}

impl HeuristicWeights {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let w = [
            self.difficulty_match,
            self.type_match,
            self.engagement_boost,
            self.struggle_mitigation,
        ];
        if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(ValidationError::new(
                "recommender.weights",
                "weights must be finite and >= 0",
            ));
        }
        let sum: f64 = w.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ValidationError::new(
                "recommender.weights",
                format!("weights must sum to 1, got {sum}"),
            ));
        }
        Ok(())
    }
}

/// Preferred action types per tier, best first.
fn preferred_types(tier: Tier) -> &'static [ActionType] {
    match tier {
        Tier::Weak => &[
            ActionType::ReadResource,
            ActionType::WatchVideo,
            ActionType::ReviewQuiz,
        ],
        Tier::Medium => &[
            ActionType::DoQuiz,
            ActionType::WatchVideo,
            ActionType::ReviewQuiz,
        ],
        Tier::Strong => &[
            ActionType::DoAssignment,
            ActionType::DoQuiz,
            ActionType::ForumPost,
        ],
    }
}

/// Rule-based scorer used before training and whenever the table is silent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer {
    weights: HeuristicWeights,
}

impl HeuristicScorer {
    pub fn new(weights: HeuristicWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &HeuristicWeights {
        &self.weights
    }

    /// Difficulty level the learner should be working at.
    pub fn target_difficulty(state: &LearnerState) -> Difficulty {
        let mut level = match state.tier {
            Tier::Weak => 0i8,
            Tier::Medium => 1,
            Tier::Strong => 2,
        };
        if state.stuck || state.score_bin == Quartile::Q25 {
            level -= 1;
        } else if state.score_bin == Quartile::Q100 {
            level += 1;
        }
        Difficulty::from_level(level.clamp(0, 2) as u8)
    }

    pub fn difficulty_match(state: &LearnerState, action: &Action) -> f64 {
        let target = Self::target_difficulty(state).level() as f64;
        1.0 - (action.difficulty.level() as f64 - target).abs() / 2.0
    }

    pub fn type_match(state: &LearnerState, action: &Action) -> f64 {
        match preferred_types(state.tier)
            .iter()
            .position(|t| *t == action.action_type)
        {
            Some(0) => 1.0,
            Some(1) => 0.8,
            Some(_) => 0.6,
            None => 0.2,
        }
    }

    /// Variety: repeating the last type scores 0; a known good follow-up 1.
    pub fn engagement_boost(state: &LearnerState, action: &Action) -> f64 {
        match state.recent_action {
            None => 0.5,
            Some(prev) if prev == action.action_type => 0.0,
            Some(prev) if sequence_bonus(prev, action.action_type) > 0.0 => 1.0,
            Some(_) => 0.6,
        }
    }

    /// Supportive activities score high while the learner is struggling.
    pub fn struggle_mitigation(state: &LearnerState, action: &Action) -> f64 {
        let struggling = state.stuck || state.score_bin <= Quartile::Q50;
        if !struggling {
            return 0.5;
        }
        match action.action_type {
            ActionType::ReviewQuiz => 1.0,
            ActionType::WatchVideo => 0.9,
            ActionType::ReadResource => 0.8,
            ActionType::ForumPost => 0.7,
            ActionType::DoQuiz | ActionType::DoAssignment => 0.2,
        }
    }

    pub fn score(&self, state: &LearnerState, action: &Action) -> f64 {
        let w = &self.weights;
        w.difficulty_match * Self::difficulty_match(state, action)
            + w.type_match * Self::type_match(state, action)
            + w.engagement_boost * Self::engagement_boost(state, action)
            + w.struggle_mitigation * Self::struggle_mitigation(state, action)
    }

    /// Candidates with heuristic scores, best first; ties by id.
    pub fn rank<'a>(&self, state: &LearnerState, candidates: &[&'a Action]) -> Vec<(&'a Action, f64)> {
        let mut scored: Vec<(&'a Action, f64)> =
            candidates.iter().map(|a| (*a, self.score(state, a))).collect();
        scored.sort_by(|a, b| by_value_then_id(a, b));
        scored
    }
}

/// Descending value, ascending id.
pub fn by_value_then_id(a: &(&Action, f64), b: &(&Action, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id))
}

/// Chooses one action among candidates for a learner state.
pub trait Policy: Send + Sync {
    /// Version string recorded with trajectories.
    fn version(&self) -> &str;

    /// None only when `candidates` is empty.
    fn choose<'a>(
        &self,
        state: &LearnerState,
        candidates: &[&'a Action],
        rng: &mut ChaCha8Rng,
    ) -> Option<&'a Action>;
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicPolicy {
    scorer: HeuristicScorer,
}

impl HeuristicPolicy {
    pub fn new(scorer: HeuristicScorer) -> Self {
        Self { scorer }
    }
}

impl Policy for HeuristicPolicy {
    fn version(&self) -> &str {
        HEURISTIC_POLICY_VERSION
    }

    fn choose<'a>(
        &self,
        state: &LearnerState,
        candidates: &[&'a Action],
        _rng: &mut ChaCha8Rng,
    ) -> Option<&'a Action> {
        self.scorer.rank(state, candidates).first().map(|(a, _)| *a)
    }
}

/// Epsilon-greedy over a frozen view of the value table.
#[derive(Debug, Clone)]
pub struct EpsilonGreedyPolicy<'t> {
    table: &'t ValueTable,
    epsilon: f64,
    scorer: HeuristicScorer,
}

impl<'t> EpsilonGreedyPolicy<'t> {
    pub fn new(table: &'t ValueTable, epsilon: f64, scorer: HeuristicScorer) -> Self {
        Self {
            table,
            epsilon: epsilon.clamp(0.0, 1.0),
            scorer,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Highest learned value; heuristic order when every candidate is zero.
    pub fn greedy<'a>(&self, state: &LearnerState, candidates: &[&'a Action]) -> Option<&'a Action> {
        let valued: Vec<(&'a Action, f64)> = candidates
            .iter()
            .map(|a| (*a, self.table.value(state, &a.id)))
            .collect();
        if valued.iter().all(|(_, v)| *v == 0.0) {
            return self.scorer.rank(state, candidates).first().map(|(a, _)| *a);
        }
        valued
            .into_iter()
            .min_by(by_value_then_id)
            .map(|(a, _)| a)
    }
}

impl Policy for EpsilonGreedyPolicy<'_> {
    fn version(&self) -> &str {
        EPSILON_GREEDY_POLICY_VERSION
    }

    fn choose<'a>(
        &self,
        state: &LearnerState,
        candidates: &[&'a Action],
        rng: &mut ChaCha8Rng,
    ) -> Option<&'a Action> {
        if candidates.is_empty() {
            return None;
        }
        if rng.gen::<f64>() < self.epsilon {
            return candidates.choose(rng).copied();
        }
        self.greedy(state, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn action(id: &str, action_type: ActionType, difficulty: Difficulty) -> Action {
        Action {
            id: id.to_string(),
            name: id.to_string(),
            action_type,
            purpose: action_type.purpose(),
            difficulty,
            module_ref: 0,
            expected_minutes: 10.0,
        }
    }

    fn state(tier: Tier, score_bin: Quartile, stuck: bool) -> LearnerState {
        LearnerState {
            tier,
            module_index: 0,
            progress_bin: Quartile::Q25,
            score_bin,
            recent_action: None,
            stuck,
        }
    }

    #[test]
    fn default_weights_are_valid() {
        assert!(HeuristicWeights::default().validate().is_ok());
        let bad = HeuristicWeights {
            difficulty_match: 0.9,
            ..HeuristicWeights::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let scorer = HeuristicScorer::default();
        for tier in Tier::ALL {
            for q in Quartile::ALL {
                for stuck in [false, true] {
                    for t in ActionType::ALL {
                        for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
                            let mut s = state(tier, q, stuck);
                            s.recent_action = Some(ActionType::ReadResource);
                            let x = scorer.score(&s, &action("a", t, d));
                            assert!((0.0..=1.0).contains(&x), "{x}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn stuck_weak_learner_prefers_easy_support() {
        let scorer = HeuristicScorer::default();
        let s = state(Tier::Weak, Quartile::Q25, true);
        let easy_read = action("r", ActionType::ReadResource, Difficulty::Easy);
        let hard_assign = action("x", ActionType::DoAssignment, Difficulty::Hard);
        let ranked = scorer.rank(&s, &[&hard_assign, &easy_read]);
        assert_eq!(ranked[0].0.id, "r");
    }

    #[test]
    fn ties_break_by_id() {
        let scorer = HeuristicScorer::default();
        let s = state(Tier::Medium, Quartile::Q50, false);
        let b = action("b", ActionType::DoQuiz, Difficulty::Medium);
        let a = action("a", ActionType::DoQuiz, Difficulty::Medium);
        let ranked = scorer.rank(&s, &[&b, &a]);
        assert_eq!(ranked[0].0.id, "a");
    }

    #[test]
    fn greedy_uses_table_when_it_has_values() {
        let mut table = ValueTable::new();
        let s = state(Tier::Medium, Quartile::Q50, false);
        let a = action("a", ActionType::DoQuiz, Difficulty::Medium);
        let b = action("b", ActionType::ForumPost, Difficulty::Hard);
        table
            .td_update(s, "b", 1.0, &s, true, 0.5, 0.95, (-5.0, 5.0))
            .unwrap();

        let policy = EpsilonGreedyPolicy::new(&table, 0.0, HeuristicScorer::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(policy.choose(&s, &[&a, &b], &mut rng).unwrap().id, "b");

        let empty = ValueTable::new();
        let cold = EpsilonGreedyPolicy::new(&empty, 0.0, HeuristicScorer::default());
        assert_eq!(cold.choose(&s, &[&a, &b], &mut rng).unwrap().id, "a");
        assert!(cold.choose(&s, &[], &mut rng).is_none());
    }

    #[test]
    fn full_exploration_stays_within_candidates() {
        let table = ValueTable::new();
        let policy = EpsilonGreedyPolicy::new(&table, 1.0, HeuristicScorer::default());
        let s = state(Tier::Strong, Quartile::Q75, false);
        let a = action("a", ActionType::DoQuiz, Difficulty::Medium);
        let b = action("b", ActionType::ForumPost, Difficulty::Hard);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let id = &policy.choose(&s, &[&a, &b], &mut rng).unwrap().id;
            assert!(id == "a" || id == "b");
        }
    }
}
