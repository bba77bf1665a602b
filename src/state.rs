// src/state.rs
//
// Discrete learner state encoding and per-learner tracking.
//
// - quartile_bin:   continuous [0,1] -> {0.25, 0.5, 0.75, 1.0}
// - StateEncoder:   tier + behavioral signals -> LearnerState
// - LearnerContext: one owned object per learner session holding attempt
//                   counters, recency window and score history

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterClassifier;
use crate::error::ValidationError;
use crate::features::{self, FeatureMap};
use crate::metrics::mean;
use crate::types::{Action, ActionType, LearnerState, Outcome, Quartile, Tier, TierValues};

/// Number of recent actions kept in a learner's recency window.
pub const RECENT_ACTION_WINDOW: usize = 5;

/// Map a value to the smallest quartile boundary >= the value.
///
/// Values are clamped to [0, 1] first, so 0 maps to 0.25 and anything above
/// 1 maps to 1.0. NaN has no bin.
pub fn quartile_bin(x: f64) -> Option<Quartile> {
    if x.is_nan() {
        return None;
    }
    let x = x.clamp(0.0, 1.0);
    let bin = if x <= 0.25 {
        Quartile::Q25
    } else if x <= 0.5 {
        Quartile::Q50
    } else if x <= 0.75 {
        Quartile::Q75
    } else {
        Quartile::Q100
    };
    Some(bin)
}

/// Stuck-detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Stuck when quiz attempts on the current module exceed this.
    pub quiz_attempt_threshold: u32,
    /// Stuck when minutes on module exceed this multiple of the tier median.
    pub time_multiplier: f64,
    /// Median minutes on a module per tier (overridden from cluster stats).
    pub median_module_minutes: TierValues<f64>,
    /// Number of most recent scores averaged for the low-score signal.
    pub score_window: usize,
    /// Stuck when the recent mean score is below this.
    pub low_score_threshold: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quiz_attempt_threshold: 3,
            time_multiplier: 2.0,
            median_module_minutes: TierValues::new(120.0, 90.0, 60.0),
            score_window: 3,
            low_score_threshold: 0.5,
        }
    }
}

/// Raw signals used for stuck detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StuckSignals {
    pub quiz_attempts: u32,
    pub minutes_on_module: f64,
    /// Scores recorded on the current module, oldest first.
    pub recent_scores: Vec<f64>,
}

/// Typed encoder input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderInput {
    pub tier: Tier,
    pub module_index: i64,
    pub module_progress: f64,
    pub avg_score: f64,
    pub recent_action: Option<ActionType>,
    pub signals: StuckSignals,
}

/// Builds canonical `LearnerState` tuples.
#[derive(Debug, Clone)]
pub struct StateEncoder {
    config: EncoderConfig,
    module_count: usize,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig, module_count: usize) -> Self {
        Self {
            config,
            module_count: module_count.max(1),
        }
    }

    /// Take per-tier median module times from the cluster statistics.
    pub fn with_classifier(mut self, classifier: &ClusterClassifier) -> Self {
        self.config.median_module_minutes = classifier.median_module_minutes();
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn module_count(&self) -> usize {
        self.module_count
    }

    pub fn encode(&self, input: &EncoderInput) -> Result<LearnerState, ValidationError> {
        let progress_bin = quartile_bin(input.module_progress)
            .ok_or_else(|| ValidationError::new(features::MODULE_PROGRESS, "value is NaN"))?;
        let score_bin = quartile_bin(input.avg_score)
            .ok_or_else(|| ValidationError::new(features::AVG_SCORE, "value is NaN"))?;
        if input.signals.minutes_on_module.is_nan() {
            return Err(ValidationError::new(features::TIME_ON_MODULE, "value is NaN"));
        }
        if input.signals.recent_scores.iter().any(|s| s.is_nan()) {
            return Err(ValidationError::new(features::RECENT_SCORES, "contains NaN"));
        }

        let last = (self.module_count - 1) as i64;
        let module_index = input.module_index.clamp(0, last).min(u16::MAX as i64) as u16;

        Ok(LearnerState {
            tier: input.tier,
            module_index,
            progress_bin,
            score_bin,
            recent_action: input.recent_action,
            stuck: self.is_stuck(input.tier, &input.signals),
        })
    }

    /// Encode a flat feature map. `tier` overrides any tier/group fields in
    /// the map.
    pub fn encode_features(
        &self,
        map: &FeatureMap,
        tier: Option<Tier>,
        classifier: Option<&ClusterClassifier>,
    ) -> Result<LearnerState, ValidationError> {
        let tier = match tier {
            Some(t) => t,
            None => map.tier(classifier)?,
        };

        let module_index = map.require_f64(features::MODULE_INDEX)?;
        let module_progress = map.require_f64(features::MODULE_PROGRESS)?;
        let avg_score = map.require_f64(features::AVG_SCORE)?;
        let recent_action = features::action_type_for_event(map.require_str(features::LAST_ACTION)?)?;
        let quiz_attempts = map.require_f64(features::QUIZ_ATTEMPTS)?;
        let minutes = map.require_f64(features::TIME_ON_MODULE)?;
        let recent_scores = map.optional_f64_list(features::RECENT_SCORES)?;

        let input = EncoderInput {
            tier,
            module_index: module_index.round().clamp(i64::MIN as f64, i64::MAX as f64) as i64,
            module_progress,
            avg_score,
            recent_action,
            signals: StuckSignals {
                quiz_attempts: quiz_attempts.round().clamp(0.0, u32::MAX as f64) as u32,
                minutes_on_module: minutes.max(0.0),
                recent_scores: recent_scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect(),
            },
        };
        self.encode(&input)
    }

    /// Check a state built outside the encoder. Enum fields are closed;
    /// only the module index can leave its domain.
    pub fn validate_state(&self, state: &LearnerState) -> Result<(), ValidationError> {
        if state.module_index as usize >= self.module_count {
            return Err(ValidationError::new(
                features::MODULE_INDEX,
                format!(
                    "{} is outside 0..{}",
                    state.module_index, self.module_count
                ),
            ));
        }
        Ok(())
    }

    /// Any one signal is enough.
    pub fn is_stuck(&self, tier: Tier, signals: &StuckSignals) -> bool {
        if signals.quiz_attempts > self.config.quiz_attempt_threshold {
            return true;
        }

        let median = self.config.median_module_minutes.get(tier);
        if median > 0.0 && signals.minutes_on_module > self.config.time_multiplier * median {
            return true;
        }

        let window = self.config.score_window.max(2);
        let scores = &signals.recent_scores;
        if scores.len() >= 2 {
            let tail = &scores[scores.len().saturating_sub(window)..];
            if let Some(m) = mean(tail) {
                if m < self.config.low_score_threshold {
                    return true;
                }
            }
        }

        false
    }
}

/// One entry of the recency window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAction {
    pub id: String,
    pub action_type: ActionType,
}

/// Per-learner tracking state, owned by the session (or simulated episode).
///
/// Transitions:
/// - `record`: an action was taken with an outcome
/// - `complete_action`: a successful outcome counts towards module progress
/// - `advance_module`: the current module is done; move on
#[derive(Debug, Clone)]
pub struct LearnerContext {
    tier: Tier,
    module_sizes: Vec<usize>,
    module_index: usize,
    quiz_attempts: u32,
    minutes_on_module: f64,
    module_scores: Vec<f64>,
    score_history: Vec<f64>,
    recent: Vec<RecentAction>,
    completed: HashSet<String>,
    completed_in_module: usize,
    completed_modules: usize,
    action_attempts: HashMap<String, u32>,
}

impl LearnerContext {
    /// `module_sizes[i]` is the number of actions in module `i`.
    pub fn new(tier: Tier, module_sizes: Vec<usize>) -> Self {
        Self {
            tier,
            module_sizes,
            module_index: 0,
            quiz_attempts: 0,
            minutes_on_module: 0.0,
            module_scores: Vec::new(),
            score_history: Vec::new(),
            recent: Vec::with_capacity(RECENT_ACTION_WINDOW),
            completed: HashSet::new(),
            completed_in_module: 0,
            completed_modules: 0,
            action_attempts: HashMap::new(),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn module_index(&self) -> usize {
        self.module_index
    }

    pub fn module_count(&self) -> usize {
        self.module_sizes.len()
    }

    /// True once every module has been completed.
    pub fn is_finished(&self) -> bool {
        self.module_index >= self.module_sizes.len()
    }

    pub fn completed_modules(&self) -> usize {
        self.completed_modules
    }

    pub fn is_completed(&self, action_id: &str) -> bool {
        self.completed.contains(action_id)
    }

    pub fn attempts_on(&self, action_id: &str) -> u32 {
        self.action_attempts.get(action_id).copied().unwrap_or(0)
    }

    /// Mean of all recorded scores; 0 before any score.
    pub fn avg_score(&self) -> f64 {
        mean(&self.score_history).unwrap_or(0.0)
    }

    pub fn module_progress(&self) -> f64 {
        if self.is_finished() {
            return 1.0;
        }
        let size = self.module_sizes[self.module_index];
        if size == 0 {
            1.0
        } else {
            (self.completed_in_module as f64 / size as f64).min(1.0)
        }
    }

    pub fn recent_actions(&self) -> &[RecentAction] {
        &self.recent
    }

    pub fn last_action_type(&self) -> Option<ActionType> {
        self.recent.last().map(|r| r.action_type)
    }

    /// Record one interaction. Returns the attempt count on that action.
    pub fn record(&mut self, action: &Action, outcome: &Outcome) -> u32 {
        let attempts = self.action_attempts.entry(action.id.clone()).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;

        if action.action_type.is_quiz() {
            self.quiz_attempts += 1;
        }
        if outcome.time_spent_minutes.is_finite() {
            self.minutes_on_module += outcome.time_spent_minutes.max(0.0);
        }
        if outcome.score.is_finite() {
            let s = outcome.score.clamp(0.0, 1.0);
            self.module_scores.push(s);
            self.score_history.push(s);
        }

        if self.recent.len() == RECENT_ACTION_WINDOW {
            self.recent.remove(0);
        }
        self.recent.push(RecentAction {
            id: action.id.clone(),
            action_type: action.action_type,
        });
        attempts
    }

    /// Mark an action completed. Returns false if it already was.
    pub fn complete_action(&mut self, action: &Action) -> bool {
        if !self.completed.insert(action.id.clone()) {
            return false;
        }
        if action.module_ref == self.module_index {
            self.completed_in_module += 1;
        }
        true
    }

    /// Move to the next module and reset module-scoped counters.
    pub fn advance_module(&mut self) {
        if self.is_finished() {
            return;
        }
        self.module_index += 1;
        self.completed_modules += 1;
        self.quiz_attempts = 0;
        self.minutes_on_module = 0.0;
        self.module_scores.clear();
        self.completed_in_module = 0;
    }

    pub fn signals(&self) -> StuckSignals {
        StuckSignals {
            quiz_attempts: self.quiz_attempts,
            minutes_on_module: self.minutes_on_module,
            recent_scores: self.module_scores.clone(),
        }
    }

    pub fn encoder_input(&self) -> EncoderInput {
        EncoderInput {
            tier: self.tier,
            module_index: self.module_index as i64,
            module_progress: self.module_progress(),
            avg_score: self.avg_score(),
            recent_action: self.last_action_type(),
            signals: self.signals(),
        }
    }
}
