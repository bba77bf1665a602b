// src/features.rs
//
// Feature-map boundary between the upstream log/feature pipeline and the
// state encoder.
//
// Upstream producers have used several key spellings over time. Instead of
// duck-typing, every legacy spelling is listed in one versioned alias table
// and resolved here; anything still missing after resolution is a
// ValidationError naming the canonical field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cluster::ClusterClassifier;
use crate::error::ValidationError;
use crate::types::{ActionType, Tier};

/// Bump when the canonical schema or alias table changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const MODULE_INDEX: &str = "module_index";
pub const MODULE_PROGRESS: &str = "module_progress";
pub const AVG_SCORE: &str = "avg_score";
pub const LAST_ACTION: &str = "last_action";
pub const QUIZ_ATTEMPTS: &str = "quiz_attempts";
pub const TIME_ON_MODULE: &str = "time_on_module_minutes";
pub const RECENT_SCORES: &str = "recent_scores";
pub const TIER: &str = "tier";
pub const GROUP_ID: &str = "group_id";

/// Legacy key -> canonical key (schema v1).
pub const ALIAS_TABLE: &[(&str, &str)] = &[
    ("current_module", MODULE_INDEX),
    ("module", MODULE_INDEX),
    ("section_index", MODULE_INDEX),
    ("progress", MODULE_PROGRESS),
    ("module_completion", MODULE_PROGRESS),
    ("completion_rate", MODULE_PROGRESS),
    ("mean_score", AVG_SCORE),
    ("avg_grade", AVG_SCORE),
    ("grade_avg", AVG_SCORE),
    ("average_score", AVG_SCORE),
    ("last_event", LAST_ACTION),
    ("recent_action", LAST_ACTION),
    ("last_action_type", LAST_ACTION),
    ("attempts", QUIZ_ATTEMPTS),
    ("quiz_attempts_current", QUIZ_ATTEMPTS),
    ("time_in_module", TIME_ON_MODULE),
    ("module_time", TIME_ON_MODULE),
    ("time_on_module", TIME_ON_MODULE),
    ("score_history", RECENT_SCORES),
    ("recent_grades", RECENT_SCORES),
    ("performance_tier", TIER),
    ("cluster", GROUP_ID),
    ("cluster_id", GROUP_ID),
];

/// Raw event identifier -> action type.
pub const EVENT_TABLE: &[(&str, ActionType)] = &[
    ("watch_video", ActionType::WatchVideo),
    ("video_play", ActionType::WatchVideo),
    ("video_viewed", ActionType::WatchVideo),
    ("lecture_viewed", ActionType::WatchVideo),
    ("do_quiz", ActionType::DoQuiz),
    ("quiz_attempt_started", ActionType::DoQuiz),
    ("quiz_attempt_submitted", ActionType::DoQuiz),
    ("forum_post", ActionType::ForumPost),
    ("forum_post_created", ActionType::ForumPost),
    ("discussion_created", ActionType::ForumPost),
    ("review_quiz", ActionType::ReviewQuiz),
    ("quiz_attempt_reviewed", ActionType::ReviewQuiz),
    ("quiz_review_viewed", ActionType::ReviewQuiz),
    ("read_resource", ActionType::ReadResource),
    ("resource_viewed", ActionType::ReadResource),
    ("page_viewed", ActionType::ReadResource),
    ("url_viewed", ActionType::ReadResource),
    ("book_viewed", ActionType::ReadResource),
    ("do_assignment", ActionType::DoAssignment),
    ("assign_submitted", ActionType::DoAssignment),
    ("submission_created", ActionType::DoAssignment),
];

/// Map a raw event identifier to an action type.
///
/// `Ok(None)` means "no recent action" (`none` or empty).
pub fn action_type_for_event(raw: &str) -> Result<Option<ActionType>, ValidationError> {
    let key = raw.trim().to_ascii_lowercase();
    if key.is_empty() || key == "none" {
        return Ok(None);
    }
    EVENT_TABLE
        .iter()
        .find(|(event, _)| *event == key)
        .map(|(_, t)| Some(*t))
        .ok_or_else(|| ValidationError::new(LAST_ACTION, format!("unknown event `{raw}`")))
}

/// Flat feature map as produced by the upstream pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap(BTreeMap<String, Value>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::new("features", e.to_string()))
    }

    /// Resolve a canonical field, consulting the alias table when the
    /// canonical key is absent. Canonical keys win over aliases.
    pub fn get(&self, canonical: &str) -> Option<&Value> {
        if let Some(v) = self.0.get(canonical).filter(|v| !v.is_null()) {
            return Some(v);
        }
        ALIAS_TABLE
            .iter()
            .filter(|(_, c)| *c == canonical)
            .find_map(|(alias, _)| {
                let v = self.0.get(*alias).filter(|v| !v.is_null())?;
                debug!(alias, canonical, "resolved legacy feature key");
                Some(v)
            })
    }

    pub fn require_f64(&self, field: &str) -> Result<f64, ValidationError> {
        let value = self.get(field).ok_or_else(|| ValidationError::missing(field))?;
        let x = value
            .as_f64()
            .ok_or_else(|| ValidationError::new(field, format!("expected a number, got {value}")))?;
        if x.is_nan() {
            return Err(ValidationError::new(field, "value is NaN"));
        }
        Ok(x)
    }

    pub fn require_str(&self, field: &str) -> Result<&str, ValidationError> {
        let value = self.get(field).ok_or_else(|| ValidationError::missing(field))?;
        value
            .as_str()
            .ok_or_else(|| ValidationError::new(field, format!("expected a string, got {value}")))
    }

    /// Optional list of numbers; absent means empty.
    pub fn optional_f64_list(&self, field: &str) -> Result<Vec<f64>, ValidationError> {
        let Some(value) = self.get(field) else {
            return Ok(Vec::new());
        };
        let items = value
            .as_array()
            .ok_or_else(|| ValidationError::new(field, "expected an array of numbers"))?;
        items
            .iter()
            .map(|v| {
                v.as_f64()
                    .filter(|x| !x.is_nan())
                    .ok_or_else(|| ValidationError::new(field, format!("bad entry {v}")))
            })
            .collect()
    }

    /// Resolve the learner tier: an explicit `tier` field first, then a
    /// `group_id` looked up in the classifier.
    pub fn tier(&self, classifier: Option<&ClusterClassifier>) -> Result<Tier, ValidationError> {
        if let Some(v) = self.get(TIER) {
            let raw = v
                .as_str()
                .ok_or_else(|| ValidationError::new(TIER, "expected a string"))?;
            return Tier::parse(raw)
                .ok_or_else(|| ValidationError::new(TIER, format!("unknown tier `{raw}`")));
        }

        let group = self.require_str(GROUP_ID).map_err(|_| ValidationError::missing(TIER))?;
        let classifier = classifier.ok_or_else(|| {
            ValidationError::new(GROUP_ID, "no classifier available to resolve group")
        })?;
        classifier
            .tier_of(group)
            .map_err(|e| ValidationError::new(GROUP_ID, e.to_string()))
    }
}
