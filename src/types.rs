// src/types.rs
//
// Core domain types shared across the crate: tiers, action metadata,
// the discrete learner state and the transition record.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type TimestampMs = i64;

/// Ordinal performance segment derived from aggregate group performance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Weak,
    Medium,
    Strong,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Weak, Tier::Medium, Tier::Strong];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Weak => "weak",
            Tier::Medium => "medium",
            Tier::Strong => "strong",
        }
    }

    /// Parse a tier name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weak" | "low" | "w" => Some(Tier::Weak),
            "medium" | "mid" | "m" => Some(Tier::Medium),
            "strong" | "high" | "s" => Some(Tier::Strong),
            _ => None,
        }
    }

    /// Index 0..3 in ascending order.
    pub fn index(&self) -> usize {
        match self {
            Tier::Weak => 0,
            Tier::Medium => 1,
            Tier::Strong => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per tier. Used for every tier-scaled parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierValues<T> {
    pub weak: T,
    pub medium: T,
    pub strong: T,
}

impl<T: Copy> TierValues<T> {
    pub const fn new(weak: T, medium: T, strong: T) -> Self {
        Self {
            weak,
            medium,
            strong,
        }
    }

    pub fn get(&self, tier: Tier) -> T {
        match tier {
            Tier::Weak => self.weak,
            Tier::Medium => self.medium,
            Tier::Strong => self.strong,
        }
    }
}

impl TierValues<f64> {
    /// weak > medium > strong.
    pub fn is_descending(&self) -> bool {
        self.weak > self.medium && self.medium > self.strong
    }

    /// strong > medium > weak.
    pub fn is_ascending(&self) -> bool {
        self.strong > self.medium && self.medium > self.weak
    }
}

/// Recommendable activity category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    WatchVideo,
    DoQuiz,
    ForumPost,
    ReviewQuiz,
    ReadResource,
    DoAssignment,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::WatchVideo,
        ActionType::DoQuiz,
        ActionType::ForumPost,
        ActionType::ReviewQuiz,
        ActionType::ReadResource,
        ActionType::DoAssignment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::WatchVideo => "watch_video",
            ActionType::DoQuiz => "do_quiz",
            ActionType::ForumPost => "forum_post",
            ActionType::ReviewQuiz => "review_quiz",
            ActionType::ReadResource => "read_resource",
            ActionType::DoAssignment => "do_assignment",
        }
    }

    /// Quiz-like actions count towards the stuck attempt threshold.
    pub fn is_quiz(&self) -> bool {
        matches!(self, ActionType::DoQuiz | ActionType::ReviewQuiz)
    }

    pub fn purpose(&self) -> Purpose {
        match self {
            ActionType::WatchVideo | ActionType::ReadResource => Purpose::Learn,
            ActionType::ReviewQuiz => Purpose::Practice,
            ActionType::DoQuiz | ActionType::DoAssignment => Purpose::Assess,
            ActionType::ForumPost => Purpose::Discuss,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Ordinal level 0..=2.
    pub fn level(&self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Difficulty::Easy,
            1 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Learn,
    Practice,
    Assess,
    Discuss,
}

/// A recommendable course resource. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub action_type: ActionType,
    pub purpose: Purpose,
    pub difficulty: Difficulty,
    /// Dense module index this action belongs to.
    pub module_ref: usize,
    /// Nominal time to finish the activity once.
    pub expected_minutes: f64,
}

/// Result of one interaction step (simulated or logged).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Score achieved in [0, 1].
    pub score: f64,
    /// Learner's average score before this step, in [0, 1].
    pub prev_score: f64,
    pub time_spent_minutes: f64,
    pub expected_minutes: f64,
    pub completed: bool,
    pub success: bool,
    /// Attempts on this action so far, including this one.
    pub attempts: u32,
}

/// Quartile bin: the smallest of {0.25, 0.5, 0.75, 1.0} that is >= the value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Quartile {
    #[serde(rename = "0.25")]
    Q25,
    #[serde(rename = "0.5")]
    Q50,
    #[serde(rename = "0.75")]
    Q75,
    #[serde(rename = "1.0")]
    Q100,
}

impl Quartile {
    pub const ALL: [Quartile; 4] = [Quartile::Q25, Quartile::Q50, Quartile::Q75, Quartile::Q100];

    pub fn value(&self) -> f64 {
        match self {
            Quartile::Q25 => 0.25,
            Quartile::Q50 => 0.5,
            Quartile::Q75 => 0.75,
            Quartile::Q100 => 1.0,
        }
    }
}

/// Canonical discrete learner state: the hash key into the value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearnerState {
    pub tier: Tier,
    pub module_index: u16,
    pub progress_bin: Quartile,
    pub score_bin: Quartile,
    /// Most recent action type; None before the first action.
    pub recent_action: Option<ActionType>,
    pub stuck: bool,
}

impl fmt::Display for LearnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, m{}, p{}, s{}, {}, {})",
            self.tier,
            self.module_index,
            self.progress_bin.value(),
            self.score_bin.value(),
            self.recent_action.map(|a| a.as_str()).unwrap_or("none"),
            if self.stuck { "stuck" } else { "ok" }
        )
    }
}

/// One (s, a, r, s', done) step produced by the simulator or a log processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub learner_id: u32,
    pub step: u32,
    pub timestamp_ms: TimestampMs,
    pub state: LearnerState,
    pub action_id: String,
    pub action_type: ActionType,
    pub reward: f64,
    pub next_state: LearnerState,
    pub terminal: bool,
}
