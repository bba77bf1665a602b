//! learnpath core library.
//!
//! Recommends the next learning activity for a learner. Learner features
//! are classified into a tier and encoded into a discrete state; a tabular
//! value function trained offline against a behavior simulator ranks the
//! candidate activities, with a deterministic heuristic scorer for states
//! the table has not learned. The binary (`src/main.rs`) is a thin CLI
//! around these components.

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod metrics;
pub mod recommend;
pub mod reward;
pub mod rl;
pub mod serving;
pub mod state;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use catalog::ActionCatalog;
pub use cluster::{ClusterClassifier, ClusterProfile, TierStatistics};
pub use config::{Config, TrainingConfig};
pub use error::{
    CatalogError, ClusterError, ConfigError, Error, Result, StorageError, ValidationError,
};
pub use features::FeatureMap;
pub use logging::{FileSink, MemorySink, NoopSink, TrainingSink};
pub use recommend::{Method, Recommendation, Recommender, RecommenderConfig};
pub use reward::{RewardComponents, RewardConfig, RewardModel};
pub use rl::{
    AgentConfig, BehaviorSimulator, HeuristicScorer, LearnerSampler, Policy, QAgent,
    SimulatorConfig, Trainer, TrainingMetadata, ValueTable,
};
pub use serving::TableHandle;
pub use state::{EncoderConfig, EncoderInput, LearnerContext, StateEncoder, StuckSignals};
pub use types::{
    Action, ActionType, Difficulty, LearnerState, Outcome, Purpose, Quartile, Tier, TierValues,
    Transition,
};
