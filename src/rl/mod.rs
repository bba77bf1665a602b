// src/rl/mod.rs
//
// Reinforcement-learning layer.
//
// - ValueTable / artifact: sparse Q-table, checksummed persistence
// - QAgent: TD(0) Q-learning with tier-adaptive learning rates
// - Policy: heuristic scorer, heuristic and epsilon-greedy policies
// - LearnerSampler: synthetic learner randomisation
// - BehaviorSimulator: trajectory generation for offline pretraining
// - TrajectoryCollector / TrajectoryWriter: JSONL datasets
// - Trainer: sequential and sharded training loops

pub mod agent;
pub mod learner_rand;
pub mod policy;
pub mod runner;
pub mod sim_env;
pub mod trajectory;
pub mod value_table;

pub use agent::{AgentConfig, QAgent};
pub use learner_rand::{LearnerProfile, LearnerRandConfig, LearnerSampler, TierAssignment};
pub use policy::{
    EpsilonGreedyPolicy, HeuristicPolicy, HeuristicScorer, HeuristicWeights, Policy,
    EPSILON_GREEDY_POLICY_VERSION, HEURISTIC_POLICY_VERSION,
};
pub use runner::{EpisodeRecord, Trainer, TrainingSummary};
pub use sim_env::{BehaviorSimulator, Episode, LearningCurve, SimulatorConfig};
pub use trajectory::{
    read_records, TrajectoryCollector, TrajectoryMetadata, TrajectoryRecord, TrajectoryWriter,
    TRAJECTORY_VERSION,
};
pub use value_table::{
    load_artifact, save_artifact, TrainingMetadata, ValueTable, ValueTableArtifact,
    ARTIFACT_VERSION,
};
