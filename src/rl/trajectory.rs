// src/rl/trajectory.rs
//
// Simulated trajectory datasets.
//
// - TrajectoryRecord: one transition plus its reward breakdown
// - TrajectoryCollector: runs simulator episodes under a policy
// - TrajectoryWriter: trajectories.jsonl + metadata.json in a directory

use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::policy::Policy;
use super::sim_env::BehaviorSimulator;
use crate::error::ValidationError;
use crate::features::FEATURE_SCHEMA_VERSION;
use crate::metrics::OnlineStats;
use crate::reward::RewardComponents;
use crate::types::Transition;

/// Increment when the record schema changes.
pub const TRAJECTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    #[serde(flatten)]
    pub transition: Transition,
    pub components: RewardComponents,
    pub episode_idx: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryMetadata {
    pub trajectory_version: u32,
    pub feature_schema_version: u32,
    pub policy_version: String,
    pub base_seed: u64,
    pub learner_preset: String,
    pub max_steps: u32,
    pub num_episodes: u32,
    pub num_transitions: u64,
    pub mean_episode_length: f64,
    pub mean_return: f64,
    /// Fraction of episodes that finished every module.
    pub completion_rate: f64,
    pub collected_at_unix: u64,
}

pub struct TrajectoryCollector {
    base_seed: u64,
    learner_preset: String,
}

impl TrajectoryCollector {
    pub fn new(base_seed: u64, learner_preset: &str) -> Self {
        Self {
            base_seed,
            learner_preset: learner_preset.to_string(),
        }
    }

    /// Run `num_episodes` learners (ids 0..n) and collect their transitions.
    pub fn collect(
        &self,
        sim: &BehaviorSimulator<'_>,
        policy: &dyn Policy,
        num_episodes: u32,
    ) -> Result<(Vec<TrajectoryRecord>, TrajectoryMetadata), ValidationError> {
        let mut records = Vec::new();
        let mut lengths = OnlineStats::default();
        let mut returns = OnlineStats::default();
        let mut finished = 0u32;

        for episode_idx in 0..num_episodes {
            let episode = sim.run_episode(episode_idx, self.base_seed, policy)?;
            lengths.add(episode.len() as f64);
            returns.add(episode.total_reward());
            if episode.finished {
                finished += 1;
            }
            records.extend(
                episode
                    .transitions
                    .into_iter()
                    .zip(episode.components)
                    .map(|(transition, components)| TrajectoryRecord {
                        transition,
                        components,
                        episode_idx,
                    }),
            );
        }

        let metadata = TrajectoryMetadata {
            trajectory_version: TRAJECTORY_VERSION,
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            policy_version: policy.version().to_string(),
            base_seed: self.base_seed,
            learner_preset: self.learner_preset.clone(),
            max_steps: sim.config().max_steps,
            num_episodes,
            num_transitions: records.len() as u64,
            mean_episode_length: lengths.mean(),
            mean_return: returns.mean(),
            completion_rate: if num_episodes == 0 {
                0.0
            } else {
                finished as f64 / num_episodes as f64
            },
            collected_at_unix: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        Ok((records, metadata))
    }
}

pub struct TrajectoryWriter {
    output_dir: PathBuf,
}

impl TrajectoryWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.output_dir.join("trajectories.jsonl")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join("metadata.json")
    }

    /// Creates:
    /// - {output_dir}/trajectories.jsonl
    /// - {output_dir}/metadata.json
    pub fn write(&self, records: &[TrajectoryRecord], metadata: &TrajectoryMetadata) -> io::Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let metadata_json = serde_json::to_string_pretty(metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.metadata_path(), metadata_json)?;

        let mut out = BufWriter::new(fs::File::create(self.records_path())?);
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(out, "{line}")?;
        }
        out.flush()?;

        info!(
            dir = %self.output_dir.display(),
            transitions = records.len(),
            "wrote trajectories"
        );
        Ok(())
    }
}

/// Read a trajectories.jsonl file back. Blank lines are skipped.
pub fn read_records(path: &Path) -> io::Result<Vec<TrajectoryRecord>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActionCatalog;
    use crate::cluster::ClusterClassifier;
    use crate::reward::RewardModel;
    use crate::rl::learner_rand::{LearnerRandConfig, LearnerSampler};
    use crate::rl::policy::HeuristicPolicy;
    use crate::rl::sim_env::SimulatorConfig;
    use crate::state::{EncoderConfig, StateEncoder};

    const COURSE: &str = r#"{"course_id": "c", "sections": [
        {"id": "s1", "name": "One", "subsections": [{"id": "u1", "name": "U", "resources": [
            {"id": "v", "name": "Intro video", "kind": "video"},
            {"id": "q", "name": "Quiz", "kind": "quiz"}
        ]}]}
    ]}"#;

    #[test]
    fn collect_write_and_read_back() {
        let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
        let classifier =
            ClusterClassifier::from_scores(&[("a".into(), 0.4), ("b".into(), 0.8)]).unwrap();
        let encoder = StateEncoder::new(EncoderConfig::default(), catalog.module_count());
        let reward = RewardModel::default();
        let sampler = LearnerSampler::new(LearnerRandConfig::deterministic(), &classifier);
        let sim = BehaviorSimulator::new(
            &catalog,
            &encoder,
            &reward,
            &sampler,
            SimulatorConfig::default(),
        );

        let collector = TrajectoryCollector::new(17, "deterministic");
        let (records, meta) = collector
            .collect(&sim, &HeuristicPolicy::default(), 4)
            .unwrap();
        assert_eq!(meta.num_transitions, records.len() as u64);
        assert_eq!(meta.num_episodes, 4);
        assert!(records.iter().all(|r| r.episode_idx < 4));

        let dir = tempfile::tempdir().unwrap();
        let writer = TrajectoryWriter::new(dir.path());
        writer.write(&records, &meta).unwrap();
        assert!(writer.metadata_path().exists());

        let back = read_records(&writer.records_path()).unwrap();
        assert_eq!(back, records);
    }
}
