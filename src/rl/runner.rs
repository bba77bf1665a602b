// src/rl/runner.rs
//
// Training loop for the Q-learning agent.
//
// - train: one episode at a time; each episode is simulated against the
//   current table and its transitions are applied in order
// - train_sharded: a batch of learners is simulated in parallel against a
//   frozen table, then merged sequentially in learner-id order. The result
//   does not depend on the thread count, but it is not identical to
//   sequential training (the table is frozen for the whole batch).

use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::agent::QAgent;
use super::policy::{EpsilonGreedyPolicy, HeuristicScorer, Policy};
use super::sim_env::{BehaviorSimulator, Episode};
use crate::catalog::ActionCatalog;
use crate::error::ValidationError;
use crate::logging::TrainingSink;
use crate::metrics::OnlineStats;
use crate::types::{LearnerState, Tier};

/// Per-episode telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: u64,
    pub learner_id: u32,
    pub tier: Tier,
    pub steps: usize,
    pub total_reward: f64,
    pub epsilon: f64,
    pub completed_modules: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub episodes: u64,
    pub updates: u64,
    pub final_epsilon: f64,
    pub states_visited: usize,
    pub mean_return: f64,
    /// Sample standard deviation of episode returns.
    pub std_return: f64,
    pub min_return: f64,
    pub max_return: f64,
    pub mean_length: f64,
    pub max_length: f64,
    /// Fraction of episodes that finished every module.
    pub completion_rate: f64,
}

pub struct Trainer<'a> {
    sim: BehaviorSimulator<'a>,
    catalog: &'a ActionCatalog,
    agent: QAgent,
    scorer: HeuristicScorer,
    seed: u64,
    next_learner: u32,
    returns: OnlineStats,
    lengths: OnlineStats,
    finished: u64,
}

impl<'a> Trainer<'a> {
    pub fn new(
        sim: BehaviorSimulator<'a>,
        catalog: &'a ActionCatalog,
        agent: QAgent,
        scorer: HeuristicScorer,
        seed: u64,
    ) -> Self {
        Self {
            sim,
            catalog,
            agent,
            scorer,
            seed,
            next_learner: 0,
            returns: OnlineStats::default(),
            lengths: OnlineStats::default(),
            finished: 0,
        }
    }

    pub fn agent(&self) -> &QAgent {
        &self.agent
    }

    pub fn into_agent(self) -> QAgent {
        self.agent
    }

    pub fn train(
        &mut self,
        episodes: u32,
        sink: &mut dyn TrainingSink,
    ) -> Result<TrainingSummary, ValidationError> {
        info!(episodes, seed = self.seed, "training (sequential)");
        for _ in 0..episodes {
            let learner_id = self.next_learner;
            let episode = {
                let policy =
                    EpsilonGreedyPolicy::new(self.agent.table(), self.agent.epsilon(), self.scorer);
                self.sim.run_episode(learner_id, self.seed, &policy)?
            };
            self.next_learner += 1;
            self.apply(&episode, sink)?;
        }
        sink.flush();
        Ok(self.summary())
    }

    pub fn train_sharded(
        &mut self,
        episodes: u32,
        batch: u32,
        threads: usize,
        sink: &mut dyn TrainingSink,
    ) -> Result<TrainingSummary, ValidationError> {
        let batch = batch.max(1);
        let threads = threads.max(1);
        info!(episodes, batch, threads, seed = self.seed, "training (sharded)");

        let mut remaining = episodes;
        while remaining > 0 {
            let n = remaining.min(batch);
            let first = self.next_learner;
            let ids: Vec<u32> = (first..first + n).collect();

            let mut episodes_out = {
                let policy =
                    EpsilonGreedyPolicy::new(self.agent.table(), self.agent.epsilon(), self.scorer);
                simulate_parallel(&self.sim, &policy, self.seed, &ids, threads)?
            };
            episodes_out.sort_by_key(|e| e.profile.learner_id);
            debug!(first, n, "merging batch");

            for episode in &episodes_out {
                self.apply(episode, sink)?;
            }
            self.next_learner += n;
            remaining -= n;
        }
        sink.flush();
        Ok(self.summary())
    }

    /// Apply one episode's transitions, then close the episode.
    fn apply(&mut self, episode: &Episode, sink: &mut dyn TrainingSink) -> Result<(), ValidationError> {
        for t in &episode.transitions {
            self.visit(t.state);
            self.visit(t.next_state);
            self.agent.update(t)?;
        }

        let record = EpisodeRecord {
            episode: self.agent.episodes(),
            learner_id: episode.profile.learner_id,
            tier: episode.profile.tier,
            steps: episode.len(),
            total_reward: episode.total_reward(),
            epsilon: self.agent.epsilon(),
            completed_modules: episode.completed_modules,
            finished: episode.finished,
        };
        self.agent.end_episode();

        self.returns.add(record.total_reward);
        self.lengths.add(record.steps as f64);
        if record.finished {
            self.finished += 1;
        }
        sink.log_episode(&record);
        Ok(())
    }

    /// Make sure every action of the state's module has a value.
    fn visit(&mut self, state: LearnerState) {
        let catalog = self.catalog;
        let ids: Vec<&str> = catalog
            .by_module(state.module_index as usize)
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();
        self.agent.table_mut().ensure_state(state, ids);
    }

    pub fn summary(&self) -> TrainingSummary {
        let n = self.returns.n();
        TrainingSummary {
            episodes: self.agent.episodes(),
            updates: self.agent.updates(),
            final_epsilon: self.agent.epsilon(),
            states_visited: self.agent.table().len(),
            mean_return: self.returns.mean(),
            std_return: self.returns.stddev_sample(),
            min_return: self.returns.min(),
            max_return: self.returns.max(),
            mean_length: self.lengths.mean(),
            max_length: self.lengths.max(),
            completion_rate: if n == 0 {
                0.0
            } else {
                self.finished as f64 / n as f64
            },
        }
    }
}

/// Simulate `ids` across `threads` scoped workers. Order of the output is
/// unspecified; callers sort by learner id.
fn simulate_parallel(
    sim: &BehaviorSimulator<'_>,
    policy: &dyn Policy,
    seed: u64,
    ids: &[u32],
    threads: usize,
) -> Result<Vec<Episode>, ValidationError> {
    let chunk = ids.len().div_ceil(threads).max(1);
    thread::scope(|s| {
        let handles: Vec<_> = ids
            .chunks(chunk)
            .map(|shard| {
                s.spawn(move || {
                    shard
                        .iter()
                        .map(|id| sim.run_episode(*id, seed, policy))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();

        let mut out = Vec::with_capacity(ids.len());
        for h in handles {
            let shard = h.join().unwrap_or_else(|e| std::panic::resume_unwind(e))?;
            out.extend(shard);
        }
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterClassifier;
    use crate::logging::{MemorySink, NoopSink};
    use crate::reward::RewardModel;
    use crate::rl::agent::AgentConfig;
    use crate::rl::learner_rand::{LearnerRandConfig, LearnerSampler};
    use crate::rl::sim_env::SimulatorConfig;
    use crate::state::{EncoderConfig, StateEncoder};

    const COURSE: &str = r#"{"course_id": "c", "sections": [
        {"id": "s1", "name": "One", "subsections": [{"id": "u1", "name": "U", "resources": [
            {"id": "v1", "name": "Intro video", "kind": "video"},
            {"id": "q1", "name": "Quiz", "kind": "quiz"},
            {"id": "r1", "name": "Practice review quiz", "kind": "quiz"}
        ]}]},
        {"id": "s2", "name": "Two", "subsections": [{"id": "u2", "name": "U", "resources": [
            {"id": "p2", "name": "Notes", "kind": "page"},
            {"id": "a2", "name": "Advanced assignment", "kind": "assign"}
        ]}]}
    ]}"#;

    struct Fixture {
        catalog: ActionCatalog,
        encoder: StateEncoder,
        reward: RewardModel,
        sampler: LearnerSampler,
    }

    fn fixture() -> Fixture {
        let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
        let classifier = ClusterClassifier::from_scores(&[
            ("g1".into(), 0.3),
            ("g2".into(), 0.55),
            ("g3".into(), 0.8),
        ])
        .unwrap();
        let encoder = StateEncoder::new(EncoderConfig::default(), catalog.module_count())
            .with_classifier(&classifier);
        let sampler = LearnerSampler::new(LearnerRandConfig::default(), &classifier);
        Fixture {
            catalog,
            encoder,
            reward: RewardModel::default(),
            sampler,
        }
    }

    fn trainer(f: &Fixture) -> Trainer<'_> {
        let sim = BehaviorSimulator::new(
            &f.catalog,
            &f.encoder,
            &f.reward,
            &f.sampler,
            SimulatorConfig {
                max_steps: 20,
                ..SimulatorConfig::default()
            },
        );
        let agent = QAgent::new(AgentConfig::default(), 7).unwrap();
        Trainer::new(sim, &f.catalog, agent, HeuristicScorer::default(), 7)
    }

    #[test]
    fn sequential_training_is_deterministic() {
        let f = fixture();
        let mut a = trainer(&f);
        let mut b = trainer(&f);
        a.train(30, &mut NoopSink).unwrap();
        b.train(30, &mut NoopSink).unwrap();
        assert_eq!(a.agent().table(), b.agent().table());
        assert!(!a.agent().table().is_empty());
    }

    #[test]
    fn sharded_training_ignores_thread_count() {
        let f = fixture();
        let mut one = trainer(&f);
        let mut four = trainer(&f);
        one.train_sharded(24, 8, 1, &mut NoopSink).unwrap();
        four.train_sharded(24, 8, 4, &mut NoopSink).unwrap();
        assert_eq!(one.agent().table(), four.agent().table());
        assert_eq!(one.summary().updates, four.summary().updates);
    }

    #[test]
    fn summary_and_sink_track_episodes() {
        let f = fixture();
        let mut t = trainer(&f);
        let mut sink = MemorySink::default();
        let summary = t.train(10, &mut sink).unwrap();
        assert_eq!(summary.episodes, 10);
        assert_eq!(sink.records.len(), 10);
        assert!(summary.final_epsilon < AgentConfig::default().epsilon_start);
        assert!(summary.max_length <= 20.0);
        assert!(summary.std_return.is_finite() && summary.std_return >= 0.0);
        assert!(summary.min_return <= summary.mean_return);
        assert!(summary.mean_return <= summary.max_return);
        let ids: Vec<u32> = sink.records.iter().map(|r| r.learner_id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }
}
