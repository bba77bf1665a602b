// tests/training_tests.rs
//
// End-to-end simulation, training and persistence on the demo course.

use learnpath::logging::{MemorySink, NoopSink};
use learnpath::rl::{
    load_artifact, read_records, HeuristicPolicy, LearnerRandConfig, TrajectoryCollector,
    TrajectoryWriter,
};
use learnpath::{
    ActionCatalog, AgentConfig, BehaviorSimulator, ClusterClassifier, ClusterProfile,
    EncoderConfig, HeuristicScorer, LearnerSampler, QAgent, RewardModel, SimulatorConfig,
    StateEncoder, TableHandle, Trainer,
};

const COURSE: &str = include_str!("../demos/course.json");
const CLUSTERS: &str = include_str!("../demos/clusters.json");

const MAX_STEPS: u32 = 30;

struct World {
    catalog: ActionCatalog,
    encoder: StateEncoder,
    reward: RewardModel,
    sampler: LearnerSampler,
}

impl World {
    fn new(learners: LearnerRandConfig) -> Self {
        let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
        let profiles: Vec<ClusterProfile> = serde_json::from_str(CLUSTERS).unwrap();
        let classifier = ClusterClassifier::from_profiles(&profiles).unwrap();
        let encoder = StateEncoder::new(EncoderConfig::default(), catalog.module_count())
            .with_classifier(&classifier);
        let sampler = LearnerSampler::new(learners, &classifier);
        Self {
            catalog,
            encoder,
            reward: RewardModel::default(),
            sampler,
        }
    }

    fn simulator(&self) -> BehaviorSimulator<'_> {
        BehaviorSimulator::new(
            &self.catalog,
            &self.encoder,
            &self.reward,
            &self.sampler,
            SimulatorConfig {
                max_steps: MAX_STEPS,
                ..SimulatorConfig::default()
            },
        )
    }

    fn trainer(&self, seed: u64) -> Trainer<'_> {
        let agent = QAgent::new(AgentConfig::default(), seed).unwrap();
        Trainer::new(
            self.simulator(),
            &self.catalog,
            agent,
            HeuristicScorer::default(),
            seed,
        )
    }
}

#[test]
fn simulated_episodes_respect_step_budget_and_module_order() {
    let world = World::new(LearnerRandConfig::default());
    let sim = world.simulator();
    let policy = HeuristicPolicy::new(HeuristicScorer::default());

    for learner_id in 0..40 {
        let episode = sim.run_episode(learner_id, 11, &policy).unwrap();
        assert!(episode.len() <= MAX_STEPS as usize);
        assert_eq!(episode.transitions.len(), episode.components.len());

        let mut last_module = 0;
        for t in &episode.transitions {
            assert!(t.state.module_index >= last_module);
            assert!(t.next_state.module_index >= t.state.module_index);
            assert!(t.reward.is_finite());
            last_module = t.state.module_index;
        }
        if let Some(last) = episode.transitions.last() {
            assert!(last.terminal);
        }
        assert!(episode.transitions.iter().rev().skip(1).all(|t| !t.terminal));
    }
}

#[test]
fn same_seed_trains_identical_tables() {
    let world = World::new(LearnerRandConfig::mild());
    let mut a = world.trainer(2024);
    let mut b = world.trainer(2024);
    let sa = a.train(60, &mut NoopSink).unwrap();
    let sb = b.train(60, &mut NoopSink).unwrap();

    assert_eq!(a.agent().table(), b.agent().table());
    assert_eq!(sa.updates, sb.updates);
    assert_eq!(sa.final_epsilon, sb.final_epsilon);
    assert!(sa.states_visited > 0);
}

#[test]
fn sharded_training_is_thread_count_independent() {
    let world = World::new(LearnerRandConfig::default());
    let mut one = world.trainer(5);
    let mut three = world.trainer(5);
    let mut sink = MemorySink::default();
    one.train_sharded(36, 12, 1, &mut NoopSink).unwrap();
    three.train_sharded(36, 12, 3, &mut sink).unwrap();

    assert_eq!(one.agent().table(), three.agent().table());
    let ids: Vec<u32> = sink.records.iter().map(|r| r.learner_id).collect();
    assert_eq!(ids, (0..36).collect::<Vec<_>>());
}

#[test]
fn saved_table_loads_bit_for_bit() {
    let world = World::new(LearnerRandConfig::default());
    let mut trainer = world.trainer(17);
    trainer.train(40, &mut NoopSink).unwrap();
    let agent = trainer.into_agent();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.json");
    agent.save(&path).unwrap();

    let (table, metadata) = load_artifact(&path).unwrap();
    assert_eq!(metadata.episodes, 40);
    assert_eq!(metadata.seed, 17);

    let saved = agent.table().sorted_entries();
    let loaded = table.sorted_entries();
    assert_eq!(saved.len(), loaded.len());
    for (s, l) in saved.iter().zip(&loaded) {
        assert_eq!(s.state, l.state);
        assert_eq!(s.values.len(), l.values.len());
        for ((ka, va), (kb, vb)) in s.values.iter().zip(&l.values) {
            assert_eq!(ka, kb);
            assert_eq!(va.to_bits(), vb.to_bits(), "value drifted for {ka} in {}", s.state);
        }
    }

    let resumed = QAgent::load(AgentConfig::default(), &path).unwrap();
    assert_eq!(resumed.episodes(), agent.episodes());
    assert_eq!(resumed.epsilon(), agent.epsilon());
    assert_eq!(resumed.table(), agent.table());
}

#[test]
fn serving_handle_swaps_in_retrained_table() {
    let world = World::new(LearnerRandConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.json");

    let mut first = world.trainer(1);
    first.train(5, &mut NoopSink).unwrap();
    first.agent().save(&path).unwrap();
    let handle = TableHandle::open(&path).unwrap();
    let before = handle.snapshot();

    let mut second = world.trainer(1);
    second.train(25, &mut NoopSink).unwrap();
    second.agent().save(&path).unwrap();
    handle.reload(&path).unwrap();

    assert_eq!(&*handle.snapshot(), second.agent().table());
    assert_eq!(&*before, first.agent().table());
    assert_eq!(handle.metadata().unwrap().episodes, 25);
}

#[test]
fn trajectory_dataset_round_trips_through_disk() {
    let world = World::new(LearnerRandConfig::deterministic());
    let sim = world.simulator();
    let policy = HeuristicPolicy::new(HeuristicScorer::default());
    let (records, metadata) = TrajectoryCollector::new(3, "deterministic")
        .collect(&sim, &policy, 6)
        .unwrap();
    assert_eq!(metadata.num_transitions, records.len() as u64);
    assert_eq!(metadata.max_steps, MAX_STEPS);

    let dir = tempfile::tempdir().unwrap();
    let writer = TrajectoryWriter::new(dir.path());
    writer.write(&records, &metadata).unwrap();
    assert!(writer.metadata_path().exists());

    let back = read_records(&writer.records_path()).unwrap();
    assert_eq!(back.len(), records.len());
    assert_eq!(back.first().map(|r| r.episode_idx), Some(0));
}
