// tests/model_tests.rs
//
// Classifier, encoder and reward contracts through the public API.

use learnpath::state::RecentAction;
use learnpath::{
    ActionCatalog, ActionType, ClusterClassifier, Config, Difficulty, EncoderConfig,
    EncoderInput, LearnerState, Outcome, Quartile, RewardModel, StateEncoder, StuckSignals, Tier,
};

const COURSE: &str = include_str!("../demos/course.json");
const CONFIG: &str = include_str!("../demos/config.yaml");

fn scores(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
    pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

#[test]
fn tiers_never_decrease_with_mean_score() {
    let batches = [
        scores(&[("a", 0.2)]),
        scores(&[("a", 0.7), ("b", 0.3)]),
        scores(&[("a", 0.5), ("b", 0.5), ("c", 0.1), ("d", 0.9)]),
        scores(&[
            ("g1", 0.81),
            ("g2", 0.12),
            ("g3", 0.44),
            ("g4", 0.67),
            ("g5", 0.29),
            ("g6", 0.93),
            ("g7", 0.55),
        ]),
    ];

    for batch in &batches {
        let c = ClusterClassifier::from_scores(batch).unwrap();
        let mut sorted = batch.clone();
        sorted.sort_by(|x, y| x.1.total_cmp(&y.1));
        let tiers: Vec<Tier> = sorted.iter().map(|(id, _)| c.tier_of(id).unwrap()).collect();
        assert!(
            tiers.windows(2).all(|w| w[0] <= w[1]),
            "tiers out of order: {tiers:?}"
        );
    }
}

#[test]
fn encoder_output_stays_in_domain() {
    let encoder = StateEncoder::new(EncoderConfig::default(), 4);
    let extremes = [-3.0, -0.0, 0.0, 0.1, 0.25, 0.26, 0.99, 1.0, 7.5, f64::INFINITY];
    for (i, x) in extremes.iter().enumerate() {
        let input = EncoderInput {
            tier: Tier::ALL[i % 3],
            module_index: [-5, 0, 3, 99][i % 4],
            module_progress: *x,
            avg_score: -*x,
            recent_action: None,
            signals: StuckSignals::default(),
        };
        let s: LearnerState = encoder.encode(&input).unwrap();
        assert!(s.module_index < 4);
        assert!(Quartile::ALL.contains(&s.progress_bin));
        assert!(Quartile::ALL.contains(&s.score_bin));
    }
}

#[test]
fn nan_inputs_are_rejected_with_the_field_name() {
    let encoder = StateEncoder::new(EncoderConfig::default(), 2);
    let input = EncoderInput {
        tier: Tier::Medium,
        module_index: 0,
        module_progress: 0.5,
        avg_score: f64::NAN,
        recent_action: None,
        signals: StuckSignals::default(),
    };
    assert_eq!(encoder.encode(&input).unwrap_err().field, "avg_score");
}

#[test]
fn many_quiz_attempts_mean_stuck_for_every_tier() {
    let encoder = StateEncoder::new(EncoderConfig::default(), 3);
    for tier in Tier::ALL {
        let calm = StuckSignals {
            quiz_attempts: 3,
            minutes_on_module: 0.0,
            recent_scores: vec![1.0, 1.0, 1.0],
        };
        assert!(!encoder.is_stuck(tier, &calm));

        let stuck = StuckSignals {
            quiz_attempts: 4,
            ..calm
        };
        assert!(encoder.is_stuck(tier, &stuck));
    }
}

#[test]
fn hard_quiz_rewards_scale_with_tier() {
    let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
    let quiz = catalog.by_id("s3-final").unwrap();
    assert_eq!(quiz.action_type, ActionType::DoQuiz);
    assert_eq!(quiz.difficulty, Difficulty::Hard);

    let outcome = Outcome {
        score: 0.9,
        prev_score: 0.5,
        time_spent_minutes: quiz.expected_minutes,
        expected_minutes: quiz.expected_minutes,
        completed: true,
        success: true,
        attempts: 1,
    };
    let state_for = |tier| LearnerState {
        tier,
        module_index: 3,
        progress_bin: Quartile::Q50,
        score_bin: Quartile::Q50,
        recent_action: Some(ActionType::WatchVideo),
        stuck: false,
    };
    let history = [RecentAction {
        id: "s3-video".to_string(),
        action_type: ActionType::WatchVideo,
    }];

    let model = RewardModel::default();
    let weak = model.reward(Tier::Weak, quiz, &outcome, &state_for(Tier::Weak), &history);
    let strong = model.reward(Tier::Strong, quiz, &outcome, &state_for(Tier::Strong), &history);

    assert!(weak.completion > strong.completion);
    assert_eq!(weak.challenge, 0.0);
    assert!(strong.challenge > 0.0);
    assert_eq!(weak.improvement, strong.improvement);

    let again = model.reward(Tier::Weak, quiz, &outcome, &state_for(Tier::Weak), &history);
    assert_eq!(weak, again);
}

#[test]
fn demo_config_is_valid() {
    let cfg = Config::from_yaml_str(CONFIG).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.training.threads, 4);
    assert_eq!(cfg.agent.gamma, 0.95);
}
