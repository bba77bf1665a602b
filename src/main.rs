// src/main.rs
//
// Thin CLI around the learnpath library.
// - train:     simulate learners, run Q-learning, write the value-table artifact
// - simulate:  write a trajectory dataset under a heuristic or learned policy
// - recommend: rank next activities for one learner from a saved table

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use learnpath::logging::{self, FileSink, NoopSink, TrainingSink};
use learnpath::rl::{
    load_artifact, EpsilonGreedyPolicy, HeuristicPolicy, LearnerRandConfig, Policy,
    TrajectoryCollector, TrajectoryWriter,
};
use learnpath::{
    ActionCatalog, BehaviorSimulator, ClusterClassifier, ClusterProfile, Config, FeatureMap,
    HeuristicScorer, LearnerSampler, LearnerState, QAgent, Recommender, RewardModel,
    StateEncoder, TableHandle, Tier, Trainer,
};

#[derive(Parser, Debug)]
#[command(name = "learnpath")]
#[command(about = "Offline Q-learning and next-activity recommendation for course paths")]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML config; LEARNPATH_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pretrain a value table against the behavior simulator.
    Train {
        /// Course definition (JSON).
        #[arg(long)]
        course: PathBuf,
        /// Performance-group statistics (JSON array).
        #[arg(long)]
        clusters: PathBuf,
        /// Where to write the artifact.
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        episodes: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Sharded simulation with this many threads.
        #[arg(long)]
        threads: Option<usize>,
        /// Learner randomisation preset: default, mild or deterministic.
        #[arg(long)]
        preset: Option<String>,
        /// Optional JSONL path for per-episode telemetry.
        #[arg(long)]
        log_jsonl: Option<PathBuf>,
    },

    /// Write a trajectory dataset (trajectories.jsonl + metadata.json).
    Simulate {
        #[arg(long)]
        course: PathBuf,
        #[arg(long)]
        clusters: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 100)]
        episodes: u32,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        preset: Option<String>,
        /// Act greedily on this artifact instead of the heuristic.
        #[arg(long)]
        table: Option<PathBuf>,
    },

    /// Rank next activities for one learner.
    Recommend {
        #[arg(long)]
        course: PathBuf,
        /// Value-table artifact. Without it every answer is heuristic.
        #[arg(long)]
        table: Option<PathBuf>,
        /// Needed when features carry a group id instead of a tier.
        #[arg(long)]
        clusters: Option<PathBuf>,
        /// Feature map (JSON file).
        #[arg(long, conflicts_with = "state", required_unless_present = "state")]
        features: Option<PathBuf>,
        /// Pre-built learner state (JSON file).
        #[arg(long)]
        state: Option<PathBuf>,
        /// Tier override for feature input.
        #[arg(long, value_enum)]
        tier: Option<TierArg>,
        #[arg(long)]
        top_k: Option<usize>,
        /// Action ids to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TierArg {
    Weak,
    Medium,
    Strong,
}

impl From<TierArg> for Tier {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Weak => Tier::Weak,
            TierArg::Medium => Tier::Medium,
            TierArg::Strong => Tier::Strong,
        }
    }
}

fn load_catalog(path: &Path) -> Result<ActionCatalog> {
    ActionCatalog::from_json_file(path)
        .with_context(|| format!("loading course definition {}", path.display()))
}

fn load_classifier(path: &Path) -> Result<ClusterClassifier> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading cluster statistics {}", path.display()))?;
    let profiles: Vec<ClusterProfile> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing cluster statistics {}", path.display()))?;
    ClusterClassifier::from_profiles(&profiles)
        .with_context(|| format!("classifying groups in {}", path.display()))
}

fn apply_preset(cfg: &mut Config, preset: Option<&str>) -> Result<String> {
    match preset {
        Some(name) => match LearnerRandConfig::from_preset(name) {
            Some(learners) => {
                cfg.learners = learners;
                Ok(name.to_string())
            }
            None => bail!("unknown learner preset `{name}` (expected default, mild or deterministic)"),
        },
        None => Ok("config".to_string()),
    }
}

/// Build the telemetry sink as a trait object so FileSink and NoopSink can
/// be chosen at runtime.
fn build_sink(log_jsonl: Option<&Path>) -> Box<dyn TrainingSink> {
    match log_jsonl {
        Some(path) => match FileSink::create(path) {
            Ok(s) => Box::new(s),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot create telemetry file; falling back to NoopSink");
                Box::new(NoopSink)
            }
        },
        None => Box::new(NoopSink),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    mut cfg: Config,
    course: &Path,
    clusters: &Path,
    out: &Path,
    episodes: Option<u32>,
    seed: Option<u64>,
    threads: Option<usize>,
    preset: Option<&str>,
    log_jsonl: Option<&Path>,
) -> Result<()> {
    if let Some(e) = episodes {
        cfg.training.episodes = e;
    }
    if let Some(s) = seed {
        cfg.training.seed = s;
    }
    if let Some(t) = threads {
        cfg.training.threads = t.max(1);
    }
    apply_preset(&mut cfg, preset)?;

    let catalog = load_catalog(course)?;
    let classifier = load_classifier(clusters)?;
    let encoder =
        StateEncoder::new(cfg.encoder.clone(), catalog.module_count()).with_classifier(&classifier);
    let reward = RewardModel::new(cfg.reward.clone())?;
    let sampler = LearnerSampler::new(cfg.learners.clone(), &classifier);
    let sim = BehaviorSimulator::new(&catalog, &encoder, &reward, &sampler, cfg.simulator.clone());
    let agent = QAgent::new(cfg.agent.clone(), cfg.training.seed)?;
    let scorer = HeuristicScorer::new(cfg.recommender.weights);

    let mut trainer = Trainer::new(sim, &catalog, agent, scorer, cfg.training.seed);
    let mut sink = build_sink(log_jsonl);
    let summary = if cfg.training.threads > 1 {
        trainer.train_sharded(
            cfg.training.episodes,
            cfg.training.batch,
            cfg.training.threads,
            sink.as_mut(),
        )?
    } else {
        trainer.train(cfg.training.episodes, sink.as_mut())?
    };

    trainer
        .agent()
        .save(out)
        .with_context(|| format!("writing value table to {}", out.display()))?;
    info!(path = %out.display(), states = summary.states_visited, "artifact written");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_simulate(
    mut cfg: Config,
    course: &Path,
    clusters: &Path,
    out_dir: &Path,
    episodes: u32,
    seed: Option<u64>,
    preset: Option<&str>,
    table: Option<&Path>,
) -> Result<()> {
    if let Some(s) = seed {
        cfg.training.seed = s;
    }
    let preset_label = apply_preset(&mut cfg, preset)?;

    let catalog = load_catalog(course)?;
    let classifier = load_classifier(clusters)?;
    let encoder =
        StateEncoder::new(cfg.encoder.clone(), catalog.module_count()).with_classifier(&classifier);
    let reward = RewardModel::new(cfg.reward.clone())?;
    let sampler = LearnerSampler::new(cfg.learners.clone(), &classifier);
    let sim = BehaviorSimulator::new(&catalog, &encoder, &reward, &sampler, cfg.simulator.clone());
    let scorer = HeuristicScorer::new(cfg.recommender.weights);

    let learned = match table {
        Some(path) => Some(
            load_artifact(path)
                .with_context(|| format!("loading value table {}", path.display()))?
                .0,
        ),
        None => None,
    };
    let heuristic = HeuristicPolicy::new(scorer);
    let greedy = learned
        .as_ref()
        .map(|t| EpsilonGreedyPolicy::new(t, 0.0, scorer));
    let policy: &dyn Policy = match &greedy {
        Some(g) => g as &dyn Policy,
        None => &heuristic,
    };

    let collector = TrajectoryCollector::new(cfg.training.seed, &preset_label);
    let (records, metadata) = collector.collect(&sim, policy, episodes)?;
    let writer = TrajectoryWriter::new(out_dir);
    writer
        .write(&records, &metadata)
        .with_context(|| format!("writing trajectories to {}", out_dir.display()))?;

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_recommend(
    cfg: Config,
    course: &Path,
    table: Option<&Path>,
    clusters: Option<&Path>,
    features: Option<&Path>,
    state: Option<&Path>,
    tier: Option<Tier>,
    top_k: Option<usize>,
    exclude: Vec<String>,
) -> Result<()> {
    let catalog = load_catalog(course)?;
    let classifier = clusters.map(load_classifier).transpose()?;

    let handle = match table {
        Some(path) => TableHandle::open(path)
            .with_context(|| format!("loading value table {}", path.display()))?,
        None => {
            warn!("no value table given; ranking heuristically");
            TableHandle::default()
        }
    };

    let mut encoder = StateEncoder::new(cfg.encoder.clone(), catalog.module_count());
    if let Some(c) = classifier.as_ref() {
        encoder = encoder.with_classifier(c);
    }
    let mut recommender = Recommender::new(
        handle.snapshot(),
        &catalog,
        &encoder,
        HeuristicScorer::new(cfg.recommender.weights),
    );
    if let Some(c) = classifier.as_ref() {
        recommender = recommender.with_classifier(c);
    }

    let top_k = top_k.unwrap_or(cfg.recommender.top_k);
    let excluded: HashSet<String> = exclude.into_iter().filter(|s| !s.is_empty()).collect();

    let out = match (features, state) {
        (Some(path), _) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading features {}", path.display()))?;
            let map = FeatureMap::from_json_str(&raw)?;
            recommender.recommend_from_features(&map, tier, top_k, &excluded)?
        }
        (None, Some(path)) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading state {}", path.display()))?;
            let s: LearnerState = serde_json::from_str(&raw)
                .with_context(|| format!("parsing state {}", path.display()))?;
            recommender.recommend_for_state(&s, top_k, &excluded)?
        }
        (None, None) => bail!("either --features or --state is required"),
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Train {
            course,
            clusters,
            out,
            episodes,
            seed,
            threads,
            preset,
            log_jsonl,
        } => run_train(
            cfg,
            &course,
            &clusters,
            &out,
            episodes,
            seed,
            threads,
            preset.as_deref(),
            log_jsonl.as_deref(),
        ),
        Command::Simulate {
            course,
            clusters,
            out_dir,
            episodes,
            seed,
            preset,
            table,
        } => run_simulate(
            cfg,
            &course,
            &clusters,
            &out_dir,
            episodes,
            seed,
            preset.as_deref(),
            table.as_deref(),
        ),
        Command::Recommend {
            course,
            table,
            clusters,
            features,
            state,
            tier,
            top_k,
            exclude,
        } => run_recommend(
            cfg,
            &course,
            table.as_deref(),
            clusters.as_deref(),
            features.as_deref(),
            state.as_deref(),
            tier.map(Tier::from),
            top_k,
            exclude,
        ),
    }
}
