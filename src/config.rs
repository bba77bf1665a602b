// src/config.rs
//
// Run configuration for learnpath.
//
// Every section has serde defaults, so a YAML file only needs to name the
// values it changes. Environment overrides are applied on top of the file
// (or of the defaults), then the whole tree is validated once.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, ValidationError};
use crate::recommend::RecommenderConfig;
use crate::reward::RewardConfig;
use crate::rl::agent::AgentConfig;
use crate::rl::learner_rand::LearnerRandConfig;
use crate::rl::sim_env::SimulatorConfig;
use crate::state::EncoderConfig;

/// Offline training run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: u32,
    pub seed: u64,
    /// Learners simulated against one frozen table in sharded mode.
    pub batch: u32,
    /// Worker threads for sharded mode. 1 trains sequentially.
    pub threads: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 2_000,
            seed: 42,
            batch: 64,
            threads: 1,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub encoder: EncoderConfig,
    pub reward: RewardConfig,
    pub agent: AgentConfig,
    pub simulator: SimulatorConfig,
    pub recommender: RecommenderConfig,
    pub learners: LearnerRandConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_yaml_str(&raw)?;
        info!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Defaults or `path`, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from the environment:
    ///
    ///   - LEARNPATH_GAMMA          (f64)
    ///   - LEARNPATH_EPSILON_START  (f64)
    ///   - LEARNPATH_EPSILON_MIN    (f64)
    ///   - LEARNPATH_MAX_STEPS      (u32)
    ///   - LEARNPATH_SEED           (u64)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Same as `apply_env_overrides`, reading from `lookup` instead of the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<f64>(&lookup, "LEARNPATH_GAMMA", self.agent.gamma) {
            self.agent.gamma = v;
        }
        if let Some(v) =
            parse_var::<f64>(&lookup, "LEARNPATH_EPSILON_START", self.agent.epsilon_start)
        {
            self.agent.epsilon_start = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "LEARNPATH_EPSILON_MIN", self.agent.epsilon_min)
        {
            self.agent.epsilon_min = v;
        }
        if let Some(v) =
            parse_var::<u32>(&lookup, "LEARNPATH_MAX_STEPS", self.simulator.max_steps)
        {
            self.simulator.max_steps = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LEARNPATH_SEED", self.training.seed) {
            self.training.seed = v;
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let e = &self.encoder;
        if e.score_window == 0 {
            return Err(ValidationError::new("encoder.score_window", "must be > 0"));
        }
        if !(e.time_multiplier.is_finite() && e.time_multiplier > 0.0) {
            return Err(ValidationError::new(
                "encoder.time_multiplier",
                "must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&e.low_score_threshold) {
            return Err(ValidationError::new(
                "encoder.low_score_threshold",
                "must be in [0, 1]",
            ));
        }

        self.reward.validate()?;
        self.agent.validate()?;
        self.simulator.validate()?;
        self.recommender.validate()?;

        let (lo, hi) = self.learners.trait_bounds;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(ValidationError::new(
                "learners.trait_bounds",
                "must satisfy 0 <= min <= max <= 1",
            ));
        }

        if self.training.batch == 0 {
            return Err(ValidationError::new("training.batch", "must be > 0"));
        }
        if self.training.threads == 0 {
            return Err(ValidationError::new("training.threads", "must be > 0"));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> Option<T>
where
    T: FromStr + std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!(key, value = %v, "config override from environment");
            Some(v)
        }
        Err(_) => {
            warn!(key, raw = %raw, current = %current, "could not parse override; keeping current value");
            None
        }
    }
}
