// src/rl/agent.rs
//
// Tabular Q-learning agent: owns the value table, the exploration schedule
// and the bookkeeping that ends up in the artifact metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::value_table::{load_artifact, save_artifact, TrainingMetadata, ValueTable};
use crate::error::{StorageError, ValidationError};
use crate::types::{Tier, TierValues, Transition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Learning rate per tier.
    pub alpha: TierValues<f64>,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Multiplicative decay applied once per episode.
    pub epsilon_decay: f64,
    pub value_clip_min: f64,
    pub value_clip_max: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            alpha: TierValues::new(0.4, 0.3, 0.2),
            epsilon_start: 0.3,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            value_clip_min: -50.0,
            value_clip_max: 50.0,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ValidationError::new("agent.gamma", "must be in [0, 1]"));
        }
        for tier in Tier::ALL {
            let a = self.alpha.get(tier);
            if !(a > 0.0 && a <= 1.0) {
                return Err(ValidationError::new(
                    "agent.alpha",
                    format!("{tier} learning rate must be in (0, 1]"),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.epsilon_start) {
            return Err(ValidationError::new("agent.epsilon_start", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) || self.epsilon_min > self.epsilon_start {
            return Err(ValidationError::new(
                "agent.epsilon_min",
                "must be in [0, epsilon_start]",
            ));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(ValidationError::new("agent.epsilon_decay", "must be in (0, 1]"));
        }
        if !(self.value_clip_min.is_finite()
            && self.value_clip_max.is_finite()
            && self.value_clip_min < self.value_clip_max)
        {
            return Err(ValidationError::new(
                "agent.value_clip_min",
                "clip bounds must be finite with min < max",
            ));
        }
        // Unvisited actions are seeded at zero.
        if self.value_clip_min > 0.0 || self.value_clip_max < 0.0 {
            return Err(ValidationError::new(
                "agent.value_clip_min",
                "clip range must contain 0",
            ));
        }
        Ok(())
    }

    pub fn clip(&self) -> (f64, f64) {
        (self.value_clip_min, self.value_clip_max)
    }
}

#[derive(Debug, Clone)]
pub struct QAgent {
    config: AgentConfig,
    table: ValueTable,
    epsilon: f64,
    episodes: u64,
    updates: u64,
    seed: u64,
}

impl QAgent {
    pub fn new(config: AgentConfig, seed: u64) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            epsilon: config.epsilon_start,
            config,
            table: ValueTable::new(),
            episodes: 0,
            updates: 0,
            seed,
        })
    }

    /// Continue from a saved table. Counters and epsilon resume from the
    /// metadata; hyperparameters come from `config`.
    pub fn from_parts(
        config: AgentConfig,
        table: ValueTable,
        metadata: &TrainingMetadata,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            epsilon: metadata
                .final_epsilon
                .clamp(config.epsilon_min, config.epsilon_start),
            config,
            table,
            episodes: metadata.episodes,
            updates: metadata.total_updates,
            seed: metadata.seed,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ValueTable {
        &mut self.table
    }

    pub fn into_table(self) -> ValueTable {
        self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Apply the TD rule for one transition with the tier's learning rate.
    pub fn update(&mut self, t: &Transition) -> Result<f64, ValidationError> {
        let alpha = self.config.alpha.get(t.state.tier);
        let v = self.table.td_update(
            t.state,
            &t.action_id,
            t.reward,
            &t.next_state,
            t.terminal,
            alpha,
            self.config.gamma,
            self.config.clip(),
        )?;
        self.updates += 1;
        Ok(v)
    }

    /// Close an episode: count it and decay epsilon towards the floor.
    pub fn end_episode(&mut self) {
        self.episodes += 1;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        debug!(episode = self.episodes, epsilon = self.epsilon, "episode closed");
    }

    pub fn metadata(&self) -> TrainingMetadata {
        let mut m = TrainingMetadata::new(self.config.clone(), self.seed);
        m.episodes = self.episodes;
        m.total_updates = self.updates;
        m.final_epsilon = self.epsilon;
        m.trained_at_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        m
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        save_artifact(path, &self.table, &self.metadata())
    }

    pub fn load(config: AgentConfig, path: &Path) -> crate::error::Result<Self> {
        let (table, metadata) = load_artifact(path)?;
        Ok(Self::from_parts(config, table, &metadata)?)
    }
}
