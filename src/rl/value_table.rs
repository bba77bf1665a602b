// src/rl/value_table.rs
//
// Sparse state -> action value table and its on-disk artifact.
//
// Lifecycle of an entry:
//   untrained (absent) -> visited (ensure_state, all zeros) -> updated (TD)
//
// Artifact layout (one JSON file):
//   { "metadata": {...}, "entries": [{"state": ..., "values": {...}}], "checksum": "<sha256 hex>" }
//
// The checksum covers the canonical JSON of (metadata, entries). Entries are
// written in state order and values are keyed in id order, so identical
// tables produce identical files.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::agent::AgentConfig;
use crate::error::{StorageError, ValidationError};
use crate::types::LearnerState;

/// Artifact schema version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Q-values for one state, keyed by action id.
pub type ActionValues = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    entries: HashMap<LearnerState, ActionValues>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_state(&self, state: &LearnerState) -> bool {
        self.entries.contains_key(state)
    }

    /// Create the entry for `state` if absent and add zero values for any of
    /// `action_ids` not yet present. Existing values are untouched.
    pub fn ensure_state<'a, I>(&mut self, state: LearnerState, action_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let values = self.entries.entry(state).or_default();
        for id in action_ids {
            values.entry(id.to_string()).or_insert(0.0);
        }
    }

    /// Learned value, 0.0 when the state or action is unseen.
    pub fn value(&self, state: &LearnerState, action_id: &str) -> f64 {
        self.entries
            .get(state)
            .and_then(|v| v.get(action_id))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn values(&self, state: &LearnerState) -> Option<&ActionValues> {
        self.entries.get(state)
    }

    /// max_a Q[state][a]; 0.0 for an unseen or empty state.
    pub fn max_value(&self, state: &LearnerState) -> f64 {
        self.entries
            .get(state)
            .and_then(|v| v.values().copied().reduce(f64::max))
            .unwrap_or(0.0)
    }

    /// Apply one temporal-difference update and return the new value.
    ///
    /// Q[s][a] += alpha * (r + gamma * max Q[s'] - Q[s][a]); terminal
    /// transitions use r alone as the target. The result is clipped.
    #[allow(clippy::too_many_arguments)]
    pub fn td_update(
        &mut self,
        state: LearnerState,
        action_id: &str,
        reward: f64,
        next_state: &LearnerState,
        terminal: bool,
        alpha: f64,
        gamma: f64,
        clip: (f64, f64),
    ) -> Result<f64, ValidationError> {
        if !reward.is_finite() {
            return Err(ValidationError::new("reward", format!("non-finite reward {reward}")));
        }

        let bootstrap = if terminal {
            0.0
        } else {
            gamma * self.max_value(next_state)
        };
        let target = reward + bootstrap;

        let q = self
            .entries
            .entry(state)
            .or_default()
            .entry(action_id.to_string())
            .or_insert(0.0);
        let updated = (*q + alpha * (target - *q)).clamp(clip.0, clip.1);
        *q = updated;
        Ok(updated)
    }

    /// Entries in canonical (state, then id) order.
    pub fn sorted_entries(&self) -> Vec<TableEntry> {
        let mut out: Vec<TableEntry> = self
            .entries
            .iter()
            .map(|(state, values)| TableEntry {
                state: *state,
                values: values.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.state.cmp(&b.state));
        out
    }

    pub fn states(&self) -> impl Iterator<Item = &LearnerState> {
        self.entries.keys()
    }
}

/// Training provenance stored alongside the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub format_version: u32,
    pub episodes: u64,
    pub total_updates: u64,
    pub final_epsilon: f64,
    pub seed: u64,
    pub hyperparameters: AgentConfig,
    pub trained_at_unix: u64,
}

impl TrainingMetadata {
    pub fn new(hyperparameters: AgentConfig, seed: u64) -> Self {
        Self {
            format_version: ARTIFACT_VERSION,
            episodes: 0,
            total_updates: 0,
            final_epsilon: hyperparameters.epsilon_start,
            seed,
            hyperparameters,
            trained_at_unix: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub state: LearnerState,
    pub values: ActionValues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueTableArtifact {
    pub metadata: TrainingMetadata,
    pub entries: Vec<TableEntry>,
    pub checksum: String,
}

#[derive(Serialize)]
struct ChecksumBody<'a> {
    metadata: &'a TrainingMetadata,
    entries: &'a [TableEntry],
}

fn checksum(
    path: &Path,
    metadata: &TrainingMetadata,
    entries: &[TableEntry],
) -> Result<String, StorageError> {
    let body = serde_json::to_vec(&ChecksumBody { metadata, entries }).map_err(|source| {
        StorageError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(hex::encode(Sha256::digest(&body)))
}

/// Write the table and metadata atomically (temp file in the same
/// directory, then rename over `path`).
pub fn save_artifact(
    path: &Path,
    table: &ValueTable,
    metadata: &TrainingMetadata,
) -> Result<(), StorageError> {
    let io_err = |source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    let clip = (
        metadata.hyperparameters.value_clip_min,
        metadata.hyperparameters.value_clip_max,
    );
    let entries = table.sorted_entries();
    for e in &entries {
        if let Some((id, v)) = e
            .values
            .iter()
            .find(|(_, v)| !v.is_finite() || **v < clip.0 || **v > clip.1)
        {
            return Err(StorageError::InvalidValue {
                path: path.to_path_buf(),
                detail: format!("{} / {id} = {v}", e.state),
            });
        }
    }

    let artifact = ValueTableArtifact {
        checksum: checksum(path, metadata, &entries)?,
        metadata: metadata.clone(),
        entries,
    };
    let bytes =
        serde_json::to_vec_pretty(&artifact).map_err(|source| StorageError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    info!(
        path = %path.display(),
        states = artifact.entries.len(),
        episodes = metadata.episodes,
        "saved value table"
    );
    Ok(())
}

/// Read and verify an artifact written by [`save_artifact`].
pub fn load_artifact(path: &Path) -> Result<(ValueTable, TrainingMetadata), StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: ValueTableArtifact =
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

    if artifact.metadata.format_version != ARTIFACT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: artifact.metadata.format_version,
            expected: ARTIFACT_VERSION,
        });
    }

    let actual = checksum(path, &artifact.metadata, &artifact.entries)?;
    if actual != artifact.checksum {
        return Err(StorageError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: artifact.checksum,
            actual,
        });
    }

    let clip = (
        artifact.metadata.hyperparameters.value_clip_min,
        artifact.metadata.hyperparameters.value_clip_max,
    );
    let mut entries = HashMap::with_capacity(artifact.entries.len());
    for e in artifact.entries {
        if let Some((id, v)) = e
            .values
            .iter()
            .find(|(_, v)| !v.is_finite() || **v < clip.0 || **v > clip.1)
        {
            return Err(StorageError::InvalidValue {
                path: path.to_path_buf(),
                detail: format!("{} / {id} = {v}", e.state),
            });
        }
        entries.insert(e.state, e.values);
    }

    debug!(path = %path.display(), states = entries.len(), "loaded value table");
    Ok((ValueTable { entries }, artifact.metadata))
}
