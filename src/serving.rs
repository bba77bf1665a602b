// src/serving.rs
//
// Holder of the value table being served. Readers take a cheap Arc
// snapshot; a reload swaps the whole table at once. A failed reload leaves
// the last good table in place.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::StorageError;
use crate::rl::value_table::{load_artifact, TrainingMetadata, ValueTable};

#[derive(Debug)]
struct Loaded {
    table: Arc<ValueTable>,
    metadata: Option<TrainingMetadata>,
}

#[derive(Debug)]
pub struct TableHandle {
    inner: RwLock<Loaded>,
}

impl Default for TableHandle {
    fn default() -> Self {
        Self::new(ValueTable::new())
    }
}

impl TableHandle {
    pub fn new(table: ValueTable) -> Self {
        Self {
            inner: RwLock::new(Loaded {
                table: Arc::new(table),
                metadata: None,
            }),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let (table, metadata) = load_artifact(path)?;
        Ok(Self {
            inner: RwLock::new(Loaded {
                table: Arc::new(table),
                metadata: Some(metadata),
            }),
        })
    }

    /// Current table. Stays valid after later swaps.
    pub fn snapshot(&self) -> Arc<ValueTable> {
        match self.inner.read() {
            Ok(g) => Arc::clone(&g.table),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().table),
        }
    }

    pub fn metadata(&self) -> Option<TrainingMetadata> {
        match self.inner.read() {
            Ok(g) => g.metadata.clone(),
            Err(poisoned) => poisoned.into_inner().metadata.clone(),
        }
    }

    /// Replace the served table; returns the previous one.
    pub fn swap(&self, table: ValueTable, metadata: Option<TrainingMetadata>) -> Arc<ValueTable> {
        let next = Loaded {
            table: Arc::new(table),
            metadata,
        };
        let mut g = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *g, next).table
    }

    /// Load `path` and swap it in. On failure the current table is kept and
    /// the error is returned.
    pub fn reload(&self, path: &Path) -> Result<(), StorageError> {
        match load_artifact(path) {
            Ok((table, metadata)) => {
                let states = table.len();
                self.swap(table, Some(metadata));
                info!(path = %path.display(), states, "value table reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "reload failed; keeping current table");
                Err(e)
            }
        }
    }
}
