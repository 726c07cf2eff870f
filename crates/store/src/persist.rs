//! Persistence boundary for the mapping store. The store talks to a
//! `StatePersister` it was handed; swapping in the in-memory stub keeps
//! tests off the filesystem.

use fieldsync_protocol::{Field, FieldMapping};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

pub const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable snapshot of one editing session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub schema_version: u32,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
}

impl PersistedState {
    #[must_use]
    pub fn new(fields: Vec<Field>, mappings: Vec<FieldMapping>) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            fields,
            mappings,
        }
    }
}

pub trait StatePersister: Send {
    /// Restore the last saved snapshot. `None` when nothing usable is
    /// stored; a snapshot from another schema version counts as
    /// nothing usable.
    fn load(&self) -> crate::Result<Option<PersistedState>>;

    fn save(&self, state: &PersistedState) -> crate::Result<()>;
}

/// JSON file persister, atomic via tmp+rename.
pub struct JsonFilePersister {
    path: PathBuf,
}

impl JsonFilePersister {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatePersister for JsonFilePersister {
    fn load(&self) -> crate::Result<Option<PersistedState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let state: PersistedState = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(err) => {
                warn!("Store state corrupted {}: {err}", self.path.display());
                return Ok(None);
            }
        };

        if state.schema_version != STATE_SCHEMA_VERSION {
            warn!(
                "Store state version {} != {}, starting fresh ({})",
                state.schema_version,
                STATE_SCHEMA_VERSION,
                self.path.display()
            );
            return Ok(None);
        }

        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        if let Err(err) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }
}

/// In-memory persister for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryPersister {
    state: Mutex<Option<PersistedState>>,
}

impl MemoryPersister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersister for MemoryPersister {
    fn load(&self) -> crate::Result<Option<PersistedState>> {
        Ok(self.state.lock().expect("persister mutex poisoned").clone())
    }

    fn save(&self, state: &PersistedState) -> crate::Result<()> {
        *self.state.lock().expect("persister mutex poisoned") = Some(state.clone());
        Ok(())
    }
}
