//! Durable playback flags
//!
//! The clean-shutdown flag survives process death. It is cleared whenever a
//! transport session is started and set whenever one is torn down on purpose,
//! so finding it cleared at startup means the previous process died mid-session.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::player::PlaybackState;

/// Record kept outside process memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedPlayback {
    pub clean_shutdown: bool,
    /// Informational only; playback never resumes from it
    pub last_state: PlaybackState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PersistedPlayback {
    fn default() -> Self {
        Self {
            // First run has nothing to recover from
            clean_shutdown: true,
            last_state: PlaybackState::Stopped,
            updated_at: None,
        }
    }
}

/// Storage for the clean-shutdown flag and last known state
pub trait PlaybackStore: Send + Sync + 'static {
    fn load(&self) -> PersistedPlayback;

    fn set_clean_shutdown(&self, clean: bool) -> Result<(), StoreError>;

    fn set_last_state(&self, state: PlaybackState) -> Result<(), StoreError>;
}

/// Process-local store, for tests and hosts without durable storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<PersistedPlayback>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clean_shutdown(clean: bool) -> Self {
        Self {
            record: Mutex::new(PersistedPlayback {
                clean_shutdown: clean,
                ..PersistedPlayback::default()
            }),
        }
    }
}

impl PlaybackStore for MemoryStore {
    fn load(&self) -> PersistedPlayback {
        self.record.lock().clone()
    }

    fn set_clean_shutdown(&self, clean: bool) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.clean_shutdown = clean;
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    fn set_last_state(&self, state: PlaybackState) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.last_state = state;
        record.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// JSON file store.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// mid-write leaves the previous record intact.
pub struct FileStore {
    path: PathBuf,
    record: Mutex<PersistedPlayback>,
}

impl FileStore {
    /// Open the store, reading any existing record.
    ///
    /// An unreadable or corrupt record is treated as an unclean shutdown.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let record = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<PersistedPlayback>(&text) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Corrupt playback state in {}: {}", path.display(), e);
                    PersistedPlayback {
                        clean_shutdown: false,
                        ..PersistedPlayback::default()
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedPlayback::default(),
            Err(e) => return Err(StoreError::Read(e)),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
        }

        debug!("Opened playback state {} ({:?})", path.display(), record);
        Ok(Self {
            path,
            record: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedPlayback)) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        let before = record.clone();
        apply(&mut record);
        if *record == before {
            return Ok(());
        }
        record.updated_at = Some(Utc::now());

        let text = serde_json::to_string_pretty(&*record)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(StoreError::Write)?;
        std::fs::rename(&tmp, &self.path).map_err(StoreError::Write)?;
        Ok(())
    }
}

impl PlaybackStore for FileStore {
    fn load(&self) -> PersistedPlayback {
        self.record.lock().clone()
    }

    fn set_clean_shutdown(&self, clean: bool) -> Result<(), StoreError> {
        self.update(|record| record.clean_shutdown = clean)
    }

    fn set_last_state(&self, state: PlaybackState) -> Result<(), StoreError> {
        self.update(|record| record.last_state = state)
    }
}
