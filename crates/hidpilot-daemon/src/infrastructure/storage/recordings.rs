//! JSON persistence for named recordings.
//!
//! Each recording is one file, `<name>.json`, inside a managed directory.
//! The file content is the bare event array produced by
//! [`Recording`]'s serde implementation:
//!
//! ```json
//! [
//!   { "timestamp": 0.0,  "event": "press",   "control_keys": 2, "keycode": 4 },
//!   { "timestamp": 0.25, "event": "release", "control_keys": 0, "keycode": 4 }
//! ]
//! ```
//!
//! Names are plain file stems, validated before they touch the filesystem;
//! a caller cannot escape the managed directory through a crafted name.

use std::fs;
use std::path::{Path, PathBuf};

use hidpilot_core::Recording;
use thiserror::Error;
use tracing::debug;

/// Recording name used when the caller does not supply one.
pub const DEFAULT_RECORDING_NAME: &str = "default";

const RECORDING_EXT: &str = "json";

/// Error type for recording persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No recording file exists under the given name.
    #[error("no recording named {name:?}")]
    NotFound { name: String },

    /// The recording file exists but its content is not a valid event list.
    #[error("recording {name:?} is malformed: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The recording could not be serialized.
    #[error("failed to serialize recording {name:?}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A filesystem error other than "not found".
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The name is empty or contains path components.
    #[error("invalid recording name {name:?}")]
    InvalidName { name: String },
}

/// Saves and loads named recordings in a managed directory.
pub struct RecordingStore {
    dir: PathBuf,
}

impl RecordingStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the managed directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists `recording` under `name`, creating the managed directory if
    /// it does not exist yet. Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for names with path components,
    /// [`StoreError::Serialize`] if encoding fails, and [`StoreError::Io`]
    /// for filesystem failures.
    pub fn save(&self, recording: &Recording, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.recording_path(name)?;

        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(recording).map_err(|source| {
            StoreError::Serialize {
                name: name.to_string(),
                source,
            }
        })?;

        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(name, events = recording.len(), "recording saved");
        Ok(path)
    }

    /// Loads the recording saved under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such file exists,
    /// [`StoreError::Parse`] if the content is malformed, and
    /// [`StoreError::Io`] for other filesystem failures. No state is
    /// modified on any error path.
    pub fn load(&self, name: &str) -> Result<Recording, StoreError> {
        let path = self.recording_path(name)?;

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            name: name.to_string(),
            source,
        })
    }

    /// Lists the names of all saved recordings, sorted.
    ///
    /// An absent managed directory is an empty store, not an error.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORDING_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolves the file path for `name` after validating it.
    fn recording_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(format!("{name}.{RECORDING_EXT}")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
