//! TOML-based configuration for the daemon.
//!
//! Reads and writes [`DaemonConfig`] to `$XDG_CONFIG_HOME/hidpilot/config.toml`
//! (falling back to `~/.config/hidpilot/config.toml`). The gadget only exists
//! on Linux, so no other platform directories are resolved.
//!
//! Example:
//!
//! ```toml
//! [daemon]
//! log_level = "info"
//!
//! [device]
//! hid_path = "/dev/hidg0"
//!
//! [recordings]
//! dir = "/var/lib/hidpilot/recordings"
//! ```
//!
//! Fields absent from the file take their defaults via `#[serde(default)]`,
//! so the daemon runs correctly on first boot before a config file exists.
//! Two environment variables override the file for containerized and
//! test deployments: `HIDPILOT_DEVICE` and `HIDPILOT_RECORDINGS_DIR`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config base directory could not be determined from the environment.
    #[error("could not determine config directory (set XDG_CONFIG_HOME or HOME)")]
    NoConfigDir,

    /// The data base directory could not be determined from the environment.
    #[error("could not determine data directory (set XDG_DATA_HOME or HOME)")]
    NoDataDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub recordings: RecordingsSection,
}

/// General daemon behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Gadget device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Path of the HID gadget device node reports are written to.
    #[serde(default = "default_hid_path")]
    pub hid_path: PathBuf,
}

/// Recording storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecordingsSection {
    /// Managed recordings directory. When absent, the platform data
    /// directory (`$XDG_DATA_HOME/hidpilot/recordings`) is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_hid_path() -> PathBuf {
    PathBuf::from("/dev/hidg0")
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            hid_path: default_hid_path(),
        }
    }
}

impl DaemonConfig {
    /// Applies `HIDPILOT_DEVICE` and `HIDPILOT_RECORDINGS_DIR` environment
    /// overrides on top of whatever the file provided.
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os("HIDPILOT_DEVICE") {
            self.device.hid_path = PathBuf::from(path);
        }
        if let Some(dir) = std::env::var_os("HIDPILOT_RECORDINGS_DIR") {
            self.recordings.dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolves the recordings directory, falling back to the platform data
    /// directory when the config does not pin one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDataDir`] if neither the config nor the
    /// environment yields a directory.
    pub fn recordings_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.recordings.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_recordings_dir().ok_or(ConfigError::NoDataDir),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the directory holding the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] when neither `XDG_CONFIG_HOME` nor
/// `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("hidpilot"))
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`DaemonConfig`] from disk and applies environment overrides.
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<DaemonConfig, ConfigError> {
    let path = config_file_path()?;

    let mut cfg = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DaemonConfig::default(),
        Err(e) => return Err(ConfigError::Io { path, source: e }),
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &DaemonConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the default recordings directory under the platform data dir.
fn default_recordings_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
        })?;
    Some(base.join("hidpilot").join("recordings"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
