//! Application configuration
//!
//! Loaded from a TOML file. Missing sections and fields fall back to defaults so
//! that an older config file keeps working.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::focus::DuckPolicy;
use crate::source::StreamSource;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub playback: PlaybackConfig,
    pub focus: FocusConfig,
    pub ui: UiConfig,
    pub storage: StorageConfig,
}

/// Remote stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub uri: StreamSource,
    pub connect_timeout_ms: u64,
    /// Longest gap between chunks before the stream is considered dead
    pub read_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            uri: StreamSource::new(DEFAULT_STREAM_URI),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 15_000,
            user_agent: format!("radio-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Playback behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub auto_play_on_start: bool,
    /// Maximum length of one listening session in hours; 0 disables the limit
    pub session_limit_hours: u32,
    pub tick_interval_ms: u64,
    /// Queue depth per state subscriber
    pub publisher_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_play_on_start: false,
            session_limit_hours: DEFAULT_SESSION_LIMIT_HOURS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            publisher_buffer: DEFAULT_PUBLISHER_BUFFER,
        }
    }
}

impl PlaybackConfig {
    pub fn session_limit(&self) -> Option<std::time::Duration> {
        (self.session_limit_hours > 0)
            .then(|| std::time::Duration::from_secs(u64::from(self.session_limit_hours) * 3600))
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

/// Audio focus policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub duck_policy: DuckPolicy,
    /// Output gain while ducked
    pub duck_volume: f32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            duck_policy: DuckPolicy::Pause,
            duck_volume: DEFAULT_DUCK_VOLUME,
        }
    }
}

/// Control surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Durable playback state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform data directory
    pub state_file: Option<PathBuf>,
}

impl StorageConfig {
    pub fn state_file_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.state_file {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(STATE_FILE_NAME))
            .ok_or_else(|| Error::Config("no home directory for state file".to_string()))
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, writing defaults there first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = AppConfig::default();
            config.save(path)?;
            info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize failed: {}", e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.uri.validate()?;

        if self.playback.tick_interval_ms == 0 {
            return Err(Error::Config("playback.tick_interval_ms must be > 0".to_string()));
        }
        if self.playback.publisher_buffer == 0 {
            return Err(Error::Config("playback.publisher_buffer must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.focus.duck_volume) {
            return Err(Error::Config(format!(
                "focus.duck_volume {} outside 0.0..=1.0",
                self.focus.duck_volume
            )));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "radiocore", "radio-core")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.tick_interval_ms, 1000);
        assert!(!config.playback.auto_play_on_start);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [stream]
            uri = "https://example.com/live.mp3"

            [playback]
            auto_play_on_start = true
            session_limit_hours = 2

            [focus]
            duck_policy = "duck"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.uri.as_str(), "https://example.com/live.mp3");
        assert_eq!(config.stream.connect_timeout_ms, 10_000);
        assert!(config.playback.auto_play_on_start);
        assert_eq!(
            config.playback.session_limit(),
            Some(std::time::Duration::from_secs(7200))
        );
        assert_eq!(config.focus.duck_policy, DuckPolicy::Duck);
        assert_eq!(config.ui.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_zero_limit_disables_session_clock() {
        let mut config = PlaybackConfig::default();
        config.session_limit_hours = 0;
        assert_eq!(config.session_limit(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.stream.uri = StreamSource::new("::nope::");
        assert!(matches!(
            config.validate(),
            Err(Error::Engine(EngineError::InvalidSource(_)))
        ));

        let mut config = AppConfig::default();
        config.playback.tick_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.focus.duck_volume = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.stream.uri, created.stream.uri);
        assert_eq!(loaded.ui.http_port, created.ui.http_port);
    }
}
