//! Application configuration.
//!
//! A single `Config` struct loaded from YAML files and environment variables.
//! Every section has defaults, so an empty configuration is valid.

use std::path::PathBuf;

use serde::Deserialize;

use crate::journal::{BacklogOptions, MalformedLinePolicy, StatusFile};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "edcompanion.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EDCOMPANION_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EDCOMPANION";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EDCOMPANION_LOG";

/// Journal location relative to the user's home directory.
const JOURNAL_SUBDIR: &str = "Saved Games/Frontier Developments/Elite Dangerous";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub journal: JournalConfig,
    pub galaxy: GalaxyConfig,
    pub notifications: NotificationConfig,
}

/// Journal directory and tailing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory holding `Journal.*.log` and the status files.
    pub directory: PathBuf,
    pub poll_interval_ms: u64,
    /// Maximum bytes read per poll.
    pub chunk_size: usize,
    pub status_files: Vec<StatusFile>,
    pub backlog: BacklogOptions,
    pub malformed_lines: MalformedLinePolicy,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: default_journal_directory(),
            poll_interval_ms: 100,
            chunk_size: 0xFFFF,
            status_files: StatusFile::ALL.to_vec(),
            backlog: BacklogOptions::default(),
            malformed_lines: MalformedLinePolicy::default(),
        }
    }
}

/// The game's journal directory under the current user's home.
///
/// Resolved on each call; falls back to the working directory when no home
/// directory is set.
pub fn default_journal_directory() -> PathBuf {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(JOURNAL_SUBDIR)
}

/// EDSM crawler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GalaxyConfig {
    pub enabled: bool,
    pub base_url: String,
    pub language: String,
    pub api_key: Option<String>,
    /// Base delay between page fetches.
    pub delay_ms: u64,
    /// Pause between full passes over the listing.
    pub cycle_delay_ms: u64,
    /// Extra per-fetch delay after the first pass; `delay_ms` when unset.
    pub additional_delay_ms: Option<u64>,
    /// Request timeout; unset leaves the transport default.
    pub request_timeout_secs: Option<u64>,
}

impl Default for GalaxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.edsm.net".to_string(),
            language: "en".to_string(),
            api_key: None,
            delay_ms: 250,
            cycle_delay_ms: 30_000,
            additional_delay_ms: Some(1500),
            request_timeout_secs: None,
        }
    }
}

/// Thresholds used by the companion daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Commander alerts are suppressed closer than this to Sol (ly).
    pub min_sol_distance: f64,
    /// Alert when a commander moves within this distance (ly).
    pub commander_distance: f64,
    /// Fuel level (t) below which a jump triggers a warning.
    pub critical_fuel_level: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            min_sol_distance: 1000.0,
            commander_distance: 1000.0,
            critical_fuel_level: 8.0,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `edcompanion.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.journal.poll_interval_ms, 100);
        assert_eq!(config.journal.chunk_size, 0xFFFF);
        assert_eq!(config.journal.status_files.len(), 5);
        assert!(config.journal.backlog.process);
        assert!(config.journal.backlog.store);
        assert_eq!(config.journal.malformed_lines, MalformedLinePolicy::Skip);
        assert_eq!(config.galaxy.base_url, "https://www.edsm.net");
        assert_eq!(config.galaxy.additional_delay_ms, Some(1500));
        assert!(config.galaxy.request_timeout_secs.is_none());
        assert_eq!(config.notifications.critical_fuel_level, 8.0);
    }

    #[test]
    #[serial]
    fn test_default_journal_directory_follows_home() {
        let saved_profile = std::env::var_os("USERPROFILE");
        let saved_home = std::env::var_os("HOME");
        std::env::remove_var("USERPROFILE");
        std::env::set_var("HOME", "/home/cmdr");

        assert_eq!(
            default_journal_directory(),
            PathBuf::from("/home/cmdr").join(JOURNAL_SUBDIR)
        );

        match saved_profile {
            Some(v) => std::env::set_var("USERPROFILE", v),
            None => std::env::remove_var("USERPROFILE"),
        }
        match saved_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_from_file_partial_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edcompanion.yaml");
        std::fs::write(
            &path,
            r#"
journal:
  directory: /tmp/journal
  malformed_lines: abort
  status_files: [Status, Market]
  backlog:
    store: false
galaxy:
  enabled: false
  additional_delay_ms: null
"#,
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.journal.directory, PathBuf::from("/tmp/journal"));
        assert_eq!(config.journal.malformed_lines, MalformedLinePolicy::Abort);
        assert_eq!(
            config.journal.status_files,
            vec![StatusFile::Status, StatusFile::Market]
        );
        assert!(config.journal.backlog.process);
        assert!(!config.journal.backlog.store);
        assert_eq!(config.journal.poll_interval_ms, 100);
        assert!(!config.galaxy.enabled);
        assert!(config.galaxy.additional_delay_ms.is_none());
        assert_eq!(config.galaxy.delay_ms, 250);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/edcompanion.yaml"),
            Err(ConfigError::FileRead(..))
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "journal: [not, a, map]").unwrap();
        assert!(matches!(
            Config::from_file(path.to_str().unwrap()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_env_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "galaxy:\n  language: de\n  delay_ms: 500\n").unwrap();

        std::env::set_var("EDCOMPANION_GALAXY__DELAY_MS", "750");
        let config = Config::load(path.to_str());
        std::env::remove_var("EDCOMPANION_GALAXY__DELAY_MS");

        let config = config.unwrap();
        assert_eq!(config.galaxy.language, "de");
        assert_eq!(config.galaxy.delay_ms, 750);
    }
}
