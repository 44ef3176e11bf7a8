//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/resumable/upload.toml`
//! - Windows: `%APPDATA%/resumable/upload.toml`
//!
//! Every field is optional; command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use resumable_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection setup timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Emit events as JSON lines instead of a progress display.
    #[serde(default)]
    pub json_events: bool,

    /// Chunking, timeout and retry settings for the driver.
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            json_events: false,
            transfer: TransferConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub chunk_size: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub json: bool,
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicitly given file must exist; a missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("config file {} not found", path.display());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(chunk_size) = overrides.chunk_size {
            self.transfer.chunk_size = chunk_size;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.transfer.request_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = overrides.max_attempts {
            self.transfer.retry.max_attempts = max;
        }
        if overrides.json {
            self.json_events = true;
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("resumable").join("upload.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("resumable")
            .join("upload.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(!config.json_events);
        assert_eq!(config.transfer, TransferConfig::default());
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            json_events = true

            [transfer]
            chunk_size = 262144

            [transfer.retry]
            max_attempts = 2
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.json_events);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.transfer.chunk_size, 256 * 1024);
        assert_eq!(config.transfer.retry.max_attempts, 2);
        assert_eq!(
            config.transfer.request_timeout,
            TransferConfig::default().request_timeout
        );
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config = Config::default();
        config.apply(&Overrides {
            chunk_size: Some(1024),
            timeout_secs: Some(3),
            max_attempts: Some(5),
            json: true,
        });
        assert_eq!(config.transfer.chunk_size, 1024);
        assert_eq!(config.transfer.request_timeout, Duration::from_secs(3));
        assert_eq!(config.transfer.retry.max_attempts, 5);
        assert!(config.json_events);

        let before = config.clone();
        config.apply(&Overrides::default());
        assert_eq!(config, before);
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("upload.toml");

        let mut config = Config {
            connect_timeout_secs: 30,
            ..Config::default()
        };
        config.transfer.chunk_size = 512 * 1024;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("upload.toml");
        std::fs::write(&path, "connect_timeout_secs = \"soon\"").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn config_path_not_empty() {
        assert!(config_path().to_string_lossy().contains("resumable"));
    }
}
