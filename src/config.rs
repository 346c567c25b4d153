//! Configuration for the rotating file sink

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Time-based rotation granularity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotateTime {
    /// No time-based rotation
    #[default]
    None,
    /// One bucket per hour: `YYYY-MM-DD-HH`
    Hourly,
    /// One bucket per day: `YYYY-MM-DD`
    Daily,
}

impl RotateTime {
    /// Bucket label for `now`, or `None` when time rotation is off
    pub fn label(&self, now: NaiveDateTime) -> Option<String> {
        match self {
            RotateTime::None => None,
            RotateTime::Hourly => Some(now.format("%Y-%m-%d-%H").to_string()),
            RotateTime::Daily => Some(now.format("%Y-%m-%d").to_string()),
        }
    }
}

/// Sink configuration, immutable once the sink is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory plus file prefix, e.g. `/var/log/app/access`
    ///
    /// A trailing separator means "use `log` as the prefix".
    pub path: String,

    /// Flush the buffer after every write
    #[serde(default)]
    pub flush_immediately: bool,

    /// Size threshold per file in bytes, 0 disables size rotation
    #[serde(default)]
    pub rotate_size_bytes: u64,

    /// Time bucket granularity
    #[serde(default)]
    pub rotate_time: RotateTime,
}

impl SinkConfig {
    /// Config with defaults for everything but the path
    ///
    /// Returns `None` for an empty path.
    pub fn new(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path,
            flush_immediately: false,
            rotate_size_bytes: 0,
            rotate_time: RotateTime::None,
        })
    }

    pub fn with_flush_immediately(mut self, flush: bool) -> Self {
        self.flush_immediately = flush;
        self
    }

    pub fn with_rotate_size(mut self, bytes: u64) -> Self {
        self.rotate_size_bytes = bytes;
        self
    }

    pub fn with_rotate_time(mut self, rotate_time: RotateTime) -> Self {
        self.rotate_time = rotate_time;
        self
    }

    /// Whether size-based rotation is active
    pub fn rotates_by_size(&self) -> bool {
        self.rotate_size_bytes > 0
    }

    /// Load a config from a TOML file, expanding `~` in `path`
    pub fn load(file: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read config file {}", file.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", file.display()))
    }

    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: SinkConfig = toml::from_str(content).context("Invalid sink config")?;
        if config.path.is_empty() {
            anyhow::bail!("Sink path must not be empty");
        }
        config.path = shellexpand::tilde(&config.path).into_owned();
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize sink config")
    }

    /// Default location of the config file (`~/.filesink/config.toml`)
    pub fn default_config_file() -> PathBuf {
        config_dir().join("config.toml")
    }
}

/// Base configuration directory (~/.filesink)
/// Falls back to ./.filesink if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".filesink"))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine home directory, using current directory for config");
            PathBuf::from(".filesink")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_new_rejects_empty_path() {
        assert!(SinkConfig::new("").is_none());
    }

    #[test]
    fn test_new_defaults() {
        let config = SinkConfig::new("/tmp/logs/app").unwrap();
        assert!(!config.flush_immediately);
        assert_eq!(config.rotate_size_bytes, 0);
        assert_eq!(config.rotate_time, RotateTime::None);
        assert!(!config.rotates_by_size());
    }

    #[test]
    fn test_builders() {
        let config = SinkConfig::new("/tmp/logs/app")
            .unwrap()
            .with_flush_immediately(true)
            .with_rotate_size(1024)
            .with_rotate_time(RotateTime::Daily);
        assert!(config.flush_immediately);
        assert!(config.rotates_by_size());
        assert_eq!(config.rotate_time, RotateTime::Daily);
    }

    #[test]
    fn test_labels() {
        let now = at(2024, 1, 1, 9);
        assert_eq!(RotateTime::None.label(now), None);
        assert_eq!(RotateTime::Hourly.label(now).as_deref(), Some("2024-01-01-09"));
        assert_eq!(RotateTime::Daily.label(now).as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_from_toml_applies_defaults() {
        let config = SinkConfig::from_toml(r#"path = "/var/log/app/access""#).unwrap();
        assert_eq!(config.path, "/var/log/app/access");
        assert_eq!(config.rotate_time, RotateTime::None);
        assert_eq!(config.rotate_size_bytes, 0);
    }

    #[test]
    fn test_from_toml_full() {
        let toml_str = r#"
            path = "/var/log/app/"
            flush_immediately = true
            rotate_size_bytes = 104857600
            rotate_time = "hourly"
        "#;
        let config = SinkConfig::from_toml(toml_str).unwrap();
        assert!(config.flush_immediately);
        assert_eq!(config.rotate_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.rotate_time, RotateTime::Hourly);
    }

    #[test]
    fn test_from_toml_rejects_unknown_rotation() {
        assert!(SinkConfig::from_toml("path = \"/x/y\"\nrotate_time = \"weekly\"").is_err());
    }

    #[test]
    fn test_from_toml_rejects_empty_path() {
        assert!(SinkConfig::from_toml(r#"path = """#).is_err());
    }

    #[test]
    fn test_from_toml_expands_tilde() {
        let config = SinkConfig::from_toml(r#"path = "~/logs/app""#).unwrap();
        if dirs::home_dir().is_some() {
            assert!(!config.path.starts_with('~'));
        }
        assert!(config.path.ends_with("logs/app"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SinkConfig::new("/tmp/logs/app")
            .unwrap()
            .with_rotate_time(RotateTime::Hourly);
        let parsed = SinkConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("config.toml");
        std::fs::write(&file, "path = \"/tmp/logs/app\"\nrotate_time = \"daily\"\n").unwrap();

        let config = SinkConfig::load(&file).unwrap();
        assert_eq!(config.rotate_time, RotateTime::Daily);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(SinkConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_default_config_file() {
        assert!(SinkConfig::default_config_file().ends_with(".filesink/config.toml"));
    }
}
