//! routegrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Key of the single coordination document shared by every node.
pub const DEFAULT_DOCUMENT_KEY: &str = "routing-table";

pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_TIMEOUT_THRESHOLD_MS: u64 = 90_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutegridConfig {
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSection {
    /// How often each node republishes its heartbeat.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// How long a node may go without a heartbeat before peers evict it.
    #[serde(default = "default_timeout_threshold_ms")]
    pub timeout_threshold_ms: u64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            timeout_threshold_ms: DEFAULT_TIMEOUT_THRESHOLD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path of the redb database file. Relative to `--data-dir` when not absolute.
    pub path: Option<PathBuf>,
    #[serde(default = "default_document_key")]
    pub document_key: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            document_key: DEFAULT_DOCUMENT_KEY.to_string(),
        }
    }
}

fn default_update_interval_ms() -> u64 {
    DEFAULT_UPDATE_INTERVAL_MS
}

fn default_timeout_threshold_ms() -> u64 {
    DEFAULT_TIMEOUT_THRESHOLD_MS
}

fn default_document_key() -> String {
    DEFAULT_DOCUMENT_KEY.to_string()
}

impl RoutegridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RoutegridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.coordinator.update_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.update_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.coordinator.timeout_threshold_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.timeout_threshold_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.store.document_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.document_key",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the database path against a data directory.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        match &self.store.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir.join(p),
            None => data_dir.join("routegrid.redb"),
        }
    }

    pub fn settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::from(&self.coordinator)
    }
}

/// The two knobs the coordinator reacts to at runtime.
///
/// Values are the *configured* ones; the coordinator derives its effective
/// interval and timeout from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub update_interval: Duration,
    pub timeout_threshold: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&CoordinatorSection::default())
    }
}

impl From<&CoordinatorSection> for CoordinatorSettings {
    fn from(section: &CoordinatorSection) -> Self {
        Self {
            update_interval: Duration::from_millis(section.update_interval_ms),
            timeout_threshold: Duration::from_millis(section.timeout_threshold_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = RoutegridConfig::from_toml_str("").unwrap();
        assert_eq!(config, RoutegridConfig::default());
        assert_eq!(config.store.document_key, DEFAULT_DOCUMENT_KEY);
        assert_eq!(
            config.settings().update_interval,
            Duration::from_millis(DEFAULT_UPDATE_INTERVAL_MS)
        );
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[coordinator]
update_interval_ms = 45000
timeout_threshold_ms = 120000

[store]
path = "routes.redb"
document_key = "edge-routes"
"#;
        let config = RoutegridConfig::from_toml_str(toml_str).unwrap();
        let settings = config.settings();
        assert_eq!(settings.update_interval, Duration::from_secs(45));
        assert_eq!(settings.timeout_threshold, Duration::from_secs(120));
        assert_eq!(config.store.document_key, "edge-routes");
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/routes.redb")
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = RoutegridConfig::from_toml_str("[coordinator]\nupdate_interval_ms = 0\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "coordinator.update_interval_ms", .. }
        ));
    }

    #[test]
    fn test_empty_document_key_rejected() {
        let err = RoutegridConfig::from_toml_str("[store]\ndocument_key = \" \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "store.document_key", .. }));
    }

    #[test]
    fn test_unparseable_toml() {
        let err = RoutegridConfig::from_toml_str("[coordinator\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_absolute_store_path_wins() {
        let mut config = RoutegridConfig::default();
        config.store.path = Some(PathBuf::from("/srv/routes.redb"));
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/srv/routes.redb")
        );
        config.store.path = None;
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/routegrid.redb")
        );
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routegrid.toml");
        let mut config = RoutegridConfig::default();
        config.coordinator.timeout_threshold_ms = 61_000;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = RoutegridConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
