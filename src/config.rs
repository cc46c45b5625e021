use serde::Deserialize;
use std::path::Path;

/// Top-level configuration file shape.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
}

/// Which storage substrate to compose the record store with.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Flat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// SQLite database file (sqlite backend).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Directory holding one JSON file per collection (flat backend).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Default window for recency queries, in days.
    #[serde(default = "default_recent_days")]
    pub default_recent_days: u32,
}

fn default_db_path() -> String {
    "lifelog.db".to_string()
}

fn default_data_dir() -> String {
    "lifelog_data".to_string()
}

fn default_recent_days() -> u32 {
    7
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            db_path: default_db_path(),
            data_dir: default_data_dir(),
            default_recent_days: default_recent_days(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, BackendKind::Sqlite);
        assert_eq!(config.store.db_path, "lifelog.db");
        assert_eq!(config.store.default_recent_days, 7);
    }

    #[test]
    fn backend_kind_parses_snake_case() {
        let config: AppConfig = toml::from_str(
            r#"
            [store]
            backend = "flat"
            data_dir = "/tmp/journal"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, BackendKind::Flat);
        assert_eq!(config.store.data_dir, "/tmp/journal");
    }
}
