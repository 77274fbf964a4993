//! CLI configuration handling
//!
//! Resolution order: YAML (or JSON) file, then `FEATUREVAULT_*` environment
//! overrides, then validation.

use anyhow::{Context, Result};
use featurevault_core::schema::FeatureSchema;
use featurevault_core::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "featurevault.yaml";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub latest: LatestConfig,

    #[serde(default)]
    pub historical: HistoricalConfig,

    /// CSV file ingested by `ingest` and `demo`
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Upper bound for each liveness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Column layout of ingested events and of the historical table
    #[serde(default = "FeatureSchema::customer_purchases")]
    pub schema: FeatureSchema,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            latest: LatestConfig::default(),
            historical: HistoricalConfig::default(),
            data_path: default_data_path(),
            probe_timeout_ms: default_probe_timeout_ms(),
            schema: FeatureSchema::customer_purchases(),
        }
    }
}

impl CliConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatestStoreKind {
    #[default]
    Redis,
    Postgres,
    Memory,
}

impl FromStr for LatestStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(Error::config(format!(
                "unknown latest store '{}' (expected redis, postgres or memory)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoricalStoreKind {
    #[default]
    Duckdb,
    Memory,
}

impl FromStr for HistoricalStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckdb" => Ok(Self::Duckdb),
            "memory" => Ok(Self::Memory),
            other => Err(Error::config(format!(
                "unknown historical store '{}' (expected duckdb or memory)",
                other
            ))),
        }
    }
}

/// Latest-value store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestConfig {
    #[serde(default)]
    pub store: LatestStoreKind,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace for Redis keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_postgres_url")]
    pub postgres_url: String,
}

impl Default for LatestConfig {
    fn default() -> Self {
        Self {
            store: LatestStoreKind::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            postgres_url: default_postgres_url(),
        }
    }
}

/// Historical store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalConfig {
    #[serde(default)]
    pub store: HistoricalStoreKind,

    /// DuckDB file, or `:memory:`
    #[serde(default = "default_duckdb_path")]
    pub duckdb_path: String,

    /// Records per insert transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            store: HistoricalStoreKind::default(),
            duckdb_path: default_duckdb_path(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "features".to_string()
}

fn default_postgres_url() -> String {
    "postgresql://localhost/featurevault".to_string()
}

fn default_duckdb_path() -> String {
    ":memory:".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_data_path() -> String {
    "data/test_task_data.csv".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

/// Load configuration from file, environment and defaults
///
/// An explicit `config_path` must exist. The default location is optional.
pub fn load_config(config_path: Option<&str>) -> Result<CliConfig> {
    let mut config = match config_path {
        Some(path) => load_from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_from_file(DEFAULT_CONFIG_PATH)?,
        None => {
            tracing::warn!(
                path = DEFAULT_CONFIG_PATH,
                "No config file found, using defaults"
            );
            CliConfig::default()
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

fn load_from_file(path: &str) -> Result<CliConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    if path.ends_with(".json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path))
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path))
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> std::result::Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

/// Overlay `FEATUREVAULT_*` variables looked up through `lookup`
pub fn apply_env_overrides<F>(config: &mut CliConfig, lookup: F) -> std::result::Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("FEATUREVAULT_LATEST_STORE") {
        config.latest.store = v.parse()?;
    }
    if let Some(v) = lookup("FEATUREVAULT_REDIS_URL") {
        config.latest.redis_url = v;
    }
    if let Some(v) = lookup("FEATUREVAULT_REDIS_PREFIX") {
        config.latest.key_prefix = v;
    }
    if let Some(v) = lookup("FEATUREVAULT_POSTGRES_URL") {
        config.latest.postgres_url = v;
    }
    if let Some(v) = lookup("FEATUREVAULT_HISTORICAL_STORE") {
        config.historical.store = v.parse()?;
    }
    if let Some(v) = lookup("FEATUREVAULT_DUCKDB_PATH") {
        config.historical.duckdb_path = v;
    }
    if let Some(v) = lookup("FEATUREVAULT_DUCKDB_BATCH") {
        config.historical.batch_size = parse_number("FEATUREVAULT_DUCKDB_BATCH", &v)?;
    }
    if let Some(v) = lookup("FEATUREVAULT_DATA_PATH") {
        config.data_path = v;
    }
    if let Some(v) = lookup("FEATUREVAULT_PROBE_TIMEOUT_MS") {
        config.probe_timeout_ms = parse_number("FEATUREVAULT_PROBE_TIMEOUT_MS", &v)?;
    }
    Ok(())
}

pub fn validate(config: &CliConfig) -> std::result::Result<(), Error> {
    if config.historical.batch_size == 0 {
        return Err(Error::config("historical.batch_size must be greater than 0"));
    }
    if config.probe_timeout_ms == 0 {
        return Err(Error::config("probe_timeout_ms must be greater than 0"));
    }
    if config.historical.duckdb_path.trim().is_empty() {
        return Err(Error::config("historical.duckdb_path must not be empty"));
    }
    config.schema.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();

        assert_eq!(config.latest.store, LatestStoreKind::Redis);
        assert_eq!(config.latest.redis_url, "redis://localhost:6379");
        assert_eq!(config.historical.store, HistoricalStoreKind::Duckdb);
        assert_eq!(config.historical.duckdb_path, ":memory:");
        assert_eq!(config.historical.batch_size, 1000);
        assert_eq!(config.data_path, "data/test_task_data.csv");
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.schema, FeatureSchema::customer_purchases());
        validate(&config).unwrap();
    }

    #[test]
    fn test_load_yaml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("featurevault.yaml");

        let yaml_content = r#"
latest:
  store: postgres
  postgres_url: postgresql://db/fv
historical:
  duckdb_path: /data/history.duckdb
  batch_size: 250
data_path: /data/events.csv
probe_timeout_ms: 500
"#;
        std::fs::write(&config_path, yaml_content).unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();

        assert_eq!(config.latest.store, LatestStoreKind::Postgres);
        assert_eq!(config.latest.postgres_url, "postgresql://db/fv");
        // Defaults fill what the file leaves out
        assert_eq!(config.latest.redis_url, "redis://localhost:6379");
        assert_eq!(config.historical.duckdb_path, "/data/history.duckdb");
        assert_eq!(config.historical.batch_size, 250);
        assert_eq!(config.data_path, "/data/events.csv");
        assert_eq!(config.probe_timeout_ms, 500);
    }

    #[test]
    fn test_load_custom_schema() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("schema.yaml");

        let yaml_content = r#"
schema:
  table: sessions
  entity_column: user_id
  entity_kind: string
  timestamp_column: event_time
  fields:
    - name: clicks
      kind: int
    - name: premium
      kind: bool
"#;
        std::fs::write(&config_path, yaml_content).unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.schema.table, "sessions");
        assert_eq!(config.schema.fields.len(), 2);
        assert_eq!(config.schema.timestamp_format, "%Y-%m-%d %H:%M:%S");
        validate(&config).unwrap();
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "latest": { "store": "memory" } }"#).unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.latest.store, LatestStoreKind::Memory);
        assert_eq!(config.historical.batch_size, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("FEATUREVAULT_LATEST_STORE", "memory"),
                ("FEATUREVAULT_REDIS_URL", "redis://cache:6380"),
                ("FEATUREVAULT_HISTORICAL_STORE", "MEMORY"),
                ("FEATUREVAULT_DUCKDB_PATH", "/tmp/fv.duckdb"),
                ("FEATUREVAULT_DUCKDB_BATCH", "64"),
                ("FEATUREVAULT_DATA_PATH", "/tmp/events.csv"),
                ("FEATUREVAULT_PROBE_TIMEOUT_MS", "150"),
            ]),
        )
        .unwrap();

        assert_eq!(config.latest.store, LatestStoreKind::Memory);
        assert_eq!(config.latest.redis_url, "redis://cache:6380");
        assert_eq!(config.historical.store, HistoricalStoreKind::Memory);
        assert_eq!(config.historical.duckdb_path, "/tmp/fv.duckdb");
        assert_eq!(config.historical.batch_size, 64);
        assert_eq!(config.data_path, "/tmp/events.csv");
        assert_eq!(config.probe_timeout_ms, 150);
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = CliConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("FEATUREVAULT_LATEST_STORE", "memcached")]))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = apply_env_overrides(&mut config, env(&[("FEATUREVAULT_DUCKDB_BATCH", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = CliConfig::default();
        config.historical.batch_size = 0;
        assert!(matches!(validate(&config), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_invalid_config_file_not_found() {
        let result = load_config(Some("/nonexistent/featurevault.yaml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn test_invalid_yaml_syntax() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        std::fs::write(&config_path, "latest:\n  store: [invalid yaml").unwrap();

        assert!(load_from_file(config_path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = CliConfig::default();
        config.latest.store = LatestStoreKind::Postgres;
        config.historical.batch_size = 20;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CliConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
