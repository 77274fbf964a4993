//! PostgreSQL latest-value store
//!
//! ## Table Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS latest_features (
//!     entity_key TEXT PRIMARY KEY,
//!     observed_at TIMESTAMPTZ NOT NULL,
//!     record JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! `set_if_newer` is a single conditional upsert. The `WHERE` on the
//! `DO UPDATE` branch makes the comparison and the write one statement,
//! so the row count tells whether the record won.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool};
use featurevault_core::{EntityId, Error, FeatureRecord, LatestStore, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_postgres::NoTls;

const SET_IF_NEWER_SQL: &str = r#"
    INSERT INTO latest_features (entity_key, observed_at, record, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (entity_key) DO UPDATE
        SET observed_at = EXCLUDED.observed_at,
            record = EXCLUDED.record,
            updated_at = NOW()
        WHERE latest_features.observed_at < EXCLUDED.observed_at
"#;

/// PostgreSQL latest-value store configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// PostgreSQL connection string
    pub connection_string: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Upper bound for waiting on a pooled connection
    pub wait_timeout: Duration,
    /// Upper bound for opening (or recycling) a connection
    pub connect_timeout: Duration,
    /// Upper bound for any single statement round-trip
    pub response_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            connection_string: "postgresql://localhost/featurevault".to_string(),
            pool_size: 10,
            wait_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(2),
        }
    }
}

impl PostgresConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// PostgreSQL-backed [`LatestStore`]
pub struct PostgresLatestStore {
    pool: Pool,
    config: PostgresConfig,
    closed: AtomicBool,
}

impl PostgresLatestStore {
    /// Connect and create the table if missing
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let pool = Self::build_pool(&config)?;
        let store = Self {
            pool,
            config,
            closed: AtomicBool::new(false),
        };

        store.init_schema().await?;
        tracing::info!(pool_size = store.config.pool_size, "Connected to PostgreSQL");

        Ok(store)
    }

    fn build_pool(config: &PostgresConfig) -> Result<Pool> {
        let url = url::Url::parse(&config.connection_string)
            .map_err(|e| Error::InvalidInput(format!("Invalid connection string: {}", e)))?;

        let mut pg_config = Config::new();
        pg_config.host = url.host_str().map(|s| s.to_string());
        pg_config.port = url.port();
        pg_config.user = if url.username().is_empty() {
            None
        } else {
            Some(url.username().to_string())
        };
        pg_config.password = url.password().map(|s| s.to_string());
        pg_config.dbname = url
            .path()
            .strip_prefix('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        pg_config.connect_timeout = Some(config.connect_timeout);

        pg_config
            .builder(NoTls)
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Pool builder error: {}", e)))?
            .max_size(config.pool_size)
            .wait_timeout(Some(config.wait_timeout))
            .create_timeout(Some(config.connect_timeout))
            .recycle_timeout(Some(config.connect_timeout))
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Pool creation error: {}", e)))
    }

    async fn connection(&self) -> Result<deadpool_postgres::Object> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed("postgres"));
        }
        self.pool
            .get()
            .await
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Pool get error: {}", e)))
    }

    /// Bound one statement by `response_timeout`
    async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        match tokio::time::timeout(self.config.response_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::StorageError(anyhow::anyhow!(
                "Postgres {} error: {}",
                op,
                e
            ))),
            Err(_) => Err(Error::StorageError(anyhow::anyhow!(
                "Postgres {} timed out after {:?}",
                op,
                self.config.response_timeout
            ))),
        }
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connection().await?;
        self.run(
            "schema init",
            conn.batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS latest_features (
                    entity_key TEXT PRIMARY KEY,
                    observed_at TIMESTAMPTZ NOT NULL,
                    record JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                "#,
            ),
        )
        .await
    }
}

#[async_trait]
impl LatestStore for PostgresLatestStore {
    async fn set_if_newer(&self, record: &FeatureRecord) -> Result<bool> {
        let conn = self.connection().await?;
        let entity_key = record.entity_id.key();
        let payload = serde_json::to_value(record)?;

        let stmt = self
            .run("prepare", conn.prepare_cached(SET_IF_NEWER_SQL))
            .await?;

        let affected = self
            .run(
                "upsert",
                conn.execute(&stmt, &[&entity_key, &record.observed_at, &payload]),
            )
            .await?;

        tracing::debug!(entity_key = %entity_key, written = affected == 1, "Postgres set_if_newer");
        Ok(affected == 1)
    }

    async fn get_latest(&self, entity_id: &EntityId) -> Result<Option<FeatureRecord>> {
        let conn = self.connection().await?;
        let entity_key = entity_id.key();

        let row = self
            .run(
                "query",
                conn.query_opt(
                    "SELECT record FROM latest_features WHERE entity_key = $1",
                    &[&entity_key],
                ),
            )
            .await?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.get(0);
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    /// Health check using `SELECT 1`
    async fn is_alive(&self) -> bool {
        let conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Postgres health check failed");
                return false;
            }
        };
        match self.run("health check", conn.execute("SELECT 1", &[])).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Postgres health check failed");
                false
            }
        }
    }

    async fn clean(&self) -> Result<()> {
        let conn = self.connection().await?;
        self.run("truncate", conn.batch_execute("TRUNCATE TABLE latest_features"))
            .await?;
        tracing::info!("Cleaned Postgres latest-value store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close();
            tracing::debug!("Closed Postgres latest-value store");
        }
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.connection_string, "postgresql://localhost/featurevault");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.response_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_postgres_config_builder() {
        let config = PostgresConfig::new("postgresql://user:pw@db:5433/fv").with_pool_size(4);
        assert_eq!(config.pool_size, 4);
        assert!(PostgresLatestStore::build_pool(&config).is_ok());
    }

    #[test]
    fn test_invalid_connection_string() {
        let config = PostgresConfig::new("not a url");
        assert!(matches!(
            PostgresLatestStore::build_pool(&config),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_pool_bounds_connection_setup() {
        let config = PostgresConfig::new("postgresql://db/fv")
            .with_connect_timeout(Duration::from_millis(750));
        let pool = PostgresLatestStore::build_pool(&config).unwrap();

        let timeouts = pool.timeouts();
        assert_eq!(timeouts.create, Some(Duration::from_millis(750)));
        assert_eq!(timeouts.recycle, Some(Duration::from_millis(750)));
        assert_eq!(timeouts.wait, Some(config.wait_timeout));
    }

    #[test]
    fn test_upsert_overwrites_only_older_rows() {
        assert!(SET_IF_NEWER_SQL.contains("latest_features.observed_at < EXCLUDED.observed_at"));
    }
}
