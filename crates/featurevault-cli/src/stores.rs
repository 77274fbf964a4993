//! Store factory: builds the configured backends behind the store traits

use anyhow::{Context, Result};
use featurevault_core::memory::{InMemoryHistoricalStore, InMemoryLatestStore};
use featurevault_core::{Error, FeatureStore, HistoricalStore, LatestStore, SchemaTransformation};
use featurevault_offline::{DuckDbConfig, DuckDbHistoricalStore};
use std::sync::Arc;

use crate::config::{CliConfig, HistoricalStoreKind, LatestStoreKind};

pub async fn create_latest_store(config: &CliConfig) -> Result<Arc<dyn LatestStore>> {
    let latest = &config.latest;
    match latest.store {
        LatestStoreKind::Memory => Ok(Arc::new(InMemoryLatestStore::new())),

        #[cfg(feature = "redis")]
        LatestStoreKind::Redis => {
            use featurevault_online::{RedisConfig, RedisLatestStore};
            let redis_config =
                RedisConfig::new(&latest.redis_url).with_key_prefix(&latest.key_prefix);
            let store = RedisLatestStore::new(redis_config)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", latest.redis_url))?;
            Ok(Arc::new(store))
        }

        #[cfg(feature = "postgres")]
        LatestStoreKind::Postgres => {
            use featurevault_online::{PostgresConfig, PostgresLatestStore};
            let store = PostgresLatestStore::new(PostgresConfig::new(&latest.postgres_url))
                .await
                .context("Failed to connect to PostgreSQL")?;
            Ok(Arc::new(store))
        }

        #[allow(unreachable_patterns)]
        other => Err(Error::config(format!(
            "latest store {:?} is not compiled in; rebuild with --features {}",
            other,
            format!("{:?}", other).to_lowercase()
        ))
        .into()),
    }
}

pub fn create_historical_store(config: &CliConfig) -> Result<Arc<dyn HistoricalStore>> {
    let historical = &config.historical;
    match historical.store {
        HistoricalStoreKind::Memory => Ok(Arc::new(InMemoryHistoricalStore::new())),
        HistoricalStoreKind::Duckdb => {
            let duckdb_config = DuckDbConfig::new(&historical.duckdb_path)
                .with_batch_size(historical.batch_size);
            let store = DuckDbHistoricalStore::new(duckdb_config, config.schema.clone())
                .with_context(|| format!("Failed to open DuckDB at {}", historical.duckdb_path))?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the coordinator over the configured stores and schema
pub async fn create_feature_store(config: &CliConfig) -> Result<FeatureStore> {
    let historical = create_historical_store(config)?;
    let latest = create_latest_store(config).await?;
    let transformation = Arc::new(SchemaTransformation::new(config.schema.clone()));

    tracing::info!(
        latest = latest.store_type(),
        historical = historical.store_type(),
        table = %config.schema.table,
        "Feature store ready"
    );

    Ok(FeatureStore::new(latest, historical, transformation)
        .with_probe_timeout(config.probe_timeout()))
}
