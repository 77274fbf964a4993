//! Redis latest-value store
//!
//! ## Layout
//!
//! One Redis hash per entity, under `{key_prefix}:{entity_id}`:
//!
//! | field         | value                                  |
//! |---------------|----------------------------------------|
//! | `observed_at` | record timestamp, epoch microseconds   |
//! | `record`      | JSON of the full `FeatureRecord`       |
//!
//! ## Atomic compare-and-set
//!
//! `set_if_newer` runs one Lua script (`EVALSHA`, falling back to `EVAL`):
//! the stored timestamp is read, compared and overwritten inside Redis, so
//! concurrent writers for the same entity cannot interleave.
//!
//! ## Connections
//!
//! Uses a `ConnectionManager`: one multiplexed TCP connection that reconnects
//! on failure. Every command is bounded by `response_timeout`.

use async_trait::async_trait;
use featurevault_core::{latest_key, EntityId, Error, FeatureRecord, LatestStore, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult, Script};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SET_IF_NEWER_LUA: &str = r#"
local current = redis.call('HGET', KEYS[1], 'observed_at')
if current and tonumber(current) >= tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'observed_at', ARGV[1], 'record', ARGV[2])
return 1
"#;

/// Keys deleted per DEL command during `clean`
const CLEAN_BATCH: usize = 500;

/// Redis latest-value store configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Namespace for entity keys
    pub key_prefix: String,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound for any single command round-trip
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "features".to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(2),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Redis-backed [`LatestStore`]
pub struct RedisLatestStore {
    conn: ConnectionManager,
    config: RedisConfig,
    set_if_newer: Script,
    closed: AtomicBool,
}

impl RedisLatestStore {
    /// Connect to Redis
    ///
    /// Fails if the server cannot be reached within `connect_timeout`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Redis connection error: {}", e)))?;

        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                Error::StorageError(anyhow::anyhow!(
                    "Redis connection to {} timed out after {:?}",
                    config.url,
                    config.connect_timeout
                ))
            })?
            .map_err(|e| {
                Error::StorageError(anyhow::anyhow!("Redis connection manager error: {}", e))
            })?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis");

        Ok(Self {
            conn,
            config,
            set_if_newer: Script::new(SET_IF_NEWER_LUA),
            closed: AtomicBool::new(false),
        })
    }

    fn key(&self, entity_id: &EntityId) -> String {
        latest_key(&self.config.key_prefix, entity_id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed("redis"));
        }
        Ok(())
    }

    /// Run a command under the response timeout and map its error
    async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.response_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::StorageError(anyhow::anyhow!(
                "Redis {} error: {}",
                op,
                e
            ))),
            Err(_) => Err(Error::StorageError(anyhow::anyhow!(
                "Redis {} timed out after {:?}",
                op,
                self.config.response_timeout
            ))),
        }
    }

    fn serialize_record(record: &FeatureRecord) -> Result<String> {
        Ok(serde_json::to_string(record)?)
    }

    fn deserialize_record(data: &str) -> Result<FeatureRecord> {
        Ok(serde_json::from_str(data)?)
    }
}

/// SCAN pattern matching only keys under `prefix`
///
/// Glob metacharacters in the prefix are escaped so they match literally.
fn scan_pattern(prefix: &str) -> String {
    if prefix.is_empty() {
        return "*".to_string();
    }
    let mut pattern = String::with_capacity(prefix.len() + 2);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str(":*");
    pattern
}

#[async_trait]
impl LatestStore for RedisLatestStore {
    async fn set_if_newer(&self, record: &FeatureRecord) -> Result<bool> {
        self.ensure_open()?;
        let key = self.key(&record.entity_id);
        let payload = Self::serialize_record(record)?;
        let observed_at = record.observed_at.timestamp_micros();

        let mut conn = self.conn.clone();
        let mut invocation = self.set_if_newer.key(&key);
        invocation.arg(observed_at).arg(payload);

        let written: i64 = self
            .run("set_if_newer", invocation.invoke_async(&mut conn))
            .await?;

        tracing::debug!(key = %key, written = written == 1, "Redis set_if_newer");
        Ok(written == 1)
    }

    async fn get_latest(&self, entity_id: &EntityId) -> Result<Option<FeatureRecord>> {
        self.ensure_open()?;
        let key = self.key(entity_id);
        let mut conn = self.conn.clone();

        let data: Option<String> = self.run("HGET", conn.hget(&key, "record")).await?;
        data.as_deref().map(Self::deserialize_record).transpose()
    }

    /// Health check using PING
    async fn is_alive(&self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        let mut conn = self.conn.clone();
        let pong: Result<String> = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await;

        match pong {
            Ok(pong) if pong == "PONG" => true,
            Ok(other) => {
                tracing::warn!(reply = %other, "Redis health check: expected PONG");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis health check failed");
                false
            }
        }
    }

    /// Delete every key under the store's prefix
    async fn clean(&self) -> Result<()> {
        self.ensure_open()?;
        let pattern = scan_pattern(&self.config.key_prefix);

        let keys: Vec<String> = {
            let mut conn = self.conn.clone();
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(|e| Error::StorageError(anyhow::anyhow!("Redis SCAN error: {}", e)))?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut conn = self.conn.clone();
        for chunk in keys.chunks(CLEAN_BATCH) {
            self.run("DEL", conn.del::<_, ()>(chunk.to_vec())).await?;
        }

        tracing::info!(pattern = %pattern, deleted = keys.len(), "Cleaned Redis latest-value store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The multiplexed connection is dropped with the store
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(url = %self.config.url, "Closed Redis latest-value store");
        }
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
