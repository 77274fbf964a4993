//! Latest-value store trait for low-latency feature serving
//!
//! A latest-value (online) store keeps exactly one record per entity: the one
//! with the greatest `observed_at` seen so far. Everything older lives only in
//! the historical store.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌────────────────────────┐
//!   FeatureRecord ──► │  set_if_newer(record)  │ ── true  → replaced
//!                     │  (atomic per entity)   │ ── false → stale, untouched
//!                     └────────────────────────┘
//!                                 │
//!                     get_latest(entity_id) → Option<FeatureRecord>
//! ```
//!
//! ## Key Design Decisions
//!
//! 1. **Compare-and-set lives in the store**: the read, the timestamp
//!    comparison and the write are one atomic step (a mutex section, a Redis
//!    Lua script, a conditional SQL upsert). Concurrent writers for the same
//!    entity can therefore never lose the newer record.
//! 2. **Ties keep the stored value**: equal timestamps are "not newer".
//! 3. **Liveness never errors**: `is_alive` answers `false` instead.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featurevault_core::{LatestStore, EntityId};
//!
//! async fn serve(store: &dyn LatestStore) -> featurevault_core::Result<()> {
//!     if let Some(record) = store.get_latest(&EntityId::from(16)).await? {
//!         println!("latest at {}", record.observed_at);
//!     }
//!     Ok(())
//! }
//! ```

use crate::{EntityId, FeatureRecord, Result};
use async_trait::async_trait;

/// Trait for latest-value stores (Redis, PostgreSQL, in-memory)
///
/// ## Implementation Requirements
///
/// - `set_if_newer` must be a single logical read-compare-write per entity
/// - `is_alive` must resolve quickly and must not block on a dead dependency
/// - `close` is idempotent; afterwards operations return `Error::StoreClosed`
/// - Thread-safe (Send + Sync)
#[async_trait]
pub trait LatestStore: Send + Sync {
    /// Store `record` if it is newer than what is stored for its entity
    ///
    /// Returns `true` if the write happened, `false` if the record was stale
    /// (its `observed_at` is less than or equal to the stored one).
    async fn set_if_newer(&self, record: &FeatureRecord) -> Result<bool>;

    /// Most recently accepted record for the entity, `None` if never observed
    async fn get_latest(&self, entity_id: &EntityId) -> Result<Option<FeatureRecord>>;

    /// Whether the backing store is reachable and responsive
    async fn is_alive(&self) -> bool;

    /// Remove every record owned by this store (tests and maintenance only)
    async fn clean(&self) -> Result<()>;

    /// Release held connections
    async fn close(&self) -> Result<()>;

    /// Name of this store type (for logging)
    fn store_type(&self) -> &'static str;
}

/// Build the key under which an entity's latest record is stored
///
/// Format: `{prefix}:{entity_id}`. An empty prefix yields the bare id.
pub fn latest_key(prefix: &str, entity_id: &EntityId) -> String {
    if prefix.is_empty() {
        entity_id.key()
    } else {
        format!("{}:{}", prefix, entity_id)
    }
}
