//! Historical store trait and related types
//!
//! The historical (offline) store is append-only: every ingested record is
//! kept, keyed by `(entity_id, observed_at)`. It is read back by time range.
//!
//! ## Duplicate keys
//!
//! A record whose `(entity_id, observed_at)` already exists is skipped by the
//! store and reported as [`AppendOutcome::Duplicate`]. The rest of the batch
//! is still stored, so a range query never sees the same key twice.
//!
//! Stores that commit a batch in several steps report a step that failed as
//! [`AppendOutcome::Failed`] for its records; outcomes of committed steps stand.

use crate::{FeatureRecord, RangeQuery, Result};
use async_trait::async_trait;
use serde::Serialize;

/// What happened to one record of an `append_many` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendOutcome {
    /// Row stored
    Inserted,
    /// Key already present; row skipped
    Duplicate,
    /// Row not stored; the rest of the batch was still attempted
    Failed(String),
}

/// The trait all historical storage backends implement
///
/// ## Implementation Notes
///
/// All methods are async because storage operations involve I/O. Blocking
/// engines (DuckDB) should move their work onto a blocking thread.
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// Append every record, skipping keys that already exist
    ///
    /// Returns one outcome per input record, in input order. Within a single
    /// batch the first occurrence of a key wins. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// `StoreClosed`/`StorageError` if the store cannot take the batch at all.
    /// Failures of individual commit steps are reported positionally as
    /// `AppendOutcome::Failed` instead.
    async fn append_many(&self, records: &[FeatureRecord]) -> Result<Vec<AppendOutcome>>;

    /// All records with `observed_at` inside the inclusive window
    ///
    /// Ordered by `(entity_id, observed_at)` ascending. An empty window is an
    /// empty vec, not an error.
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<FeatureRecord>>;

    /// Whether the backing store is reachable and responsive
    async fn is_alive(&self) -> bool;

    /// Drop all stored history (tests and maintenance only)
    async fn clean(&self) -> Result<()>;

    /// Release held connections
    async fn close(&self) -> Result<()>;

    /// Name of this store type (for logging)
    fn store_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_outcome_serializes_lowercase() {
        let json = serde_json::to_string(&AppendOutcome::Duplicate).unwrap();
        assert_eq!(json, "\"duplicate\"");
    }
}
