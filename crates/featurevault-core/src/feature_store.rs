//! The feature store coordinator
//!
//! `FeatureStore` owns one latest-value store, one historical store and one
//! transformation, and runs the dual-write ingestion path:
//!
//! ```text
//! RawEvent ──► Transformation ──► [FeatureRecord, ...]
//!                                     │
//!                     ┌───────────────┴────────────────┐
//!                     ▼                                ▼
//!        LatestStore::set_if_newer         HistoricalStore::append_many
//!        (per record, conditional)         (whole batch, unconditional)
//! ```
//!
//! Ingestion is best-effort: nothing inside `ingest` is propagated to the
//! caller. Every failure is logged and reported in the returned
//! [`IngestReport`]. Reads go straight to the stores and do propagate errors.
//!
//! The coordinator keeps no state between calls. Per-entity consistency of
//! the latest value is the latest-value store's job (its compare-and-set is
//! atomic), so a shared `FeatureStore` can ingest from many tasks at once.

use crate::historical_store::{AppendOutcome, HistoricalStore};
use crate::latest_store::LatestStore;
use crate::outcome::{HistoryWrite, IngestReport, LatestWrite, RecordOutcome};
use crate::transformation::{RawEvent, Transformation};
use crate::{EntityId, FeatureRecord, RangeQuery, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default upper bound for a single liveness probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness of one store, as seen by [`FeatureStore::health`]
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub store_type: &'static str,
    pub alive: bool,
    pub latency_ms: u64,
}

/// Liveness of both stores
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub alive: bool,
    pub latest: StoreHealth,
    pub historical: StoreHealth,
}

/// Feature store with pluggable storage backends
pub struct FeatureStore {
    latest: Arc<dyn LatestStore>,
    historical: Arc<dyn HistoricalStore>,
    transformation: Arc<dyn Transformation>,
    probe_timeout: Duration,
}

impl FeatureStore {
    /// Create a feature store
    ///
    /// # Arguments
    ///
    /// * `latest` - Store for the most recent record per entity
    /// * `historical` - Store for every record ever ingested
    /// * `transformation` - Strategy turning raw events into records
    pub fn new(
        latest: Arc<dyn LatestStore>,
        historical: Arc<dyn HistoricalStore>,
        transformation: Arc<dyn Transformation>,
    ) -> Self {
        Self {
            latest,
            historical,
            transformation,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Bound each liveness probe by `timeout` (builder pattern)
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn latest_store(&self) -> &Arc<dyn LatestStore> {
        &self.latest
    }

    pub fn historical_store(&self) -> &Arc<dyn HistoricalStore> {
        &self.historical
    }

    /// Ingest one raw event into both stores
    ///
    /// 1. Transform the event (failure ⇒ `IngestReport::Dropped`)
    /// 2. `set_if_newer` each record; stale records are a warning, failures
    ///    are recorded and the loop continues
    /// 3. Append all records to history in one batch, stale ones included
    ///
    /// Never returns an error.
    pub async fn ingest(&self, event: &RawEvent) -> IngestReport {
        let records = match self.transformation.transform(event) {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Dropping event that failed transformation");
                return IngestReport::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        if records.is_empty() {
            debug!("Event produced no feature records");
            return IngestReport::Processed {
                records: Vec::new(),
            };
        }

        let mut latest_writes = Vec::with_capacity(records.len());
        for record in &records {
            latest_writes.push(self.apply_latest(record).await);
        }

        let history_writes = self.append_history(&records).await;

        let outcomes = records
            .iter()
            .zip(latest_writes)
            .zip(history_writes)
            .map(|((record, latest), history)| RecordOutcome::new(record, latest, history))
            .collect();

        IngestReport::Processed { records: outcomes }
    }

    async fn apply_latest(&self, record: &FeatureRecord) -> LatestWrite {
        match self.latest.set_if_newer(record).await {
            Ok(true) => LatestWrite::Written,
            Ok(false) => {
                warn!(
                    entity_id = %record.entity_id,
                    observed_at = %record.observed_at,
                    "Record is not the latest for its entity"
                );
                LatestWrite::Stale
            }
            Err(e) => {
                error!(
                    entity_id = %record.entity_id,
                    observed_at = %record.observed_at,
                    store = self.latest.store_type(),
                    error = %e,
                    "Latest-value write failed"
                );
                LatestWrite::Failed(e.to_string())
            }
        }
    }

    async fn append_history(&self, records: &[FeatureRecord]) -> Vec<HistoryWrite> {
        match self.historical.append_many(records).await {
            Ok(outcomes) if outcomes.len() == records.len() => records
                .iter()
                .zip(outcomes)
                .map(|(record, outcome)| match outcome {
                    AppendOutcome::Inserted => HistoryWrite::Appended,
                    AppendOutcome::Duplicate => {
                        warn!(
                            entity_id = %record.entity_id,
                            observed_at = %record.observed_at,
                            "Duplicate historical record skipped"
                        );
                        HistoryWrite::Duplicate
                    }
                    AppendOutcome::Failed(msg) => {
                        warn!(
                            entity_id = %record.entity_id,
                            observed_at = %record.observed_at,
                            error = %msg,
                            "Historical record not stored"
                        );
                        HistoryWrite::Failed(msg)
                    }
                })
                .collect(),
            Ok(outcomes) => {
                let msg = format!(
                    "historical store returned {} outcomes for {} records",
                    outcomes.len(),
                    records.len()
                );
                error!(store = self.historical.store_type(), "{}", msg);
                vec![HistoryWrite::Failed(msg); records.len()]
            }
            Err(e) => {
                error!(
                    store = self.historical.store_type(),
                    records = records.len(),
                    error = %e,
                    "Historical append failed"
                );
                vec![HistoryWrite::Failed(e.to_string()); records.len()]
            }
        }
    }

    /// Latest record for an entity, `None` if never observed
    pub async fn get_latest(&self, entity_id: &EntityId) -> Result<Option<FeatureRecord>> {
        self.latest.get_latest(entity_id).await
    }

    /// Every stored record inside the window, ordered by `(entity_id, observed_at)`
    pub async fn get_historical(&self, query: &RangeQuery) -> Result<Vec<FeatureRecord>> {
        self.historical.query_range(query).await
    }

    /// True only if both stores answer their liveness probe in time
    pub async fn is_alive(&self) -> bool {
        let (latest, historical) = tokio::join!(
            probe(self.probe_timeout, self.latest.is_alive()),
            probe(self.probe_timeout, self.historical.is_alive()),
        );
        latest.0 && historical.0
    }

    /// Liveness and probe latency of each store
    pub async fn health(&self) -> HealthReport {
        let (latest, historical) = tokio::join!(
            probe(self.probe_timeout, self.latest.is_alive()),
            probe(self.probe_timeout, self.historical.is_alive()),
        );

        let latest = StoreHealth {
            store_type: self.latest.store_type(),
            alive: latest.0,
            latency_ms: latest.1,
        };
        let historical = StoreHealth {
            store_type: self.historical.store_type(),
            alive: historical.0,
            latency_ms: historical.1,
        };

        HealthReport {
            alive: latest.alive && historical.alive,
            latest,
            historical,
        }
    }

    /// Remove all data from both stores
    ///
    /// Both stores are attempted; the first error is returned.
    pub async fn clean(&self) -> Result<()> {
        let latest = self.latest.clean().await;
        let historical = self.historical.clean().await;
        info!(
            latest_ok = latest.is_ok(),
            historical_ok = historical.is_ok(),
            "Cleaned feature store"
        );
        latest.and(historical)
    }

    /// Release both stores' resources
    ///
    /// Both stores are attempted; the first error is returned.
    pub async fn close(&self) -> Result<()> {
        let latest = self.latest.close().await;
        let historical = self.historical.close().await;
        debug!("Closed feature store");
        latest.and(historical)
    }
}

/// Run a liveness probe under a deadline; a timeout counts as dead
async fn probe<F>(timeout: Duration, fut: F) -> (bool, u64)
where
    F: Future<Output = bool>,
{
    let start = Instant::now();
    let alive = match tokio::time::timeout(timeout, fut).await {
        Ok(alive) => alive,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Liveness probe timed out");
            false
        }
    };
    (alive, start.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryHistoricalStore, InMemoryLatestStore};
    use crate::outcome::RecordStatus;
    use crate::transformation::SchemaTransformation;
    use crate::Error;
    use async_trait::async_trait;

    fn event(id: i64, ts: &str) -> RawEvent {
        RawEvent::new()
            .with("customer_id", id)
            .with("purchase_value", 10.0)
            .with("loyalty_score", 1.0)
            .with("purchase_timestamp", ts)
    }

    fn store() -> (FeatureStore, Arc<InMemoryLatestStore>, Arc<InMemoryHistoricalStore>) {
        let latest = Arc::new(InMemoryLatestStore::new());
        let historical = Arc::new(InMemoryHistoricalStore::new());
        let fs = FeatureStore::new(
            latest.clone(),
            historical.clone(),
            Arc::new(SchemaTransformation::default()),
        );
        (fs, latest, historical)
    }

    #[tokio::test]
    async fn test_ingest_reports_statuses() {
        let (fs, _, _) = store();

        let report = fs.ingest(&event(1, "2022-01-05 00:00:00")).await;
        assert_eq!(report.records()[0].status(), RecordStatus::Accepted);

        let report = fs.ingest(&event(1, "2021-01-05 00:00:00")).await;
        assert_eq!(report.records()[0].status(), RecordStatus::Stale);

        let report = fs.ingest(&event(1, "2022-01-05 00:00:00")).await;
        assert_eq!(report.records()[0].status(), RecordStatus::Rejected);
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let (fs, latest, historical) = store();
        let report = fs.ingest(&RawEvent::new().with("customer_id", 1)).await;

        assert!(report.is_dropped());
        assert!(latest.is_empty());
        assert!(historical.is_empty());
    }

    #[tokio::test]
    async fn test_latest_failure_still_appends_history() {
        let (fs, latest, historical) = store();
        latest.set_reachable(false);

        let report = fs.ingest(&event(1, "2022-01-05 00:00:00")).await;
        let outcome = &report.records()[0];
        assert!(matches!(outcome.latest, LatestWrite::Failed(_)));
        assert_eq!(outcome.history, HistoryWrite::Appended);
        assert_eq!(outcome.status(), RecordStatus::Failed);
        assert_eq!(historical.len(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_reported() {
        let (fs, latest, historical) = store();
        historical.set_reachable(false);

        let report = fs.ingest(&event(1, "2022-01-05 00:00:00")).await;
        let outcome = &report.records()[0];
        assert_eq!(outcome.latest, LatestWrite::Written);
        assert!(matches!(outcome.history, HistoryWrite::Failed(_)));
        assert_eq!(latest.len(), 1);
    }

    #[tokio::test]
    async fn test_is_alive_follows_both_stores() {
        let (fs, latest, historical) = store();
        assert!(fs.is_alive().await);

        latest.set_reachable(false);
        assert!(!fs.is_alive().await);
        latest.set_reachable(true);

        historical.set_reachable(false);
        assert!(!fs.is_alive().await);

        let health = fs.health().await;
        assert!(!health.alive);
        assert!(health.latest.alive);
        assert!(!health.historical.alive);
    }

    struct HangingLatestStore;

    #[async_trait]
    impl LatestStore for HangingLatestStore {
        async fn set_if_newer(&self, _record: &FeatureRecord) -> Result<bool> {
            Ok(true)
        }

        async fn get_latest(&self, _entity_id: &EntityId) -> Result<Option<FeatureRecord>> {
            Ok(None)
        }

        async fn is_alive(&self) -> bool {
            std::future::pending::<()>().await;
            true
        }

        async fn clean(&self) -> Result<()> {
            Err(Error::internal("clean not supported"))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn store_type(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_counts_as_dead() {
        let fs = FeatureStore::new(
            Arc::new(HangingLatestStore),
            Arc::new(InMemoryHistoricalStore::new()),
            Arc::new(SchemaTransformation::default()),
        )
        .with_probe_timeout(Duration::from_millis(50));

        assert!(!fs.is_alive().await);
    }

    #[tokio::test]
    async fn test_clean_attempts_both_stores() {
        let historical = Arc::new(InMemoryHistoricalStore::new());
        let fs = FeatureStore::new(
            Arc::new(HangingLatestStore),
            historical.clone(),
            Arc::new(SchemaTransformation::default()),
        );
        fs.ingest(&event(1, "2022-01-05 00:00:00")).await;
        assert_eq!(historical.len(), 1);

        assert!(fs.clean().await.is_err());
        assert!(historical.is_empty());
    }
}
