//! Ingestion outcomes
//!
//! `FeatureStore::ingest` never fails. What happened to each record is
//! reported through these types instead.

use crate::{EntityId, FeatureRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of the conditional write to the latest-value store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "error")]
pub enum LatestWrite {
    /// The record became the latest value for its entity
    Written,
    /// A record with an equal or newer timestamp was already stored
    Stale,
    Failed(String),
}

/// Result of the append to the historical store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "error")]
pub enum HistoryWrite {
    Appended,
    /// `(entity_id, observed_at)` already present; skipped
    Duplicate,
    Failed(String),
}

/// Overall status of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// New latest value, appended to history
    Accepted,
    /// Appended to history, latest value unchanged
    Stale,
    /// Duplicate history key
    Rejected,
    /// At least one store write failed
    Failed,
}

/// Per-record outcome of an ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub entity_id: EntityId,
    pub observed_at: DateTime<Utc>,
    pub latest: LatestWrite,
    pub history: HistoryWrite,
}

impl RecordOutcome {
    pub fn new(record: &FeatureRecord, latest: LatestWrite, history: HistoryWrite) -> Self {
        Self {
            entity_id: record.entity_id.clone(),
            observed_at: record.observed_at,
            latest,
            history,
        }
    }

    pub fn status(&self) -> RecordStatus {
        match (&self.latest, &self.history) {
            (LatestWrite::Failed(_), _) | (_, HistoryWrite::Failed(_)) => RecordStatus::Failed,
            (_, HistoryWrite::Duplicate) => RecordStatus::Rejected,
            (LatestWrite::Stale, _) => RecordStatus::Stale,
            (LatestWrite::Written, HistoryWrite::Appended) => RecordStatus::Accepted,
        }
    }
}

/// Outcome of one `ingest` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum IngestReport {
    /// The transformation rejected the event; nothing was written
    Dropped { reason: String },
    /// The event produced these records (possibly none)
    Processed { records: Vec<RecordOutcome> },
}

impl IngestReport {
    pub fn records(&self) -> &[RecordOutcome] {
        match self {
            IngestReport::Dropped { .. } => &[],
            IngestReport::Processed { records } => records,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, IngestReport::Dropped { .. })
    }

    /// Counts of this report alone
    pub fn summary(&self) -> IngestSummary {
        let mut summary = IngestSummary::default();
        summary.add(self);
        summary
    }
}

/// Running counters over many ingestions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub events: usize,
    pub dropped: usize,
    pub accepted: usize,
    pub stale: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl IngestSummary {
    pub fn add(&mut self, report: &IngestReport) {
        self.events += 1;
        if report.is_dropped() {
            self.dropped += 1;
            return;
        }
        for outcome in report.records() {
            match outcome.status() {
                RecordStatus::Accepted => self.accepted += 1,
                RecordStatus::Stale => self.stale += 1,
                RecordStatus::Rejected => self.rejected += 1,
                RecordStatus::Failed => self.failed += 1,
            }
        }
    }

    pub fn records(&self) -> usize {
        self.accepted + self.stale + self.rejected + self.failed
    }
}
