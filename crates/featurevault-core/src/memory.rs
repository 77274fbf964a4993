//! In-memory stores
//!
//! Process-local implementations of both store traits. They are used by the
//! test suites and by the CLI's `memory` backend. Each store can be flipped
//! to "unreachable" to simulate an outage.

use crate::historical_store::{AppendOutcome, HistoricalStore};
use crate::latest_store::LatestStore;
use crate::{EntityId, Error, FeatureRecord, RangeQuery, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Availability switches shared by both in-memory stores
#[derive(Debug)]
struct Availability {
    name: &'static str,
    reachable: AtomicBool,
    closed: AtomicBool,
}

impl Availability {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed(self.name));
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::StorageError(anyhow::anyhow!(
                "{} store is unreachable",
                self.name
            )));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.check().is_ok()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::internal(format!("{} store lock poisoned", name)))
}

/// Latest-value store backed by a `HashMap`
///
/// The timestamp comparison and the write happen under one mutex, so
/// `set_if_newer` is atomic per entity.
#[derive(Debug)]
pub struct InMemoryLatestStore {
    records: Mutex<HashMap<EntityId, FeatureRecord>>,
    availability: Availability,
}

impl InMemoryLatestStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            availability: Availability::new("memory-latest"),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`)
    pub fn set_reachable(&self, reachable: bool) {
        self.availability.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of entities with a stored record
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLatestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LatestStore for InMemoryLatestStore {
    async fn set_if_newer(&self, record: &FeatureRecord) -> Result<bool> {
        self.availability.check()?;
        let mut records = lock(&self.records, self.availability.name)?;

        if !record.supersedes(records.get(&record.entity_id)) {
            return Ok(false);
        }
        records.insert(record.entity_id.clone(), record.clone());
        Ok(true)
    }

    async fn get_latest(&self, entity_id: &EntityId) -> Result<Option<FeatureRecord>> {
        self.availability.check()?;
        let records = lock(&self.records, self.availability.name)?;
        Ok(records.get(entity_id).cloned())
    }

    async fn is_alive(&self) -> bool {
        self.availability.is_alive()
    }

    async fn clean(&self) -> Result<()> {
        self.availability.check()?;
        lock(&self.records, self.availability.name)?.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.availability.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

/// Historical store backed by a `BTreeMap` keyed by `(entity_id, observed_at)`
///
/// The map ordering is exactly the query ordering, and the key doubles as the
/// uniqueness constraint.
#[derive(Debug)]
pub struct InMemoryHistoricalStore {
    rows: Mutex<BTreeMap<(EntityId, DateTime<Utc>), FeatureRecord>>,
    availability: Availability,
}

impl InMemoryHistoricalStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            availability: Availability::new("memory-historical"),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`)
    pub fn set_reachable(&self, reachable: bool) {
        self.availability.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Total number of stored rows
    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryHistoricalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoricalStore for InMemoryHistoricalStore {
    async fn append_many(&self, records: &[FeatureRecord]) -> Result<Vec<AppendOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.availability.check()?;
        let mut rows = lock(&self.rows, self.availability.name)?;

        let outcomes = records
            .iter()
            .map(|record| {
                let key = record.key();
                if rows.contains_key(&key) {
                    AppendOutcome::Duplicate
                } else {
                    rows.insert(key, record.clone());
                    AppendOutcome::Inserted
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<FeatureRecord>> {
        self.availability.check()?;
        let rows = lock(&self.rows, self.availability.name)?;

        Ok(rows
            .values()
            .filter(|r| query.contains(r.observed_at))
            .cloned()
            .collect())
    }

    async fn is_alive(&self) -> bool {
        self.availability.is_alive()
    }

    async fn clean(&self) -> Result<()> {
        self.availability.check()?;
        lock(&self.rows, self.availability.name)?.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.availability.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
