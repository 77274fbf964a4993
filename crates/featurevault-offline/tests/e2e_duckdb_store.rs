//! E2E tests for the DuckDB historical store
//!
//! Run with: `cargo test -p featurevault-offline --test e2e_duckdb_store`

use chrono::{DateTime, Duration, TimeZone, Utc};
use featurevault_core::memory::InMemoryLatestStore;
use featurevault_core::prelude::*;
use featurevault_core::schema::FeatureSchema;
use featurevault_core::{AppendOutcome, RecordStatus};
use featurevault_offline::{DuckDbConfig, DuckDbHistoricalStore};
use std::sync::Arc;
use tempfile::TempDir;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn record(entity: i64, ts: DateTime<Utc>, value: f64) -> FeatureRecord {
    FeatureRecord::new(entity, ts)
        .with_value("purchase_value", FeatureValue::Float(value))
        .with_value("loyalty_score", FeatureValue::Float(value / 100.0))
}

fn in_memory_store() -> DuckDbHistoricalStore {
    DuckDbHistoricalStore::new(DuckDbConfig::default(), FeatureSchema::customer_purchases())
        .unwrap()
}

fn everything() -> RangeQuery {
    RangeQuery::new(utc(2000, 1, 1, 0, 0, 0), utc(2100, 1, 1, 0, 0, 0)).unwrap()
}

#[tokio::test]
async fn test_append_and_query_range() {
    let store = in_memory_store();
    let records = vec![
        record(20, utc(2022, 1, 15, 0, 0, 0), 20.0),
        record(3, utc(2022, 2, 1, 0, 0, 0), 3.5),
        record(3, utc(2022, 1, 1, 0, 0, 0), 3.0),
        record(100, utc(2021, 12, 31, 23, 59, 59), 100.0),
    ];
    let outcomes = store.append_many(&records).await.unwrap();
    assert_eq!(outcomes, vec![AppendOutcome::Inserted; 4]);

    let query = RangeQuery::new(utc(2022, 1, 1, 0, 0, 0), utc(2022, 2, 1, 0, 0, 0)).unwrap();
    let rows = store.query_range(&query).await.unwrap();

    // Ordered by entity then timestamp, bounds inclusive
    let keys: Vec<_> = rows.iter().map(|r| (r.entity_id.clone(), r.observed_at)).collect();
    assert_eq!(
        keys,
        vec![
            (EntityId::from(3), utc(2022, 1, 1, 0, 0, 0)),
            (EntityId::from(3), utc(2022, 2, 1, 0, 0, 0)),
            (EntityId::from(20), utc(2022, 1, 15, 0, 0, 0)),
        ]
    );
    assert_eq!(rows[1].get("purchase_value"), Some(&FeatureValue::Float(3.5)));
    assert_eq!(rows[1].get("loyalty_score"), Some(&FeatureValue::Float(0.035)));
}

#[tokio::test]
async fn test_duplicates_are_skipped() {
    let store = in_memory_store();
    let ts = utc(2022, 1, 5, 14, 37, 14);

    store.append_many(&[record(16, ts, 1.0)]).await.unwrap();
    let outcomes = store
        .append_many(&[record(16, ts, 2.0), record(16, ts + Duration::seconds(1), 3.0)])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![AppendOutcome::Duplicate, AppendOutcome::Inserted]);

    let rows = store.query_range(&everything()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("purchase_value"), Some(&FeatureValue::Float(1.0)));
}

#[tokio::test]
async fn test_duplicate_within_one_batch_first_wins() {
    let store = in_memory_store();
    let ts = utc(2022, 3, 1, 0, 0, 0);
    let outcomes = store
        .append_many(&[record(1, ts, 1.0), record(1, ts, 9.0)])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![AppendOutcome::Inserted, AppendOutcome::Duplicate]);

    let rows = store.query_range(&everything()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("purchase_value"), Some(&FeatureValue::Float(1.0)));
}

#[tokio::test]
async fn test_batches_span_multiple_transactions() {
    let store = DuckDbHistoricalStore::new(
        DuckDbConfig::default().with_batch_size(7),
        FeatureSchema::customer_purchases(),
    )
    .unwrap();

    let base = utc(2022, 1, 1, 0, 0, 0);
    let records: Vec<_> = (0..50)
        .map(|i| record(i % 5, base + Duration::minutes(i), i as f64))
        .collect();
    let outcomes = store.append_many(&records).await.unwrap();
    assert_eq!(outcomes.len(), 50);
    assert!(outcomes.iter().all(|o| *o == AppendOutcome::Inserted));
    assert_eq!(store.query_range(&everything()).await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_failed_chunk_keeps_committed_outcomes() {
    let store = DuckDbHistoricalStore::new(
        DuckDbConfig::default().with_batch_size(1),
        FeatureSchema::customer_purchases(),
    )
    .unwrap();

    let base = utc(2022, 1, 1, 0, 0, 0);
    let bad = FeatureRecord::new(2, base)
        .with_value("purchase_value", FeatureValue::String("lots".to_string()));
    let outcomes = store
        .append_many(&[record(1, base, 1.0), bad, record(3, base, 3.0)])
        .await
        .unwrap();

    assert_eq!(outcomes[0], AppendOutcome::Inserted);
    assert!(matches!(&outcomes[1], AppendOutcome::Failed(msg) if msg.contains("purchase_value")));
    assert_eq!(outcomes[2], AppendOutcome::Inserted);

    let rows = store.query_range(&everything()).await.unwrap();
    let entities: Vec<_> = rows.iter().map(|r| r.entity_id.clone()).collect();
    assert_eq!(entities, vec![EntityId::from(1), EntityId::from(3)]);
}

#[tokio::test]
async fn test_failed_chunk_is_rolled_back_whole() {
    let store = DuckDbHistoricalStore::new(
        DuckDbConfig::default().with_batch_size(2),
        FeatureSchema::customer_purchases(),
    )
    .unwrap();

    let base = utc(2022, 1, 1, 0, 0, 0);
    let bad = FeatureRecord::new(2, base).with_value("loyalty_score", FeatureValue::Bool(true));
    let outcomes = store
        .append_many(&[record(1, base, 1.0), bad])
        .await
        .unwrap();

    assert!(outcomes.iter().all(|o| matches!(o, AppendOutcome::Failed(_))));
    assert!(store.query_range(&everything()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_microsecond_precision_survives() {
    let store = in_memory_store();
    let ts = utc(2022, 1, 1, 0, 0, 0) + Duration::microseconds(123_456);
    store.append_many(&[record(1, ts, 1.0)]).await.unwrap();

    let rows = store.query_range(&everything()).await.unwrap();
    assert_eq!(rows[0].observed_at, ts);
}

#[tokio::test]
async fn test_null_fields_round_trip() {
    let store = in_memory_store();
    let ts = utc(2022, 1, 1, 0, 0, 0);
    let sparse = FeatureRecord::new(8, ts).with_value("purchase_value", FeatureValue::Float(5.0));
    store.append_many(&[sparse]).await.unwrap();

    let rows = store.query_range(&everything()).await.unwrap();
    assert_eq!(rows[0].get("loyalty_score"), Some(&FeatureValue::Null));
}

#[tokio::test]
async fn test_clean_and_close() {
    let store = in_memory_store();
    store.append_many(&[record(1, utc(2022, 1, 1, 0, 0, 0), 1.0)]).await.unwrap();

    store.clean().await.unwrap();
    store.clean().await.unwrap();
    assert!(store.query_range(&everything()).await.unwrap().is_empty());
    assert!(store.is_alive().await);

    store.close().await.unwrap();
    store.close().await.unwrap();
    assert!(!store.is_alive().await);
    assert!(matches!(
        store.query_range(&everything()).await,
        Err(Error::StoreClosed(_))
    ));
}

#[tokio::test]
async fn test_persistent_file_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("features.duckdb");
    let config = DuckDbConfig::new(path.to_str().unwrap());

    {
        let store = DuckDbHistoricalStore::new(config.clone(), FeatureSchema::customer_purchases())
            .unwrap();
        store.append_many(&[record(1, utc(2022, 1, 1, 0, 0, 0), 1.0)]).await.unwrap();
        store.close().await.unwrap();
    }

    let reopened =
        DuckDbHistoricalStore::new(config, FeatureSchema::customer_purchases()).unwrap();
    assert_eq!(reopened.query_range(&everything()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_feature_store_over_duckdb() {
    let store = FeatureStore::new(
        Arc::new(InMemoryLatestStore::new()),
        Arc::new(in_memory_store()),
        Arc::new(SchemaTransformation::default()),
    );

    for (value, ts) in [
        ("321.84", "2022-01-05 14:37:14"),
        ("450.00", "2022-02-05 14:37:14"),
        ("111.11", "2021-01-05 14:37:14"),
    ] {
        let event = RawEvent::new()
            .with("customer_id", "16")
            .with("purchase_value", value)
            .with("loyalty_score", "1.0")
            .with("purchase_timestamp", ts);
        store.ingest(&event).await;
    }

    let latest = store.get_latest(&EntityId::from(16)).await.unwrap().unwrap();
    assert_eq!(latest.observed_at, utc(2022, 2, 5, 14, 37, 14));
    assert_eq!(store.get_historical(&everything()).await.unwrap().len(), 3);
    assert!(store.is_alive().await);
}

#[tokio::test]
async fn test_partial_history_failure_is_reported_per_record() {
    let store = FeatureStore::new(
        Arc::new(InMemoryLatestStore::new()),
        Arc::new(
            DuckDbHistoricalStore::new(
                DuckDbConfig::default().with_batch_size(1),
                FeatureSchema::customer_purchases(),
            )
            .unwrap(),
        ),
        Arc::new(MixedTransformation),
    );

    let report = store.ingest(&RawEvent::new()).await;
    let statuses: Vec<_> = report.records().iter().map(|o| o.status()).collect();
    assert_eq!(statuses, vec![RecordStatus::Accepted, RecordStatus::Failed]);
    assert_eq!(store.get_historical(&everything()).await.unwrap().len(), 1);
}

/// Emits one well-typed record and one the table cannot hold
struct MixedTransformation;

impl Transformation for MixedTransformation {
    fn transform(&self, _event: &RawEvent) -> featurevault_core::Result<Vec<FeatureRecord>> {
        let ts = utc(2022, 1, 5, 0, 0, 0);
        Ok(vec![
            record(1, ts, 1.0),
            FeatureRecord::new(2, ts).with_value("purchase_value", FeatureValue::Bool(true)),
        ])
    }
}
