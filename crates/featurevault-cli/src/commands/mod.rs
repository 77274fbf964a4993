//! CLI command implementations

pub mod clean;
pub mod demo;
pub mod health;
pub mod history;
pub mod ingest;
pub mod latest;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use featurevault_core::schema::FeatureSchema;
use featurevault_core::FeatureStore;

/// Close `store`, then surface the command's own error first
pub async fn close_after<T>(store: &FeatureStore, result: Result<T>) -> Result<T> {
    let closed = store.close().await;
    let value = result?;
    closed.context("Failed to close feature store")?;
    Ok(value)
}

/// Parse a command-line timestamp as UTC
///
/// Accepts the schema's timestamp format, RFC 3339, or a bare `YYYY-MM-DD`
/// meaning midnight.
pub fn parse_timestamp(raw: &str, schema: &FeatureSchema) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, &schema.timestamp_format) {
        return Ok(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(anyhow!(
        "invalid timestamp '{}' (expected '{}', RFC 3339 or YYYY-MM-DD)",
        raw,
        schema.timestamp_format
    ))
}
