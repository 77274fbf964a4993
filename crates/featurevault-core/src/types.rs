//! Core data types for featurevault
//!
//! This module defines the fundamental data structures used throughout the system.
//! These types are kept simple and focused on their single responsibility.

use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of the subject of a feature record (e.g. a customer)
///
/// Integer ids order numerically, string ids lexicographically. All integer
/// ids sort before all string ids; a single schema only ever produces one kind.
///
/// # Examples
///
/// ```
/// use featurevault_core::EntityId;
///
/// let id = EntityId::from(16);
/// assert_eq!(id.to_string(), "16");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// String form used as the key in the latest-value store
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(v) => write!(f, "{}", v),
            EntityId::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Scalar payload value of a feature record
///
/// Uses `#[serde(untagged)]` so records serialize to plain JSON:
/// - `Int(42)` → `42`
/// - `Float(1.5)` → `1.5`
/// - `Null` → `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Null/missing value
    /// Must be first for untagged deserialization to pick it for `null`
    Null,

    /// Integer value (e.g., purchase counts)
    Int(i64),

    /// Floating point value (e.g., purchase value, loyalty score)
    Float(f64),

    /// String value (e.g., category, status)
    String(String),

    /// Boolean value (e.g., is_premium)
    Bool(bool),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Null => f.write_str("null"),
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::String(v) => f.write_str(v),
            FeatureValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// One observation of an entity at a point in time
///
/// A record is built once per transformed event and then handed to both
/// stores. Its identity is `entity_id`; its ordering key is `observed_at`
/// (event time, not ingestion time).
///
/// `observed_at` is truncated to microseconds on construction, which is the
/// precision every store persists.
///
/// # Examples
///
/// ```
/// use featurevault_core::{FeatureRecord, FeatureValue};
/// use chrono::{TimeZone, Utc};
///
/// let record = FeatureRecord::new(16, Utc.with_ymd_and_hms(2022, 1, 5, 14, 37, 14).unwrap())
///     .with_value("purchase_value", FeatureValue::Float(321.84))
///     .with_value("loyalty_score", FeatureValue::Float(1.46));
///
/// assert_eq!(record.entity_id.to_string(), "16");
/// assert_eq!(record.get("loyalty_score"), Some(&FeatureValue::Float(1.46)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Stable identifier of the subject
    pub entity_id: EntityId,

    /// When the observed event happened
    pub observed_at: DateTime<Utc>,

    /// Feature name -> value, opaque to the ordering logic
    #[serde(default)]
    pub values: BTreeMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new(entity_id: impl Into<EntityId>, observed_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            observed_at: observed_at.trunc_subsecs(6),
            values: BTreeMap::new(),
        }
    }

    /// Adds a value to this record (builder pattern)
    pub fn with_value(mut self, name: impl Into<String>, value: FeatureValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Gets a value by name
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// Uniqueness key in the historical store
    pub fn key(&self) -> (EntityId, DateTime<Utc>) {
        (self.entity_id.clone(), self.observed_at)
    }

    /// Whether this record should replace `current` as the latest value
    ///
    /// Strictly greater timestamps win; on a tie the stored record is kept.
    pub fn supersedes(&self, current: Option<&FeatureRecord>) -> bool {
        match current {
            None => true,
            Some(current) => current.observed_at < self.observed_at,
        }
    }
}

/// Inclusive `[start_time, end_time]` window over `observed_at`
///
/// Only used against the historical store. There is no entity filter;
/// narrowing by entity is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl RangeQuery {
    /// Creates a validated window
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `start_time` is after `end_time`.
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<Self> {
        if start_time > end_time {
            return Err(Error::invalid_input(format!(
                "range start {} is after range end {}",
                start_time, end_time
            )));
        }
        Ok(Self {
            start_time,
            end_time,
        })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start_time <= ts && ts <= self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_entity_id_ordering() {
        let mut ids = vec![EntityId::from(16), EntityId::from(2), EntityId::from(100)];
        ids.sort();
        assert_eq!(ids, vec![EntityId::Int(2), EntityId::Int(16), EntityId::Int(100)]);
    }

    #[test]
    fn test_entity_id_key() {
        assert_eq!(EntityId::from(16).key(), "16");
        assert_eq!(EntityId::from("cust-7").key(), "cust-7");
    }

    #[test]
    fn test_supersedes() {
        let older = FeatureRecord::new(16, ts(2022, 1, 5));
        let newer = FeatureRecord::new(16, ts(2022, 2, 5));
        let same = FeatureRecord::new(16, ts(2022, 2, 5))
            .with_value("purchase_value", FeatureValue::Float(1.0));

        assert!(older.supersedes(None));
        assert!(newer.supersedes(Some(&older)));
        assert!(!older.supersedes(Some(&newer)));
        // Equal timestamps: the stored record wins
        assert!(!same.supersedes(Some(&newer)));
    }

    #[test]
    fn test_record_truncates_to_micros() {
        let base = ts(2022, 1, 5);
        let record = FeatureRecord::new(1, base + Duration::nanoseconds(1_234_567));
        assert_eq!(record.observed_at, base + Duration::microseconds(1_234));
    }

    #[test]
    fn test_record_json_shape() {
        let record = FeatureRecord::new(16, ts(2022, 1, 5))
            .with_value("purchase_value", FeatureValue::Float(321.84))
            .with_value("visits", FeatureValue::Int(3));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entity_id"], 16);
        assert_eq!(json["values"]["visits"], 3);

        let back: FeatureRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_range_query_validation() {
        assert!(RangeQuery::new(ts(2022, 1, 1), ts(2022, 2, 1)).is_ok());
        assert!(RangeQuery::new(ts(2022, 1, 1), ts(2022, 1, 1)).is_ok());

        let err = RangeQuery::new(ts(2022, 2, 1), ts(2022, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_range_query_is_inclusive() {
        let query = RangeQuery::new(ts(2022, 1, 1), ts(2022, 2, 1)).unwrap();
        assert!(query.contains(ts(2022, 1, 1)));
        assert!(query.contains(ts(2022, 2, 1)));
        assert!(!query.contains(ts(2022, 2, 2)));
    }
}
