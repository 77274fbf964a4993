//! Transformations: raw events → feature records
//!
//! A raw event is a flat mapping of named fields, typically one row of a CSV
//! file. A [`Transformation`] turns it into zero or more [`FeatureRecord`]s
//! and is the only component that inspects payload fields; the coordinator
//! never validates them itself.

use crate::schema::{EntityKind, FeatureSchema, FieldKind};
use crate::{EntityId, Error, FeatureRecord, FeatureValue, Result};
use chrono::format::ParseErrorKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One raw input event: field name → JSON value
///
/// Values from tabular sources are usually strings; JSON sources may carry
/// numbers and booleans. Transformations accept both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(BTreeMap<String, Value>);

impl RawEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an event from `(name, value)` pairs, e.g. CSV headers zipped with a row
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Sets a field (builder pattern)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Strategy turning a raw event into feature records
///
/// Implementations signal unparseable input with `Error::MalformedEvent`.
/// Returning an empty vec is allowed (the event carries no features).
pub trait Transformation: Send + Sync {
    fn transform(&self, event: &RawEvent) -> Result<Vec<FeatureRecord>>;
}

/// Default transformation: one record per event, laid out by a [`FeatureSchema`]
///
/// - the entity and timestamp columns are required
/// - payload fields that are absent, `null` or empty become `FeatureValue::Null`
/// - columns not named by the schema are ignored
#[derive(Debug, Clone)]
pub struct SchemaTransformation {
    schema: FeatureSchema,
}

impl SchemaTransformation {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn parse_entity(&self, event: &RawEvent) -> Result<EntityId> {
        let column = &self.schema.entity_column;
        let value = required(event, column)?;

        match self.schema.entity_kind {
            EntityKind::Int => parse_int(value)
                .map(EntityId::Int)
                .ok_or_else(|| invalid_value(column, value, "an integer")),
            EntityKind::String => match value {
                Value::String(s) if !s.trim().is_empty() => Ok(EntityId::Str(s.trim().to_string())),
                Value::Number(n) => Ok(EntityId::Str(n.to_string())),
                _ => Err(invalid_value(column, value, "a non-empty string")),
            },
        }
    }

    fn parse_timestamp(&self, event: &RawEvent) -> Result<DateTime<Utc>> {
        let column = &self.schema.timestamp_column;
        let value = required(event, column)?;

        match value {
            Value::String(s) => {
                let s = s.trim();
                parse_with_format(s, &self.schema.timestamp_format)
                    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)))
                    .ok_or_else(|| {
                        invalid_value(
                            column,
                            value,
                            &format!("a timestamp in '{}' format", self.schema.timestamp_format),
                        )
                    })
            }
            // Numbers are epoch seconds
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| invalid_value(column, value, "epoch seconds")),
            _ => Err(invalid_value(column, value, "a timestamp")),
        }
    }
}

impl Default for SchemaTransformation {
    fn default() -> Self {
        Self::new(FeatureSchema::customer_purchases())
    }
}

impl Transformation for SchemaTransformation {
    fn transform(&self, event: &RawEvent) -> Result<Vec<FeatureRecord>> {
        let entity_id = self.parse_entity(event)?;
        let observed_at = self.parse_timestamp(event)?;

        let mut record = FeatureRecord::new(entity_id, observed_at);
        for field in &self.schema.fields {
            let value = match event.get(&field.name) {
                None => FeatureValue::Null,
                Some(raw) if is_blank(raw) => FeatureValue::Null,
                Some(raw) => parse_field(&field.name, field.kind, raw)?,
            };
            record.values.insert(field.name.clone(), value);
        }

        Ok(vec![record])
    }
}

/// Date-only formats parse to midnight UTC
fn parse_with_format(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(raw, format) {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) if e.kind() == ParseErrorKind::NotEnough => NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc()),
        Err(_) => None,
    }
}

fn required<'a>(event: &'a RawEvent, column: &str) -> Result<&'a Value> {
    match event.get(column) {
        Some(v) if !is_blank(v) => Ok(v),
        _ => Err(Error::malformed(format!("missing required column '{}'", column))),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn invalid_value(column: &str, value: &Value, expected: &str) -> Error {
    Error::malformed(format!(
        "column '{}' has value {} but expected {}",
        column, value, expected
    ))
}

/// Integers may arrive as `16`, `"16"` or an integral float such as `16.0`
fn parse_int(value: &Value) -> Option<i64> {
    let integral = |f: f64| {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            Some(f as i64)
        } else {
            None
        }
    };

    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_field(name: &str, kind: FieldKind, value: &Value) -> Result<FeatureValue> {
    match kind {
        FieldKind::Int => parse_int(value)
            .map(FeatureValue::Int)
            .ok_or_else(|| invalid_value(name, value, "an integer")),
        FieldKind::Float => parse_float(value)
            .map(FeatureValue::Float)
            .ok_or_else(|| invalid_value(name, value, "a finite number")),
        FieldKind::Bool => parse_bool(value)
            .map(FeatureValue::Bool)
            .ok_or_else(|| invalid_value(name, value, "a boolean")),
        FieldKind::String => match value {
            Value::String(s) => Ok(FeatureValue::String(s.clone())),
            Value::Number(n) => Ok(FeatureValue::String(n.to_string())),
            Value::Bool(b) => Ok(FeatureValue::String(b.to_string())),
            _ => Err(invalid_value(name, value, "a string")),
        },
    }
}
