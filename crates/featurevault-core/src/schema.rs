//! Feature schema: the column layout shared by transformation and storage
//!
//! A schema names the entity column, the timestamp column and the payload
//! fields. The default transformation uses it to parse raw events, and the
//! historical store uses it to lay out its table.

use crate::{EntityId, Error, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default textual timestamp format for raw events
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type of the entity id column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Int,
    String,
}

impl EntityKind {
    /// Parse a textual id (e.g. from the command line) into an `EntityId`
    pub fn parse_id(&self, raw: &str) -> Result<EntityId> {
        let raw = raw.trim();
        match self {
            EntityKind::Int => raw
                .parse::<i64>()
                .map(EntityId::Int)
                .map_err(|_| Error::invalid_input(format!("'{}' is not an integer entity id", raw))),
            EntityKind::String => {
                if raw.is_empty() {
                    return Err(Error::invalid_input("entity id must not be empty"));
                }
                Ok(EntityId::Str(raw.to_string()))
            }
        }
    }
}

/// Type of a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    String,
    Bool,
}

/// Payload field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Column layout of one feature table
///
/// # Example
///
/// ```
/// use featurevault_core::schema::{FeatureSchema, FieldKind};
///
/// let schema = FeatureSchema::customer_purchases();
/// assert_eq!(schema.entity_column, "customer_id");
/// assert_eq!(schema.fields[0].kind, FieldKind::Float);
/// schema.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Historical table name
    pub table: String,

    pub entity_column: String,

    pub entity_kind: EntityKind,

    pub timestamp_column: String,

    /// chrono format string used to parse textual timestamps
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    pub fields: Vec<FieldDef>,
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl FeatureSchema {
    /// Customer purchase features: the dataset shipped with the demo
    pub fn customer_purchases() -> Self {
        Self {
            table: "historical_features".to_string(),
            entity_column: "customer_id".to_string(),
            entity_kind: EntityKind::Int,
            timestamp_column: "purchase_timestamp".to_string(),
            timestamp_format: default_timestamp_format(),
            fields: vec![
                FieldDef::new("purchase_value", FieldKind::Float),
                FieldDef::new("loyalty_score", FieldKind::Float),
            ],
        }
    }

    /// Check names are present, unique and safe to splice into SQL
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let columns = [&self.table, &self.entity_column, &self.timestamp_column]
            .into_iter()
            .chain(self.fields.iter().map(|f| &f.name));

        for (i, name) in columns.enumerate() {
            if !is_identifier(name) {
                return Err(Error::config(format!(
                    "'{}' is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*)",
                    name
                )));
            }
            // index 0 is the table name, which lives in its own namespace
            if i > 0 && !seen.insert(name.to_ascii_lowercase()) {
                return Err(Error::config(format!("duplicate column '{}'", name)));
            }
        }

        if self.timestamp_format.trim().is_empty() {
            return Err(Error::config("timestamp_format must not be empty"));
        }
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::config(format!(
                "timestamp_format '{}' is not a valid strftime format",
                self.timestamp_format
            )));
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
