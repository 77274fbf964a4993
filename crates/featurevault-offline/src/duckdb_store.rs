//! DuckDB historical store
//!
//! ## Table layout
//!
//! One table per [`FeatureSchema`], created on open:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS historical_features (
//!     customer_id BIGINT NOT NULL,
//!     purchase_timestamp TIMESTAMP NOT NULL,
//!     purchase_value DOUBLE,
//!     loyalty_score DOUBLE,
//!     PRIMARY KEY (customer_id, purchase_timestamp)
//! );
//! ```
//!
//! Timestamps are UTC and written with microsecond precision via
//! `make_timestamp(micros)`; reads go back through `epoch_us`.
//!
//! ## Concurrency
//!
//! DuckDB calls are blocking, so every operation runs on the blocking pool
//! against one connection behind a mutex. An append batch is one
//! transaction per `batch_size` chunk: the existence check and the insert
//! for a key can never interleave with another writer. A chunk that fails
//! rolls back alone and its records come back as `AppendOutcome::Failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::types::Value;
use duckdb::{params_from_iter, Connection, Transaction};
use featurevault_core::schema::{EntityKind, FeatureSchema, FieldKind};
use featurevault_core::{
    AppendOutcome, EntityId, Error, FeatureRecord, FeatureValue, HistoricalStore, RangeQuery,
    Result,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Path value that selects an in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// DuckDB historical store configuration
#[derive(Debug, Clone)]
pub struct DuckDbConfig {
    /// Database file, or `:memory:`
    pub path: String,
    /// Records per insert transaction
    pub batch_size: usize,
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            path: IN_MEMORY.to_string(),
            batch_size: 1000,
        }
    }
}

impl DuckDbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }
}

/// `None` once the store is closed
type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// DuckDB-backed [`HistoricalStore`]
pub struct DuckDbHistoricalStore {
    conn: SharedConnection,
    schema: Arc<FeatureSchema>,
    config: DuckDbConfig,
}

fn storage_error(context: &str, e: duckdb::Error) -> Error {
    Error::StorageError(anyhow::anyhow!("DuckDB {}: {}", context, e))
}

impl DuckDbHistoricalStore {
    /// Open (or create) the database and its feature table
    pub fn new(config: DuckDbConfig, schema: FeatureSchema) -> Result<Self> {
        schema.validate()?;
        if config.batch_size == 0 {
            return Err(Error::config("DuckDB batch_size must be greater than 0"));
        }

        let conn = if config.is_in_memory() {
            debug!("Opening in-memory DuckDB connection");
            Connection::open_in_memory().map_err(|e| storage_error("open in-memory", e))?
        } else {
            let path = PathBuf::from(&config.path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StorageError(anyhow::anyhow!("Failed to create DB directory: {}", e))
                })?;
            }
            debug!(path = %path.display(), "Opening persistent DuckDB connection");
            Connection::open(&path).map_err(|e| storage_error("open", e))?
        };

        conn.execute_batch(&create_table_sql(&schema))
            .map_err(|e| storage_error("create table", e))?;

        info!(
            path = %config.path,
            table = %schema.table,
            batch_size = config.batch_size,
            "Opened DuckDB historical store"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            schema: Arc::new(schema),
            config,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Run `f` against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &FeatureSchema) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let schema = self.schema.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            let conn = guard.as_mut().ok_or(Error::StoreClosed("duckdb"))?;
            f(conn, &schema)
        })
        .await
        .map_err(|e| Error::internal(format!("DuckDB task panicked: {}", e)))?
    }
}

fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|_| Error::internal("DuckDB connection mutex poisoned"))
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Int => "BIGINT",
        FieldKind::Float => "DOUBLE",
        FieldKind::String => "VARCHAR",
        FieldKind::Bool => "BOOLEAN",
    }
}

fn create_table_sql(schema: &FeatureSchema) -> String {
    let entity_type = match schema.entity_kind {
        EntityKind::Int => "BIGINT",
        EntityKind::String => "VARCHAR",
    };
    let fields: String = schema
        .fields
        .iter()
        .map(|f| format!("    {} {},\n", f.name, sql_type(f.kind)))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
         {entity} {entity_type} NOT NULL,\n    \
         {ts} TIMESTAMP NOT NULL,\n\
         {fields}    \
         PRIMARY KEY ({entity}, {ts})\n);\n\
         CREATE INDEX IF NOT EXISTS idx_{table}_{ts} ON {table} ({ts});",
        table = schema.table,
        entity = schema.entity_column,
        ts = schema.timestamp_column,
    )
}

fn insert_sql(schema: &FeatureSchema) -> String {
    let mut columns = vec![schema.entity_column.as_str(), schema.timestamp_column.as_str()];
    columns.extend(schema.fields.iter().map(|f| f.name.as_str()));
    let placeholders = std::iter::once("?")
        .chain(std::iter::once("make_timestamp(?::BIGINT)"))
        .chain(schema.fields.iter().map(|_| "?"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table,
        columns.join(", "),
        placeholders
    )
}

fn exists_sql(schema: &FeatureSchema) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = make_timestamp(?::BIGINT)",
        schema.table, schema.entity_column, schema.timestamp_column
    )
}

fn select_range_sql(schema: &FeatureSchema) -> String {
    let fields: String = schema
        .fields
        .iter()
        .map(|f| format!(", {}", f.name))
        .collect();
    format!(
        "SELECT {entity}, epoch_us({ts}){fields} FROM {table} \
         WHERE {ts} BETWEEN make_timestamp(?::BIGINT) AND make_timestamp(?::BIGINT) \
         ORDER BY {entity}, {ts}",
        entity = schema.entity_column,
        ts = schema.timestamp_column,
        table = schema.table,
    )
}

fn entity_param(schema: &FeatureSchema, id: &EntityId) -> Result<Value> {
    match (schema.entity_kind, id) {
        (EntityKind::Int, EntityId::Int(v)) => Ok(Value::BigInt(*v)),
        (EntityKind::String, id) => Ok(Value::Text(id.key())),
        (EntityKind::Int, EntityId::Str(s)) => Err(Error::invalid_input(format!(
            "entity id '{}' is not an integer",
            s
        ))),
    }
}

fn field_param(kind: FieldKind, name: &str, value: Option<&FeatureValue>) -> Result<Value> {
    let value = match value {
        None | Some(FeatureValue::Null) => return Ok(Value::Null),
        Some(v) => v,
    };
    match (kind, value) {
        (FieldKind::Int, FeatureValue::Int(v)) => Ok(Value::BigInt(*v)),
        (FieldKind::Float, FeatureValue::Float(v)) => Ok(Value::Double(*v)),
        (FieldKind::Float, FeatureValue::Int(v)) => Ok(Value::Double(*v as f64)),
        (FieldKind::String, FeatureValue::String(v)) => Ok(Value::Text(v.clone())),
        (FieldKind::Bool, FeatureValue::Bool(v)) => Ok(Value::Boolean(*v)),
        (kind, other) => Err(Error::invalid_input(format!(
            "field '{}' expects {:?}, got {}",
            name, kind, other
        ))),
    }
}

fn feature_value(value: Value) -> FeatureValue {
    match value {
        Value::Null => FeatureValue::Null,
        Value::Boolean(v) => FeatureValue::Bool(v),
        Value::TinyInt(v) => FeatureValue::Int(v.into()),
        Value::SmallInt(v) => FeatureValue::Int(v.into()),
        Value::Int(v) => FeatureValue::Int(v.into()),
        Value::BigInt(v) => FeatureValue::Int(v),
        Value::Float(v) => FeatureValue::Float(v.into()),
        Value::Double(v) => FeatureValue::Float(v),
        Value::Text(v) => FeatureValue::String(v),
        other => FeatureValue::String(format!("{:?}", other)),
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| Error::internal(format!("timestamp out of range: {}us", micros)))
}

/// Append one chunk inside `tx`; earlier rows of the chunk are visible to later ones
fn append_chunk(
    tx: &Transaction<'_>,
    schema: &FeatureSchema,
    records: &[FeatureRecord],
) -> Result<Vec<AppendOutcome>> {
    let mut exists = tx
        .prepare_cached(&exists_sql(schema))
        .map_err(|e| storage_error("prepare", e))?;
    let mut insert = tx
        .prepare_cached(&insert_sql(schema))
        .map_err(|e| storage_error("prepare", e))?;

    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        let entity = entity_param(schema, &record.entity_id)?;
        let micros = record.observed_at.timestamp_micros();

        let count: i64 = exists
            .query_row(params_from_iter([entity.clone(), Value::BigInt(micros)]), |row| {
                row.get(0)
            })
            .map_err(|e| storage_error("lookup", e))?;
        if count > 0 {
            outcomes.push(AppendOutcome::Duplicate);
            continue;
        }

        let mut params = vec![entity, Value::BigInt(micros)];
        for field in &schema.fields {
            params.push(field_param(field.kind, &field.name, record.get(&field.name))?);
        }
        insert
            .execute(params_from_iter(params))
            .map_err(|e| storage_error("insert", e))?;
        outcomes.push(AppendOutcome::Inserted);
    }
    Ok(outcomes)
}

/// One chunk in its own transaction; dropping `tx` on error rolls it back
fn commit_chunk(
    conn: &mut Connection,
    schema: &FeatureSchema,
    records: &[FeatureRecord],
) -> Result<Vec<AppendOutcome>> {
    let tx = conn.transaction().map_err(|e| storage_error("begin", e))?;
    let outcomes = append_chunk(&tx, schema, records)?;
    tx.commit().map_err(|e| storage_error("commit", e))?;
    Ok(outcomes)
}

#[async_trait]
impl HistoricalStore for DuckDbHistoricalStore {
    async fn append_many(&self, records: &[FeatureRecord]) -> Result<Vec<AppendOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let records = records.to_vec();
        let batch_size = self.config.batch_size;

        let outcomes = self
            .with_connection(move |conn, schema| {
                let mut outcomes = Vec::with_capacity(records.len());
                for chunk in records.chunks(batch_size) {
                    match commit_chunk(conn, schema, chunk) {
                        Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                        Err(e) => {
                            warn!(rows = chunk.len(), error = %e, "DuckDB chunk rolled back");
                            let msg = e.to_string();
                            outcomes.extend(chunk.iter().map(|_| AppendOutcome::Failed(msg.clone())));
                        }
                    }
                }
                Ok(outcomes)
            })
            .await?;

        let duplicates = outcomes
            .iter()
            .filter(|o| **o == AppendOutcome::Duplicate)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, AppendOutcome::Failed(_)))
            .count();
        debug!(
            records = outcomes.len(),
            duplicates, failed, "Appended records to DuckDB"
        );
        Ok(outcomes)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<FeatureRecord>> {
        let start = query.start_time.timestamp_micros();
        let end = query.end_time.timestamp_micros();

        self.with_connection(move |conn, schema| {
            let mut stmt = conn
                .prepare_cached(&select_range_sql(schema))
                .map_err(|e| storage_error("prepare", e))?;
            let mut rows = stmt
                .query(params_from_iter([start, end]))
                .map_err(|e| storage_error("query", e))?;

            let mut records = Vec::new();
            while let Some(row) = rows.next().map_err(|e| storage_error("read row", e))? {
                let entity_id = match schema.entity_kind {
                    EntityKind::Int => EntityId::Int(row.get(0).map_err(|e| storage_error("read", e))?),
                    EntityKind::String => {
                        EntityId::Str(row.get(0).map_err(|e| storage_error("read", e))?)
                    }
                };
                let micros: i64 = row.get(1).map_err(|e| storage_error("read", e))?;

                let mut record = FeatureRecord::new(entity_id, from_micros(micros)?);
                for (i, field) in schema.fields.iter().enumerate() {
                    let value: Value = row.get(i + 2).map_err(|e| storage_error("read", e))?;
                    record = record.with_value(field.name.clone(), feature_value(value));
                }
                records.push(record);
            }
            Ok(records)
        })
        .await
    }

    async fn is_alive(&self) -> bool {
        let probe = self
            .with_connection(|conn, _| {
                conn.execute("SELECT 1", [])
                    .map_err(|e| storage_error("health check", e))
            })
            .await;
        match probe {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "DuckDB health check failed");
                false
            }
        }
    }

    /// Drop and recreate the feature table
    async fn clean(&self) -> Result<()> {
        self.with_connection(|conn, schema| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", schema.table))
                .map_err(|e| storage_error("drop table", e))?;
            conn.execute_batch(&create_table_sql(schema))
                .map_err(|e| storage_error("create table", e))
        })
        .await?;
        info!(table = %self.schema.table, "Cleaned DuckDB historical store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let taken = lock(&conn)?.take();
            if let Some(conn) = taken {
                conn.close()
                    .map_err(|(_, e)| storage_error("close", e))?;
                debug!("Closed DuckDB historical store");
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::internal(format!("DuckDB task panicked: {}", e)))?
    }

    fn store_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurevault_core::schema::FieldDef;

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(&FeatureSchema::customer_purchases());
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS historical_features"));
        assert!(sql.contains("customer_id BIGINT NOT NULL"));
        assert!(sql.contains("purchase_timestamp TIMESTAMP NOT NULL"));
        assert!(sql.contains("purchase_value DOUBLE"));
        assert!(sql.contains("PRIMARY KEY (customer_id, purchase_timestamp)"));
    }

    #[test]
    fn test_insert_sql() {
        let sql = insert_sql(&FeatureSchema::customer_purchases());
        assert_eq!(
            sql,
            "INSERT INTO historical_features (customer_id, purchase_timestamp, purchase_value, loyalty_score) \
             VALUES (?, make_timestamp(?::BIGINT), ?, ?)"
        );
    }

    #[test]
    fn test_field_param_conversions() {
        assert_eq!(
            field_param(FieldKind::Float, "x", Some(&FeatureValue::Int(3))).unwrap(),
            Value::Double(3.0)
        );
        assert_eq!(field_param(FieldKind::Int, "x", None).unwrap(), Value::Null);
        assert!(field_param(FieldKind::Bool, "x", Some(&FeatureValue::Float(1.0))).is_err());
    }

    #[test]
    fn test_entity_param_kind_mismatch() {
        let schema = FeatureSchema::customer_purchases();
        assert!(entity_param(&schema, &EntityId::from("abc")).is_err());

        let mut string_schema = schema.clone();
        string_schema.entity_kind = EntityKind::String;
        assert_eq!(
            entity_param(&string_schema, &EntityId::from(7)).unwrap(),
            Value::Text("7".to_string())
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DuckDbConfig::default().with_batch_size(0);
        assert!(DuckDbHistoricalStore::new(config, FeatureSchema::customer_purchases()).is_err());

        let mut schema = FeatureSchema::customer_purchases();
        schema.fields.push(FieldDef::new("bad name", FieldKind::Int));
        assert!(DuckDbHistoricalStore::new(DuckDbConfig::default(), schema).is_err());
    }
}
