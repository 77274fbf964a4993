//! # featurevault historical store
//!
//! DuckDB implementation of [`HistoricalStore`]: an append-only table of
//! every accepted record, keyed by `(entity_id, observed_at)` and queried
//! by time range.
//!
//! ```rust,no_run
//! use featurevault_core::schema::FeatureSchema;
//! use featurevault_offline::{DuckDbConfig, DuckDbHistoricalStore};
//!
//! # fn main() -> featurevault_core::Result<()> {
//! let config = DuckDbConfig::new("data/features.duckdb").with_batch_size(500);
//! let store = DuckDbHistoricalStore::new(config, FeatureSchema::customer_purchases())?;
//! # Ok(())
//! # }
//! ```

pub use duckdb_store::{DuckDbConfig, DuckDbHistoricalStore, IN_MEMORY};
pub use featurevault_core::HistoricalStore;

mod duckdb_store;
