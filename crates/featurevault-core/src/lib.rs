//! # featurevault core library
//!
//! Foundation library for featurevault: the record model, the two store
//! traits, the transformation contract and the [`FeatureStore`] coordinator
//! that keeps both stores populated.
//!
//! ## Key Components
//!
//! - **LatestStore**: one record per entity, atomic set-if-newer
//! - **HistoricalStore**: append-only, queried by time range
//! - **Transformation**: raw event → feature records
//! - **FeatureStore**: best-effort dual-write ingestion
//! - **Errors**: strongly-typed error handling
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use featurevault_core::prelude::*;
//! use featurevault_core::memory::{InMemoryHistoricalStore, InMemoryLatestStore};
//!
//! # async fn run() -> featurevault_core::Result<()> {
//! let store = FeatureStore::new(
//!     Arc::new(InMemoryLatestStore::new()),
//!     Arc::new(InMemoryHistoricalStore::new()),
//!     Arc::new(SchemaTransformation::default()),
//! );
//!
//! let event = RawEvent::new()
//!     .with("customer_id", 16)
//!     .with("purchase_value", "321.84")
//!     .with("loyalty_score", "1.46")
//!     .with("purchase_timestamp", "2022-01-05 14:37:14");
//! store.ingest(&event).await;
//!
//! let latest = store.get_latest(&EntityId::from(16)).await?;
//! assert!(latest.is_some());
//! # Ok(())
//! # }
//! ```

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use feature_store::{FeatureStore, HealthReport, StoreHealth, DEFAULT_PROBE_TIMEOUT};
pub use historical_store::{AppendOutcome, HistoricalStore};
pub use latest_store::{latest_key, LatestStore};
pub use outcome::{HistoryWrite, IngestReport, IngestSummary, LatestWrite, RecordOutcome, RecordStatus};
pub use transformation::{RawEvent, SchemaTransformation, Transformation};
pub use types::{EntityId, FeatureRecord, FeatureValue, RangeQuery};

mod error;
mod feature_store;
mod historical_store;
mod latest_store;
pub mod memory;
mod outcome;
pub mod schema;
mod transformation;
mod types;

// Prelude module - commonly used imports
// Users can do `use featurevault_core::prelude::*` to get everything they need
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::feature_store::FeatureStore;
    pub use crate::historical_store::HistoricalStore;
    pub use crate::latest_store::LatestStore;
    pub use crate::transformation::{RawEvent, SchemaTransformation, Transformation};
    pub use crate::types::{EntityId, FeatureRecord, FeatureValue, RangeQuery};
}
