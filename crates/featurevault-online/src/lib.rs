//! featurevault latest-value stores
//!
//! Network-backed implementations of [`LatestStore`]. Each store performs
//! `set_if_newer` as one atomic server-side operation, so concurrent
//! ingestion for the same entity never regresses the stored value.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use featurevault_online::{RedisConfig, RedisLatestStore};
//!
//! let store = RedisLatestStore::new(RedisConfig::new("redis://localhost:6379")).await?;
//! let written = store.set_if_newer(&record).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `redis` (default): Redis store
//! - `postgres`: PostgreSQL store
//! - `all`: both

pub use featurevault_core::{EntityId, FeatureRecord, LatestStore};

#[cfg(feature = "redis")]
pub mod redis_store;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisLatestStore};

#[cfg(feature = "postgres")]
pub mod postgres_store;
#[cfg(feature = "postgres")]
pub use postgres_store::{PostgresConfig, PostgresLatestStore};
