//! Promantle - pre-aggregated hierarchical log store.
//!
//! This crate maintains several "ranks" of progressively coarser
//! aggregations over a stream of domain objects keyed by an orderable value.
//! Each rank partitions the key space into buckets of a different granularity
//! (minute, hour, day, ...); every bucket carries, per registered aggregate,
//! the combined value, the count of source items folded in, and the observed
//! key bounds. Point and range queries cost in proportion to the chosen rank,
//! not to the volume of ingested data.
//!
//! # Components
//!
//! - [`TriangularList`]: the engine. Schema materialization, the bottom-up
//!   rank-walk write algorithm, point/range/children reads
//! - [`TriangularListBuilder`]: validating configuration of ranks, aggregates,
//!   key derivation and storage
//! - [`TableAdapter`]: the persistence contract, with [`MemoryAdapter`] and
//!   the SQL reference [`SqliteAdapter`]
//!
//! # Example
//!
//! ```rust,ignore
//! use promantle::{MemoryAdapter, TriangularList};
//! use std::sync::Arc;
//!
//! struct Purchase { at: i64, spent: f64 }
//!
//! let list: TriangularList<Purchase, i64> = TriangularList::builder("purchases")
//!     .using_storage(Arc::new(MemoryAdapter::new()))?
//!     .key_on("INT8", |p: &Purchase| p.at, |a, b| if a <= b { (*a, *b) } else { (*b, *a) })?
//!     .aggregate::<f64, _, _>("Spent", "REAL", |p| p.spent, |a, b| a + b)?
//!     .rank(1, "PerHour", |at| at / 3600)?
//!     .rank(2, "PerDay", |at| at / 86_400)?
//!     .build()?;
//!
//! list.write_item(&Purchase { at: 1588673472, spent: 5.1 })?;
//! let spent: Option<f64> = list.read_aggregate_at("Spent", "PerHour", &1588673432)?;
//! ```

#![deny(missing_docs)]

pub mod adapter;
pub mod error;
pub mod list;
pub mod model;

pub use adapter::{memory::MemoryAdapter, sqlite::SqliteAdapter, AggregateColumn, TableAdapter};
pub use error::{Result, StoreError};
pub use list::{TriangularList, TriangularListBuilder};
pub use model::{Bucket, RawBucket, ScalarKind, ScalarRepr, ScalarValue};
