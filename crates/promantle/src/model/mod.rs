//! Core data model: scalar values, ranks, aggregators and bucket rows.

pub mod aggregate;
pub mod bucket;
pub mod rank;
pub mod scalar;

pub use aggregate::Aggregator;
pub use bucket::{Bucket, RawBucket};
pub use rank::{PositionFn, Rank};
pub use scalar::{ScalarKind, ScalarRepr, ScalarValue};
