//! The table adapter contract: the persistence seam of the store.
//!
//! Every rank of a group is persisted as one table of bucket rows, reached
//! through the [`TableAdapter`] trait. The engine is entirely unaware of the
//! backend behind the trait; any store that can upsert by primary key and
//! scan by position or parent position qualifies: SQL, an ordered key-value
//! store, or plain memory.
//!
//! # Scoping and naming
//!
//! All operations are scoped by `(group, rank, rank_count)`. Adapters must
//! derive the table identifier deterministically from that triple via
//! [`table_name`], and must push every caller-supplied identifier (group,
//! aggregate names, storage types) through the shared sanitizer before it
//! reaches DDL or DML. Values are bound positionally, never concatenated.
//!
//! # Connections
//!
//! Adapters are stateless with respect to engine logic. A call opens whatever
//! short-lived resources it needs and releases them on every exit path; no
//! state is carried between calls.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::model::{RawBucket, ScalarValue};

/// Replaces every character outside `[0-9A-Za-z_]` with `_`, dropping spaces.
///
/// Applied to every identifier that flows into adapter-generated DDL or DML:
/// group names, aggregate column stems and storage types.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ' ')
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Sanitizes and lowercases a column identifier.
///
/// The canonical column stem of an aggregate; the suffixes `_count` and
/// `_value` are appended after sanitization and are reserved for that use.
pub fn column_name(raw: &str) -> String {
    sanitize_identifier(raw).to_ascii_lowercase()
}

/// Derives the table identifier for one rank of a group.
///
/// The scheme is `<group>_<rank>_of_<rank_count>`, sanitized.
pub fn table_name(group: &str, rank: u32, rank_count: u32) -> String {
    format!("{}_{}_of_{}", sanitize_identifier(group), rank, rank_count)
}

/// One aggregate's column pair as required for table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateColumn {
    /// Sanitized, lowercased column stem.
    pub column: String,
    /// Sanitized storage type of the `_value` column.
    pub storage_type: String,
}

/// Persists rank tables of bucket rows.
///
/// Implementations must provide atomic insert-or-update by the `position`
/// primary key. Scans return rows ascending by `position` with inclusive
/// bounds, materialized because per-call resources close on return.
///
/// Nothing in this contract makes a whole engine write transactional; an
/// adapter may additionally run each call under serializable semantics, but
/// the engine does not rely on it.
pub trait TableAdapter: Send + Sync {
    /// Creates the rank table if it does not exist. Idempotent.
    ///
    /// The table has columns `position` (i64 primary key), `parent_position`
    /// (i64, explicitly indexed), `lower_bound` and `upper_bound` of
    /// `key_type`, and a `<stem>_count` / `<stem>_value` pair per aggregate.
    ///
    /// Returns true iff this call created the table.
    fn ensure_table(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        key_type: &str,
        aggregates: &[AggregateColumn],
    ) -> Result<bool>;

    /// Upserts one aggregate's view of a bucket row, keyed by `position`.
    ///
    /// Inserts the row when absent. When the row exists, updates only this
    /// aggregate's `_count`/`_value` pair plus the shared `parent_position`
    /// and bounds columns, leaving other aggregates' pairs untouched.
    #[allow(clippy::too_many_arguments)]
    fn write_at(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        parent_position: i64,
        position: i64,
        count: i64,
        value: &ScalarValue,
        lower: &ScalarValue,
        upper: &ScalarValue,
    ) -> Result<()>;

    /// Reads the bucket row at `position`, or `None` if the row is absent.
    fn read_at(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        position: i64,
    ) -> Result<Option<RawBucket>>;

    /// Reads all rows with `start <= position <= end`, ascending by position.
    fn read_range(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<RawBucket>>;

    /// Reads all rows whose `parent_position` equals the argument, ascending
    /// by position.
    fn read_children(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        parent_position: i64,
    ) -> Result<Vec<RawBucket>>;

    /// The largest `position` in the rank table.
    ///
    /// Returns 0 when the table is empty or missing, and swallows adapter
    /// errors: it runs during engine construction against brand-new tables.
    fn max_position(&self, group: &str, rank: u32, rank_count: u32) -> i64;

    /// Renders every row of the rank table for diagnostics.
    fn dump_rank(&self, group: &str, rank: u32, rank_count: u32) -> Result<String>;

    /// Drops the rank table. Succeeds when the table is already gone.
    fn drop_table(&self, group: &str, rank: u32, rank_count: u32) -> Result<()>;
}
