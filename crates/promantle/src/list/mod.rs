//! The pre-aggregation engine.
//!
//! A [`TriangularList`] maintains one bucket table per rank of a group. Rank 0
//! holds one row per ingested item; each rank above it partitions the key
//! space into coarser buckets carrying, for every registered aggregate, the
//! combined value, the count of source items folded in, and the observed
//! lower/upper key bounds. Range and point queries then cost in proportion to
//! the chosen rank, not to the volume of ingested data.
//!
//! # Writes
//!
//! Every write walks the ranks bottom-up, once per aggregate: the item lands
//! as a rank-0 row, then each parent bucket on the item's path is recomputed
//! from the full set of its children at the rank below. Re-folding from the
//! children keeps every upper rank exact under any associative combiner,
//! including `max`/`min`, which cannot be maintained incrementally without
//! re-examining all siblings sharing the bucket.
//!
//! # Consistency
//!
//! The walk is a read-modify-write sequence and is not transactional; a
//! single writer per group is assumed. Concurrent readers observe per-row
//! atomicity but may briefly see a parent rank behind its children; reads
//! settle once the last write returns. A write whose key lands in an already
//! materialized bucket is folded in correctly, retroactive arrivals included.
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
//! let hour: Option<f64> = list.read_aggregate_at("Spent", "PerHour", &1588673432)?;
//! ```

mod builder;

pub use builder::TriangularListBuilder;

use crate::adapter::{AggregateColumn, TableAdapter};
use crate::error::{Result, StoreError};
use crate::model::{Aggregator, Bucket, Rank, RawBucket, ScalarRepr, ScalarValue};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Derives the key of a source item.
pub(crate) type KeyFn<V, K> = Box<dyn Fn(&V) -> K + Send + Sync>;

/// Orders two keys, returning `(min, max)`.
pub(crate) type MinMaxFn<K> = Box<dyn Fn(&K, &K) -> (K, K) + Send + Sync>;

/// A re-folded parent bucket, ready to upsert.
struct Folded<K> {
    count: i64,
    value: ScalarValue,
    lower: K,
    upper: K,
}

/// A pre-aggregated hierarchical store over one group of rank tables.
///
/// Constructed through [`TriangularList::builder`]. All methods take `&self`;
/// the only mutable state is the rank-0 id counter and the deleted latch.
pub struct TriangularList<V, K> {
    group: String,
    adapter: Arc<dyn TableAdapter>,
    key_storage_type: String,
    key_fn: KeyFn<V, K>,
    min_max: MinMaxFn<K>,
    ranks: Vec<Rank<K>>,
    aggregates: Vec<Aggregator<V>>,
    next_zero_id: AtomicI64,
    deleted: AtomicBool,
}

impl<V, K: ScalarRepr + Clone> TriangularList<V, K> {
    /// Starts configuring a new list for `group`.
    ///
    /// The group name namespaces all rank tables; two lists built against the
    /// same group and adapter share the underlying data.
    pub fn builder(group: impl Into<String>) -> TriangularListBuilder<V, K> {
        TriangularListBuilder::new(group.into())
    }

    /// Materializes the schema and assembles the engine.
    ///
    /// Creates the rank tables 0..=N if absent and resumes the rank-0 id
    /// counter past the largest persisted position.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn materialize(
        group: String,
        adapter: Arc<dyn TableAdapter>,
        key_storage_type: String,
        key_fn: KeyFn<V, K>,
        min_max: MinMaxFn<K>,
        ranks: Vec<Rank<K>>,
        aggregates: Vec<Aggregator<V>>,
    ) -> Result<Self> {
        let rank_count = ranks.len() as u32;
        let columns: Vec<AggregateColumn> = aggregates
            .iter()
            .map(|aggregate| AggregateColumn {
                column: aggregate.column().to_string(),
                storage_type: aggregate.storage_type().to_string(),
            })
            .collect();
        for rank in 0..=rank_count {
            let created =
                adapter.ensure_table(&group, rank, rank_count, &key_storage_type, &columns)?;
            if created {
                debug!(group = %group, rank, "created rank table");
            }
        }
        let next_zero_id = adapter.max_position(&group, 0, rank_count) + 1;

        Ok(Self {
            group,
            adapter,
            key_storage_type,
            key_fn,
            min_max,
            ranks,
            aggregates,
            next_zero_id: AtomicI64::new(next_zero_id),
            deleted: AtomicBool::new(false),
        })
    }

    /// The group name all rank tables are derived from.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The number of user-defined ranks (excluding the implicit rank 0).
    pub fn rank_count(&self) -> u32 {
        self.ranks.len() as u32
    }

    /// The storage type keys are persisted under.
    pub fn key_storage_type(&self) -> &str {
        &self.key_storage_type
    }

    fn ensure_live(&self) -> Result<()> {
        if self.deleted.load(Ordering::Relaxed) {
            return Err(StoreError::EngineDeleted(self.group.clone()));
        }
        Ok(())
    }

    fn rank_by_name(&self, name: &str) -> Result<&Rank<K>> {
        self.ranks
            .iter()
            .find(|rank| rank.name() == name)
            .ok_or_else(|| StoreError::UnknownRank(name.to_string()))
    }

    fn aggregator(&self, name: &str) -> Result<&Aggregator<V>> {
        self.aggregates
            .iter()
            .find(|aggregate| aggregate.name() == name)
            .ok_or_else(|| StoreError::UnknownAggregate(name.to_string()))
    }

    /// Resolves an aggregate and checks its registered kind against the
    /// caller's requested value type.
    fn checked_aggregator<A: ScalarRepr>(&self, name: &str) -> Result<&Aggregator<V>> {
        let aggregate = self.aggregator(name)?;
        if aggregate.kind() != A::KIND {
            return Err(StoreError::TypeMismatch {
                requested: A::KIND,
                stored: aggregate.kind().name(),
            });
        }
        Ok(aggregate)
    }

    /// Bucket position of `key` at internal rank `number` (1..=N).
    fn position_at(&self, number: u32, key: &K) -> i64 {
        self.ranks[(number - 1) as usize].position_of(key)
    }

    fn decode_key(&self, value: &ScalarValue) -> Result<K> {
        K::from_scalar(value).ok_or(StoreError::TypeMismatch {
            requested: K::KIND,
            stored: value.kind_name(),
        })
    }

    /// Re-folds a parent bucket from its children, skipping children that
    /// carry no pair for this aggregate. Returns `None` when nothing remains.
    fn fold_children(
        &self,
        aggregate: &Aggregator<V>,
        children: &[RawBucket],
    ) -> Result<Option<Folded<K>>> {
        let mut count = 0i64;
        let mut value: Option<ScalarValue> = None;
        let mut bounds: Option<(K, K)> = None;
        for child in children {
            if child.value.is_null() {
                continue;
            }
            count += child.count;
            value = Some(match value {
                None => child.value.clone(),
                Some(acc) => aggregate.combine(&acc, &child.value)?,
            });
            let lower = self.decode_key(&child.lower)?;
            let upper = self.decode_key(&child.upper)?;
            bounds = Some(match bounds {
                None => (lower, upper),
                Some((acc_lower, acc_upper)) => (
                    (self.min_max)(&acc_lower, &lower).0,
                    (self.min_max)(&acc_upper, &upper).1,
                ),
            });
        }
        match (value, bounds) {
            (Some(value), Some((lower, upper))) => Ok(Some(Folded {
                count,
                value,
                lower,
                upper,
            })),
            _ => Ok(None),
        }
    }

    /// Ingests one item, updating every rank on the item's bucket path.
    ///
    /// The item's rank-0 row is persisted first; each rank above it is then
    /// recomputed from the full set of children below the item's bucket, one
    /// aggregate at a time. Returns the number of child rows scanned during
    /// the recompute, a cost diagnostic.
    ///
    /// The walk is not transactional: a concurrent writer on the same group
    /// leaves aggregate state undefined, and a concurrent reader may observe
    /// a parent bucket before its recompute lands.
    ///
    /// # Errors
    ///
    /// Fails with `EngineDeleted` after teardown, or with any error the
    /// adapter raises; a failed walk leaves lower ranks already updated.
    pub fn write_item(&self, item: &V) -> Result<usize> {
        self.ensure_live()?;
        let key = (self.key_fn)(item);
        let key_scalar = key.to_scalar();
        let zero_id = self.next_zero_id.fetch_add(1, Ordering::Relaxed);
        let rank_count = self.rank_count();
        let mut scanned = 0usize;

        for aggregate in &self.aggregates {
            // The new item lands at rank 0 before any parent is touched.
            let value = aggregate.select(item);
            self.adapter.write_at(
                &self.group,
                0,
                rank_count,
                aggregate.column(),
                self.position_at(1, &key),
                zero_id,
                1,
                &value,
                &key_scalar,
                &key_scalar,
            )?;

            for child_rank in 0..rank_count {
                let parent_rank = child_rank + 1;
                let parent_position = self.position_at(parent_rank, &key);
                let children = self.adapter.read_children(
                    &self.group,
                    child_rank,
                    rank_count,
                    aggregate.column(),
                    parent_position,
                )?;
                scanned += children.len();
                let Some(folded) = self.fold_children(aggregate, &children)? else {
                    // Nothing below this bucket; no ancestor needs a refresh.
                    break;
                };
                let grand_position = if parent_rank < rank_count {
                    self.position_at(parent_rank + 1, &key)
                } else {
                    0
                };
                self.adapter.write_at(
                    &self.group,
                    parent_rank,
                    rank_count,
                    aggregate.column(),
                    grand_position,
                    parent_position,
                    folded.count,
                    &folded.value,
                    &folded.lower.to_scalar(),
                    &folded.upper.to_scalar(),
                )?;
            }
        }
        Ok(scanned)
    }

    /// Reads the combined value of `aggregate` in the bucket containing `key`
    /// at the named rank, or `None` if the bucket is unoccupied.
    pub fn read_aggregate_at<A: ScalarRepr>(
        &self,
        aggregate: &str,
        rank: &str,
        key: &K,
    ) -> Result<Option<A>> {
        Ok(self
            .read_point_at(aggregate, rank, key)?
            .map(|bucket| bucket.value))
    }

    /// Reads the full bucket containing `key` at the named rank.
    pub fn read_point_at<A: ScalarRepr>(
        &self,
        aggregate: &str,
        rank: &str,
        key: &K,
    ) -> Result<Option<Bucket<A, K>>> {
        self.ensure_live()?;
        let aggregate = self.checked_aggregator::<A>(aggregate)?;
        let rank = self.rank_by_name(rank)?;
        let raw = self.adapter.read_at(
            &self.group,
            rank.number(),
            self.rank_count(),
            aggregate.column(),
            rank.position_of(key),
        )?;
        match raw {
            None => Ok(None),
            Some(raw) => Bucket::decode(&raw),
        }
    }

    /// Reads the child buckets one rank below the bucket containing `key`.
    ///
    /// At the finest user rank this yields the original items folded under
    /// the bucket, each with a count of 1 and equal bounds, in ingestion
    /// order.
    pub fn read_children_of_point<A: ScalarRepr>(
        &self,
        aggregate: &str,
        rank: &str,
        key: &K,
    ) -> Result<Vec<Bucket<A, K>>> {
        self.ensure_live()?;
        let aggregate = self.checked_aggregator::<A>(aggregate)?;
        let rank = self.rank_by_name(rank)?;
        let raws = self.adapter.read_children(
            &self.group,
            rank.number() - 1,
            self.rank_count(),
            aggregate.column(),
            rank.position_of(key),
        )?;
        let mut buckets = Vec::with_capacity(raws.len());
        for raw in &raws {
            if let Some(bucket) = Bucket::decode(raw)? {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    /// Reads the combined values of every occupied bucket between `start` and
    /// `end` (inclusive) at the named rank, ascending by position.
    pub fn read_aggregate_range<A: ScalarRepr>(
        &self,
        aggregate: &str,
        rank: &str,
        start: &K,
        end: &K,
    ) -> Result<Vec<A>> {
        Ok(self
            .read_points_over_range(aggregate, rank, start, end)?
            .into_iter()
            .map(|bucket| bucket.value)
            .collect())
    }

    /// Reads every occupied bucket between `start` and `end` (inclusive) at
    /// the named rank, ascending by position.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidRange` when `end` maps to a position before
    /// `start`'s.
    pub fn read_points_over_range<A: ScalarRepr>(
        &self,
        aggregate: &str,
        rank: &str,
        start: &K,
        end: &K,
    ) -> Result<Vec<Bucket<A, K>>> {
        self.ensure_live()?;
        let aggregate = self.checked_aggregator::<A>(aggregate)?;
        let rank = self.rank_by_name(rank)?;
        let start_position = rank.position_of(start);
        let end_position = rank.position_of(end);
        if end_position < start_position {
            return Err(StoreError::InvalidRange {
                start: start_position,
                end: end_position,
            });
        }
        let raws = self.adapter.read_range(
            &self.group,
            rank.number(),
            self.rank_count(),
            aggregate.column(),
            start_position,
            end_position,
        )?;
        let mut buckets = Vec::with_capacity(raws.len());
        for raw in &raws {
            if let Some(bucket) = Bucket::decode(raw)? {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    /// Renders every rank table for diagnostics.
    pub fn dump_tables(&self) -> Result<String> {
        self.ensure_live()?;
        let mut out = String::new();
        for rank in 0..=self.rank_count() {
            out.push_str(&self.adapter.dump_rank(&self.group, rank, self.rank_count())?);
        }
        Ok(out)
    }

    /// Drops every rank table of the group and latches the engine unusable.
    ///
    /// Every subsequent operation fails with `EngineDeleted`.
    pub fn delete_all_tables_and_data(&self) -> Result<()> {
        self.ensure_live()?;
        for rank in 0..=self.rank_count() {
            self.adapter
                .drop_table(&self.group, rank, self.rank_count())?;
        }
        self.deleted.store(true, Ordering::Relaxed);
        debug!(group = %self.group, "dropped all rank tables");
        Ok(())
    }
}
