//! Validating builder for [`TriangularList`].

use crate::adapter::TableAdapter;
use crate::error::{Result, StoreError};
use crate::list::{KeyFn, MinMaxFn, TriangularList};
use crate::model::{Aggregator, PositionFn, Rank, ScalarRepr};
use std::sync::Arc;

/// Key configuration: storage type, key derivation and key ordering.
struct KeyConfig<V, K> {
    storage_type: String,
    key_fn: KeyFn<V, K>,
    min_max: MinMaxFn<K>,
}

/// A rank as registered, before external numbers are replaced.
struct PendingRank<K> {
    number: u32,
    name: String,
    position: PositionFn<K>,
}

/// Accumulates the configuration of a [`TriangularList`] and validates it on
/// [`build`](TriangularListBuilder::build).
///
/// Storage and key configuration can each be set once; setting them again
/// fails with `AlreadyConfigured`. Ranks and aggregates accumulate, rejecting
/// duplicates as they arrive. `build` consumes the builder, so one builder
/// yields exactly one engine.
pub struct TriangularListBuilder<V, K> {
    group: String,
    adapter: Option<Arc<dyn TableAdapter>>,
    key: Option<KeyConfig<V, K>>,
    ranks: Vec<PendingRank<K>>,
    aggregates: Vec<Aggregator<V>>,
}

impl<V, K: ScalarRepr + Clone> TriangularListBuilder<V, K> {
    pub(crate) fn new(group: String) -> Self {
        Self {
            group,
            adapter: None,
            key: None,
            ranks: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    /// Sets the table adapter all rank tables are persisted through.
    pub fn using_storage(mut self, adapter: Arc<dyn TableAdapter>) -> Result<Self> {
        if self.adapter.is_some() {
            return Err(StoreError::AlreadyConfigured("storage adapter"));
        }
        self.adapter = Some(adapter);
        Ok(self)
    }

    /// Sets the key derivation: the declared storage type of the key columns,
    /// the key function, and the `(min, max)` ordering of two keys.
    pub fn key_on<F, M>(mut self, storage_type: &str, key_fn: F, min_max: M) -> Result<Self>
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
        M: Fn(&K, &K) -> (K, K) + Send + Sync + 'static,
    {
        if self.key.is_some() {
            return Err(StoreError::AlreadyConfigured("key configuration"));
        }
        if storage_type.trim().is_empty() {
            return Err(StoreError::ConfigInvalid(
                "key storage type must not be empty".to_string(),
            ));
        }
        self.key = Some(KeyConfig {
            storage_type: storage_type.to_string(),
            key_fn: Box::new(key_fn),
            min_max: Box::new(min_max),
        });
        Ok(self)
    }

    /// Registers an aggregate: a name, the declared storage type of its value
    /// column, a value selector and an associative combiner.
    pub fn aggregate<A, S, C>(
        mut self,
        name: &str,
        storage_type: &str,
        select: S,
        combine: C,
    ) -> Result<Self>
    where
        A: ScalarRepr,
        S: Fn(&V) -> A + Send + Sync + 'static,
        C: Fn(A, A) -> A + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(StoreError::ConfigInvalid(
                "aggregate name must not be empty".to_string(),
            ));
        }
        if storage_type.trim().is_empty() {
            return Err(StoreError::ConfigInvalid(format!(
                "aggregate {name} has an empty storage type"
            )));
        }
        let aggregate = Aggregator::new::<A, _, _>(name, storage_type, select, combine);
        if self.aggregates.iter().any(|a| a.name() == name) {
            return Err(StoreError::ConfigInvalid(format!(
                "duplicate aggregate name: {name}"
            )));
        }
        if self
            .aggregates
            .iter()
            .any(|a| a.column() == aggregate.column())
        {
            return Err(StoreError::ConfigInvalid(format!(
                "aggregate {name} collides with another on column stem {}",
                aggregate.column()
            )));
        }
        self.aggregates.push(aggregate);
        Ok(self)
    }

    /// Registers a rank under an external number.
    ///
    /// External numbers must be non-negative, unique, and gapless once
    /// sorted; `build` replaces them with contiguous internal numbers 1..=N
    /// in ascending external order. Only names survive as query keys.
    pub fn rank<F>(mut self, number: u32, name: &str, position: F) -> Result<Self>
    where
        F: Fn(&K) -> i64 + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(StoreError::ConfigInvalid(
                "rank name must not be empty".to_string(),
            ));
        }
        if self.ranks.iter().any(|r| r.number == number) {
            return Err(StoreError::ConfigInvalid(format!(
                "duplicate rank number: {number}"
            )));
        }
        if self.ranks.iter().any(|r| r.name == name) {
            return Err(StoreError::ConfigInvalid(format!(
                "duplicate rank name: {name}"
            )));
        }
        self.ranks.push(PendingRank {
            number,
            name: name.to_string(),
            position: Box::new(position),
        });
        Ok(self)
    }

    /// Validates the configuration, materializes the schema and returns the
    /// engine.
    ///
    /// # Errors
    ///
    /// Fails with `ConfigInvalid` when a required field is missing, no rank
    /// or aggregate was registered, or the external rank numbers have a gap;
    /// adapter failures during schema materialization propagate unchanged.
    pub fn build(self) -> Result<TriangularList<V, K>> {
        if self.group.trim().is_empty() {
            return Err(StoreError::ConfigInvalid(
                "group name must not be empty".to_string(),
            ));
        }
        let adapter = self
            .adapter
            .ok_or_else(|| StoreError::ConfigInvalid("no storage adapter".to_string()))?;
        let key = self
            .key
            .ok_or_else(|| StoreError::ConfigInvalid("no key configuration".to_string()))?;
        if self.ranks.is_empty() {
            return Err(StoreError::ConfigInvalid(
                "at least one rank is required".to_string(),
            ));
        }
        if self.aggregates.is_empty() {
            return Err(StoreError::ConfigInvalid(
                "at least one aggregate is required".to_string(),
            ));
        }

        let mut pending = self.ranks;
        pending.sort_by_key(|rank| rank.number);
        for window in pending.windows(2) {
            if window[1].number != window[0].number + 1 {
                return Err(StoreError::ConfigInvalid(format!(
                    "gap in rank numbers: {} is followed by {}",
                    window[0].number, window[1].number
                )));
            }
        }
        let ranks: Vec<Rank<K>> = pending
            .into_iter()
            .enumerate()
            .map(|(index, rank)| Rank::new(index as u32 + 1, rank.name, rank.position))
            .collect();

        TriangularList::materialize(
            self.group,
            adapter,
            key.storage_type,
            key.key_fn,
            key.min_max,
            ranks,
            self.aggregates,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;

    struct Item {
        at: i64,
        spent: f64,
    }

    fn min_max(a: &i64, b: &i64) -> (i64, i64) {
        if a <= b {
            (*a, *b)
        } else {
            (*b, *a)
        }
    }

    fn base() -> TriangularListBuilder<Item, i64> {
        TriangularList::builder("g")
            .using_storage(Arc::new(MemoryAdapter::new()))
            .unwrap()
            .key_on("INT8", |item: &Item| item.at, min_max)
            .unwrap()
            .aggregate::<f64, _, _>("Spent", "REAL", |item| item.spent, |a, b| a + b)
            .unwrap()
    }

    #[test]
    fn test_build_requires_every_field() {
        let builder: TriangularListBuilder<Item, i64> = TriangularList::builder("g");
        assert!(matches!(
            builder.build(),
            Err(StoreError::ConfigInvalid(_))
        ));

        // No ranks registered.
        assert!(matches!(base().build(), Err(StoreError::ConfigInvalid(_))));
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let result = TriangularList::<Item, i64>::builder("")
            .using_storage(Arc::new(MemoryAdapter::new()))
            .unwrap()
            .key_on("INT8", |item: &Item| item.at, min_max)
            .unwrap()
            .aggregate::<f64, _, _>("Spent", "REAL", |item| item.spent, |a, b| a + b)
            .unwrap()
            .rank(1, "PerHour", |at| at / 3600)
            .unwrap()
            .build();
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));
    }

    #[test]
    fn test_reconfiguring_fails() {
        let result = base().using_storage(Arc::new(MemoryAdapter::new()));
        assert!(matches!(
            result,
            Err(StoreError::AlreadyConfigured("storage adapter"))
        ));

        let result = base().key_on("INT8", |item: &Item| item.at, min_max);
        assert!(matches!(
            result,
            Err(StoreError::AlreadyConfigured("key configuration"))
        ));
    }

    #[test]
    fn test_duplicate_aggregate_is_rejected() {
        let result =
            base().aggregate::<f64, _, _>("Spent", "REAL", |item| item.spent, |a, b| a + b);
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));

        // Same column stem after sanitization is a collision too.
        let result =
            base().aggregate::<f64, _, _>("spen t", "REAL", |item| item.spent, |a, b| a + b);
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));
    }

    #[test]
    fn test_duplicate_rank_number_or_name_is_rejected() {
        let builder = base().rank(1, "PerHour", |at| at / 3600).unwrap();
        let result = builder.rank(1, "PerDay", |at| at / 86_400);
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));

        let builder = base().rank(1, "PerHour", |at| at / 3600).unwrap();
        let result = builder.rank(2, "PerHour", |at| at / 86_400);
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));
    }

    #[test]
    fn test_gap_in_rank_numbers_is_fatal() {
        let result = base()
            .rank(1, "PerHour", |at| at / 3600)
            .unwrap()
            .rank(3, "PerDay", |at| at / 86_400)
            .unwrap()
            .build();
        assert!(matches!(result, Err(StoreError::ConfigInvalid(_))));
    }

    #[test]
    fn test_external_numbers_are_replaced_in_sorted_order() {
        // Registration order does not matter; external numbers do.
        let list = base()
            .rank(20, "PerDay", |at| at / 86_400)
            .unwrap()
            .rank(19, "PerHour", |at| at / 3600)
            .unwrap()
            .rank(21, "PerWeek", |at| at / 604_800)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(list.rank_count(), 3);

        list.write_item(&Item {
            at: 100_000,
            spent: 1.0,
        })
        .unwrap();
        // PerHour is the finest rank: its children are individual items.
        let children = list
            .read_children_of_point::<f64>("Spent", "PerHour", &100_000)
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].count, 1);
    }
}
