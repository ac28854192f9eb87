//! Named aggregates: a value selector plus an associative combiner.

use crate::adapter::{column_name, sanitize_identifier};
use crate::error::{Result, StoreError};
use crate::model::scalar::{ScalarKind, ScalarRepr, ScalarValue};

/// Extracts an aggregate's input value from a source item.
type SelectFn<V> = Box<dyn Fn(&V) -> ScalarValue + Send + Sync>;

/// Combines two aggregate values. Fails if a stored value does not decode to
/// the aggregate's registered type.
type CombineFn = Box<dyn Fn(&ScalarValue, &ScalarValue) -> Result<ScalarValue> + Send + Sync>;

/// A registered aggregate: name, selector, combiner and storage type.
///
/// The public registration path is typed over a value type `A`; the closures
/// held here are erased to [`ScalarValue`] so every aggregate can share the
/// adapter's weakly typed row format. The registered [`ScalarKind`] is kept
/// for the read-time type check.
pub struct Aggregator<V> {
    name: String,
    column: String,
    storage_type: String,
    kind: ScalarKind,
    select: SelectFn<V>,
    combine: CombineFn,
}

impl<V> Aggregator<V> {
    /// Creates an aggregate from a typed selector/combiner pair.
    ///
    /// The combiner must be associative; it is applied in position-ascending
    /// order when buckets are re-folded.
    pub(crate) fn new<A, S, C>(name: &str, storage_type: &str, select: S, combine: C) -> Self
    where
        A: ScalarRepr,
        S: Fn(&V) -> A + Send + Sync + 'static,
        C: Fn(A, A) -> A + Send + Sync + 'static,
    {
        let erased_select: SelectFn<V> = Box::new(move |item: &V| select(item).to_scalar());
        let erased_combine: CombineFn = Box::new(move |a: &ScalarValue, b: &ScalarValue| {
            let left = A::from_scalar(a).ok_or(StoreError::TypeMismatch {
                requested: A::KIND,
                stored: a.kind_name(),
            })?;
            let right = A::from_scalar(b).ok_or(StoreError::TypeMismatch {
                requested: A::KIND,
                stored: b.kind_name(),
            })?;
            Ok(combine(left, right).to_scalar())
        });
        Self {
            name: name.to_string(),
            column: column_name(name),
            storage_type: sanitize_identifier(storage_type),
            kind: A::KIND,
            select: erased_select,
            combine: erased_combine,
        }
    }

    /// The name this aggregate was registered and is queried by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sanitized column stem; the persisted columns are
    /// `<stem>_count` and `<stem>_value`.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The sanitized storage type of the value column.
    pub fn storage_type(&self) -> &str {
        &self.storage_type
    }

    /// The scalar kind this aggregate's values were registered with.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Extracts this aggregate's input value from a source item.
    pub(crate) fn select(&self, item: &V) -> ScalarValue {
        (self.select)(item)
    }

    /// Combines two stored values with the registered combiner.
    pub(crate) fn combine(&self, a: &ScalarValue, b: &ScalarValue) -> Result<ScalarValue> {
        (self.combine)(a, b)
    }
}
