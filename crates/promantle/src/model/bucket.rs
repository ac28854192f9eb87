//! Bucket rows: the single persisted entity, in raw and typed form.

use crate::error::{Result, StoreError};
use crate::model::scalar::{ScalarRepr, ScalarValue};

/// A bucket row as returned by a table adapter, before typed decoding.
///
/// `count` is the number of rank-0 items folded into the bucket for one
/// aggregate; a count of 0 with a `Null` value means the row exists but this
/// aggregate's column pair was never written.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBucket {
    /// Bucket position at its rank.
    pub position: i64,
    /// Position at the next coarser rank this bucket folds into; 0 at the
    /// coarsest rank.
    pub parent_position: i64,
    /// Number of rank-0 items folded in.
    pub count: i64,
    /// Combined aggregate value.
    pub value: ScalarValue,
    /// Smallest original key folded into the bucket.
    pub lower: ScalarValue,
    /// Largest original key folded into the bucket.
    pub upper: ScalarValue,
}

/// A typed bucket as returned by engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<A, K> {
    /// Bucket position at the queried rank.
    pub position: i64,
    /// Number of rank-0 items folded in.
    pub count: i64,
    /// Combined aggregate value.
    pub value: A,
    /// Smallest original key folded into the bucket.
    pub lower_bound: K,
    /// Largest original key folded into the bucket.
    pub upper_bound: K,
}

impl<A: ScalarRepr, K: ScalarRepr> Bucket<A, K> {
    /// Decodes a raw row into a typed bucket.
    ///
    /// Returns `Ok(None)` when the row carries no value for the requested
    /// aggregate. Fails with a type mismatch when the stored value or bounds
    /// do not decode to the requested types.
    pub(crate) fn decode(raw: &RawBucket) -> Result<Option<Self>> {
        if raw.value.is_null() {
            return Ok(None);
        }
        let value = A::from_scalar(&raw.value).ok_or(StoreError::TypeMismatch {
            requested: A::KIND,
            stored: raw.value.kind_name(),
        })?;
        let lower_bound = K::from_scalar(&raw.lower).ok_or(StoreError::TypeMismatch {
            requested: K::KIND,
            stored: raw.lower.kind_name(),
        })?;
        let upper_bound = K::from_scalar(&raw.upper).ok_or(StoreError::TypeMismatch {
            requested: K::KIND,
            stored: raw.upper.kind_name(),
        })?;
        Ok(Some(Bucket {
            position: raw.position,
            count: raw.count,
            value,
            lower_bound,
            upper_bound,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: ScalarValue) -> RawBucket {
        RawBucket {
            position: 7,
            parent_position: 1,
            count: 3,
            value,
            lower: ScalarValue::Integer(100),
            upper: ScalarValue::Integer(250),
        }
    }

    #[test]
    fn test_decode_typed_bucket() {
        let bucket: Bucket<f64, i64> = Bucket::decode(&raw(ScalarValue::Real(6.3)))
            .unwrap()
            .unwrap();
        assert_eq!(bucket.position, 7);
        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.value, 6.3);
        assert_eq!(bucket.lower_bound, 100);
        assert_eq!(bucket.upper_bound, 250);
    }

    #[test]
    fn test_decode_null_value_is_absent() {
        let bucket = Bucket::<f64, i64>::decode(&raw(ScalarValue::Null)).unwrap();
        assert!(bucket.is_none());
    }

    #[test]
    fn test_decode_wrong_value_kind_fails() {
        let result = Bucket::<i64, i64>::decode(&raw(ScalarValue::Real(6.3)));
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn test_decode_wrong_key_kind_fails() {
        let result = Bucket::<f64, String>::decode(&raw(ScalarValue::Real(6.3)));
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }
}
