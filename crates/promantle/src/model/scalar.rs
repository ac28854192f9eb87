//! Dynamically typed scalar values crossing the table-adapter boundary.
//!
//! Adapters store and return rows as [`ScalarValue`]s; the engine and its
//! callers work with concrete Rust types through the [`ScalarRepr`] trait.
//! Each aggregate records the [`ScalarKind`] it was registered with, which is
//! checked against the caller's requested type at read time.

use std::fmt;

/// The dynamic type tag of a non-null [`ScalarValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE 754 float.
    Real,
    /// UTF-8 text.
    Text,
}

impl ScalarKind {
    /// The display name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Integer => "integer",
            ScalarKind::Real => "real",
            ScalarKind::Text => "text",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed value as persisted by a table adapter.
///
/// `Null` marks an aggregate column pair that has never been written on an
/// otherwise existing row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// No value stored.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE 754 float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
}

impl ScalarValue {
    /// Returns the kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Integer(_) => Some(ScalarKind::Integer),
            ScalarValue::Real(_) => Some(ScalarKind::Real),
            ScalarValue::Text(_) => Some(ScalarKind::Text),
        }
    }

    /// Returns the kind of this value as a display name, `"null"` for `Null`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Integer(_) => "integer",
            ScalarValue::Real(_) => "real",
            ScalarValue::Text(_) => "text",
        }
    }

    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Real(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Conversion between a concrete Rust type and its scalar storage form.
///
/// Implemented for the types a key or aggregate value may take. `from_scalar`
/// returns `None` when the stored kind disagrees with `KIND`; callers turn
/// that into a type-mismatch error.
pub trait ScalarRepr: Sized {
    /// The kind values of this type store as.
    const KIND: ScalarKind;

    /// Encodes this value into its scalar storage form.
    fn to_scalar(&self) -> ScalarValue;

    /// Decodes a value from its scalar storage form.
    fn from_scalar(value: &ScalarValue) -> Option<Self>;
}

impl ScalarRepr for i64 {
    const KIND: ScalarKind = ScalarKind::Integer;

    fn to_scalar(&self) -> ScalarValue {
        ScalarValue::Integer(*self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl ScalarRepr for f64 {
    const KIND: ScalarKind = ScalarKind::Real;

    fn to_scalar(&self) -> ScalarValue {
        ScalarValue::Real(*self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl ScalarRepr for String {
    const KIND: ScalarKind = ScalarKind::Text;

    fn to_scalar(&self) -> ScalarValue {
        ScalarValue::Text(self.clone())
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_integer() {
        let scalar = 42i64.to_scalar();
        assert_eq!(scalar, ScalarValue::Integer(42));
        assert_eq!(i64::from_scalar(&scalar), Some(42));
    }

    #[test]
    fn test_roundtrip_real() {
        let scalar = 1.5f64.to_scalar();
        assert_eq!(scalar, ScalarValue::Real(1.5));
        assert_eq!(f64::from_scalar(&scalar), Some(1.5));
    }

    #[test]
    fn test_roundtrip_text() {
        let scalar = "hello".to_string().to_scalar();
        assert_eq!(scalar, ScalarValue::Text("hello".to_string()));
        assert_eq!(String::from_scalar(&scalar), Some("hello".to_string()));
    }

    #[test]
    fn test_kind_disagreement_decodes_to_none() {
        assert_eq!(i64::from_scalar(&ScalarValue::Real(1.0)), None);
        assert_eq!(f64::from_scalar(&ScalarValue::Integer(1)), None);
        assert_eq!(String::from_scalar(&ScalarValue::Null), None);
    }

    #[test]
    fn test_kind_of_null() {
        assert_eq!(ScalarValue::Null.kind(), None);
        assert!(ScalarValue::Null.is_null());
        assert_eq!(ScalarValue::Null.kind_name(), "null");
    }

    #[test]
    fn test_kind_names_match_display() {
        assert_eq!(ScalarKind::Integer.to_string(), "integer");
        assert_eq!(ScalarValue::Integer(1).kind_name(), "integer");
        assert_eq!(ScalarKind::Real.to_string(), "real");
        assert_eq!(ScalarKind::Text.to_string(), "text");
    }
}
