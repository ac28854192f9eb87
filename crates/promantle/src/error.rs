//! Error and Result types for store operations.

use crate::model::ScalarKind;
use thiserror::Error;

/// A convenience `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The builder was assembled with missing, empty or duplicate fields.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A builder field was set a second time.
    #[error("{0} is already configured")]
    AlreadyConfigured(&'static str),

    /// A query referenced an aggregate name that was never registered.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// A query referenced a rank name that was never registered.
    #[error("unknown rank: {0}")]
    UnknownRank(String),

    /// A stored value does not match the caller-requested result type.
    #[error("type mismatch: requested {requested}, stored {stored}")]
    TypeMismatch {
        /// The scalar kind the caller asked for.
        requested: ScalarKind,
        /// The kind actually held by the stored value.
        stored: &'static str,
    },

    /// A range query mapped to an end position before its start position.
    #[error("invalid range: end position {end} precedes start position {start}")]
    InvalidRange {
        /// Mapped position of the range start.
        start: i64,
        /// Mapped position of the range end.
        end: i64,
    },

    /// An operation was attempted after all tables for the group were dropped.
    #[error("engine deleted: rank tables for group {0} were dropped")]
    EngineDeleted(String),

    /// The table adapter failed.
    #[error("adapter failure: {message}")]
    Adapter {
        /// Human-readable description of the failed operation.
        message: String,
        /// The underlying cause, if the adapter exposed one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl StoreError {
    /// Creates an adapter failure with no underlying cause.
    pub fn adapter(message: impl Into<String>) -> Self {
        StoreError::Adapter {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an adapter failure wrapping an underlying cause.
    pub fn adapter_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Adapter {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
