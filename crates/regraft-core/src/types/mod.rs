//! # Error Types
//!
//! This module contains the error taxonomy shared by the engine, the stores
//! and the application layer:
//! - `StoreError`: failures reported by a calculation store
//! - `RegraftError`: failures of a whole graph operation
//!
//! ## Propagation
//!
//! No error is swallowed or downgraded. A store failure aborts the enclosing
//! operation and reaches the caller unchanged, wrapped with the identifier or
//! phase it happened in.

use crate::ident::Identifier;
use thiserror::Error;

// =============================================================================
// STORE ERRORS
// =============================================================================

/// Errors reported by a [`CalculationStore`](crate::store::CalculationStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store has no calculation under this identifier.
    #[error("calculation not found: {0}")]
    NotFound(Identifier),

    /// The request could not be delivered or the store failed internally.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store refused a posted calculation.
    #[error("rejected by store: {0}")]
    Rejected(String),

    /// The store returned content that is not a calculation.
    #[error("malformed calculation from store: {0}")]
    Malformed(String),
}

// =============================================================================
// OPERATION ERRORS
// =============================================================================

/// Errors that can occur in a Regraft graph operation.
///
/// - Every variant is terminal for the operation that raised it
/// - The engine never returns a partial result alongside an error
#[derive(Debug, Error)]
pub enum RegraftError {
    /// The operation is not defined for a node it reached.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Fetching a calculation failed.
    #[error("failed to read calculation {id}: {source}")]
    StoreRead {
        id: Identifier,
        #[source]
        source: StoreError,
    },

    /// Posting a calculation failed.
    #[error("failed to write calculation: {source}")]
    StoreWrite {
        #[source]
        source: StoreError,
    },

    /// A calculation has a missing or unknown tag, or a payload that does not
    /// fit its tag.
    #[error("malformed calculation: {0}")]
    MalformedCalculation(String),

    /// Variable substitution reached a variable with no binding.
    #[error("missing variable substitution: {0}")]
    MissingVariable(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl RegraftError {
    /// Wrap a fetch failure for `id`.
    ///
    /// Malformed content is reported as [`RegraftError::MalformedCalculation`]
    /// rather than as a read failure.
    pub fn read(id: &Identifier, source: StoreError) -> Self {
        match source {
            StoreError::Malformed(msg) => Self::MalformedCalculation(format!("{id}: {msg}")),
            source => Self::StoreRead {
                id: id.clone(),
                source,
            },
        }
    }

    /// Wrap a post failure.
    pub fn write(source: StoreError) -> Self {
        Self::StoreWrite { source }
    }

    /// Whether this error is a fetch that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StoreRead {
                source: StoreError::NotFound(_),
                ..
            }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
