//! Error types for ledger, reservation and transfer operations.
//!
//! Two layers:
//!
//! - [`StoreError`]: what a storage backend reports (connection lost, constraint
//!   violated, injected fault in tests).
//! - [`InventoryError`]: the business taxonomy returned by every engine operation.
//!   Any store failure surfaces as [`InventoryError::TransactionFailed`] after the
//!   in-flight transaction has been rolled back.

use crate::types::ReservationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors reported by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failed
    #[error("Database error: {0}")]
    Database(String),

    /// A storage-level invariant (e.g. non-negative quantity) rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Failure injected by a test double
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Stable, transport-friendly classification of [`InventoryError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Product, warehouse or reservation missing
    NotFound,
    /// Requested quantity exceeds effective availability
    InsufficientStock,
    /// Double-release attempt
    AlreadyReleased,
    /// Request rejected before any mutation
    InvalidArgument,
    /// The store could not commit an atomic operation
    TransactionFailed,
}

/// Business errors for ledger operations.
///
/// Validation failures (`NotFound`, `InvalidArgument`) are detected before any
/// mutation. `InsufficientStock` and `AlreadyReleased` are expected outcomes,
/// returned as values and never raised as panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity ("product", "warehouse", "reservation")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Requested quantity exceeds what is available.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        /// Units requested
        requested: u64,
        /// Units available at the time of the check
        available: u64,
    },

    /// Reservation was already released.
    #[error("Reservation {0} has already been released")]
    AlreadyReleased(ReservationId),

    /// Request is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying store could not commit; the operation was rolled back.
    ///
    /// `retryable` is false when the store rejected the write on a constraint,
    /// since replaying the same write would be rejected again.
    #[error("Transaction failed: {message}")]
    TransactionFailed {
        /// Store-level detail, never shown to callers
        message: String,
        /// Whether a replay could succeed
        retryable: bool,
    },
}

impl InventoryError {
    /// Shorthand for a missing entity
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classification for transport mapping
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::AlreadyReleased(_) => ErrorKind::AlreadyReleased,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::TransactionFailed { .. } => ErrorKind::TransactionFailed,
        }
    }

    /// Only transient store failures are worth retrying. Reservation creation should
    /// not be retried blindly unless an idempotency key was supplied.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionFailed {
                retryable: true,
                ..
            }
        )
    }
}

impl From<StoreError> for InventoryError {
    fn from(error: StoreError) -> Self {
        let retryable = !matches!(error, StoreError::Constraint(_));
        Self::TransactionFailed {
            message: error.to_string(),
            retryable,
        }
    }
}
