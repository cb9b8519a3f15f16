//! Result-style envelope handed to the transport boundary.
//!
//! Every mutating operation returns `Result<T, InventoryError>`; an HTTP or RPC
//! layer converts it into an [`OperationOutcome`] and serializes that, mapping
//! [`ErrorKind`] to its own status codes.

use serde::{Deserialize, Serialize};
use stock_ledger_core::{ErrorKind, InventoryError};

/// Message surfaced for store failures. Internal details stay in the logs.
pub const TRANSACTION_FAILED_MESSAGE: &str = "The operation could not be completed; no changes were made";

/// `success` / `message` / `record` triple returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome<T> {
    /// Whether the operation took effect
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Affected record on success
    pub record: Option<T>,
    /// Failure classification
    pub error_kind: Option<ErrorKind>,
}

impl<T> OperationOutcome<T> {
    /// Successful outcome carrying `record`
    pub fn succeeded(message: impl Into<String>, record: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            record: Some(record),
            error_kind: None,
        }
    }

    /// Failed outcome for `error`.
    ///
    /// `TransactionFailed` gets a generic message.
    #[must_use]
    pub fn failed(error: &InventoryError) -> Self {
        let message = match error {
            InventoryError::TransactionFailed { .. } => TRANSACTION_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        };
        Self {
            success: false,
            message,
            record: None,
            error_kind: Some(error.kind()),
        }
    }

    /// Build from an operation result, using `message` for the success case
    pub fn from_result(result: Result<T, InventoryError>, message: impl Into<String>) -> Self {
        match result {
            Ok(record) => Self::succeeded(message, record),
            Err(error) => Self::failed(&error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_record() {
        let outcome = OperationOutcome::from_result(Ok(5_u32), "Reserved");
        assert!(outcome.success);
        assert_eq!(outcome.message, "Reserved");
        assert_eq!(outcome.record, Some(5));
        assert_eq!(outcome.error_kind, None);
    }

    #[test]
    fn insufficient_stock_is_a_typed_failure() {
        let outcome: OperationOutcome<u32> =
            OperationOutcome::from_result(
                Err(InventoryError::InsufficientStock {
                    requested: 70,
                    available: 60,
                }),
                "unused",
            );
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::InsufficientStock));
        assert!(outcome.message.contains("requested 70"));
    }

    #[test]
    fn store_failures_hide_internal_detail() {
        let outcome: OperationOutcome<()> = OperationOutcome::failed(
            &InventoryError::TransactionFailed {
                message: "connection reset by peer".to_string(),
                retryable: true,
            },
        );
        assert_eq!(outcome.message, TRANSACTION_FAILED_MESSAGE);
        assert_eq!(outcome.error_kind, Some(ErrorKind::TransactionFailed));
    }

    #[test]
    fn serializes_for_transport() {
        let outcome = OperationOutcome::succeeded("ok", 1_u8);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["record"], 1);
        assert!(json["error_kind"].is_null());
    }
}
