//! Error types for watchi operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for watchi operations.
pub type WatchiResult<T> = Result<T, WatchiError>;

/// Errors raised by the store and the revert engine.
#[derive(Debug, Error)]
pub enum WatchiError {
    /// A store with this name (case-insensitive) is already registered.
    #[error("store \"{name}\" already exists")]
    DuplicateStoreName {
        /// The conflicting name as supplied by the caller.
        name: String,
    },

    /// A path segment could not be resolved against the document shape.
    ///
    /// Raised during revert replay when the recorded path no longer matches
    /// the document; the change log is left partially replayed.
    #[error("path not resolvable: {path}")]
    PathUnresolvable {
        /// The path that failed to resolve.
        path: Path,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the array.
        path: Path,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// Type mismatch when applying an operation.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// Numeric operation on a non-numeric value.
    #[error("numeric operation requires number at {path}")]
    NumericOperationOnNonNumber {
        /// The path where the non-numeric value was found.
        path: Path,
    },

    /// Invalid operation error.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },
}

impl WatchiError {
    /// Create a duplicate store name error.
    #[inline]
    pub fn duplicate_store_name(name: impl Into<String>) -> Self {
        WatchiError::DuplicateStoreName { name: name.into() }
    }

    /// Create a path not resolvable error.
    #[inline]
    pub fn path_unresolvable(path: Path) -> Self {
        WatchiError::PathUnresolvable { path }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        WatchiError::IndexOutOfBounds { path, index, len }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        WatchiError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create a numeric operation on non-number error.
    #[inline]
    pub fn numeric_on_non_number(path: Path) -> Self {
        WatchiError::NumericOperationOnNonNumber { path }
    }

    /// Create an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        WatchiError::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Failure of a transactional store operation.
///
/// The action's own error type is preserved so callers can match on it after
/// the store has already rolled back.
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    /// The action failed; recorded mutations were reverted and the action's
    /// error is re-raised here.
    #[error("transaction aborted: {0}")]
    Aborted(E),

    /// The revert machinery itself failed. The change log may be partially
    /// replayed; this is fatal for the session.
    #[error("store failure during transaction: {0}")]
    Store(#[from] WatchiError),
}

impl<E> TransactionError<E> {
    /// Get the action error if this is an abort.
    pub fn into_action_error(self) -> Option<E> {
        match self {
            TransactionError::Aborted(e) => Some(e),
            TransactionError::Store(_) => None,
        }
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = WatchiError::path_unresolvable(path!("users", 0, "name"));
        assert!(err.to_string().contains("path not resolvable"));

        let err = WatchiError::duplicate_store_name("app");
        assert!(err.to_string().contains("\"app\" already exists"));
    }

    #[test]
    fn test_transaction_error_into_action_error() {
        let err: TransactionError<String> = TransactionError::Aborted("boom".into());
        assert_eq!(err.into_action_error(), Some("boom".into()));

        let err: TransactionError<String> =
            TransactionError::Store(WatchiError::invalid_operation("x"));
        assert_eq!(err.into_action_error(), None);
    }

    #[test]
    fn test_value_type_name() {
        use serde_json::json;

        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(42)), "number");
        assert_eq!(value_type_name(&json!("hello")), "string");
        assert_eq!(value_type_name(&json!([1, 2, 3])), "array");
        assert_eq!(value_type_name(&json!({"a": 1})), "object");
    }
}
