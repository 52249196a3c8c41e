//! Application error types for the mentorship engine.
//!
//! Every core operation returns the specific kind of failure. Mapping these to
//! user-facing messages is left to the calling layer.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by the engine's operations.
///
/// All variants serialize to a structured JSON object for dashboard consumption.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Requested person, request or review not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Policy denial, including any attempt to act on oneself.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Transition attempted from a state that does not allow it.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Approval attempted while the reviewer has no free slot.
    #[error("Capacity exceeded for reviewer {reviewer_id} (capacity {capacity})")]
    CapacityExceeded { reviewer_id: i64, capacity: i64 },

    /// Malformed input.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// The store did not answer in time or is locked. Safe to retry.
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.to_string()),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a capacity exceeded error.
    pub fn capacity_exceeded(reviewer_id: i64, capacity: i64) -> Self {
        Self::CapacityExceeded {
            reviewer_id,
            capacity,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field name.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Self::unavailable("Timed out waiting for a connection"),
            sqlx::Error::PoolClosed => Self::unavailable("Connection pool is closed"),
            sqlx::Error::Database(db_err) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
                let busy = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false);
                if busy {
                    Self::unavailable(db_err.message().to_string())
                } else {
                    Self::database(err.to_string())
                }
            }
            _ => Self::database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::Sqlite(inner) => inner.into(),
            other => Self::database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::invalid_state("request is approved");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"InvalidState\""));
        assert!(json.contains("request is approved"));
    }

    #[test]
    fn test_capacity_exceeded_fields() {
        let err = AppError::capacity_exceeded(7, 2);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"reviewer_id\":7"));
        assert!(json.contains("\"capacity\":2"));
        assert_eq!(
            err.to_string(),
            "Capacity exceeded for reviewer 7 (capacity 2)"
        );
    }

    #[test]
    fn test_not_found_with_id() {
        let err = AppError::not_found_with_id("Person", 123);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"resource\":\"Person\""));
        assert!(json.contains("\"id\":\"123\""));
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::validation("bad input");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("field"));
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(AppError::unavailable("locked").is_retryable());
        assert!(!AppError::database("constraint").is_retryable());
        assert!(!AppError::capacity_exceeded(1, 2).is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::Unavailable { .. }));
    }
}
