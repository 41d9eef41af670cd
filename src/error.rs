//! Error types for leadsweep.
//!
//! Each layer has its own strongly typed error built with thiserror.
//! `LeadsweepError` wraps them so callers can match on the layer that
//! failed while still using `?` across layer boundaries.

use thiserror::Error;

use crate::storage::StorageError;
use crate::sweep::SweepError;

/// Validation errors raised before anything touches the store.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' cannot be blank")]
    BlankField {
        field: String,
    },

    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        expression: String,
        reason: String,
    },

    #[error("Unknown keep policy '{value}' (expected 'oldest' or 'store-order')")]
    InvalidKeepPolicy {
        value: String,
    },
}

/// Errors raised by the sweep scheduler itself, not by a sweep.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler worker has stopped")]
    Stopped,

    #[error("Trigger queue is full (capacity: {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Sweep did not finish within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to spawn scheduler worker: {message}")]
    Spawn {
        message: String,
    },
}

/// Top-level error type for leadsweep.
#[derive(Debug, Error)]
pub enum LeadsweepError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl LeadsweepError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same call could succeed.
    ///
    /// Backend failures are transient; a missing record or a rejected
    /// payload will fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => matches!(e, StorageError::BackendError(_)),
            Self::Sweep(_) => true,
            Self::Scheduler(e) => matches!(e, SchedulerError::Timeout { .. } | SchedulerError::QueueFull { .. }),
            Self::Validation(_) | Self::Config { .. } => false,
        }
    }
}

/// Result type alias for leadsweep operations.
pub type LeadsweepResult<T> = Result<T, LeadsweepError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::LeadId;
    use crate::sweep::SweepStage;

    #[test]
    fn test_validation_error_missing_field() {
        let err = ValidationError::MissingField {
            field: "phoneNumber".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("phoneNumber"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_schedule_error_names_expression() {
        let err = ValidationError::InvalidSchedule {
            expression: "every soon".to_string(),
            reason: "bad unit".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("every soon"));
        assert!(msg.contains("bad unit"));
    }

    #[test]
    fn test_from_storage_error() {
        let err: LeadsweepError = StorageError::NotFound(LeadId::nil()).into();
        assert!(err.is_storage());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_backend_error_is_retryable() {
        let err: LeadsweepError = StorageError::BackendError("connection reset".to_string()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sweep_error_is_retryable() {
        let sweep = SweepError {
            stage: SweepStage::Fetch,
            source: StorageError::BackendError("down".to_string()),
        };
        let err: LeadsweepError = sweep.into();
        assert!(err.is_retryable());
        assert!(format!("{err}").contains("fetch"));
    }

    #[test]
    fn test_validation_not_retryable() {
        let err: LeadsweepError = ValidationError::BlankField {
            field: "name".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_config_error() {
        let err = LeadsweepError::config("LEADSWEEP_KEEP is not valid");
        assert!(format!("{err}").contains("LEADSWEEP_KEEP"));
        assert!(!err.is_retryable());
    }
}
