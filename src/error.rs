//! Error types for nodeharness.
//!
//! Only misuse of the lifecycle API and invalid inputs are errors. Timeouts,
//! pool capacity and process start/stop failures are ordinary outcomes and are
//! reported as values (`EventRequestResult`, `Outcome`).

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Event pattern cannot be empty")]
    EmptyPattern,

    #[error("Pool capacity must be at least 1")]
    ZeroCapacity,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },
}

/// Lifecycle sequencing errors.
///
/// These indicate a defect in the caller's control flow, not a runtime
/// condition, and are never retried.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Node has not been configured yet, cannot {operation}")]
    NotConfigured {
        operation: &'static str,
    },

    #[error("Cannot {operation} while the node is running")]
    Running {
        operation: &'static str,
    },

    #[error("There is already a node process running")]
    AlreadyRunning,

    #[error("Node directory does not exist: {}", path.display())]
    MissingNodeDirectory {
        path: PathBuf,
    },
}

/// Top-level error type for nodeharness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl HarnessError {
    /// Wraps an I/O error with a short description of what was being done.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this is a lifecycle state error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Result type alias for nodeharness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
