//! Success/failure values for recoverable lifecycle outcomes.

use std::fmt;

/// Result of a lifecycle operation that can fail without it being a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Outcome {
    success: bool,
    reason: Option<String>,
}

impl Outcome {
    pub const fn successful() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn unsuccessful_due_to(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Why the operation failed; `None` on success.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.success, &self.reason) {
            (true, _) => f.write_str("success"),
            (false, Some(reason)) => write!(f, "unsuccessful: {reason}"),
            (false, None) => f.write_str("unsuccessful"),
        }
    }
}
