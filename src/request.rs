//! Event requests and their terminal results.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Unique identifier for an event request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a request did not observe its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// No pool capacity became free before the timeout.
    PoolFullTimeout,
    /// The request was admitted but no matching line arrived in time.
    WaitTimeout,
    /// The pool shut down (or its lock was poisoned) while waiting.
    Interrupted,
    /// The owning caller cancelled the request.
    Cancelled,
}

impl RejectReason {
    /// Short machine-friendly code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PoolFullTimeout => "pool-full-timeout",
            Self::WaitTimeout => "wait-timeout",
            Self::Interrupted => "interrupted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::PoolFullTimeout => "Timed out waiting for availability in the request pool.",
            Self::WaitTimeout => "Timed out waiting for event to occur.",
            Self::Interrupted => "Interrupted while waiting for event.",
            Self::Cancelled => "Request was cancelled.",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal value of an event request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRequestResult {
    /// The event was seen in a log line at the given monotonic instant.
    Observed {
        at: Instant,
    },
    /// The event was not seen.
    Rejected {
        reason: RejectReason,
    },
}

impl EventRequestResult {
    #[must_use]
    pub const fn observed(at: Instant) -> Self {
        Self::Observed { at }
    }

    #[must_use]
    pub const fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }

    #[must_use]
    pub const fn is_observed(&self) -> bool {
        matches!(self, Self::Observed { .. })
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Time of observation, if observed.
    #[must_use]
    pub const fn observed_at(&self) -> Option<Instant> {
        match self {
            Self::Observed { at } => Some(*at),
            Self::Rejected { .. } => None,
        }
    }

    /// Rejection reason, if rejected.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Observed { .. } => None,
            Self::Rejected { reason } => Some(*reason),
        }
    }
}

impl fmt::Display for EventRequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observed { .. } => f.write_str("observed"),
            Self::Rejected { reason } => write!(f, "rejected: {}", reason.description()),
        }
    }
}

/// A subscription to an [`Event`] with a terminal-once result slot.
///
/// The result slot is only written by the request pool while it holds its
/// lock. Once set it never changes.
#[derive(Debug)]
pub struct EventRequest {
    id: RequestId,
    event: Event,
    submitted_at: Instant,
    cancelled: AtomicBool,
    result: OnceLock<EventRequestResult>,
}

impl EventRequest {
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            id: RequestId::new(),
            event,
            submitted_at: Instant::now(),
            cancelled: AtomicBool::new(false),
            result: OnceLock::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// When the request was created.
    #[must_use]
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The terminal result, if one has been assigned.
    #[must_use]
    pub fn result(&self) -> Option<EventRequestResult> {
        self.result.get().copied()
    }

    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.get().is_some()
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Assigns the terminal result. Returns false if one was already set.
    pub(crate) fn resolve(&self, result: EventRequestResult) -> bool {
        self.result.set(result).is_ok()
    }
}
