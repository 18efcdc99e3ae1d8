//! Bounded pool of pending event requests.
//!
//! One `Mutex` guards the pending requests and one `Condvar` signals every
//! change to them. Admission, waiting, cancellation and the per-line matching
//! pass all go through that pair, so a line that resolves a request can never
//! slip in between a waiter's check of its result and its call to `wait`.
//!
//! # Matching policy
//!
//! For every log line, under the lock:
//!
//! 1. Cancelled requests are removed without being resolved.
//! 2. The first remaining request (in admission order) whose pattern is
//!    contained in the line determines the *matched event*.
//! 3. Every pending request whose event equals the matched event is resolved
//!    as observed, all with the same timestamp, and removed.
//! 4. All waiters are woken.
//!
//! Requests whose different pattern also happens to be contained in the same
//! line stay pending until a later line matches them first.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ValidationError;
use crate::event::Event;
use crate::request::{EventRequest, EventRequestResult, RejectReason};

/// Upper bound on a single condvar wait; the deadline is re-checked after each.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(3600);

/// Request pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of pending requests.
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// Outcome of matching one log line against the pool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinePass {
    /// The event acted upon for this line, if any.
    pub matched: Option<Event>,
    /// Number of requests resolved as observed.
    pub resolved: usize,
    /// Number of cancelled requests removed.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    pending: VecDeque<Arc<EventRequest>>,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Time left, or `None` once the deadline has passed.
    fn remaining(self) -> Option<Duration> {
        match self.0 {
            None => Some(MAX_WAIT_SLICE),
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                (!left.is_zero()).then(|| left.min(MAX_WAIT_SLICE))
            }
        }
    }
}

/// A bounded, monitor-protected collection of pending [`EventRequest`]s.
#[derive(Debug)]
pub struct RequestPool {
    capacity: usize,
    state: Mutex<PoolState>,
    changed: Condvar,
}

impl RequestPool {
    /// Creates a pool; a zero capacity is clamped to 1.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(PoolState {
                pending: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Creates a pool with an exact capacity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ZeroCapacity` if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        Ok(Self::new(PoolConfig { capacity }))
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of requests currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_recover().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_recover().closed
    }

    /// Submits a new request for `event`, waiting up to `timeout` for capacity.
    ///
    /// # Errors
    ///
    /// Returns `RejectReason::PoolFullTimeout` if no capacity became free in
    /// time, or `RejectReason::Interrupted` if the pool is closed. A rejected
    /// request never enters the pool.
    pub fn submit(&self, event: Event, timeout: Duration) -> Result<Arc<EventRequest>, RejectReason> {
        let request = Arc::new(EventRequest::new(event));
        self.submit_request(Arc::clone(&request), timeout)?;
        Ok(request)
    }

    /// Admits an existing request, waiting up to `timeout` for capacity.
    ///
    /// Admitting a request that is already pending, or that already has a
    /// result, is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`RequestPool::submit`], plus `RejectReason::Cancelled` for a
    /// cancelled request.
    pub fn submit_request(&self, request: Arc<EventRequest>, timeout: Duration) -> Result<(), RejectReason> {
        let deadline = Deadline::after(timeout);
        let mut state = self.state.lock().map_err(|_| RejectReason::Interrupted)?;

        loop {
            if state.closed {
                return Err(RejectReason::Interrupted);
            }
            if request.has_result() || state.pending.iter().any(|r| r.id() == request.id()) {
                return Ok(());
            }
            if request.is_cancelled() {
                return Err(RejectReason::Cancelled);
            }
            if state.pending.len() < self.capacity {
                break;
            }
            let Some(remaining) = deadline.remaining() else {
                return Err(RejectReason::PoolFullTimeout);
            };
            state = self
                .changed
                .wait_timeout(state, remaining)
                .map_err(|_| RejectReason::Interrupted)?
                .0;
        }

        state.pending.push_back(request);
        Ok(())
    }

    /// Blocks until `request` has a terminal result or `timeout` elapses.
    ///
    /// Never fails: a timeout yields `rejected(wait-timeout)` and leaves the
    /// request pending, a closed pool yields `rejected(interrupted)`, and a
    /// cancelled request yields `rejected(cancelled)`.
    pub fn await_result(&self, request: &EventRequest, timeout: Duration) -> EventRequestResult {
        let deadline = Deadline::after(timeout);
        let Ok(mut state) = self.state.lock() else {
            return EventRequestResult::rejected(RejectReason::Interrupted);
        };

        loop {
            if let Some(result) = request.result() {
                return result;
            }
            if request.is_cancelled() {
                return EventRequestResult::rejected(RejectReason::Cancelled);
            }
            if state.closed {
                return EventRequestResult::rejected(RejectReason::Interrupted);
            }
            let Some(remaining) = deadline.remaining() else {
                return EventRequestResult::rejected(RejectReason::WaitTimeout);
            };
            state = match self.changed.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return EventRequestResult::rejected(RejectReason::Interrupted),
            };
        }
    }

    /// Marks `request` as cancelled and wakes all waiters.
    ///
    /// The request is removed from the pool by the next matching pass, not
    /// here. A cancelled request is never resolved as observed.
    pub fn cancel(&self, request: &EventRequest) {
        let _state = self.lock_recover();
        request.mark_cancelled();
        self.changed.notify_all();
    }

    /// Runs the matching pass for one log line.
    pub fn process_line(&self, line: &str) -> LinePass {
        let mut state = self.lock_recover();

        let before = state.pending.len();
        state.pending.retain(|r| !r.is_cancelled());
        let dropped = before - state.pending.len();

        let matched = state
            .pending
            .iter()
            .find(|r| r.event().is_observed_in(line))
            .map(|r| r.event().clone());

        let mut resolved = 0;
        if let Some(event) = &matched {
            let now = Instant::now();
            state.pending.retain(|r| {
                if r.event() == event {
                    r.resolve(EventRequestResult::observed(now));
                    resolved += 1;
                    false
                } else {
                    true
                }
            });
        }

        self.changed.notify_all();

        LinePass {
            matched,
            resolved,
            dropped,
        }
    }

    /// Closes the pool: pending requests are rejected as interrupted, and
    /// every current and future wait returns immediately.
    pub fn close(&self) {
        let mut state = self.lock_recover();
        state.closed = true;
        for request in state.pending.drain(..) {
            request.resolve(EventRequestResult::rejected(RejectReason::Interrupted));
        }
        self.changed.notify_all();
    }

    fn lock_recover(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
