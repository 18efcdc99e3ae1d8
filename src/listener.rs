//! Notification engine: feeds log lines into a request pool.
//!
//! The engine is the [`LineHandler`] a tailer delivers lines to, and the
//! entry point for callers that want to wait for an event. It does not log;
//! tail errors are pushed into a bounded error sink for the owner to drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::event::Event;
use crate::pool::{PoolConfig, RequestPool};
use crate::request::{EventRequest, EventRequestResult, RejectReason};
use crate::tailer::{LineHandler, TailError};

/// Notification engine configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Request pool settings.
    pub pool: PoolConfig,
    /// Max queued tail errors before new ones are counted and dropped.
    pub error_sink_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            error_sink_capacity: 64,
        }
    }
}

/// Counters describing what the engine has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStats {
    pub lines: u64,
    pub resolved: u64,
    pub rotations: u64,
    pub missing_file_reports: u64,
    pub dropped_errors: u64,
}

/// Applies the pool's matching policy to every delivered line.
#[derive(Debug)]
pub struct NotificationEngine {
    pool: Arc<RequestPool>,
    errors_tx: Sender<TailError>,
    errors_rx: Receiver<TailError>,
    lines: AtomicU64,
    resolved: AtomicU64,
    rotations: AtomicU64,
    missing_file_reports: AtomicU64,
    dropped_errors: AtomicU64,
}

impl NotificationEngine {
    #[must_use]
    pub fn new(cfg: ListenerConfig) -> Self {
        let (errors_tx, errors_rx) = bounded::<TailError>(cfg.error_sink_capacity.max(1));
        Self {
            pool: Arc::new(RequestPool::new(cfg.pool)),
            errors_tx,
            errors_rx,
            lines: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            missing_file_reports: AtomicU64::new(0),
            dropped_errors: AtomicU64::new(0),
        }
    }

    /// The request pool lines are matched against.
    #[must_use]
    pub fn pool(&self) -> &Arc<RequestPool> {
        &self.pool
    }

    /// Waits (off the calling thread) for `event` to appear in the log.
    ///
    /// `timeout` bounds both the wait for pool capacity and the wait for the
    /// event itself.
    pub fn listen_for_event(&self, event: Event, timeout: Duration) -> EventFuture {
        let request = Arc::new(EventRequest::new(event));
        let (tx, rx) = bounded::<EventRequestResult>(1);

        let pool = Arc::clone(&self.pool);
        let worker_request = Arc::clone(&request);
        // If the spawn fails the closure, and with it the reply sender, is
        // dropped: `get` then reports the request as interrupted.
        let _ = thread::Builder::new()
            .name("nodeharness-listen".to_string())
            .spawn(move || {
                let started = Instant::now();
                let result = match pool.submit_request(Arc::clone(&worker_request), timeout) {
                    Err(reason) => EventRequestResult::rejected(reason),
                    Ok(()) => pool.await_result(&worker_request, timeout.saturating_sub(started.elapsed())),
                };
                let _ = tx.send(result);
            });

        EventFuture {
            request,
            pool: Arc::clone(&self.pool),
            rx,
        }
    }

    /// Removes and returns all queued tail errors.
    pub fn drain_errors(&self) -> Vec<TailError> {
        self.errors_rx.try_iter().collect()
    }

    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            lines: self.lines.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            missing_file_reports: self.missing_file_reports.load(Ordering::Relaxed),
            dropped_errors: self.dropped_errors.load(Ordering::Relaxed),
        }
    }

    /// Closes the pool, interrupting every waiter.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

impl Default for NotificationEngine {
    fn default() -> Self {
        Self::new(ListenerConfig::default())
    }
}

impl LineHandler for NotificationEngine {
    fn on_line(&self, line: &str) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        let pass = self.pool.process_line(line);
        if pass.resolved > 0 {
            self.resolved.fetch_add(pass.resolved as u64, Ordering::Relaxed);
        }
    }

    fn on_file_missing(&self) {
        self.missing_file_reports.fetch_add(1, Ordering::Relaxed);
    }

    fn on_rotated(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self, err: TailError) {
        match self.errors_tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Handle to a pending `listen_for_event` call.
#[derive(Debug)]
pub struct EventFuture {
    request: Arc<EventRequest>,
    pool: Arc<RequestPool>,
    rx: Receiver<EventRequestResult>,
}

impl EventFuture {
    /// The underlying request.
    #[must_use]
    pub fn request(&self) -> &Arc<EventRequest> {
        &self.request
    }

    /// Cancels the request. A later `get` returns a rejection.
    pub fn cancel(&self) {
        self.pool.cancel(&self.request);
    }

    /// Blocks until the request has a result.
    #[must_use]
    pub fn get(self) -> EventRequestResult {
        self.rx
            .recv()
            .unwrap_or(EventRequestResult::rejected(RejectReason::Interrupted))
    }

    /// Blocks up to `timeout`; `None` if the result is not ready yet.
    #[must_use]
    pub fn get_timeout(&self, timeout: Duration) -> Option<EventRequestResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(EventRequestResult::rejected(RejectReason::Interrupted))
            }
        }
    }
}
