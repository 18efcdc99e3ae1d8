//! Log file tailing.
//!
//! A [`Tailer`] follows one file from its first byte on a dedicated thread and
//! hands every complete line, in file order, to a [`LineHandler`]. It waits
//! for a file that does not exist yet and reopens the file when it is
//! truncated or replaced. Lines already delivered from a replaced file are
//! not replayed, but delivery across a rotation is best-effort.

use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

/// Errors reported by the tailing thread.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Log file {} not found after {attempts} attempts", path.display())]
    NotFound {
        path: PathBuf,
        attempts: u32,
    },

    #[error("Line in {} exceeded {limit} bytes without a terminator and was split", path.display())]
    LineTooLong {
        path: PathBuf,
        limit: usize,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Receives the output of a [`Tailer`].
///
/// All callbacks run on the tailer's thread, one at a time.
pub trait LineHandler: Send + Sync {
    /// A complete line, without its terminator.
    fn on_line(&self, line: &str);

    /// The file does not exist (yet); called on every poll while missing.
    fn on_file_missing(&self) {}

    /// The file was truncated or replaced and is being reopened.
    fn on_rotated(&self) {}

    /// A read failure, or a file still missing after the configured retries.
    fn on_error(&self, err: TailError);
}

/// Tailer configuration.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// How long to wait for new data, or for the file to appear.
    pub poll_interval: Duration,
    /// Consecutive missing-file polls before a `TailError::NotFound` is reported.
    pub missing_file_retries: u32,
    /// Longest unterminated line held before it is delivered in pieces.
    pub max_line_bytes: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            missing_file_retries: 50,
            max_line_bytes: 1024 * 1024,
        }
    }
}

/// Handle to a running tail thread.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    stopping: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Tailer {
    /// Starts following `path` on a new thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned. A missing file is not
    /// an error here.
    pub fn start(path: impl Into<PathBuf>, handler: Arc<dyn LineHandler>, cfg: TailerConfig) -> io::Result<Self> {
        let path = path.into();
        let stopping = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let tail = TailLoop {
            path: path.clone(),
            handler,
            poll_interval: cfg.poll_interval.max(Duration::from_millis(1)),
            missing_file_retries: cfg.missing_file_retries.max(1),
            max_line_bytes: cfg.max_line_bytes.max(1),
            stopping: Arc::clone(&stopping),
            stop_rx,
        };

        let join = thread::Builder::new()
            .name("nodeharness-tail".to_string())
            .spawn(move || tail.run())?;

        Ok(Self {
            path,
            stopping,
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    /// The file being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true until `stop` has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Stops delivery and joins the tail thread. Idempotent.
    ///
    /// No line is handed to the handler after this returns.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        // Dropping the sender wakes the thread out of its poll wait.
        drop(self.stop_tx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Follow {
    Stopped,
    Rotated,
}

struct TailLoop {
    path: PathBuf,
    handler: Arc<dyn LineHandler>,
    poll_interval: Duration,
    missing_file_retries: u32,
    max_line_bytes: usize,
    stopping: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
}

impl TailLoop {
    fn run(self) {
        let mut missing_attempts = 0u32;

        loop {
            if self.is_stopping() {
                return;
            }

            let file = match File::open(&self.path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.handler.on_file_missing();
                    missing_attempts = missing_attempts.saturating_add(1);
                    if missing_attempts == self.missing_file_retries {
                        self.handler.on_error(TailError::NotFound {
                            path: self.path.clone(),
                            attempts: missing_attempts,
                        });
                    }
                    if !self.pause() {
                        return;
                    }
                    continue;
                }
                Err(source) => {
                    self.report_io(source);
                    if !self.pause() {
                        return;
                    }
                    continue;
                }
            };
            missing_attempts = 0;

            match self.follow(file) {
                Follow::Stopped => return,
                Follow::Rotated => self.handler.on_rotated(),
            }
        }
    }

    fn follow(&self, file: File) -> Follow {
        let identity = file.metadata().ok().as_ref().and_then(file_identity);
        let mut reader = BufReader::new(file);
        let mut position = 0u64;
        let mut line = Vec::new();

        loop {
            if self.is_stopping() {
                return Follow::Stopped;
            }

            let room = (self.max_line_bytes - line.len()) as u64;
            match (&mut reader).take(room).read_until(b'\n', &mut line) {
                Ok(0) => {
                    match fs::metadata(&self.path) {
                        Ok(meta) => {
                            let replaced = identity.is_some() && file_identity(&meta) != identity;
                            if replaced || meta.len() < position {
                                return Follow::Rotated;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::NotFound => return Follow::Rotated,
                        Err(source) => self.report_io(source),
                    }
                    if !self.pause() {
                        return Follow::Stopped;
                    }
                }
                Ok(n) => {
                    position += n as u64;
                    let complete = line.last() == Some(&b'\n');
                    if complete || line.len() >= self.max_line_bytes {
                        if self.is_stopping() {
                            return Follow::Stopped;
                        }
                        if !complete {
                            self.handler.on_error(TailError::LineTooLong {
                                path: self.path.clone(),
                                limit: self.max_line_bytes,
                            });
                        }
                        self.handler.on_line(&decode_line(&line));
                        line.clear();
                    }
                }
                Err(source) => {
                    self.report_io(source);
                    if !self.pause() {
                        return Follow::Stopped;
                    }
                }
            }
        }
    }

    /// Waits one poll interval; false if a stop was requested.
    fn pause(&self) -> bool {
        match self.stop_rx.recv_timeout(self.poll_interval) {
            Err(RecvTimeoutError::Timeout) => !self.is_stopping(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn report_io(&self, source: io::Error) {
        self.handler.on_error(TailError::Io {
            path: self.path.clone(),
            source,
        });
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn file_identity(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}
