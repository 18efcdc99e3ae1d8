//! Best-effort termination of a node's process tree.
//!
//! Signalling a node's launcher script does not always reach the node binary
//! it started. The controller therefore also terminates every process whose
//! command line mentions the node's executable directory.
//!
//! # Platform support
//! - Linux: scans `/proc/<pid>/cmdline` and sends `SIGTERM`
//! - Other unix: signalling only, no scan (terminates nothing)
//! - Elsewhere: unsupported

use std::io::{self, ErrorKind};
use std::path::Path;

/// Terminates processes identified by an executable-path signature.
pub trait ProcessGroupTerminator: Send + Sync {
    /// Sends a termination request to every process whose command line
    /// contains `signature`, returning how many were signalled.
    ///
    /// # Errors
    /// Returns an error if the process table cannot be enumerated.
    fn terminate_matching(&self, signature: &Path) -> io::Result<usize>;
}

/// The OS process-table backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcScanTerminator;

impl ProcessGroupTerminator for ProcScanTerminator {
    fn terminate_matching(&self, signature: &Path) -> io::Result<usize> {
        scan_and_terminate(signature)
    }
}

/// Sends `SIGTERM` to `pid`.
///
/// # Errors
/// Returns the OS error if the signal could not be delivered.
#[cfg(unix)]
pub fn terminate_pid(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, format!("pid {pid} out of range")))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate_pid(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "signalling processes is not supported on this platform",
    ))
}

/// Returns true if a raw NUL-separated `/proc/<pid>/cmdline` mentions `needle`.
pub(crate) fn cmdline_mentions(raw: &[u8], needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let command = raw
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    command.contains(needle)
}

#[cfg(target_os = "linux")]
fn scan_and_terminate(signature: &Path) -> io::Result<usize> {
    let needle = signature.to_string_lossy();
    let own_pid = std::process::id();
    let mut signalled = 0;

    for entry in std::fs::read_dir("/proc")? {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        // The process may exit between listing and reading.
        let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if cmdline_mentions(&raw, &needle) && terminate_pid(pid).is_ok() {
            signalled += 1;
        }
    }

    Ok(signalled)
}

#[cfg(not(target_os = "linux"))]
fn scan_and_terminate(_signature: &Path) -> io::Result<usize> {
    Ok(0)
}
