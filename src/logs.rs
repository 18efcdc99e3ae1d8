//! Per-run node log files.
//!
//! Layout under the configured log root:
//!
//! ```text
//! <root>/current/out.log    stdout of the running node
//! <root>/current/err.log    stderr of the running node
//! <root>/archive/<stamp>/   earlier runs, moved aside by `setup_log_files`
//! <root>/build.log          output of non-verbose builds
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info};

use crate::error::{HarnessError, HarnessResult};

const CURRENT_DIR: &str = "current";
const ARCHIVE_DIR: &str = "archive";
const OUTPUT_LOG: &str = "out.log";
const ERROR_LOG: &str = "err.log";
const BUILD_LOG: &str = "build.log";

/// Output and error log of one node run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    pub output: PathBuf,
    pub error: PathBuf,
}

/// Creates and archives node log files.
#[derive(Debug, Clone)]
pub struct LogManager {
    root: PathBuf,
    current: Option<LogFiles>,
}

impl LogManager {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The files of the most recent run, if any were set up.
    #[must_use]
    pub fn current(&self) -> Option<&LogFiles> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn build_log_path(&self) -> PathBuf {
        self.root.join(BUILD_LOG)
    }

    /// Archives the previous run's logs and creates empty ones.
    ///
    /// # Errors
    /// Returns `HarnessError::Io` if a directory or file cannot be created or
    /// the previous logs cannot be moved.
    pub fn setup_log_files(&mut self) -> HarnessResult<LogFiles> {
        let current_dir = self.root.join(CURRENT_DIR);
        if current_dir.exists() {
            let archived = self.archive(&current_dir)?;
            debug!("archived previous node logs to {}", archived.display());
        }

        fs::create_dir_all(&current_dir)
            .map_err(|e| HarnessError::io(format!("creating {}", current_dir.display()), e))?;

        let files = LogFiles {
            output: current_dir.join(OUTPUT_LOG),
            error: current_dir.join(ERROR_LOG),
        };
        for path in [&files.output, &files.error] {
            File::create(path).map_err(|e| HarnessError::io(format!("creating {}", path.display()), e))?;
        }

        info!("node logs at {}", current_dir.display());
        self.current = Some(files.clone());
        Ok(files)
    }

    fn archive(&self, current_dir: &Path) -> HarnessResult<PathBuf> {
        let archive_root = self.root.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_root)
            .map_err(|e| HarnessError::io(format!("creating {}", archive_root.display()), e))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut target = archive_root.join(&stamp);
        let mut n = 1u32;
        while target.exists() {
            target = archive_root.join(format!("{stamp}-{n}"));
            n += 1;
        }

        fs::rename(current_dir, &target)
            .map_err(|e| HarnessError::io(format!("archiving {}", current_dir.display()), e))?;
        Ok(target)
    }
}
