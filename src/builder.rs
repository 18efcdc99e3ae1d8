//! Producing the node installation before it is started.
//!
//! Building is delegated to an external command (for example a Gradle or
//! make invocation). The controller only cares whether it succeeded.

use std::fs::{self, File};
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::config::NodeConfig;
use crate::error::{HarnessError, HarnessResult, ValidationError};
use crate::logs::LogManager;
use crate::outcome::Outcome;

/// Builds a node installation into `config.node_dir`.
pub trait NodeBuilder: Send + Sync {
    /// Runs the build. `verbose` shows the build output instead of writing
    /// it to the build log.
    ///
    /// # Errors
    /// Returns an error only for invalid build settings; a failing build is
    /// an unsuccessful [`Outcome`].
    fn build(&self, config: &NodeConfig, logs: &LogManager, verbose: bool) -> HarnessResult<Outcome>;
}

/// Runs `config.build.command` in `config.build.source_dir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandBuilder;

impl NodeBuilder for CommandBuilder {
    fn build(&self, config: &NodeConfig, logs: &LogManager, verbose: bool) -> HarnessResult<Outcome> {
        let Some(build) = &config.build else {
            return Ok(if config.node_dir.is_dir() {
                Outcome::successful()
            } else {
                Outcome::unsuccessful_due_to(format!(
                    "no build configured and node directory {} does not exist",
                    config.node_dir.display()
                ))
            });
        };

        if build.conditional && config.node_dir.is_dir() {
            info!("node already built at {}, skipping build", config.node_dir.display());
            return Ok(Outcome::successful());
        }

        let Some((program, args)) = build.command.split_first() else {
            return Err(HarnessError::Validation(ValidationError::MissingField {
                field: "build.command".to_string(),
            }));
        };

        if !build.source_dir.is_dir() {
            return Ok(Outcome::unsuccessful_due_to(format!(
                "build source directory {} does not exist",
                build.source_dir.display()
            )));
        }

        let mut command = Command::new(program);
        command.args(args).current_dir(&build.source_dir).stdin(Stdio::null());

        if !verbose {
            let log_path = logs.build_log_path();
            let redirect = fs::create_dir_all(logs.root())
                .and_then(|()| File::create(&log_path))
                .and_then(|out| Ok((out.try_clone()?, out)));
            match redirect {
                Ok((out, err)) => {
                    command.stdout(out).stderr(err);
                }
                Err(e) => {
                    return Ok(Outcome::unsuccessful_due_to(format!(
                        "could not create build log {}: {e}",
                        log_path.display()
                    )))
                }
            }
        }

        info!("building node: {}", build.command.join(" "));
        match command.status() {
            Ok(status) if status.success() => {
                info!("node build finished");
                Ok(Outcome::successful())
            }
            Ok(status) => {
                warn!("node build failed: {status}");
                Ok(Outcome::unsuccessful_due_to(format!("build exited with {status}")))
            }
            Err(e) => Ok(Outcome::unsuccessful_due_to(format!("could not run build '{program}': {e}"))),
        }
    }
}
