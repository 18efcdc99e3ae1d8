//! Node process lifecycle.
//!
//! ```text
//! Unconfigured --configure--> Configured --start--> Running --stop--> Stopped
//!                                 ^                                      |
//!                                 +----------- reset_state / start ------+
//! ```
//!
//! A [`ProcessController`] owns one external node process and its log files.
//! It is not thread-safe: lifecycle calls take `&mut self`. Other threads wait
//! for log events through the controller's [`NotificationEngine`], which is
//! shared through a [`ListenerRegistry`].
//!
//! Lifecycle misuse (starting twice, stopping before configuring, ...) is a
//! `HarnessError::State`. Everything else that can go wrong at runtime is an
//! unsuccessful [`Outcome`].

use std::fs::{self, File};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::builder::{CommandBuilder, NodeBuilder};
use crate::config::{DatabaseOption, NodeConfig};
use crate::error::{HarnessResult, StateError};
use crate::listener::{ListenerConfig, NotificationEngine};
use crate::logs::{LogFiles, LogManager};
use crate::network::Network;
use crate::outcome::Outcome;
use crate::process_group::{ProcScanTerminator, ProcessGroupTerminator};
use crate::registry::{ListenerRegistry, NodeId};
use crate::tailer::{LineHandler, Tailer, TailerConfig};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

/// Collaborators and tuning for a [`ProcessController`].
pub struct ControllerOptions {
    pub listener: ListenerConfig,
    pub tailer: TailerConfig,
    pub terminator: Arc<dyn ProcessGroupTerminator>,
    pub builder: Arc<dyn NodeBuilder>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            tailer: TailerConfig::default(),
            terminator: Arc::new(ProcScanTerminator),
            builder: Arc::new(CommandBuilder),
        }
    }
}

/// Owns a node process: configure, build, start, stop and reset it.
pub struct ProcessController {
    id: NodeId,
    state: NodeState,
    config: Option<NodeConfig>,
    logs: Option<LogManager>,
    engine: Arc<NotificationEngine>,
    tailer_cfg: TailerConfig,
    tailer: Option<Tailer>,
    child: Option<Child>,
    terminator: Arc<dyn ProcessGroupTerminator>,
    builder: Arc<dyn NodeBuilder>,
}

impl ProcessController {
    /// Creates an unconfigured controller and registers its listener.
    #[must_use]
    pub fn new(registry: &ListenerRegistry) -> Self {
        Self::with_options(registry, ControllerOptions::default())
    }

    #[must_use]
    pub fn with_options(registry: &ListenerRegistry, options: ControllerOptions) -> Self {
        let engine = Arc::new(NotificationEngine::new(options.listener));
        let id = registry.register(Arc::clone(&engine));
        Self {
            id,
            state: NodeState::Unconfigured,
            config: None,
            logs: None,
            engine,
            tailer_cfg: options.tailer,
            tailer: None,
            child: None,
            terminator: options.terminator,
            builder: options.builder,
        }
    }

    /// The id this controller's listener is registered under.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> NodeState {
        self.state
    }

    /// The engine matching this node's output against event requests.
    #[must_use]
    pub fn listener(&self) -> &Arc<NotificationEngine> {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> Option<&NodeConfig> {
        self.config.as_ref()
    }

    /// The network the node will join on `start`, or has joined if running.
    #[must_use]
    pub fn network(&self) -> Option<Network> {
        self.config.as_ref().map(|c| c.network)
    }

    /// Log files of the current (or last) run.
    #[must_use]
    pub fn log_files(&self) -> Option<&LogFiles> {
        self.logs.as_ref().and_then(LogManager::current)
    }

    /// OS process id of the running node.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Stores the settings used by every later operation.
    ///
    /// # Errors
    /// `StateError::Running` if the node is alive; a validation error if the
    /// settings are invalid.
    pub fn configure(&mut self, config: NodeConfig) -> HarnessResult<()> {
        if self.is_alive() {
            return Err(StateError::Running { operation: "configure" }.into());
        }
        let config = config.validate()?;
        self.logs = Some(LogManager::new(config.log_path()));
        self.config = Some(config);
        self.state = NodeState::Configured;
        Ok(())
    }

    /// Builds the node, writing build output to the build log.
    ///
    /// # Errors
    /// Same as [`ProcessController::initialize_verbose`].
    pub fn initialize(&mut self) -> HarnessResult<Outcome> {
        self.run_build(false)
    }

    /// Builds the node, showing build output.
    ///
    /// # Errors
    /// `StateError::NotConfigured` before `configure`, `StateError::Running`
    /// while the node is alive.
    pub fn initialize_verbose(&mut self) -> HarnessResult<Outcome> {
        self.run_build(true)
    }

    fn run_build(&mut self, verbose: bool) -> HarnessResult<Outcome> {
        let (Some(config), Some(logs)) = (self.config.clone(), self.logs.clone()) else {
            return Err(StateError::NotConfigured { operation: "initialize" }.into());
        };
        if self.is_alive() {
            return Err(StateError::Running { operation: "initialize" }.into());
        }

        let outcome = self.builder.build(&config, &logs, verbose)?;
        if !outcome.is_success() || config.database_option == DatabaseOption::Preserve {
            return Ok(outcome);
        }

        let database = config.database_path();
        if database.exists() {
            info!("removing node database {}", database.display());
            if let Err(e) = fs::remove_dir_all(&database) {
                return Ok(Outcome::unsuccessful_due_to(format!(
                    "could not remove database {}: {e}",
                    database.display()
                )));
            }
        }
        Ok(outcome)
    }

    /// Starts the node and waits for it to become ready.
    ///
    /// The node is ready once its readiness event appears in its output. If
    /// that does not happen within the readiness timeout, a node that is
    /// still alive is assumed ready (the banner may have been printed before
    /// anyone listened).
    ///
    /// # Errors
    /// `StateError::NotConfigured`, `StateError::AlreadyRunning`, or
    /// `StateError::MissingNodeDirectory`.
    pub fn start(&mut self) -> HarnessResult<Outcome> {
        let Some(config) = self.config.clone() else {
            return Err(StateError::NotConfigured { operation: "start" }.into());
        };
        if self.is_alive() {
            return Err(StateError::AlreadyRunning.into());
        }
        if !config.node_dir.is_dir() {
            return Err(StateError::MissingNodeDirectory {
                path: config.node_dir.clone(),
            }
            .into());
        }

        info!("starting node {} on {}", self.id, config.network);
        self.detach_tailer();
        self.child = None;

        let logs = self.logs.get_or_insert_with(|| LogManager::new(config.log_path()));
        let files = match logs.setup_log_files() {
            Ok(files) => files,
            Err(e) => return Ok(Outcome::unsuccessful_due_to(format!("could not set up log files: {e}"))),
        };
        let (stdout, stderr) = match (File::create(&files.output), File::create(&files.error)) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return Ok(Outcome::unsuccessful_due_to(format!("could not open log files: {e}")))
            }
        };

        // Registered before the node runs so an early banner is not missed.
        let readiness = config.readiness_event()?;
        let started = Instant::now();
        let pool = Arc::clone(self.engine.pool());
        let request = match pool.submit(readiness, config.readiness_timeout()) {
            Ok(request) => request,
            Err(reason) => {
                return Ok(Outcome::unsuccessful_due_to(format!(
                    "could not listen for readiness: {}",
                    reason.description()
                )))
            }
        };

        let spawned = Command::new(config.executable_path())
            .arg("-n")
            .arg(config.network.as_str())
            .args(&config.extra_args)
            .current_dir(&config.node_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn();
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                pool.cancel(&request);
                return Ok(Outcome::unsuccessful_due_to(format!(
                    "could not launch {}: {e}",
                    config.executable_path().display()
                )));
            }
        };
        debug!("node process {} spawned", child.id());
        self.child = Some(child);
        self.state = NodeState::Running;

        let handler: Arc<dyn LineHandler> = Arc::clone(&self.engine) as Arc<dyn LineHandler>;
        match Tailer::start(&files.output, handler, self.tailer_cfg.clone()) {
            Ok(tailer) => self.tailer = Some(tailer),
            Err(e) => {
                pool.cancel(&request);
                return Ok(self.abandon_start(format!("could not follow node output: {e}")));
            }
        }

        let remaining = config.readiness_timeout().saturating_sub(started.elapsed());
        let result = pool.await_result(&request, remaining);
        if !result.is_observed() {
            pool.cancel(&request);
        }
        self.log_tail_errors();

        if result.is_observed() {
            info!("node {} is ready", self.id);
            return Ok(Outcome::successful());
        }

        warn!("readiness event not observed ({result}), checking liveness instead");
        if self.is_alive() {
            info!("node {} is alive, assuming ready", self.id);
            return Ok(Outcome::successful());
        }

        Ok(self.abandon_start("Node failed to start!"))
    }

    /// Tears down a half-started node so a failed start leaves nothing running.
    fn abandon_start(&mut self, reason: impl Into<String>) -> Outcome {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                warn!("killing node process {} after failed start", child.id());
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        self.detach_tailer();
        self.state = NodeState::Stopped;
        Outcome::unsuccessful_due_to(reason)
    }

    /// Stops the node and cleans up leftover node processes.
    ///
    /// A termination signal is sent and the node gets the shutdown grace
    /// period to exit. Whether or not it does, every process whose command
    /// line mentions the node's executable directory is then terminated.
    ///
    /// # Errors
    /// `StateError::NotConfigured` before `configure`.
    pub fn stop(&mut self) -> HarnessResult<Outcome> {
        let Some(config) = self.config.clone() else {
            return Err(StateError::NotConfigured { operation: "stop" }.into());
        };

        let outcome = if self.is_alive() {
            info!("stopping node {}", self.id);
            let exited = match self.child.as_mut() {
                Some(child) => terminate_and_wait(child, config.shutdown_grace()),
                None => true,
            };
            self.child = None;
            self.detach_tailer();
            self.state = NodeState::Stopped;

            if exited {
                info!("node {} stopped", self.id);
                Outcome::successful()
            } else {
                Outcome::unsuccessful_due_to("Timed out waiting for node to shut down!")
            }
        } else {
            if self.child.take().is_some() {
                self.state = NodeState::Stopped;
            }
            self.detach_tailer();
            Outcome::unsuccessful_due_to("Node is not currently alive!")
        };

        let signature = config.executable_signature();
        match self.terminator.terminate_matching(&signature) {
            Ok(0) => {}
            Ok(n) => info!("terminated {n} leftover process(es) under {}", signature.display()),
            Err(e) => warn!("could not scan for leftover node processes: {e}"),
        }
        self.log_tail_errors();

        Ok(outcome)
    }

    /// True iff a node process is held and has not exited.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Deletes the node's persisted data.
    ///
    /// # Errors
    /// `StateError::NotConfigured`, `StateError::Running`, or
    /// `StateError::MissingNodeDirectory`.
    pub fn reset_state(&mut self) -> HarnessResult<Outcome> {
        let Some(config) = self.config.clone() else {
            return Err(StateError::NotConfigured { operation: "reset state" }.into());
        };
        if self.is_alive() {
            return Err(StateError::Running { operation: "reset state" }.into());
        }
        if !config.node_dir.is_dir() {
            return Err(StateError::MissingNodeDirectory { path: config.node_dir }.into());
        }

        let database = config.database_path();
        info!("resetting node state at {}", database.display());
        if database.exists() {
            if let Err(e) = fs::remove_dir_all(&database) {
                return Ok(Outcome::unsuccessful_due_to(format!(
                    "could not remove database {}: {e}",
                    database.display()
                )));
            }
        }
        self.state = NodeState::Configured;
        Ok(Outcome::successful())
    }

    fn detach_tailer(&mut self) {
        if let Some(mut tailer) = self.tailer.take() {
            tailer.stop();
        }
    }

    fn log_tail_errors(&self) {
        for err in self.engine.drain_errors() {
            warn!("node {} output: {err}", self.id);
        }
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        if self.is_alive() {
            warn!("node {} dropped while running, killing it", self.id);
            if let Some(child) = self.child.as_mut() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        self.detach_tailer();
        self.engine.shutdown();
    }
}

/// Sends a termination signal and waits up to `grace` for the process to
/// exit. A process that outlives the grace period is killed; returns whether
/// it exited in time.
fn terminate_and_wait(child: &mut Child, grace: Duration) -> bool {
    if let Err(e) = send_terminate(child) {
        warn!("could not signal node process {}: {e}", child.id());
    }

    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("node process exited: {status}");
                return true;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("could not poll node process: {e}");
                return false;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            warn!("node did not exit within {grace:?}, killing it");
            let _ = child.kill();
            let _ = child.wait();
            return false;
        }
        thread::sleep((deadline - now).min(EXIT_POLL_INTERVAL));
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    crate::process_group::terminate_pid(child.id())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}
