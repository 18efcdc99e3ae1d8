//! Node configuration.
//!
//! A [`NodeConfig`] is everything `configure` needs: where the node is
//! installed, how to launch it, where its logs and data live, and the
//! readiness/shutdown timing. It can be built in code or loaded from JSON;
//! every field except `network` and `node_dir` has a default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult, ValidationError};
use crate::event::{Event, RPC_SERVER_STARTED};
use crate::network::Network;

/// What `initialize` does with the node's persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOption {
    #[default]
    Preserve,
    DoNotPreserve,
}

/// How to produce the node installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory the build command runs in.
    pub source_dir: PathBuf,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Skip the build when the node directory already exists.
    #[serde(default)]
    pub conditional: bool,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: Network,
    /// Installation directory; the process runs with this as its working directory.
    pub node_dir: PathBuf,
    /// Launcher, relative to `node_dir`.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Directory of the real node binary, relative to `node_dir`.
    #[serde(default = "default_executable_dir")]
    pub executable_dir: PathBuf,
    /// Persisted data, relative to `node_dir`; defaults to `<network>/database`.
    #[serde(default)]
    pub database_dir: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_readiness_event")]
    pub readiness_event: String,
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub database_option: DatabaseOption,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_executable() -> String {
    "./aion.sh".to_string()
}

fn default_executable_dir() -> PathBuf {
    PathBuf::from("rt")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_readiness_event() -> String {
    RPC_SERVER_STARTED.to_string()
}

const fn default_readiness_timeout_ms() -> u64 {
    20_000
}

const fn default_shutdown_grace_ms() -> u64 {
    60_000
}

impl NodeConfig {
    /// Creates a configuration with defaults for everything but the network
    /// and installation directory.
    #[must_use]
    pub fn new(network: Network, node_dir: impl Into<PathBuf>) -> Self {
        Self {
            network,
            node_dir: node_dir.into(),
            executable: default_executable(),
            executable_dir: default_executable_dir(),
            database_dir: None,
            log_dir: default_log_dir(),
            readiness_event: default_readiness_event(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            database_option: DatabaseOption::default(),
            build: None,
            extra_args: Vec::new(),
        }
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns `HarnessError::Io` if the file cannot be read and
    /// `HarnessError::Config` if it does not parse or validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| HarnessError::io(format!("reading config {}", path.display()), e))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| HarnessError::Config {
            message: format!("invalid config {}: {e}", path.display()),
        })?;
        cfg.validate()
    }

    /// Checks field values.
    ///
    /// # Errors
    /// Returns `HarnessError::Validation` naming the first offending field.
    pub fn validate(self) -> HarnessResult<Self> {
        if self.executable.trim().is_empty() {
            return Err(invalid("executable", "must not be empty"));
        }
        if self.readiness_event.is_empty() {
            return Err(invalid("readiness_event", "must not be empty"));
        }
        if self.readiness_timeout_ms == 0 {
            return Err(invalid("readiness_timeout_ms", "must be greater than zero"));
        }
        if self.shutdown_grace_ms == 0 {
            return Err(invalid("shutdown_grace_ms", "must be greater than zero"));
        }
        if let Some(build) = &self.build {
            if build.command.is_empty() {
                return Err(HarnessError::Validation(ValidationError::MissingField {
                    field: "build.command".to_string(),
                }));
            }
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    #[must_use]
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = duration_ms(grace);
        self
    }

    #[must_use]
    pub fn with_database_option(mut self, option: DatabaseOption) -> Self {
        self.database_option = option;
        self
    }

    #[must_use]
    pub fn with_build(mut self, build: BuildConfig) -> Self {
        self.build = Some(build);
        self
    }

    /// Full path of the launcher.
    #[must_use]
    pub fn executable_path(&self) -> PathBuf {
        self.node_dir.join(&self.executable)
    }

    /// Absolute path of the node binary's directory, used to find leftover
    /// node processes after a stop.
    #[must_use]
    pub fn executable_signature(&self) -> PathBuf {
        let dir = self.node_dir.join(&self.executable_dir);
        fs::canonicalize(&dir)
            .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(&dir)))
            .unwrap_or(dir)
    }

    /// Full path of the log root; a relative `log_dir` is under `node_dir`.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.node_dir.join(&self.log_dir)
    }

    /// Full path of the persisted data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        match &self.database_dir {
            Some(dir) => self.node_dir.join(dir),
            None => self.node_dir.join(self.network.as_str()).join("database"),
        }
    }

    /// The event that marks the node as ready.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyPattern` for an empty readiness pattern.
    pub fn readiness_event(&self) -> Result<Event, ValidationError> {
        Event::new(self.readiness_event.clone())
    }

    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn invalid(field: &str, reason: &str) -> HarnessError {
    HarnessError::Validation(ValidationError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    })
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_node_conventions() {
        let cfg = NodeConfig::new(Network::Custom, "/opt/aion");
        assert_eq!(cfg.readiness_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(60));
        assert_eq!(cfg.executable_path(), PathBuf::from("/opt/aion/./aion.sh"));
        assert_eq!(cfg.database_path(), PathBuf::from("/opt/aion/custom/database"));
        assert_eq!(cfg.log_path(), PathBuf::from("/opt/aion/logs"));
        assert_eq!(cfg.clone().with_log_dir("/var/log/aion").log_path(), PathBuf::from("/var/log/aion"));
        assert_eq!(cfg.readiness_event().unwrap(), Event::rpc_server_started());
        assert_eq!(cfg.database_option, DatabaseOption::Preserve);
    }

    #[test]
    fn json_with_only_required_fields_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        fs::write(&path, r#"{"network":"mastery","node_dir":"/opt/aion"}"#).unwrap();

        let cfg = NodeConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.network, Network::Mastery);
        assert_eq!(cfg.executable, "./aion.sh");
        assert_eq!(cfg.readiness_timeout_ms, 20_000);
        assert!(cfg.build.is_none());
    }

    #[test]
    fn json_overrides_and_build_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        fs::write(
            &path,
            r#"{
                "network": "custom",
                "node_dir": "/opt/aion",
                "database_dir": "data",
                "database_option": "do_not_preserve",
                "shutdown_grace_ms": 5000,
                "build": {"source_dir": "/src/aion", "command": ["./gradlew", "pack"], "conditional": true}
            }"#,
        )
        .unwrap();

        let cfg = NodeConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.database_path(), PathBuf::from("/opt/aion/data"));
        assert_eq!(cfg.database_option, DatabaseOption::DoNotPreserve);
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(5));
        assert!(cfg.build.unwrap().conditional);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        fs::write(&path, r#"{"network":"nowhere","node_dir":"/x"}"#).unwrap();
        assert!(matches!(NodeConfig::from_json_file(&path), Err(HarnessError::Config { .. })));

        let missing = NodeConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(missing.is_io());
    }

    #[test]
    fn validate_rejects_zero_timeouts_and_empty_fields() {
        let base = NodeConfig::new(Network::Custom, "/x");
        assert!(base.clone().validate().is_ok());
        assert!(base.clone().with_readiness_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_shutdown_grace(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_executable(" ").validate().is_err());

        let mut empty_event = base.clone();
        empty_event.readiness_event.clear();
        assert!(empty_event.validate().unwrap_err().is_validation());

        let no_command = base.with_build(BuildConfig {
            source_dir: PathBuf::from("/src"),
            command: Vec::new(),
            conditional: false,
        });
        assert!(no_command.validate().is_err());
    }
}
