//! # nodeharness - node process control and log-driven event notification
//!
//! nodeharness launches an external blockchain node, follows its output log,
//! and lets test code wait for textual events in that log with bounded
//! timeouts.
//!
//! ## Core Concepts
//!
//! - **Event**: A substring pattern that may appear in a log line
//! - **EventRequest**: A one-shot wait for an event, resolved exactly once
//! - **RequestPool**: Bounded FIFO of pending requests matched against each line
//! - **Tailer**: Follows a log file across creation, truncation and rotation
//! - **ProcessController**: Configures, builds, starts, stops and resets a node
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use nodeharness::{Event, ListenerRegistry, Network, NodeConfig, ProcessController};
//!
//! # fn main() -> Result<(), nodeharness::HarnessError> {
//! let registry = ListenerRegistry::new();
//! let mut node = ProcessController::new(&registry);
//! node.configure(NodeConfig::new(Network::Custom, "/opt/aion"))?;
//!
//! let started = node.start()?;
//! assert!(started.is_success(), "{started}");
//!
//! let sealed = node
//!     .listener()
//!     .listen_for_event(Event::new("Block sealed")?, Duration::from_secs(30))
//!     .get();
//! println!("{sealed}");
//!
//! let _ = node.stop()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Event matching core
pub mod error;
pub mod event;
pub mod listener;
pub mod pool;
pub mod registry;
pub mod request;
pub mod tailer;

// Node lifecycle
pub mod builder;
pub mod config;
pub mod controller;
pub mod logs;
pub mod network;
pub mod outcome;
pub mod process_group;

pub use builder::{CommandBuilder, NodeBuilder};
pub use config::{BuildConfig, DatabaseOption, NodeConfig};
pub use controller::{ControllerOptions, NodeState, ProcessController};
pub use error::{HarnessError, HarnessResult, StateError, ValidationError};
pub use event::{Event, RPC_SERVER_STARTED};
pub use listener::{EventFuture, ListenerConfig, ListenerStats, NotificationEngine};
pub use logs::{LogFiles, LogManager};
pub use network::Network;
pub use outcome::Outcome;
pub use pool::{LinePass, PoolConfig, RequestPool};
pub use process_group::{ProcScanTerminator, ProcessGroupTerminator};
pub use registry::{ListenerRegistry, NodeId};
pub use request::{EventRequest, EventRequestResult, RejectReason, RequestId};
pub use tailer::{LineHandler, TailError, Tailer, TailerConfig};
