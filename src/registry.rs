//! Explicit registry of node listeners.
//!
//! Each process controller registers its notification engine under its
//! [`NodeId`]. Whoever needs to wait on a node's log events is handed the
//! registry (or the engine itself); there is no process-wide table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::listener::NotificationEngine;

/// Unique identifier for a node controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random node id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps node ids to their notification engines.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<NodeId, Arc<NotificationEngine>>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `engine` under a fresh id and returns the id.
    pub fn register(&self, engine: Arc<NotificationEngine>) -> NodeId {
        let id = NodeId::new();
        self.write().insert(id, engine);
        id
    }

    /// The engine listening to node `id`, if registered.
    #[must_use]
    pub fn listen_to(&self, id: NodeId) -> Option<Arc<NotificationEngine>> {
        self.read().get(&id).cloned()
    }

    /// Removes node `id`, returning its engine.
    pub fn unregister(&self, id: NodeId) -> Option<Arc<NotificationEngine>> {
        self.write().remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<NodeId, Arc<NotificationEngine>>> {
        self.listeners.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<NodeId, Arc<NotificationEngine>>> {
        self.listeners.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
