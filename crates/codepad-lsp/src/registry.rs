//! Observer registry of the document plugins attached to one session.
//!
//! The registry holds weak references only: a plugin decides its own
//! lifetime and a dropped plugin simply stops receiving notifications.
use std::sync::{Arc, Weak};

use crate::notification::ServerNotification;

/// Receives server notifications fanned out by a session.
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &ServerNotification);
}

/// Opaque handle returned by `attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(u64);

impl PluginId {
    /// Return the raw numeric id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Attached listeners in attach order.
pub struct PluginRegistry {
    entries: Vec<(PluginId, Weak<dyn NotificationListener>)>,
    /// Counter for generating unique plugin IDs.
    next_id: u64,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a listener. IDs are never reused.
    pub fn attach(&mut self, listener: Weak<dyn NotificationListener>) -> PluginId {
        let id = PluginId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not attached.
    pub fn detach(&mut self, id: PluginId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Strong references to every listener still alive, in attach order.
    /// Entries whose plugin was dropped without detaching are pruned.
    pub fn live(&mut self) -> Vec<Arc<dyn NotificationListener>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(listener) => {
                live.push(listener);
                true
            }
            None => false,
        });
        live
    }

    /// Number of attached listeners, dead or alive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field(
                "ids",
                &self.entries.iter().map(|(id, _)| id.0).collect::<Vec<_>>(),
            )
            .finish()
    }
}
