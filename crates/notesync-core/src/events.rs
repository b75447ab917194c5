//! Notifications for observers of the note database.
//!
//! `NotesDb` publishes [`NoteEvent`]s on an [`EventBus`]; a UI subscribes to
//! refresh note status indicators and show sync progress.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use crate::models::{NoteKey, StatusField};

/// Events emitted by the note database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NoteEvent {
    /// One of the bookkeeping dates of a note changed.
    NoteStatusChanged { what: StatusField, key: NoteKey },
    /// A note was written to disk.
    NoteSaved { key: NoteKey },
    /// A note was reconciled with the remote.
    NoteSynced { key: NoteKey },
    /// A partial sync of one note failed; it stays dirty and is retried.
    NoteSyncFailed { key: NoteKey, message: String },
    /// A full sync moved a note from its local key to its remote key.
    KeyChanged { old_key: NoteKey, new_key: NoteKey },
    /// Human readable progress of a full sync.
    SyncProgress { message: String },
    /// A full sync finished; `errors` counts notes that could not be pulled.
    SyncCompleted { errors: usize },
    /// A full sync was aborted.
    SyncFailed { error: String, diagnostic: String },
}

type Callback = Arc<dyn Fn(&NoteEvent) + Send + Sync>;

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing note events to subscribers.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&NoteEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        self.callbacks.write().retain(|(i, _)| *i != id);
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: &NoteEvent) {
        // Callbacks run outside the lock so they may subscribe in turn.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }
}
