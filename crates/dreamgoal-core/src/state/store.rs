//! Shared in-memory state with typed change notifications.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;

use super::command::{reduce, Command, Snapshot};
use crate::events::Event;

const EVENT_CAPACITY: usize = 256;

/// Holds the current snapshot and fans out [`Event`]s to subscribers.
///
/// Readers get a cheap `Arc` clone of the snapshot; `dispatch` swaps in the
/// reduced one. The lock is never held across an await.
pub struct StateStore {
    current: RwLock<Arc<Snapshot>>,
    events: broadcast::Sender<Event>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            events,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Number of commands applied so far.
    pub fn revision(&self) -> u64 {
        self.snapshot().revision
    }

    /// Apply `command` and notify subscribers. Returns the new snapshot.
    pub fn dispatch(&self, command: Command) -> Arc<Snapshot> {
        let name = command.name();
        let next = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let next = Arc::new(reduce(&guard, command));
            *guard = Arc::clone(&next);
            next
        };
        tracing::debug!(revision = next.revision, command = name, "state dispatched");
        self.publish(Event::StateChanged {
            revision: next.revision,
            change: name.to_string(),
            at: Utc::now(),
        });
        next
    }

    /// Send an event to current subscribers. Having none is fine.
    pub fn publish(&self, event: Event) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
