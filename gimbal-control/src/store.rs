//! Shared owner of the system snapshot.
//!
//! The state provider mutates the snapshot through [`StateStore::update`];
//! every change is published to each subscriber exactly once and in order.
//! The control core reads copies and only writes back the derived
//! no-traverse-zone flag.

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::state::SystemStateSnapshot;

struct SharedState {
    snapshot: SystemStateSnapshot,
    subscribers: Vec<Sender<SystemStateSnapshot>>,
}

/// Cloneable handle to the snapshot and its change notifications.
#[derive(Clone)]
pub struct StateStore {
    state: Arc<Mutex<SharedState>>,
}

impl StateStore {
    pub fn new(initial: SystemStateSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState {
                snapshot: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // A panicking writer leaves a complete snapshot behind, so keep going
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> SystemStateSnapshot {
        self.lock().snapshot.clone()
    }

    /// Register for change notifications.
    ///
    /// The receiver gets the full snapshot after every change made from now on.
    pub fn subscribe(&self) -> Receiver<SystemStateSnapshot> {
        let (tx, rx) = unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Mutate the snapshot and publish it if anything changed.
    ///
    /// Returns whether a change was published.
    pub fn update<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut SystemStateSnapshot),
    {
        let mut state = self.lock();
        let before = state.snapshot.clone();
        mutate(&mut state.snapshot);
        if state.snapshot == before {
            return false;
        }

        let published = state.snapshot.clone();
        let count = state.subscribers.len();
        state
            .subscribers
            .retain(|tx| tx.send(published.clone()).is_ok());
        if state.subscribers.len() != count {
            debug!(
                "Dropped {} closed snapshot subscriber(s)",
                count - state.subscribers.len()
            );
        }
        true
    }

    /// Push back the derived no-traverse-zone flag.
    pub fn set_reticle_in_no_traverse_zone(&self, inside: bool) -> bool {
        self.update(|s| s.reticle_in_no_traverse_zone = inside)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(SystemStateSnapshot::default())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("StateStore")
            .field("motion_mode", &state.snapshot.motion_mode)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
