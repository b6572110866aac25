//! Listener registration for discovered blocks.
//!
//! Interested parties subscribe to the scanner's discovery stream through a
//! [`ListenerRegistry`]. The registry is in-memory and per-process: it is
//! owned by the enclosing adapter and outlives individual scans, but is not
//! persisted across restarts.
//!
//! Removal is by opaque handle and idempotent. A listener registered while
//! a scan is in flight may or may not see that scan's remaining blocks;
//! scans snapshot the registry at each dispatch, and that race is accepted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use ledgerq_sdk::ledger::Block;
use uuid::Uuid;

/// A callback invoked once per block discovered during a scan.
#[async_trait]
pub trait BlockListener: Send + Sync {
    /// Returns `true` when the listener produced or detected outstanding
    /// work for this block. Errors are logged at the dispatch site and
    /// never fail the scan or other listeners.
    async fn on_block(&self, block: Arc<Block>) -> anyhow::Result<bool>;
}

/// In-memory set of registered listeners, keyed by generated handle.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<Uuid, Arc<dyn BlockListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<dyn BlockListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `listener` under a freshly generated handle. Never fails.
    pub fn register(self: &Arc<Self>, listener: Arc<dyn BlockListener>) -> Registration {
        let handle = Uuid::new_v4();
        self.lock().insert(handle, listener);
        Registration {
            handle,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove the listener registered under `handle`. Removing an unknown
    /// or already-removed handle is a no-op.
    pub fn remove(&self, handle: Uuid) {
        self.lock().remove(&handle);
    }

    /// Current listeners, in no particular order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn BlockListener>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Removal handle returned by [`ListenerRegistry::register`].
///
/// Dropping a `Registration` does not remove the listener; registrations
/// only end through an explicit [`remove`](Registration::remove) call.
#[derive(Debug)]
pub struct Registration {
    handle: Uuid,
    registry: Weak<ListenerRegistry>,
}

impl Registration {
    pub fn handle(&self) -> Uuid {
        self.handle
    }

    /// Unregister the listener. Idempotent; a no-op when the registry is
    /// already gone.
    pub fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.handle);
        }
    }
}
