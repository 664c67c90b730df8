//! Observer registry with per-registration cancellation.
//!
//! Every `subscribe` hands back a [`Subscription`] that removes exactly that
//! registration, either explicitly via `cancel` or on drop. A panicking
//! observer is caught and logged; delivery continues to the others.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Slots<T> = Arc<Mutex<BTreeMap<u64, Callback<T>>>>;

pub struct ObserverRegistry<T> {
    slots: Slots<T>,
    next_id: AtomicU64,
}

impl<T: 'static> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an observer and returns its cancellation handle.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(id, Arc::new(callback));
        let slots: Weak<dyn SlotMap> =
            Arc::downgrade(&(Arc::clone(&self.slots) as Arc<dyn SlotMap>));
        Subscription {
            id,
            slots,
            teardown: None,
        }
    }

    /// Delivers `value` to every observer in registration order. The slot
    /// lock is released before invoking callbacks so observers may subscribe
    /// or cancel reentrantly.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<(u64, Callback<T>)> = self
            .slots
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!("observer {id} panicked; continuing delivery");
            }
        }
    }

    pub fn count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Drops every registration. Outstanding `Subscription` handles become
    /// harmless no-ops.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl<T: 'static> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased removal so `Subscription` does not carry the payload type.
trait SlotMap: Send + Sync {
    fn remove(&self, id: u64);
}

impl<T> SlotMap for Mutex<BTreeMap<u64, Callback<T>>> {
    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }
}

/// Capability that deregisters exactly one observer. Cancels on drop.
pub struct Subscription {
    id: u64,
    slots: Weak<dyn SlotMap>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Runs `f` after this registration has been removed. Used for
    /// reference-counted activation (stop the ticker when the last observer
    /// leaves).
    pub fn with_teardown(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(f));
        self
    }

    pub fn cancel(self) {
        // Drop runs the actual release.
    }

    fn release(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.remove(self.id);
        }
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
