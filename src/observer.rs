//! Observer-list fan-out
//!
//! Every publishing component (frame sources, the device registry) owns one
//! or more `Observers<T>` lists. Subscribers register a callback and get back
//! a token used for unregistration, in the style of a broadcast subscriber
//! handle.
//!
//! Two locks with distinct roles:
//! - the slot lock guards the subscriber list and is never held while a
//!   callback runs, so a slow callback cannot block registration;
//! - the dispatch lock serializes emits and is taken (and immediately
//!   released) by `unsubscribe`, so once `unsubscribe` returns the callback
//!   will never run again.
//!
//! Callbacks must not subscribe to or unsubscribe from the same list they are
//! invoked by; route such work through a queue to another context instead.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Token identifying one registered callback.
pub type SubscriptionId = u64;

/// Shareable callback invoked with a borrowed event.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Observers<T> {
    next_id: AtomicU64,
    slots: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
    dispatch: Mutex<()>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Vec::new()),
            dispatch: Mutex::new(()),
        }
    }

    /// Register a callback. Safe to call while an emit is in progress; the
    /// callback starts receiving from the next emit.
    pub fn subscribe(&self, callback: Callback<T>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push((id, callback));
        id
    }

    /// Remove a callback. Blocks until any in-flight emit has finished, so
    /// after this returns the callback is guaranteed not to run.
    ///
    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            let before = slots.len();
            slots.retain(|(slot_id, _)| *slot_id != id);
            slots.len() != before
        };
        // Wait out a dispatch that may still be invoking the callback.
        drop(self.dispatch.lock());
        removed
    }

    /// Invoke every registered callback with `value`, in registration order.
    /// Emits on the same list never interleave.
    pub fn emit(&self, value: &T) {
        let _serial = self.dispatch.lock();
        let snapshot: Vec<Callback<T>> = self
            .slots
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
