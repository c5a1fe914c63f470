//! External store bridge.
//!
//! Reconciles an external mutable source with the render cycle. The bridge
//! re-reads the snapshot on every render attempt; if the source moved while
//! a pass was in progress, the runtime retries the pass synchronously
//! before anything becomes visible, so two consumers can never show
//! different snapshots in one commit (no tearing).
//!
//! The bridge never writes to the store: single writer (the outside world),
//! many readers (mounted consumers).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::engine::slot::{Slot, StoreSlot, slot_kind_mismatch};
use crate::engine::{self};
use crate::pipeline::render;
use crate::types::eq_impl;

// =============================================================================
// ExternalStore
// =============================================================================

struct StoreInner<T> {
    value: RefCell<T>,
    listeners: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
    next_listener: Cell<u64>,
}

/// A concrete external source: owned value plus a listener registry.
/// Snapshot reads are pure and synchronous; mutation notifies listeners.
pub struct ExternalStore<T> {
    inner: Rc<StoreInner<T>>,
}

impl<T> Clone for ExternalStore<T> {
    fn clone(&self) -> Self {
        ExternalStore { inner: self.inner.clone() }
    }
}

impl<T: Clone + 'static> ExternalStore<T> {
    pub fn new(value: T) -> Self {
        ExternalStore {
            inner: Rc::new(StoreInner {
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// Immutable read of the current value.
    pub fn snapshot(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Register a change listener; the returned closure unregisters it.
    /// Subscribing and unsubscribing repeatedly leaves no residue.
    pub fn subscribe(&self, listener: Rc<dyn Fn()>) -> Box<dyn FnOnce()> {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));

        let inner = self.inner.clone();
        Box::new(move || {
            inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
        })
    }

    /// Number of registered listeners (for leak assertions).
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self) {
        // Collect first: a listener may unsubscribe while running.
        let listeners: Vec<Rc<dyn Fn()>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

// =============================================================================
// use_sync_external_store
// =============================================================================

/// Subscribe this instance to an external source and read its snapshot.
///
/// `subscribe` is invoked once, when the consumer mounts, with a callback
/// that schedules an urgent render; the unsubscribe closure it returns runs
/// exactly once at unmount. `get_snapshot` is captured at mount and
/// re-invoked on every render attempt.
pub fn use_sync_external_store<T, Sub, Snap>(subscribe: Sub, get_snapshot: Snap) -> T
where
    T: Clone + PartialEq + 'static,
    Snap: Fn() -> T + 'static,
    Sub: Fn(Rc<dyn Fn()>) -> Box<dyn FnOnce()> + 'static,
{
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        let get: Rc<dyn Fn() -> Rc<dyn Any>> =
            Rc::new(move || Rc::new(get_snapshot()) as Rc<dyn Any>);
        let snapshot = get();
        engine::install(
            slot_ref,
            Slot::Store(StoreSlot {
                rendered: snapshot,
                get_snapshot: get,
                subscribe: Rc::new(subscribe),
                unsubscribe: None,
                alive: Rc::new(Cell::new(true)),
                eq: eq_impl::<T>,
            }),
        );
    } else {
        // Re-read through the closure captured at mount; the ones passed on
        // this render are dropped.
        let get = engine::with_slot(slot_ref, |slot| match slot {
            Slot::Store(store) => store.get_snapshot.clone(),
            other => slot_kind_mismatch("store", other),
        });
        let snapshot = get();
        engine::with_slot(slot_ref, |slot| match slot {
            Slot::Store(store) => store.rendered = snapshot,
            other => slot_kind_mismatch("store", other),
        });
    }

    render::record_store_read(slot_ref);

    let rendered = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Store(store) => store.rendered.clone(),
        other => slot_kind_mismatch("store", other),
    });
    rendered
        .downcast_ref::<T>()
        .expect("store slot holds the snapshot type")
        .clone()
}

/// [`use_sync_external_store`] wired to an [`ExternalStore`].
pub fn use_store<T: Clone + PartialEq + 'static>(store: &ExternalStore<T>) -> T {
    let for_subscribe = store.clone();
    let for_snapshot = store.clone();
    use_sync_external_store(
        move |listener| for_subscribe.subscribe(listener),
        move || for_snapshot.snapshot(),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_unsubscribe_leaves_no_residue() {
        let store = ExternalStore::new(0);
        assert_eq!(store.listener_count(), 0);

        let unsub_a = store.subscribe(Rc::new(|| {}));
        let unsub_b = store.subscribe(Rc::new(|| {}));
        assert_eq!(store.listener_count(), 2);

        unsub_a();
        assert_eq!(store.listener_count(), 1);
        unsub_b();
        assert_eq!(store.listener_count(), 0);

        // Toggling again registers cleanly.
        let unsub_c = store.subscribe(Rc::new(|| {}));
        assert_eq!(store.listener_count(), 1);
        unsub_c();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn set_notifies_every_listener() {
        let store = ExternalStore::new(1);
        let hits = Rc::new(Cell::new(0));

        let h1 = hits.clone();
        let _keep_a = store.subscribe(Rc::new(move || h1.set(h1.get() + 1)));
        let h2 = hits.clone();
        let _keep_b = store.subscribe(Rc::new(move || h2.set(h2.get() + 1)));

        store.set(2);
        assert_eq!(hits.get(), 2);
        assert_eq!(store.snapshot(), 2);

        store.update(|v| v + 10);
        assert_eq!(store.snapshot(), 12);
        assert_eq!(hits.get(), 4);
    }

    #[test]
    fn listener_may_unsubscribe_during_notify() {
        let store = ExternalStore::new(0);
        let unsub_cell: Rc<RefCell<Option<Box<dyn FnOnce()>>>> =
            Rc::new(RefCell::new(None));

        let cell = unsub_cell.clone();
        let unsub = store.subscribe(Rc::new(move || {
            if let Some(unsub) = cell.borrow_mut().take() {
                unsub();
            }
        }));
        *unsub_cell.borrow_mut() = Some(unsub);

        store.set(1); // must not panic on re-entrant borrow
        assert_eq!(store.listener_count(), 0);
    }
}
