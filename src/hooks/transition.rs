//! Transitions - low-priority, interruptible updates.
//!
//! Updates enqueued inside a transition render one component at a time and
//! yield to urgent work: an urgent update discards the in-progress pass,
//! commits, and the transition restarts from scratch. No partial state from
//! a discarded pass ever commits.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::engine::slot::{DeferredSlot, Slot, TransitionSlot, slot_kind_mismatch};
use crate::engine::{self};
use crate::pipeline::{render, scheduler};
use crate::types::{Lane, eq_impl};

// =============================================================================
// start_transition
// =============================================================================

/// Run `updates` with every enqueued update tagged as transition work.
pub fn start_transition(updates: impl FnOnce()) {
    scheduler::with_lane(Lane::Transition, updates);
}

/// Handle returned by [`use_transition`]; starts transitions whose pending
/// state this instance can observe.
pub struct TransitionHandle {
    flag: Rc<Cell<bool>>,
}

impl Clone for TransitionHandle {
    fn clone(&self) -> Self {
        TransitionHandle { flag: self.flag.clone() }
    }
}

impl TransitionHandle {
    /// Mark this transition pending, run `updates` under the transition
    /// lane, and schedule both the urgent re-render (so the pending flag
    /// shows) and the transition work itself.
    pub fn start(&self, updates: impl FnOnce()) {
        self.flag.set(true);
        scheduler::register_inflight(self.flag.clone());
        scheduler::force(Lane::Urgent);
        scheduler::with_lane(Lane::Transition, updates);
        scheduler::force(Lane::Transition);
    }
}

/// Declare a transition for this instance: `(is_pending, handle)`.
///
/// `is_pending` is true from [`TransitionHandle::start`] until the
/// transition's updates commit (or its component unmounts).
pub fn use_transition() -> (bool, TransitionHandle) {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        engine::install(
            slot_ref,
            Slot::Transition(TransitionSlot { pending: Rc::new(Cell::new(false)) }),
        );
    }
    let flag = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Transition(t) => t.pending.clone(),
        other => slot_kind_mismatch("transition", other),
    });
    (flag.get(), TransitionHandle { flag })
}

// =============================================================================
// use_deferred_value
// =============================================================================

/// Defer adopting a new value until a transition pass renders it.
///
/// During an urgent pass this returns the previously committed value, so
/// content that already has a committed result keeps showing it instead of
/// any pending placeholder; a transition pass (scheduled here) catches up
/// to the latest value.
pub fn use_deferred_value<T: Clone + PartialEq + 'static>(value: T) -> T {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        let rendered: Rc<dyn Any> = Rc::new(value.clone());
        engine::install(
            slot_ref,
            Slot::Deferred(DeferredSlot {
                current: rendered.clone(),
                rendered: Some(rendered),
                eq: eq_impl::<T>,
            }),
        );
        return value;
    }

    let (current, eq) = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Deferred(d) => (d.current.clone(), d.eq),
        other => slot_kind_mismatch("deferred", other),
    });

    let unchanged = eq(&*current, &value);
    let adopt_now = unchanged || render::pass_lane() == Some(Lane::Transition);

    if adopt_now {
        let rendered: Rc<dyn Any> = Rc::new(value.clone());
        engine::with_slot(slot_ref, |slot| match slot {
            Slot::Deferred(d) => d.rendered = Some(rendered),
            other => slot_kind_mismatch("deferred", other),
        });
        return value;
    }

    // Urgent pass with a newer value: keep showing the committed one and
    // let a transition pass adopt the new value.
    engine::with_slot(slot_ref, |slot| match slot {
        Slot::Deferred(d) => d.rendered = Some(current.clone()),
        other => slot_kind_mismatch("deferred", other),
    });
    scheduler::force(Lane::Transition);
    current
        .downcast_ref::<T>()
        .expect("deferred slot holds the declared type")
        .clone()
}
