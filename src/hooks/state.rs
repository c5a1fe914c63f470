//! State cells - per-instance persistent values with queued updates.
//!
//! The setter never mutates in place: it enqueues a replacement value or an
//! updater and schedules a render. Queued entries are folded left-to-right
//! against the last committed value when the pass starts, so reads inside
//! the currently executing render stay intentionally stale.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::warn;

use crate::engine::slot::{PendingUpdate, Slot, StateSlot, UpdateOp, slot_kind_mismatch};
use crate::engine::{self, SlotRef};
use crate::pipeline::scheduler;
use crate::types::eq_impl;

// =============================================================================
// use_state
// =============================================================================

/// Declare a state cell holding `initial` on the first render of the owning
/// instance. Returns the current value and its setter.
///
/// The value returned here is the one committed before this pass began;
/// calling the setter does not change it until the next render.
pub fn use_state<T: Clone + PartialEq + 'static>(initial: T) -> (T, SetState<T>) {
    use_state_with(move || initial)
}

/// Lazy form of [`use_state`]: `init` is invoked exactly once, at the first
/// render of the owning instance, never again.
pub fn use_state_with<T: Clone + PartialEq + 'static>(
    init: impl FnOnce() -> T,
) -> (T, SetState<T>) {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        // Initializer runs without the instance table borrowed.
        let value: Rc<dyn Any> = Rc::new(init());
        engine::install(
            slot_ref,
            Slot::State(StateSlot {
                committed: value,
                render_value: None,
                queue: Vec::new(),
                in_flight: Vec::new(),
                eq: eq_impl::<T>,
            }),
        );
    }

    let value = engine::with_slot(slot_ref, |slot| match slot {
        Slot::State(cell) => cell
            .render_value
            .clone()
            .unwrap_or_else(|| cell.committed.clone()),
        other => slot_kind_mismatch("state", other),
    });
    let value = value
        .downcast_ref::<T>()
        .expect("state slot holds the declared type")
        .clone();

    (value, SetState { slot: slot_ref, _marker: PhantomData })
}

// =============================================================================
// SetState
// =============================================================================

/// Setter for one state cell. Cheap to copy and safe to move into
/// callbacks; calls after the owning instance unmounted are ignored with a
/// warning.
pub struct SetState<T> {
    slot: SlotRef,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SetState<T> {}

impl<T: 'static> SetState<T> {
    /// Enqueue a replacement value.
    pub fn set(&self, value: T) {
        self.enqueue(UpdateOp::Replace(Rc::new(value)));
    }

    /// Enqueue an updater applied to the pending value (the fold chain, not
    /// the value visible in the currently executing render).
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.enqueue(UpdateOp::Map(Rc::new(move |pending: &dyn Any| {
            let pending = pending
                .downcast_ref::<T>()
                .expect("state slot holds the declared type");
            Rc::new(f(pending)) as Rc<dyn Any>
        })));
    }

    fn enqueue(&self, op: UpdateOp) {
        let lane = scheduler::current_lane();
        let delivered = engine::try_with_slot(self.slot, |slot| match slot {
            Slot::State(cell) => cell.queue.push(PendingUpdate { lane, op }),
            other => slot_kind_mismatch("state", other),
        });
        match delivered {
            Some(()) => scheduler::mark_dirty(lane),
            None => warn!("state update dropped: owning instance unmounted"),
        }
    }
}
