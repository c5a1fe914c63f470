//! Reducer cells - state driven by `(state, action) -> state` functions.
//!
//! Dispatch enqueues the action; the reducer runs when the pass folds its
//! queue, in dispatch order. A reducer that does not recognize an action
//! returns `Err`, which surfaces as
//! [`RuntimeError::ReducerRejected`](crate::RuntimeError::ReducerRejected)
//! from the flush - never a silent no-op.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::warn;

use crate::engine::slot::{PendingAction, ReducerSlot, Slot, slot_kind_mismatch};
use crate::engine::{self, SlotRef};
use crate::pipeline::scheduler;
use crate::types::eq_impl;

// =============================================================================
// use_reducer
// =============================================================================

/// Declare a reducer cell with `initial` state.
///
/// `reducer` must be pure. Returning `Err` rejects the action loudly.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, &A) -> Result<S, String> + 'static,
    initial: S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    use_reducer_with_init(reducer, initial, |s| s)
}

/// Reducer cell with an initializer: `init(arg)` produces the initial state,
/// invoked exactly once at the first render of the owning instance.
pub fn use_reducer_with_init<S, A, I>(
    reducer: impl Fn(&S, &A) -> Result<S, String> + 'static,
    arg: I,
    init: impl FnOnce(I) -> S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        let value: Rc<dyn Any> = Rc::new(init(arg));
        let erased = Rc::new(move |state: &dyn Any, action: &dyn Any| {
            let state = state
                .downcast_ref::<S>()
                .expect("reducer slot holds the declared state type");
            let action = action
                .downcast_ref::<A>()
                .expect("dispatched action matches the declared action type");
            reducer(state, action).map(|next| Rc::new(next) as Rc<dyn Any>)
        });
        engine::install(
            slot_ref,
            Slot::Reducer(ReducerSlot {
                committed: value,
                render_value: None,
                queue: Vec::new(),
                in_flight: Vec::new(),
                reducer: erased,
                eq: eq_impl::<S>,
            }),
        );
    }

    let value = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Reducer(cell) => cell
            .render_value
            .clone()
            .unwrap_or_else(|| cell.committed.clone()),
        other => slot_kind_mismatch("reducer", other),
    });
    let value = value
        .downcast_ref::<S>()
        .expect("reducer slot holds the declared state type")
        .clone();

    (value, Dispatch { slot: slot_ref, _marker: PhantomData })
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatcher for one reducer cell. Cheap to copy; dispatches after the
/// owning instance unmounted are ignored with a warning.
pub struct Dispatch<A> {
    slot: SlotRef,
    _marker: PhantomData<fn(A)>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for Dispatch<A> {}

impl<A: 'static> Dispatch<A> {
    /// Enqueue an action for the next fold.
    pub fn dispatch(&self, action: A) {
        let lane = scheduler::current_lane();
        let delivered = engine::try_with_slot(self.slot, |slot| match slot {
            Slot::Reducer(cell) => cell.queue.push(PendingAction {
                lane,
                action: Rc::new(action),
            }),
            other => slot_kind_mismatch("reducer", other),
        });
        match delivered {
            Some(()) => scheduler::mark_dirty(lane),
            None => warn!("dispatch dropped: owning instance unmounted"),
        }
    }
}
