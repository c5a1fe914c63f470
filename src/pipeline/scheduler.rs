//! Scheduler state - lanes, dirty tracking, in-flight transitions.
//!
//! Single-threaded cooperative scheduling: all bookkeeping is thread-local.
//! "Concurrency" means interruptible, prioritized render work, not
//! parallelism. Urgent work drains synchronously; transition work advances
//! one component at a time and yields to urgent arrivals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::types::Lane;

// =============================================================================
// Scheduler State
// =============================================================================

thread_local! {
    /// Lane applied to updates enqueued right now.
    static CURRENT_LANE: Cell<Lane> = const { Cell::new(Lane::Urgent) };

    /// Urgent queue entries (or forced urgent work) await a flush.
    static URGENT_DIRTY: Cell<bool> = const { Cell::new(false) };

    /// Transition queue entries (or forced transition work) await a flush.
    static TRANSITION_DIRTY: Cell<bool> = const { Cell::new(false) };

    /// Render even when no folded value changed (mount, store notification,
    /// pending-flag change, deferred catch-up).
    static URGENT_FORCED: Cell<bool> = const { Cell::new(false) };
    static TRANSITION_FORCED: Cell<bool> = const { Cell::new(false) };

    /// Pending flags of transitions whose updates have not committed yet.
    static INFLIGHT: RefCell<Vec<Rc<Cell<bool>>>> = const { RefCell::new(Vec::new()) };
}

// =============================================================================
// Lanes
// =============================================================================

pub(crate) fn current_lane() -> Lane {
    CURRENT_LANE.with(|lane| lane.get())
}

/// Run `f` with updates tagged as `lane`.
pub(crate) fn with_lane<R>(lane: Lane, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_LANE.with(|current| current.replace(lane));
    let result = f();
    CURRENT_LANE.with(|current| current.set(previous));
    result
}

// =============================================================================
// Dirty Tracking
// =============================================================================

/// Note that `lane` has queued work.
pub(crate) fn mark_dirty(lane: Lane) {
    match lane {
        Lane::Urgent => URGENT_DIRTY.with(|dirty| dirty.set(true)),
        Lane::Transition => TRANSITION_DIRTY.with(|dirty| dirty.set(true)),
    }
}

/// Note that `lane` must render even if no folded value changes.
pub(crate) fn force(lane: Lane) {
    mark_dirty(lane);
    match lane {
        Lane::Urgent => URGENT_FORCED.with(|forced| forced.set(true)),
        Lane::Transition => TRANSITION_FORCED.with(|forced| forced.set(true)),
    }
}

pub(crate) fn is_dirty(lane: Lane) -> bool {
    match lane {
        Lane::Urgent => URGENT_DIRTY.with(|dirty| dirty.get()),
        Lane::Transition => TRANSITION_DIRTY.with(|dirty| dirty.get()),
    }
}

/// Clear the dirty + forced flags for `lane`, returning whether the work
/// was forced.
pub(crate) fn take_dirty(lane: Lane) -> bool {
    match lane {
        Lane::Urgent => {
            URGENT_DIRTY.with(|dirty| dirty.set(false));
            URGENT_FORCED.with(|forced| forced.replace(false))
        }
        Lane::Transition => {
            TRANSITION_DIRTY.with(|dirty| dirty.set(false));
            TRANSITION_FORCED.with(|forced| forced.replace(false))
        }
    }
}

// =============================================================================
// In-flight Transitions
// =============================================================================

/// Track the pending flag of a transition whose updates are now queued.
pub(crate) fn register_inflight(flag: Rc<Cell<bool>>) {
    INFLIGHT.with(|inflight| inflight.borrow_mut().push(flag));
}

/// A transition render pass is starting: the pass itself must observe
/// `is_pending == false`, so the committed tree never shows a stale
/// pending indicator.
pub(crate) fn begin_transition_pass() {
    INFLIGHT.with(|inflight| {
        for flag in inflight.borrow().iter() {
            flag.set(false);
        }
    });
}

/// The in-progress transition pass was discarded; its updates are still
/// queued, so the pending flags go back up.
pub(crate) fn abort_transition_pass() {
    INFLIGHT.with(|inflight| {
        for flag in inflight.borrow().iter() {
            flag.set(true);
        }
    });
}

/// The transition committed; the tracked flags are settled.
pub(crate) fn finish_transition() {
    INFLIGHT.with(|inflight| inflight.borrow_mut().clear());
}

// =============================================================================
// Reset (for testing)
// =============================================================================

pub(crate) fn reset() {
    CURRENT_LANE.with(|lane| lane.set(Lane::Urgent));
    URGENT_DIRTY.with(|dirty| dirty.set(false));
    TRANSITION_DIRTY.with(|dirty| dirty.set(false));
    URGENT_FORCED.with(|forced| forced.set(false));
    TRANSITION_FORCED.with(|forced| forced.set(false));
    INFLIGHT.with(|inflight| inflight.borrow_mut().clear());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_nesting_restores() {
        reset();
        assert_eq!(current_lane(), Lane::Urgent);
        with_lane(Lane::Transition, || {
            assert_eq!(current_lane(), Lane::Transition);
            with_lane(Lane::Urgent, || {
                assert_eq!(current_lane(), Lane::Urgent);
            });
            assert_eq!(current_lane(), Lane::Transition);
        });
        assert_eq!(current_lane(), Lane::Urgent);
    }

    #[test]
    fn dirty_and_forced_flags() {
        reset();
        assert!(!is_dirty(Lane::Urgent));

        mark_dirty(Lane::Urgent);
        assert!(is_dirty(Lane::Urgent));
        assert!(!take_dirty(Lane::Urgent)); // dirty but not forced
        assert!(!is_dirty(Lane::Urgent));

        force(Lane::Transition);
        assert!(is_dirty(Lane::Transition));
        assert!(take_dirty(Lane::Transition)); // forced
    }

    #[test]
    fn inflight_flags_follow_pass_lifecycle() {
        reset();
        let flag = Rc::new(Cell::new(true));
        register_inflight(flag.clone());

        begin_transition_pass();
        assert!(!flag.get());

        abort_transition_pass();
        assert!(flag.get());

        begin_transition_pass();
        finish_transition();
        assert!(!flag.get());
    }
}
