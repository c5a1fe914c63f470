//! Memoization - cached computations and stable callable identities.

use std::any::Any;
use std::rc::Rc;

use crate::engine::slot::{MemoSlot, Slot, slot_kind_mismatch};
use crate::engine::{self};
use crate::types::Deps;

/// Cache `compute()` until `deps` change (pairwise, by position).
///
/// `Deps::none()` recomputes every render; `Deps::empty()` computes once
/// per instance lifetime.
pub fn use_memo<T: Clone + 'static>(deps: Deps, compute: impl FnOnce() -> T) -> T {
    let value = memo_value(deps, move || Rc::new(compute()) as Rc<dyn Any>);
    value
        .downcast_ref::<T>()
        .expect("memo slot holds the computed type")
        .clone()
}

/// Keep a stable `Rc` identity for a callable until `deps` change.
///
/// The callable itself is arbitrary; the point is that the returned `Rc`
/// compares pointer-equal across renders while the deps are unchanged.
pub fn use_callback<F: 'static>(deps: Deps, f: F) -> Rc<F> {
    let value = memo_value(deps, move || Rc::new(f) as Rc<dyn Any>);
    value
        .downcast::<F>()
        .ok()
        .expect("callback slot holds the declared closure type")
}

fn memo_value(deps: Deps, produce: impl FnOnce() -> Rc<dyn Any>) -> Rc<dyn Any> {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        // Compute runs without the instance table borrowed.
        let value = produce();
        engine::install(
            slot_ref,
            Slot::Memo(MemoSlot { value: value.clone(), deps }),
        );
        return value;
    }

    let (changed, cached) = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Memo(memo) => (deps.changed_from(Some(&memo.deps)), memo.value.clone()),
        other => slot_kind_mismatch("memo", other),
    });
    if !changed {
        return cached;
    }

    let value = produce();
    engine::with_slot(slot_ref, |slot| match slot {
        Slot::Memo(memo) => {
            memo.value = value.clone();
            memo.deps = deps;
        }
        other => slot_kind_mismatch("memo", other),
    });
    value
}
