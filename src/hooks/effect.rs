//! Effect registration - side effects with dependency arrays.
//!
//! Effects are recorded during render and decided at commit: a changed
//! dependency list (or no list at all) re-runs cleanup-then-setup; an
//! unchanged list drops this render's setup closure and keeps the old
//! cleanup. Timing classes are described on [`TimingClass`].

use crate::engine::slot::{EffectSlot, PendingEffect, Slot, slot_kind_mismatch};
use crate::engine::{self};
use crate::types::{Cleanup, Deps, TimingClass};

/// Deferred effect: runs after paint, grouped all-cleanups then all-setups
/// with the other passive effects of the commit.
pub fn use_effect(deps: Deps, setup: impl FnOnce() -> Option<Cleanup> + 'static) {
    register_effect(TimingClass::Passive, deps, setup);
}

/// Layout effect: runs after host mutation, before paint. Cleanups for all
/// affected components run first, then all setups.
pub fn use_layout_effect(deps: Deps, setup: impl FnOnce() -> Option<Cleanup> + 'static) {
    register_effect(TimingClass::Layout, deps, setup);
}

/// Insertion effect: runs before host mutation is observable, cleanup and
/// setup interleaved per component.
pub fn use_insertion_effect(deps: Deps, setup: impl FnOnce() -> Option<Cleanup> + 'static) {
    register_effect(TimingClass::Insertion, deps, setup);
}

pub(crate) fn register_effect(
    timing: TimingClass,
    deps: Deps,
    setup: impl FnOnce() -> Option<Cleanup> + 'static,
) {
    let (slot_ref, fresh) = engine::advance_cursor();
    let pending = PendingEffect { deps, setup: Box::new(setup) };
    if fresh {
        engine::install(
            slot_ref,
            Slot::Effect(EffectSlot {
                timing,
                deps: None,
                cleanup: None,
                pending: Some(pending),
            }),
        );
        return;
    }
    engine::with_slot(slot_ref, |slot| match slot {
        Slot::Effect(effect) => {
            // Under strict mode the body runs twice; the second recording wins.
            effect.pending = Some(pending);
        }
        other => slot_kind_mismatch("effect", other),
    });
}
