//! Component instances and their hook slots.
//!
//! An [`Instance`] is one logical occurrence of a component at a tree
//! position. It owns an ordered slot list populated by an incrementing
//! cursor that is reset at each invocation; slot identity is call order,
//! not name.

pub(crate) mod registry;
pub(crate) mod slot;

use crate::types::{InstanceFlags, Path};

use slot::Slot;

// =============================================================================
// Instance
// =============================================================================

pub(crate) struct Instance {
    /// Tree position: parent path + sibling index.
    pub path: Path,
    /// Ordered hook slots, indexed by call order.
    pub slots: Vec<Slot>,
    /// Next slot to claim; reset at each invocation.
    pub cursor: usize,
    pub flags: InstanceFlags,
}

impl Instance {
    pub(crate) fn new(path: Path) -> Self {
        Instance {
            path,
            slots: Vec::new(),
            cursor: 0,
            flags: InstanceFlags::empty(),
        }
    }
}

// =============================================================================
// Slot Claiming
// =============================================================================

/// Stable address of one hook slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub instance: usize,
    pub slot: usize,
}

/// Claim the next slot position for the currently rendering instance.
///
/// Returns the slot address and whether the slot still has to be created
/// (first render of this call site). Creation is a separate step
/// ([`install`]) so initializers can run without the registry borrowed.
///
/// Panics when called outside a body, or when a previously committed
/// instance grows new hook positions (stable-call-order violation).
pub(crate) fn advance_cursor() -> (SlotRef, bool) {
    let index = registry::expect_current();
    registry::with_instance(index, |instance| {
        let position = instance.cursor;
        instance.cursor += 1;
        let fresh = position == instance.slots.len();
        if fresh && instance.flags.contains(InstanceFlags::MOUNTED) {
            panic!(
                "hook order violation: instance at {:?} rendered more hooks than \
                 it committed with ({} so far, {} recorded)",
                instance.path,
                position + 1,
                instance.slots.len()
            );
        }
        (SlotRef { instance: index, slot: position }, fresh)
    })
}

/// Install a freshly created slot at the position claimed by
/// [`advance_cursor`].
pub(crate) fn install(slot_ref: SlotRef, slot: Slot) {
    registry::with_instance(slot_ref.instance, |instance| {
        assert_eq!(
            instance.slots.len(),
            slot_ref.slot,
            "slot installed out of order"
        );
        instance.slots.push(slot);
    });
}

/// Run `f` with mutable access to one slot. The closure must not run user
/// code that could re-enter the registry.
pub(crate) fn with_slot<R>(slot_ref: SlotRef, f: impl FnOnce(&mut Slot) -> R) -> R {
    registry::with_instance(slot_ref.instance, |instance| {
        let slot = instance
            .slots
            .get_mut(slot_ref.slot)
            .expect("slot reference out of range");
        f(slot)
    })
}

/// Like [`with_slot`], but tolerates a released instance (setters may
/// outlive their component).
pub(crate) fn try_with_slot<R>(
    slot_ref: SlotRef,
    f: impl FnOnce(&mut Slot) -> R,
) -> Option<R> {
    registry::try_with_instance(slot_ref.instance, |instance| {
        instance.slots.get_mut(slot_ref.slot).map(f)
    })
    .flatten()
}

/// Reset the cursor before a body invocation.
pub(crate) fn begin_invocation(index: usize) {
    registry::with_instance(index, |instance| {
        instance.cursor = 0;
    });
}

/// Verify the invocation claimed every recorded slot.
///
/// A committed instance that renders fewer hooks than it committed with is
/// the other half of the stable-call-order contract.
pub(crate) fn finish_invocation(index: usize) {
    registry::with_instance(index, |instance| {
        if instance.flags.contains(InstanceFlags::MOUNTED)
            && instance.cursor != instance.slots.len()
        {
            panic!(
                "hook order violation: instance at {:?} rendered {} hooks, \
                 previously committed with {}",
                instance.path,
                instance.cursor,
                instance.slots.len()
            );
        }
    });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::slot::{IdSlot, Slot};
    use super::*;

    fn make_instance() -> usize {
        registry::reset();
        let (index, _) = registry::acquire(&vec![0]);
        registry::set_current(Some(index));
        index
    }

    #[test]
    fn claim_install_and_reuse() {
        let index = make_instance();

        begin_invocation(index);
        let (slot_ref, fresh) = advance_cursor();
        assert!(fresh);
        install(slot_ref, Slot::Id(IdSlot { id: "a".into() }));

        // Second invocation finds the slot in place.
        begin_invocation(index);
        let (slot_ref2, fresh2) = advance_cursor();
        assert_eq!(slot_ref, slot_ref2);
        assert!(!fresh2);

        let id = with_slot(slot_ref2, |slot| match slot {
            Slot::Id(s) => s.id.clone(),
            _ => unreachable!(),
        });
        assert_eq!(id, "a");
        registry::set_current(None);
    }

    #[test]
    #[should_panic(expected = "hook order violation")]
    fn extra_hook_after_commit_panics() {
        let index = make_instance();

        begin_invocation(index);
        let (slot_ref, _) = advance_cursor();
        install(slot_ref, Slot::Id(IdSlot { id: "a".into() }));
        registry::with_instance(index, |instance| {
            instance.flags.insert(InstanceFlags::MOUNTED);
        });

        begin_invocation(index);
        let _ = advance_cursor();
        let _ = advance_cursor(); // one more than committed
    }

    #[test]
    #[should_panic(expected = "hook order violation")]
    fn missing_hook_after_commit_panics() {
        let index = make_instance();

        begin_invocation(index);
        let (slot_ref, _) = advance_cursor();
        install(slot_ref, Slot::Id(IdSlot { id: "a".into() }));
        registry::with_instance(index, |instance| {
            instance.flags.insert(InstanceFlags::MOUNTED);
        });

        begin_invocation(index);
        finish_invocation(index); // claimed zero of one slot
    }
}
