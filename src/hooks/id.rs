//! Stable identifier allocation.
//!
//! Identifiers derive purely from tree position (instance path + hook
//! ordinal), never from a global counter: the same logical instance yields
//! the same identifier on the initial render, on any later render, and on
//! both sides of a producer/consumer boundary that agrees on tree shape.

use std::fmt::Write;

use crate::engine::slot::{IdSlot, Slot, slot_kind_mismatch};
use crate::engine::{self, registry};
use crate::types::Path;

/// A unique identifier for this call site, stable for the lifetime of the
/// owning instance and reproducible from tree shape alone.
pub fn use_id() -> String {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        let path = registry::with_instance(slot_ref.instance, |instance| {
            instance.path.clone()
        });
        engine::install(
            slot_ref,
            Slot::Id(IdSlot { id: position_id(&path, slot_ref.slot) }),
        );
    }
    engine::with_slot(slot_ref, |slot| match slot {
        Slot::Id(s) => s.id.clone(),
        other => slot_kind_mismatch("id", other),
    })
}

fn position_id(path: &Path, ordinal: usize) -> String {
    let mut id = String::from(":r");
    for segment in path {
        let _ = write!(id, "-{segment}");
    }
    let _ = write!(id, ":{ordinal}:");
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_from_position_only() {
        assert_eq!(position_id(&vec![], 0), ":r:0:");
        assert_eq!(position_id(&vec![0, 2], 1), ":r-0-2:1:");
        // Distinct ordinals at one position stay distinct.
        assert_ne!(position_id(&vec![1], 0), position_id(&vec![1], 1));
        // Same shape, same identifier - no counter involved.
        assert_eq!(position_id(&vec![3, 1], 2), position_id(&vec![3, 1], 2));
    }
}
