//! Instance Registry - index allocation for component instances.
//!
//! Manages the lifecycle of instance indices:
//! - Path ↔ Index bidirectional mapping (identity is tree position)
//! - Free index pool for O(1) reuse
//! - Current-instance tracking while a body executes
//!
//! Borrows are kept short: no user closure ever runs while the instance
//! table is borrowed.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::types::{InstanceFlags, Path};

use super::Instance;

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Instance storage; `None` entries are free.
    static INSTANCES: RefCell<Vec<Option<Instance>>> = const { RefCell::new(Vec::new()) };

    /// Map tree position to instance index.
    static PATH_TO_INDEX: RefCell<HashMap<Path, usize>> = RefCell::new(HashMap::new());

    /// Pool of freed indices for reuse.
    static FREE_INDICES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };

    /// Instance whose body is currently executing, if any.
    static CURRENT: RefCell<Option<usize>> = const { RefCell::new(None) };
}

// =============================================================================
// Allocation
// =============================================================================

/// Get the instance for a tree position, creating it if absent.
///
/// Returns `(index, created)`.
pub(crate) fn acquire(path: &Path) -> (usize, bool) {
    let existing = PATH_TO_INDEX.with(|map| map.borrow().get(path).copied());
    if let Some(index) = existing {
        return (index, false);
    }

    let instance = Instance::new(path.clone());
    let index = INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        match FREE_INDICES.with(|free| free.borrow_mut().pop()) {
            Some(index) => {
                instances[index] = Some(instance);
                index
            }
            None => {
                instances.push(Some(instance));
                instances.len() - 1
            }
        }
    });
    PATH_TO_INDEX.with(|map| {
        map.borrow_mut().insert(path.clone(), index);
    });
    (index, true)
}

/// Release an index back to the pool. Slots (and their queued updates,
/// cleanups, handles) are dropped here.
pub(crate) fn release(index: usize) {
    let removed = INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        instances.get_mut(index).and_then(Option::take)
    });
    let Some(instance) = removed else { return };

    PATH_TO_INDEX.with(|map| {
        map.borrow_mut().remove(&instance.path);
    });
    FREE_INDICES.with(|free| {
        free.borrow_mut().push(index);
    });

    // When the last instance goes away, drop the backing storage too.
    let is_empty = PATH_TO_INDEX.with(|map| map.borrow().is_empty());
    if is_empty {
        INSTANCES.with(|instances| instances.borrow_mut().clear());
        FREE_INDICES.with(|free| free.borrow_mut().clear());
    }
}

// =============================================================================
// Access
// =============================================================================

/// Run `f` with mutable access to the instance at `index`.
///
/// Panics if the index is not allocated; the closure must not re-enter the
/// registry for the same instance.
pub(crate) fn with_instance<R>(index: usize, f: impl FnOnce(&mut Instance) -> R) -> R {
    INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        let instance = instances
            .get_mut(index)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("instance {index} is not allocated"));
        f(instance)
    })
}

/// Like [`with_instance`], but returns `None` for a released index.
/// Used by setters that may outlive their component.
pub(crate) fn try_with_instance<R>(
    index: usize,
    f: impl FnOnce(&mut Instance) -> R,
) -> Option<R> {
    INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        instances.get_mut(index).and_then(Option::as_mut).map(f)
    })
}

/// Whether an index currently holds a live instance.
pub(crate) fn is_allocated(index: usize) -> bool {
    INSTANCES.with(|instances| {
        instances
            .borrow()
            .get(index)
            .map(Option::is_some)
            .unwrap_or(false)
    })
}

/// All currently allocated indices.
pub(crate) fn allocated_indices() -> Vec<usize> {
    INSTANCES.with(|instances| {
        instances
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    })
}

/// Indices of instances that have committed at least once.
pub(crate) fn mounted_indices() -> Vec<usize> {
    INSTANCES.with(|instances| {
        instances
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(inst) if inst.flags.contains(InstanceFlags::MOUNTED) => Some(i),
                _ => None,
            })
            .collect()
    })
}

// =============================================================================
// Current Instance
// =============================================================================

/// Set (or clear) the instance whose body is executing.
pub(crate) fn set_current(index: Option<usize>) {
    CURRENT.with(|current| *current.borrow_mut() = index);
}

pub(crate) fn current() -> Option<usize> {
    CURRENT.with(|current| *current.borrow())
}

/// Index of the instance whose body is executing.
///
/// Panics when called outside a component body - hooks have no identity
/// there.
pub(crate) fn expect_current() -> usize {
    current().expect("hook called outside a component body")
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Reset all registry state.
pub(crate) fn reset() {
    INSTANCES.with(|instances| instances.borrow_mut().clear());
    PATH_TO_INDEX.with(|map| map.borrow_mut().clear());
    FREE_INDICES.with(|free| free.borrow_mut().clear());
    CURRENT.with(|current| *current.borrow_mut() = None);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_idempotent_per_path() {
        reset();

        let (a, created_a) = acquire(&vec![0]);
        let (b, created_b) = acquire(&vec![0, 1]);
        let (a2, created_a2) = acquire(&vec![0]);

        assert!(created_a);
        assert!(created_b);
        assert!(!created_a2);
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn release_and_reuse() {
        reset();

        let (a, _) = acquire(&vec![0]);
        let (_b, _) = acquire(&vec![1]);

        release(a);
        assert!(!is_allocated(a));

        // Freed index is reused for the next position.
        let (c, created) = acquire(&vec![2]);
        assert!(created);
        assert_eq!(c, a);
    }

    #[test]
    fn current_tracking() {
        reset();

        assert_eq!(current(), None);
        set_current(Some(3));
        assert_eq!(current(), Some(3));
        set_current(None);
        assert_eq!(current(), None);
    }

    #[test]
    #[should_panic(expected = "outside a component body")]
    fn expect_current_outside_render_panics() {
        reset();
        expect_current();
    }
}
