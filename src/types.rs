//! Core shared types: lanes, effect timing, dependency values, instance flags.
//!
//! These types define the foundation that everything builds on. They flow
//! through the scheduler and commit pipeline and define what the hooks
//! understand.

use std::any::Any;
use std::rc::Rc;

use bitflags::bitflags;

/// Tree position of an instance: sibling indices from the root.
pub type Path = Vec<usize>;

/// Cleanup closure returned by an effect setup.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Lanes
// =============================================================================

/// Priority class for a scheduled update.
///
/// Urgent work commits synchronously and may interrupt transition work.
/// Transition work renders one component at a time and can be discarded
/// and restarted when urgent work arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Urgent,
    Transition,
}

// =============================================================================
// Effect Timing
// =============================================================================

/// When an effect runs relative to the host commit.
///
/// - `Insertion`: before host mutation is observable; cleanup and setup
///   interleaved per component.
/// - `Layout`: after host mutation, before paint; all cleanups across the
///   affected components, then all setups.
/// - `Passive`: after paint; same two-pass grouping as `Layout`, drained at
///   the end of the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingClass {
    Insertion,
    Layout,
    Passive,
}

// =============================================================================
// Dependency Values
// =============================================================================

pub(crate) type EqFn = fn(&dyn Any, &dyn Any) -> bool;

pub(crate) fn eq_impl<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A type-erased dependency entry, compared with the `PartialEq` of the
/// concrete type it was built from.
#[derive(Clone)]
pub struct Dep {
    value: Rc<dyn Any>,
    eq: EqFn,
}

impl Dep {
    pub fn of<T: PartialEq + 'static>(value: T) -> Self {
        Dep {
            value: Rc::new(value),
            eq: eq_impl::<T>,
        }
    }

    fn same_as(&self, other: &Dep) -> bool {
        (self.eq)(&*self.value, &*other.value)
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dep(..)")
    }
}

/// Dependency declaration for effects and memoized values.
///
/// - [`Deps::none`] - no dependency array: re-run on every commit.
/// - [`Deps::empty`] - empty array: run once at mount, cleanup at unmount.
/// - [`Deps::list`] / [`deps!`](crate::deps) - compare pairwise by position.
#[derive(Clone, Debug)]
pub enum Deps {
    Always,
    List(Vec<Dep>),
}

impl Deps {
    /// No dependency array: the effect re-runs on every commit.
    pub fn none() -> Self {
        Deps::Always
    }

    /// Empty dependency array: mount-only setup, unmount-only cleanup.
    pub fn empty() -> Self {
        Deps::List(Vec::new())
    }

    pub fn list(entries: Vec<Dep>) -> Self {
        Deps::List(entries)
    }

    /// Whether a re-run is due given the previously stored deps.
    /// `previous == None` means the effect has never run.
    pub(crate) fn changed_from(&self, previous: Option<&Deps>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        match (self, previous) {
            (Deps::Always, _) | (_, Deps::Always) => true,
            (Deps::List(now), Deps::List(then)) => {
                now.len() != then.len()
                    || now.iter().zip(then.iter()).any(|(a, b)| !a.same_as(b))
            }
        }
    }
}

/// Build a [`Deps::List`] from comparable values.
///
/// ```ignore
/// use_effect(deps![count, name.clone()], move || { ... });
/// ```
#[macro_export]
macro_rules! deps {
    () => { $crate::Deps::empty() };
    ($($value:expr),+ $(,)?) => {
        $crate::Deps::list(vec![$($crate::Dep::of($value)),+])
    };
}

// =============================================================================
// Instance Flags
// =============================================================================

bitflags! {
    /// Lifecycle flags carried by each instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstanceFlags: u8 {
        /// Committed at least once; slot layout is now locked.
        const MOUNTED = 1 << 0;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_pairwise_comparison() {
        let a = Deps::list(vec![Dep::of(1), Dep::of("x")]);
        let b = Deps::list(vec![Dep::of(1), Dep::of("x")]);
        let c = Deps::list(vec![Dep::of(2), Dep::of("x")]);

        assert!(!a.changed_from(Some(&b)));
        assert!(a.changed_from(Some(&c)));
        // Length mismatch counts as changed.
        assert!(a.changed_from(Some(&Deps::list(vec![Dep::of(1)]))));
    }

    #[test]
    fn deps_none_always_changes() {
        let always = Deps::none();
        assert!(always.changed_from(Some(&Deps::none())));
        assert!(always.changed_from(None));
    }

    #[test]
    fn deps_empty_changes_only_on_first_run() {
        let empty = Deps::empty();
        assert!(empty.changed_from(None));
        assert!(!empty.changed_from(Some(&Deps::empty())));
    }

    #[test]
    fn dep_type_mismatch_is_a_change() {
        let a = Deps::list(vec![Dep::of(1u32)]);
        let b = Deps::list(vec![Dep::of(1i64)]);
        assert!(a.changed_from(Some(&b)));
    }
}
