//! Refs and imperative handles.
//!
//! A [`RefHandle`] is a parent-owned slot that is `None` before its target
//! attaches and after it detaches. Reading an unattached handle is a
//! reportable error at the call site ([`RuntimeError::RefNotAttached`]),
//! never a silently propagated null.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::engine::slot::{RefSlot, Slot, slot_kind_mismatch};
use crate::engine::{self};
use crate::error::RuntimeError;
use crate::types::{Deps, TimingClass};

use super::effect::register_effect;

// =============================================================================
// RefHandle
// =============================================================================

/// Out-of-band slot for a capability published by a descendant.
pub struct RefHandle<T> {
    cell: Rc<RefCell<Option<Rc<dyn Any>>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        RefHandle { cell: self.cell.clone(), _marker: PhantomData }
    }
}

impl<T: 'static> RefHandle<T> {
    /// Place a capability into the slot.
    pub fn attach(&self, value: T) {
        *self.cell.borrow_mut() = Some(Rc::new(value));
    }

    /// Empty the slot.
    pub fn detach(&self) {
        *self.cell.borrow_mut() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.cell.borrow().is_some()
    }

    /// Borrow the attached capability.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RuntimeError> {
        let guard = self.cell.borrow();
        let value = guard.as_ref().ok_or(RuntimeError::RefNotAttached)?;
        let value = value
            .downcast_ref::<T>()
            .expect("ref slot holds the declared type");
        Ok(f(value))
    }

    /// Clone the attached capability out of the slot.
    pub fn get(&self) -> Result<T, RuntimeError>
    where
        T: Clone,
    {
        self.with(T::clone)
    }
}

// =============================================================================
// use_ref
// =============================================================================

/// Declare a ref slot owned by this instance. The handle is stable across
/// renders; the slot starts detached.
pub fn use_ref<T: 'static>() -> RefHandle<T> {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        engine::install(
            slot_ref,
            Slot::Ref(RefSlot { cell: Rc::new(RefCell::new(None)) }),
        );
    }
    let cell = engine::with_slot(slot_ref, |slot| match slot {
        Slot::Ref(r) => r.cell.clone(),
        other => slot_kind_mismatch("ref", other),
    });
    RefHandle { cell, _marker: PhantomData }
}

// =============================================================================
// use_imperative_handle
// =============================================================================

/// Publish a capability into a parent-owned handle once this instance is
/// attached (layout timing). The slot reverts to detached when the deps
/// change or the instance unmounts - a consumer never sees a stale handle.
pub fn use_imperative_handle<T: 'static>(
    handle: &RefHandle<T>,
    deps: Deps,
    create: impl FnOnce() -> T + 'static,
) {
    let attach = handle.clone();
    register_effect(TimingClass::Layout, deps, move || {
        attach.attach(create());
        let detach = attach.clone();
        Some(Box::new(move || detach.detach()) as Box<dyn FnOnce()>)
    });
}
