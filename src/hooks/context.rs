//! Context propagation - tree-scoped key-value overrides.
//!
//! A [`Scope`] is created once with a process-wide default. A provider
//! element binds a value for its subtree; [`use_context`] resolves the
//! nearest enclosing binding for that exact scope at the read site's tree
//! position. Unrelated scopes never interact, and re-binding a value
//! propagates to every descendant reader on the next pass without their
//! own inputs changing.
//!
//! Providing an explicit absent sentinel (say `Option::None`) is a real
//! binding: readers resolve to the sentinel, not to the default.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::element::Element;
use crate::engine::slot::Slot;
use crate::engine::{self, slot::slot_kind_mismatch};
use crate::pipeline::render;

pub(crate) type ScopeId = u64;

// =============================================================================
// Scope Registry
// =============================================================================

thread_local! {
    /// Default value bound at scope creation, used when no provider encloses
    /// the reader.
    static SCOPE_DEFAULTS: RefCell<HashMap<ScopeId, Rc<dyn Any>>> =
        RefCell::new(HashMap::new());

    static NEXT_SCOPE_ID: Cell<ScopeId> = const { Cell::new(0) };
}

/// Reset the scope registry.
pub(crate) fn reset() {
    SCOPE_DEFAULTS.with(|defaults| defaults.borrow_mut().clear());
    NEXT_SCOPE_ID.with(|next| next.set(0));
}

fn default_for(id: ScopeId) -> Rc<dyn Any> {
    SCOPE_DEFAULTS.with(|defaults| {
        defaults
            .borrow()
            .get(&id)
            .cloned()
            .expect("scope used after registry reset")
    })
}

// =============================================================================
// Scope Handle
// =============================================================================

/// Handle to one context scope. Cheap to copy; carries only the scope's
/// identity, so two scopes of the same value type still never interact.
pub struct Scope<T> {
    id: ScopeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Scope<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Scope<T> {}

impl<T: Clone + 'static> Scope<T> {
    /// Create a scope with its process-wide default.
    pub fn new(default: T) -> Self {
        let id = NEXT_SCOPE_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        SCOPE_DEFAULTS.with(|defaults| {
            defaults.borrow_mut().insert(id, Rc::new(default) as Rc<dyn Any>);
        });
        Scope { id, _marker: PhantomData }
    }

    /// A provider element binding `value` over `children`.
    pub fn provide(&self, value: T, children: Vec<Element>) -> Element {
        Element::provider(self.id, Rc::new(value) as Rc<dyn Any>, children)
    }
}

// =============================================================================
// use_context
// =============================================================================

/// Read the nearest enclosing binding for `scope`, or its default when no
/// provider encloses this position.
pub fn use_context<T: Clone + 'static>(scope: Scope<T>) -> T {
    let (slot_ref, fresh) = engine::advance_cursor();
    if fresh {
        engine::install(slot_ref, Slot::ContextRead(scope.id));
    } else {
        engine::with_slot(slot_ref, |slot| match slot {
            Slot::ContextRead(id) => *id = scope.id,
            other => slot_kind_mismatch("context read", other),
        });
    }

    let bound = render::lookup_binding(scope.id).unwrap_or_else(|| default_for(scope.id));
    bound
        .downcast_ref::<T>()
        .expect("context binding holds the scope's value type")
        .clone()
}
