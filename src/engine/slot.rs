//! Hook slots - the tagged per-call-site storage owned by an instance.
//!
//! Every hook call claims one slot, identified by call order within the
//! owning instance. The slot kind and count must be identical on every
//! render of that instance; a mismatch is a fatal hook-order violation.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::hooks::context::ScopeId;
use crate::types::{Cleanup, Deps, EqFn, Lane, TimingClass};

// =============================================================================
// Pending Updates
// =============================================================================

/// One queued state update, tagged with the lane it was enqueued under.
pub(crate) struct PendingUpdate {
    pub lane: Lane,
    pub op: UpdateOp,
}

pub(crate) enum UpdateOp {
    /// Replace with a value.
    Replace(Rc<dyn Any>),
    /// Apply an updater to the pending value.
    Map(Rc<dyn Fn(&dyn Any) -> Rc<dyn Any>>),
}

/// One queued reducer action, tagged with its lane.
pub(crate) struct PendingAction {
    pub lane: Lane,
    pub action: Rc<dyn Any>,
}

/// Type-erased reducer: `(state, action) -> Result<state, rejection>`.
pub(crate) type ErasedReducer =
    Rc<dyn Fn(&dyn Any, &dyn Any) -> Result<Rc<dyn Any>, String>>;

// =============================================================================
// Slot Kinds
// =============================================================================

pub(crate) struct StateSlot {
    /// Last committed value.
    pub committed: Rc<dyn Any>,
    /// Value computed by the prefold for the in-progress pass.
    pub render_value: Option<Rc<dyn Any>>,
    /// Updates enqueued but not yet folded.
    pub queue: Vec<PendingUpdate>,
    /// Updates folded into `render_value`; consumed on commit,
    /// pushed back to the queue front on discard.
    pub in_flight: Vec<PendingUpdate>,
    pub eq: EqFn,
}

pub(crate) struct ReducerSlot {
    pub committed: Rc<dyn Any>,
    pub render_value: Option<Rc<dyn Any>>,
    pub queue: Vec<PendingAction>,
    pub in_flight: Vec<PendingAction>,
    pub reducer: ErasedReducer,
    pub eq: EqFn,
}

pub(crate) struct MemoSlot {
    pub value: Rc<dyn Any>,
    pub deps: Deps,
}

pub(crate) struct RefSlot {
    /// Shared with every `RefHandle` returned for this slot.
    pub cell: Rc<RefCell<Option<Rc<dyn Any>>>>,
}

/// Setup captured during a render, applied (or dropped) at commit.
pub(crate) struct PendingEffect {
    pub deps: Deps,
    pub setup: Box<dyn FnOnce() -> Option<Cleanup>>,
}

pub(crate) struct EffectSlot {
    pub timing: TimingClass,
    /// Deps of the last run; `None` means the effect has never run.
    pub deps: Option<Deps>,
    /// Cleanup returned by the last setup, if any.
    pub cleanup: Option<Cleanup>,
    /// Recorded by the current render pass, decided at commit.
    pub pending: Option<PendingEffect>,
}

pub(crate) struct StoreSlot {
    /// Snapshot used by the in-progress (or last committed) render.
    pub rendered: Rc<dyn Any>,
    pub get_snapshot: Rc<dyn Fn() -> Rc<dyn Any>>,
    pub subscribe: Rc<dyn Fn(Rc<dyn Fn()>) -> Box<dyn FnOnce()>>,
    /// Present once the consumer is subscribed; taken exactly once at unmount.
    pub unsubscribe: Option<Box<dyn FnOnce()>>,
    /// Cleared at unmount so a late store notification cannot touch a
    /// recycled instance index.
    pub alive: Rc<Cell<bool>>,
    pub eq: EqFn,
}

pub(crate) struct TransitionSlot {
    /// Shared with the scheduler's in-flight list and the start handle.
    pub pending: Rc<Cell<bool>>,
}

pub(crate) struct DeferredSlot {
    /// Value last shown to the host.
    pub current: Rc<dyn Any>,
    /// Value adopted by the in-progress pass, committed on success.
    pub rendered: Option<Rc<dyn Any>>,
    pub eq: EqFn,
}

pub(crate) struct IdSlot {
    pub id: String,
}

// =============================================================================
// Slot
// =============================================================================

pub(crate) enum Slot {
    State(StateSlot),
    Reducer(ReducerSlot),
    Memo(MemoSlot),
    Ref(RefSlot),
    Effect(EffectSlot),
    Store(StoreSlot),
    Transition(TransitionSlot),
    Deferred(DeferredSlot),
    Id(IdSlot),
    ContextRead(ScopeId),
}

impl Slot {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Slot::State(_) => "state",
            Slot::Reducer(_) => "reducer",
            Slot::Memo(_) => "memo",
            Slot::Ref(_) => "ref",
            Slot::Effect(_) => "effect",
            Slot::Store(_) => "store",
            Slot::Transition(_) => "transition",
            Slot::Deferred(_) => "deferred",
            Slot::Id(_) => "id",
            Slot::ContextRead(_) => "context read",
        }
    }
}

/// Fatal: a hook claimed a slot of a different kind than the previous render
/// left at this position.
pub(crate) fn slot_kind_mismatch(expected: &str, found: &Slot) -> ! {
    panic!(
        "hook order violation: expected a {} slot at this position, found {}; \
         hooks must be called in the same order on every render",
        expected,
        found.kind_name()
    );
}
