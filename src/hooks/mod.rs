//! Hook API - per-call-site primitives available inside component bodies.
//!
//! Every hook claims one slot on the owning instance, identified by call
//! order. Hooks must run unconditionally and in the same order on every
//! render of an instance.

pub mod context;
pub mod effect;
pub mod id;
pub mod memo;
pub mod reducer;
pub mod refs;
pub mod state;
pub mod store;
pub mod transition;

pub use context::{Scope, use_context};
pub use effect::{use_effect, use_insertion_effect, use_layout_effect};
pub use id::use_id;
pub use memo::{use_callback, use_memo};
pub use reducer::{Dispatch, use_reducer, use_reducer_with_init};
pub use refs::{RefHandle, use_imperative_handle, use_ref};
pub use state::{SetState, use_state, use_state_with};
pub use store::{ExternalStore, use_store, use_sync_external_store};
pub use transition::{
    TransitionHandle, start_transition, use_deferred_value, use_transition,
};
