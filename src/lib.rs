//! # cinder
//!
//! A minimal reactive component runtime.
//!
//! Component bodies are plain closures that rebuild their children from
//! current state. Hooks give each positional instance durable slots for
//! state, effects, memos, refs, and subscriptions; slots are claimed by
//! call order, so hook calls must be unconditional within a body.
//!
//! The runtime is single-threaded. "Concurrency" means interruptible,
//! prioritized render work: urgent updates drain synchronously, transition
//! updates render one component at a time via [`flush_step`] and yield to
//! urgent arrivals.
//!
//! ```no_run
//! use cinder::{component, text, mount, NullHost, RuntimeConfig, use_state};
//!
//! let counter = component(|| {
//!     let (count, set_count) = use_state(0u32);
//!     if count == 0 {
//!         set_count.set(1);
//!     }
//!     vec![text(format!("count: {count}"))]
//! });
//!
//! let root = mount(counter, Box::new(NullHost), RuntimeConfig::default()).unwrap();
//! assert_eq!(cinder::output(), vec!["count: 1".to_string()]);
//! root.unmount();
//! ```
//!
//! ## Modules
//!
//! - [`element`] - Element tree descriptions ([`component`], [`text`], providers)
//! - [`hooks`] - The hook API (`use_state`, `use_effect`, `use_context`, ...)
//! - [`pipeline`] - Scheduler, render passes, commit, mount/flush
//! - [`host`] - The presentation boundary the runtime commits into

pub mod element;
pub(crate) mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod pipeline;
pub mod types;

// Re-export the public API surface at the crate root.
pub use element::{Body, Element, component, text};
pub use error::RuntimeError;
pub use hooks::context::Scope;
pub use hooks::effect::{use_effect, use_insertion_effect, use_layout_effect};
pub use hooks::id::use_id;
pub use hooks::memo::{use_callback, use_memo};
pub use hooks::reducer::{Dispatch, use_reducer, use_reducer_with_init};
pub use hooks::refs::{RefHandle, use_imperative_handle, use_ref};
pub use hooks::state::{SetState, use_state, use_state_with};
pub use hooks::store::{ExternalStore, use_store, use_sync_external_store};
pub use hooks::transition::{
    TransitionHandle, start_transition, use_deferred_value, use_transition,
};
pub use hooks::use_context;
pub use host::{Host, NullHost};
pub use pipeline::{
    RootHandle, RuntimeConfig, flush, flush_step, flush_sync, mount, output, reset_runtime,
};
pub use types::{Cleanup, Dep, Deps, Lane, TimingClass};
