//! Runtime error type.
//!
//! Data-dependent failures surface as [`RuntimeError`] from the flush entry
//! points. Programmer errors that corrupt hook identity (hook count or kind
//! changing between renders of one instance, hooks called outside a component
//! body) are fatal panics with descriptive messages, like `RefCell` borrow
//! errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A reducer returned `Err` for an action it did not recognize.
    /// Unknown actions fail loudly instead of silently no-opping.
    #[error("reducer rejected action: {0}")]
    ReducerRejected(String),

    /// A ref-like handle was read before its target was attached
    /// (or after it was detached).
    #[error("ref handle read before attachment")]
    RefNotAttached,

    /// An external store's snapshot kept changing across consecutive
    /// synchronous render retries.
    #[error("external store snapshot did not settle after {0} render retries")]
    StoreRetryExceeded(usize),

    /// Render passes kept scheduling more urgent work without settling
    /// (typically an unconditional render-phase state update).
    #[error("update loop: {0} render passes without settling")]
    UpdateLoop(usize),

    /// A runtime operation was called with no mounted root.
    #[error("runtime is not mounted")]
    NotMounted,

    /// `mount` was called while a root is already mounted on this thread.
    #[error("a root is already mounted on this thread")]
    AlreadyMounted,
}
