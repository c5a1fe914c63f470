//! Render Pipeline
//!
//! The pipeline turns queued updates into committed output:
//!
//! ```text
//! queued updates → fold (per lane) → render pass → commit → host → effects
//! ```
//!
//! - [`scheduler`] tracks lanes, dirty flags, and in-flight transitions.
//! - [`render`] folds update queues and walks the element tree with an
//!   explicit work stack, one component body per unit of work.
//! - [`commit`] makes a completed pass visible and runs effects in timing
//!   order around the host boundaries.
//! - [`mount`] owns the root and exposes the flush entry points.

pub mod mount;
pub(crate) mod commit;
pub(crate) mod render;
pub(crate) mod scheduler;

pub use mount::{RootHandle, RuntimeConfig, flush, flush_step, flush_sync, mount, output, reset_runtime};
