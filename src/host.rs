//! Host renderer boundary.
//!
//! The runtime does not render anything itself; it hands each commit's
//! output to an opaque [`Host`] capability and relies on two callbacks to
//! order effect timing: `mutations_visible` (layout effects run after it)
//! and `painted` (passive effects run after it).

/// Opaque presentation-tree capability supplied at mount.
pub trait Host {
    /// Apply a committed tree (text leaves in traversal order).
    fn commit(&mut self, output: &[String]);

    /// The applied mutations are now observable.
    fn mutations_visible(&mut self) {}

    /// The frame containing the mutations was painted.
    fn painted(&mut self) {}
}

/// Host that discards everything; useful for tests and headless runs.
pub struct NullHost;

impl Host for NullHost {
    fn commit(&mut self, _output: &[String]) {}
}
