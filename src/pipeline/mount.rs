//! Mount API - root lifecycle and flush entry points.
//!
//! One root per thread. [`mount`] stores the element tree and host, runs
//! the initial commit, and returns a [`RootHandle`] for teardown. The
//! flush family drives scheduled work:
//!
//! - [`flush_sync`] drains urgent work synchronously (and discards any
//!   in-progress transition pass first - urgent wins).
//! - [`flush_step`] advances transition work by one component unit.
//! - [`flush`] drains everything.

use std::cell::{Cell, RefCell};

use tracing::debug;

use crate::element::Element;
use crate::engine::registry;
use crate::error::RuntimeError;
use crate::hooks::context;
use crate::host::Host;
use crate::types::{Lane, Path};

use super::{commit, render, scheduler};

// =============================================================================
// Runtime Config
// =============================================================================

/// Knobs fixed at mount time.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Diagnostic double invocation of component bodies; the second
    /// invocation's result is kept.
    pub strict: bool,
    /// How many synchronous retries a moving external store gets before
    /// the flush fails.
    pub store_retry_limit: usize,
    /// How many consecutive render cycles one flush may take before it is
    /// declared an update loop.
    pub update_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            strict: false,
            store_retry_limit: 8,
            update_limit: 25,
        }
    }
}

// =============================================================================
// Mount State
// =============================================================================

thread_local! {
    static ROOT: RefCell<Option<Element>> = const { RefCell::new(None) };
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
    static IN_FLUSH: Cell<bool> = const { Cell::new(false) };
    /// Store-consistency retries of the in-progress transition pass.
    static TRANSITION_RETRIES: Cell<usize> = const { Cell::new(0) };
}

fn root_element() -> Result<Element, RuntimeError> {
    ROOT.with(|root| root.borrow().clone()).ok_or(RuntimeError::NotMounted)
}

fn config() -> RuntimeConfig {
    CONFIG.with(|config| config.borrow().clone())
}

// =============================================================================
// Root Handle
// =============================================================================

/// Handle returned by [`mount`] that allows unmounting.
///
/// Dropping the handle tears the root down as well (best effort), running
/// every live effect cleanup exactly once.
pub struct RootHandle {
    armed: bool,
}

impl RootHandle {
    /// Unmount the root: run all live cleanups, drop store subscriptions,
    /// release every instance, and clear the host.
    pub fn unmount(mut self) {
        self.armed = false;
        teardown();
    }
}

impl Drop for RootHandle {
    fn drop(&mut self) {
        if self.armed {
            teardown();
        }
    }
}

// =============================================================================
// Mount / Unmount
// =============================================================================

/// Mount an element tree with the given host and configuration, and run
/// the initial commit.
pub fn mount(
    root: Element,
    host: Box<dyn Host>,
    config: RuntimeConfig,
) -> Result<RootHandle, RuntimeError> {
    let already = ROOT.with(|slot| slot.borrow().is_some());
    if already {
        return Err(RuntimeError::AlreadyMounted);
    }

    ROOT.with(|slot| *slot.borrow_mut() = Some(root));
    CONFIG.with(|slot| *slot.borrow_mut() = config);
    commit::set_host(host);
    scheduler::force(Lane::Urgent);

    match flush() {
        Ok(()) => Ok(RootHandle { armed: true }),
        Err(error) => {
            teardown();
            Err(error)
        }
    }
}

fn teardown() {
    debug!("unmounting root");
    let mut live: Vec<(Path, usize)> = registry::allocated_indices()
        .into_iter()
        .map(|index| {
            let path = registry::with_instance(index, |instance| instance.path.clone());
            (path, index)
        })
        .collect();
    live.sort();
    for (_, index) in live {
        commit::unmount_instance(index);
    }
    // Scope defaults are bound at scope creation, not at mount: handles
    // created before this root stay valid for the next one.
    clear_mount_state();
}

fn clear_mount_state() {
    ROOT.with(|slot| *slot.borrow_mut() = None);
    CONFIG.with(|slot| *slot.borrow_mut() = RuntimeConfig::default());
    IN_FLUSH.with(|flag| flag.set(false));
    TRANSITION_RETRIES.with(|count| count.set(0));
    registry::reset();
    scheduler::reset();
    render::reset();
    commit::reset();
}

/// Hard-reset every piece of thread-local runtime state, without running
/// cleanups. This also drops the scope-default table, invalidating every
/// existing [`Scope`](crate::Scope) handle. Intended for test isolation;
/// prefer [`RootHandle::unmount`] for an orderly teardown.
pub fn reset_runtime() {
    clear_mount_state();
    context::reset();
}

// =============================================================================
// Flush
// =============================================================================

/// The committed output: text leaves in traversal order.
pub fn output() -> Vec<String> {
    commit::committed_output()
}

/// Force all pending urgent updates to commit before returning.
///
/// If a transition pass is in progress it is discarded first; its queued
/// updates survive and the transition restarts from scratch on the next
/// [`flush_step`] / [`flush`].
pub fn flush_sync() -> Result<(), RuntimeError> {
    let root = root_element()?;
    enter_flush();
    let result = flush_sync_inner(&root);
    leave_flush();
    result
}

fn enter_flush() {
    IN_FLUSH.with(|flag| {
        if flag.replace(true) {
            panic!("flush re-entered; flushing from a body or effect is not supported");
        }
    });
}

fn leave_flush() {
    IN_FLUSH.with(|flag| flag.set(false));
}

fn flush_sync_inner(root: &Element) -> Result<(), RuntimeError> {
    if render::has_wip() {
        // Urgent work interrupts the transition: discard its pass, keep
        // its queued updates for the restart. The restart must render even
        // if the restored queue folds to a no-op, so the raised pending
        // flags reach a commit and settle.
        render::discard_pass();
        scheduler::abort_transition_pass();
        scheduler::force(Lane::Transition);
        TRANSITION_RETRIES.with(|count| count.set(0));
    }

    let config = config();
    let mut cycles = 0usize;
    loop {
        commit::drain_passive();
        if !scheduler::is_dirty(Lane::Urgent) {
            return Ok(());
        }
        cycles += 1;
        if cycles > config.update_limit {
            return Err(RuntimeError::UpdateLoop(config.update_limit));
        }

        let forced = scheduler::take_dirty(Lane::Urgent);
        let changed = render::fold_queues(Lane::Urgent)?;
        if !changed && !forced {
            // Equality elision: consume the fold, skip the render.
            render::settle_without_render();
            continue;
        }

        let result = render_to_completion(Lane::Urgent, root, &config)?;
        commit::commit(result);
    }
}

fn render_to_completion(
    lane: Lane,
    root: &Element,
    config: &RuntimeConfig,
) -> Result<render::PassResult, RuntimeError> {
    let mut carry_created = Vec::new();
    let mut retries = 0usize;
    loop {
        render::begin_pass(lane, root.clone(), config.strict, carry_created);
        while render::step() {}
        let result = render::finish_pass();
        if !render::stores_moved(&result) {
            return Ok(result);
        }
        // A store moved mid-pass: retry synchronously so no consumer ever
        // shows a torn snapshot.
        retries += 1;
        if retries > config.store_retry_limit {
            return Err(RuntimeError::StoreRetryExceeded(config.store_retry_limit));
        }
        carry_created = result.created;
    }
}

/// Advance scheduled work by one unit.
///
/// Urgent work is drained whole (it is never interruptible); transition
/// work advances one component body at a time. Returns whether more work
/// remains.
pub fn flush_step() -> Result<bool, RuntimeError> {
    let root = root_element()?;
    let config = config();

    if scheduler::is_dirty(Lane::Urgent) {
        flush_sync()?;
        return Ok(scheduler::is_dirty(Lane::Transition) || render::has_wip());
    }

    if render::has_wip() {
        enter_flush();
        let result = transition_step(&root, &config);
        leave_flush();
        return result;
    }

    if scheduler::is_dirty(Lane::Transition) {
        let forced = scheduler::take_dirty(Lane::Transition);
        let changed = render::fold_queues(Lane::Transition)?;
        if !changed && !forced {
            render::settle_without_render();
            return Ok(false);
        }
        scheduler::begin_transition_pass();
        TRANSITION_RETRIES.with(|count| count.set(0));
        render::begin_pass(Lane::Transition, root, config.strict, Vec::new());
        return Ok(true);
    }

    Ok(false)
}

fn transition_step(root: &Element, config: &RuntimeConfig) -> Result<bool, RuntimeError> {
    if render::step() {
        return Ok(true);
    }
    let result = render::finish_pass();
    if render::stores_moved(&result) {
        let retries = TRANSITION_RETRIES.with(|count| {
            let next = count.get() + 1;
            count.set(next);
            next
        });
        if retries > config.store_retry_limit {
            return Err(RuntimeError::StoreRetryExceeded(config.store_retry_limit));
        }
        render::begin_pass(Lane::Transition, root.clone(), config.strict, result.created);
        return Ok(true);
    }
    TRANSITION_RETRIES.with(|count| count.set(0));
    commit::commit(result);
    commit::drain_passive();
    Ok(scheduler::is_dirty(Lane::Transition) || scheduler::is_dirty(Lane::Urgent))
}

/// Drain all scheduled work: urgent first, then transitions (restarting
/// them as needed when urgent work arrives in between).
pub fn flush() -> Result<(), RuntimeError> {
    flush_sync()?;
    while flush_step()? {}
    commit::drain_passive();
    Ok(())
}
