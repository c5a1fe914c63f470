//! Render pass - top-down body re-execution over the element tree.
//!
//! A pass walks the tree with an explicit work stack so transition work can
//! stop between component units. Before bodies run, every state and reducer
//! queue is folded for the pass's lane; bodies then read the folded values.
//! Nothing a pass computes becomes visible until commit, and a discarded
//! pass restores the queues it drained.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::element::{Element, ElementKind};
use crate::engine::slot::{PendingAction, PendingUpdate, Slot};
use crate::engine::{self, SlotRef, registry};
use crate::error::RuntimeError;
use crate::hooks::context::ScopeId;
use crate::types::{Lane, Path};

// =============================================================================
// Pass State
// =============================================================================

enum WorkItem {
    Node { element: Element, path: Path },
    PopBinding,
}

struct WorkState {
    lane: Lane,
    strict: bool,
    stack: Vec<WorkItem>,
    visited: Vec<usize>,
    visited_set: HashSet<usize>,
    created: Vec<usize>,
    output: Vec<String>,
    stores: Vec<SlotRef>,
}

/// Everything commit needs from a completed pass.
pub(crate) struct PassResult {
    pub lane: Lane,
    pub visited: Vec<usize>,
    pub visited_set: HashSet<usize>,
    pub created: Vec<usize>,
    pub output: Vec<String>,
    pub stores: Vec<SlotRef>,
}

thread_local! {
    /// In-progress pass, if any. Borrows are short; bodies run unborrowed.
    static WIP: RefCell<Option<WorkState>> = const { RefCell::new(None) };

    /// Context bindings currently in scope during traversal.
    static BINDINGS: RefCell<Vec<(ScopeId, Rc<dyn Any>)>> = const { RefCell::new(Vec::new()) };

    /// Lane of the in-progress pass.
    static PASS_LANE: Cell<Option<Lane>> = const { Cell::new(None) };
}

/// Lane of the pass currently rendering, if any.
pub(crate) fn pass_lane() -> Option<Lane> {
    PASS_LANE.with(|lane| lane.get())
}

pub(crate) fn has_wip() -> bool {
    WIP.with(|wip| wip.borrow().is_some())
}

/// Nearest enclosing binding for `scope` at the current traversal position.
pub(crate) fn lookup_binding(scope: ScopeId) -> Option<Rc<dyn Any>> {
    BINDINGS.with(|bindings| {
        bindings
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| *id == scope)
            .map(|(_, value)| value.clone())
    })
}

/// Note a store read so the pass can be checked for tearing before commit.
pub(crate) fn record_store_read(slot_ref: SlotRef) {
    WIP.with(|wip| {
        if let Some(state) = wip.borrow_mut().as_mut() {
            state.stores.push(slot_ref);
        }
    });
}

// =============================================================================
// Queue Folding
// =============================================================================

/// Fold every state/reducer queue for `lane`, left-to-right against the
/// last committed value. Folded entries move to the slot's `in_flight` list
/// (consumed on commit, restored on discard); an urgent fold leaves
/// transition-tagged entries queued for later rebase.
///
/// Returns whether any folded value differs from its committed value.
pub(crate) fn fold_queues(lane: Lane) -> Result<bool, RuntimeError> {
    let mut changed = false;
    for index in registry::allocated_indices() {
        let slot_count = registry::with_instance(index, |instance| instance.slots.len());
        for position in 0..slot_count {
            let slot_ref = SlotRef { instance: index, slot: position };
            match fold_slot(slot_ref, lane) {
                Ok(slot_changed) => changed |= slot_changed,
                Err(error) => {
                    // Push every already-folded entry back so nothing the
                    // failed flush drained is lost.
                    restore_folded();
                    return Err(error);
                }
            }
        }
    }
    Ok(changed)
}

fn drain_for_lane<E>(queue: &mut Vec<E>, lane: Lane, lane_of: impl Fn(&E) -> Lane) -> Vec<E> {
    if lane == Lane::Transition {
        return std::mem::take(queue);
    }
    let mut drained = Vec::new();
    let mut kept = Vec::new();
    for entry in queue.drain(..) {
        if lane_of(&entry) == Lane::Urgent {
            drained.push(entry);
        } else {
            kept.push(entry);
        }
    }
    *queue = kept;
    drained
}

fn fold_slot(slot_ref: SlotRef, lane: Lane) -> Result<bool, RuntimeError> {
    enum Work {
        State(Rc<dyn Any>, Vec<PendingUpdate>),
        Reducer(
            Rc<dyn Any>,
            Vec<PendingAction>,
            crate::engine::slot::ErasedReducer,
        ),
    }

    let work = engine::with_slot(slot_ref, |slot| match slot {
        Slot::State(cell) => {
            let drained = drain_for_lane(&mut cell.queue, lane, |e| e.lane);
            if drained.is_empty() {
                None
            } else {
                Some(Work::State(cell.committed.clone(), drained))
            }
        }
        Slot::Reducer(cell) => {
            let drained = drain_for_lane(&mut cell.queue, lane, |e| e.lane);
            if drained.is_empty() {
                None
            } else {
                Some(Work::Reducer(
                    cell.committed.clone(),
                    drained,
                    cell.reducer.clone(),
                ))
            }
        }
        _ => None,
    });
    let Some(work) = work else {
        return Ok(false);
    };

    // User updaters and reducers run with no registry borrow held.
    match work {
        Work::State(base, entries) => {
            let mut value = base.clone();
            for entry in &entries {
                value = match &entry.op {
                    crate::engine::slot::UpdateOp::Replace(next) => next.clone(),
                    crate::engine::slot::UpdateOp::Map(f) => f(&*value),
                };
            }
            let changed = engine::with_slot(slot_ref, |slot| match slot {
                Slot::State(cell) => {
                    let changed = !(cell.eq)(&*value, &*base);
                    cell.render_value = Some(value);
                    cell.in_flight.extend(entries);
                    changed
                }
                _ => unreachable!(),
            });
            Ok(changed)
        }
        Work::Reducer(base, entries, reducer) => {
            let mut value = base.clone();
            let mut rejection = None;
            for entry in &entries {
                match reducer(&*value, &*entry.action) {
                    Ok(next) => value = next,
                    Err(reason) => {
                        rejection = Some(reason);
                        break;
                    }
                }
            }
            if let Some(reason) = rejection {
                // Restore the drained actions before failing loudly.
                engine::with_slot(slot_ref, |slot| match slot {
                    Slot::Reducer(cell) => {
                        let mut restored = entries;
                        restored.extend(cell.queue.drain(..));
                        cell.queue = restored;
                        cell.render_value = None;
                    }
                    _ => unreachable!(),
                });
                return Err(RuntimeError::ReducerRejected(reason));
            }
            let changed = engine::with_slot(slot_ref, |slot| match slot {
                Slot::Reducer(cell) => {
                    let changed = !(cell.eq)(&*value, &*base);
                    cell.render_value = Some(value);
                    cell.in_flight.extend(entries);
                    changed
                }
                _ => unreachable!(),
            });
            Ok(changed)
        }
    }
}

/// A fold found nothing changed and no render is forced: consume the folded
/// entries without running a pass. The committed values are untouched
/// (they compare equal to the fold results by definition).
pub(crate) fn settle_without_render() {
    for index in registry::allocated_indices() {
        let slot_count = registry::with_instance(index, |instance| instance.slots.len());
        for position in 0..slot_count {
            engine::with_slot(SlotRef { instance: index, slot: position }, |slot| {
                match slot {
                    Slot::State(cell) => {
                        if let Some(value) = cell.render_value.take() {
                            cell.committed = value;
                        }
                        cell.in_flight.clear();
                    }
                    Slot::Reducer(cell) => {
                        if let Some(value) = cell.render_value.take() {
                            cell.committed = value;
                        }
                        cell.in_flight.clear();
                    }
                    _ => {}
                }
            });
        }
    }
}

// =============================================================================
// Pass Lifecycle
// =============================================================================

/// Begin a pass over `root`. `carry_created` holds instances created by a
/// previous attempt of the same commit (store-consistency retries) so they
/// stay accounted for.
pub(crate) fn begin_pass(lane: Lane, root: Element, strict: bool, carry_created: Vec<usize>) {
    trace!(?lane, strict, "render pass begin");
    BINDINGS.with(|bindings| bindings.borrow_mut().clear());
    PASS_LANE.with(|pass| pass.set(Some(lane)));
    WIP.with(|wip| {
        *wip.borrow_mut() = Some(WorkState {
            lane,
            strict,
            stack: vec![WorkItem::Node { element: root, path: Vec::new() }],
            visited: Vec::new(),
            visited_set: HashSet::new(),
            created: carry_created,
            output: Vec::new(),
            stores: Vec::new(),
        });
    });
}

/// Advance the pass by one unit of work (one component body, or a run of
/// non-component nodes). Returns whether work remains.
pub(crate) fn step() -> bool {
    loop {
        let item = WIP.with(|wip| {
            wip.borrow_mut()
                .as_mut()
                .expect("step called with no pass in progress")
                .stack
                .pop()
        });
        let Some(item) = item else {
            return false;
        };

        match item {
            WorkItem::PopBinding => {
                BINDINGS.with(|bindings| {
                    bindings.borrow_mut().pop();
                });
            }
            WorkItem::Node { element, path } => match element.kind {
                ElementKind::Text(content) => {
                    WIP.with(|wip| {
                        wip.borrow_mut()
                            .as_mut()
                            .expect("pass in progress")
                            .output
                            .push(content);
                    });
                }
                ElementKind::Provider { scope, value, children } => {
                    BINDINGS.with(|bindings| {
                        bindings.borrow_mut().push((scope, value));
                    });
                    WIP.with(|wip| {
                        let mut wip = wip.borrow_mut();
                        let state = wip.as_mut().expect("pass in progress");
                        state.stack.push(WorkItem::PopBinding);
                        push_children(state, &path, children);
                    });
                }
                ElementKind::Component(body) => {
                    render_component(&path, body);
                    let more = WIP.with(|wip| {
                        !wip.borrow().as_ref().expect("pass in progress").stack.is_empty()
                    });
                    return more;
                }
            },
        }
    }
}

fn push_children(state: &mut WorkState, parent: &Path, children: Vec<Element>) {
    for (index, child) in children.into_iter().enumerate().rev() {
        let mut path = parent.clone();
        path.push(index);
        state.stack.push(WorkItem::Node { element: child, path });
    }
}

fn render_component(path: &Path, body: Rc<dyn Fn() -> Vec<Element>>) {
    let (index, created) = registry::acquire(path);
    let strict = WIP.with(|wip| {
        let mut wip = wip.borrow_mut();
        let state = wip.as_mut().expect("pass in progress");
        if created {
            state.created.push(index);
        }
        state.visited.push(index);
        state.visited_set.insert(index);
        state.strict
    });

    registry::set_current(Some(index));
    engine::begin_invocation(index);
    if strict {
        // Diagnostic double invocation: the first result is discarded, the
        // second is kept. Slots already exist by the second call, so
        // initializers still run exactly once.
        let _ = body();
        engine::begin_invocation(index);
    }
    let children = body();
    engine::finish_invocation(index);
    registry::set_current(None);

    WIP.with(|wip| {
        let mut wip = wip.borrow_mut();
        let state = wip.as_mut().expect("pass in progress");
        push_children(state, path, children);
    });
}

/// Complete the pass and hand its results to commit.
pub(crate) fn finish_pass() -> PassResult {
    PASS_LANE.with(|pass| pass.set(None));
    BINDINGS.with(|bindings| bindings.borrow_mut().clear());
    let state = WIP.with(|wip| wip.borrow_mut().take()).expect("no pass to finish");
    debug!(
        lane = ?state.lane,
        visited = state.visited.len(),
        created = state.created.len(),
        "render pass complete"
    );
    PassResult {
        lane: state.lane,
        visited: state.visited,
        visited_set: state.visited_set,
        created: state.created,
        output: state.output,
        stores: state.stores,
    }
}

/// Throw away the in-progress pass: release instances it created, push
/// folded entries back onto their queues, and drop recorded effects. No
/// partial result leaks into committed state.
pub(crate) fn discard_pass() {
    let state = WIP.with(|wip| wip.borrow_mut().take());
    let Some(state) = state else { return };
    debug!(lane = ?state.lane, "render pass discarded");

    PASS_LANE.with(|pass| pass.set(None));
    BINDINGS.with(|bindings| bindings.borrow_mut().clear());

    for index in state.created {
        registry::release(index);
    }
    restore_folded();
}

/// Undo a fold that will not commit: push `in_flight` entries back to the
/// queue front (ahead of anything enqueued since), drop render values, and
/// drop recorded effects.
fn restore_folded() {
    for index in registry::allocated_indices() {
        let slot_count = registry::with_instance(index, |instance| instance.slots.len());
        for position in 0..slot_count {
            engine::with_slot(SlotRef { instance: index, slot: position }, |slot| {
                match slot {
                    Slot::State(cell) => {
                        cell.render_value = None;
                        if !cell.in_flight.is_empty() {
                            let mut restored = std::mem::take(&mut cell.in_flight);
                            restored.extend(cell.queue.drain(..));
                            cell.queue = restored;
                        }
                    }
                    Slot::Reducer(cell) => {
                        cell.render_value = None;
                        if !cell.in_flight.is_empty() {
                            let mut restored = std::mem::take(&mut cell.in_flight);
                            restored.extend(cell.queue.drain(..));
                            cell.queue = restored;
                        }
                    }
                    Slot::Deferred(cell) => {
                        cell.rendered = None;
                    }
                    Slot::Effect(effect) => {
                        effect.pending = None;
                    }
                    _ => {}
                }
            });
        }
    }
}

/// Whether any store read by the pass has moved since it was read.
/// A mismatch forces a synchronous retry before anything becomes visible.
pub(crate) fn stores_moved(result: &PassResult) -> bool {
    for slot_ref in &result.stores {
        let probe = engine::with_slot(*slot_ref, |slot| match slot {
            Slot::Store(store) => {
                Some((store.get_snapshot.clone(), store.rendered.clone(), store.eq))
            }
            _ => None,
        });
        let Some((get_snapshot, rendered, eq)) = probe else { continue };
        let current = get_snapshot();
        if !eq(&*current, &*rendered) {
            return true;
        }
    }
    false
}

/// Reset all pass state.
pub(crate) fn reset() {
    WIP.with(|wip| *wip.borrow_mut() = None);
    BINDINGS.with(|bindings| bindings.borrow_mut().clear());
    PASS_LANE.with(|pass| pass.set(None));
}
