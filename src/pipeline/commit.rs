//! Commit phase - making a completed pass visible.
//!
//! Order per commit:
//! 1. unmount departed instances (their live cleanups run exactly once)
//! 2. fold results become committed values
//! 3. insertion effects, cleanup/setup interleaved per component
//! 4. host commit + mutation-visible boundary
//! 5. layout effects, all cleanups then all setups
//! 6. paint boundary
//! 7. new store subscriptions (with a post-subscribe snapshot recheck)
//! 8. passive effects queued, drained at flush level after paint

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::engine::slot::{Slot, StoreSlot};
use crate::engine::{self, SlotRef, registry};
use crate::host::Host;
use crate::pipeline::scheduler;
use crate::types::{Cleanup, Deps, InstanceFlags, Lane, Path, TimingClass};

use super::render::PassResult;

// =============================================================================
// Commit State
// =============================================================================

/// One effect due to run this commit.
struct EffectRun {
    slot: SlotRef,
    setup: Box<dyn FnOnce() -> Option<Cleanup>>,
    deps: Deps,
}

thread_local! {
    /// Host renderer for the mounted root.
    static HOST: RefCell<Option<Box<dyn Host>>> = RefCell::new(None);

    /// Committed output (text leaves in traversal order).
    static OUTPUT: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };

    /// Passive effects awaiting the post-paint drain.
    static PASSIVE: RefCell<Vec<EffectRun>> = RefCell::new(Vec::new());
}

pub(crate) fn set_host(host: Box<dyn Host>) {
    HOST.with(|slot| *slot.borrow_mut() = Some(host));
}

pub(crate) fn committed_output() -> Vec<String> {
    OUTPUT.with(|output| output.borrow().clone())
}

fn with_host(f: impl FnOnce(&mut dyn Host)) {
    HOST.with(|slot| {
        if let Some(host) = slot.borrow_mut().as_mut() {
            f(host.as_mut());
        }
    });
}

// =============================================================================
// Commit
// =============================================================================

pub(crate) fn commit(result: PassResult) {
    trace!(lane = ?result.lane, "commit begin");

    unmount_departed(&result);

    // Instances created by an earlier retry of this commit but absent from
    // the final attempt never mounted; drop them silently.
    for index in &result.created {
        if !result.visited_set.contains(index) && registry::is_allocated(*index) {
            registry::release(*index);
        }
    }

    commit_values(&result);

    for index in &result.visited {
        registry::with_instance(*index, |instance| {
            instance.flags.insert(InstanceFlags::MOUNTED);
        });
    }

    let (insertion, layout, passive) = collect_effects(&result);

    // Insertion: before host mutation, interleaved per component.
    for run in insertion {
        run_cleanup(run.slot);
        run_setup(run);
    }

    OUTPUT.with(|committed| *committed.borrow_mut() = result.output.clone());
    with_host(|host| {
        host.commit(&result.output);
        host.mutations_visible();
    });

    // Layout: after mutation, all cleanups across components, then all setups.
    for run in &layout {
        run_cleanup(run.slot);
    }
    for run in layout {
        run_setup(run);
    }

    with_host(|host| host.painted());

    subscribe_new_stores(&result);

    // Passive effects wait for the flush-level drain after paint.
    PASSIVE.with(|queue| queue.borrow_mut().extend(passive));

    if result.lane == Lane::Transition {
        scheduler::finish_transition();
    }
    debug!(lane = ?result.lane, "commit complete");
}

fn commit_values(result: &PassResult) {
    for index in &result.visited {
        let slot_count = registry::with_instance(*index, |instance| instance.slots.len());
        for position in 0..slot_count {
            engine::with_slot(SlotRef { instance: *index, slot: position }, |slot| {
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
                    Slot::Deferred(cell) => {
                        if let Some(value) = cell.rendered.take() {
                            cell.current = value;
                        }
                    }
                    _ => {}
                }
            });
        }
    }
}

// =============================================================================
// Effects
// =============================================================================

fn collect_effects(result: &PassResult) -> (Vec<EffectRun>, Vec<EffectRun>, Vec<EffectRun>) {
    let mut insertion = Vec::new();
    let mut layout = Vec::new();
    let mut passive = Vec::new();

    for index in &result.visited {
        let slot_count = registry::with_instance(*index, |instance| instance.slots.len());
        for position in 0..slot_count {
            let slot_ref = SlotRef { instance: *index, slot: position };
            let due = engine::with_slot(slot_ref, |slot| match slot {
                Slot::Effect(effect) => {
                    let pending = effect.pending.take()?;
                    if pending.deps.changed_from(effect.deps.as_ref()) {
                        Some((effect.timing, pending))
                    } else {
                        None
                    }
                }
                _ => None,
            });
            if let Some((timing, pending)) = due {
                let run = EffectRun {
                    slot: slot_ref,
                    setup: pending.setup,
                    deps: pending.deps,
                };
                match timing {
                    TimingClass::Insertion => insertion.push(run),
                    TimingClass::Layout => layout.push(run),
                    TimingClass::Passive => passive.push(run),
                }
            }
        }
    }
    (insertion, layout, passive)
}

fn run_cleanup(slot_ref: SlotRef) {
    let cleanup = engine::try_with_slot(slot_ref, |slot| match slot {
        Slot::Effect(effect) => effect.cleanup.take(),
        _ => None,
    })
    .flatten();
    if let Some(cleanup) = cleanup {
        cleanup();
    }
}

fn run_setup(run: EffectRun) {
    let cleanup = (run.setup)();
    engine::try_with_slot(run.slot, |slot| {
        if let Slot::Effect(effect) = slot {
            effect.cleanup = cleanup;
            effect.deps = Some(run.deps);
        }
    });
}

/// Drain passive effects queued by commits: all cleanups, then all setups.
pub(crate) fn drain_passive() {
    loop {
        let batch = PASSIVE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
        if batch.is_empty() {
            return;
        }
        for run in &batch {
            run_cleanup(run.slot);
        }
        for run in batch {
            run_setup(run);
        }
    }
}

// =============================================================================
// Unmount
// =============================================================================

fn unmount_departed(result: &PassResult) {
    let mut departed: Vec<(Path, usize)> = registry::mounted_indices()
        .into_iter()
        .filter(|index| !result.visited_set.contains(index))
        .map(|index| {
            let path = registry::with_instance(index, |instance| instance.path.clone());
            (path, index)
        })
        .collect();
    if departed.is_empty() {
        return;
    }
    // Parents before children: lexicographic path order.
    departed.sort();
    debug!(count = departed.len(), "unmounting departed instances");
    for (_, index) in departed {
        unmount_instance(index);
    }
}

/// Run an instance's live cleanups exactly once (with the captures from
/// each effect's last setup), drop its store subscriptions, and release it.
pub(crate) fn unmount_instance(index: usize) {
    let slot_count = registry::with_instance(index, |instance| instance.slots.len());
    for position in 0..slot_count {
        let slot_ref = SlotRef { instance: index, slot: position };
        enum Teardown {
            Effect(Cleanup),
            Store(Box<dyn FnOnce()>),
        }
        let teardown = engine::with_slot(slot_ref, |slot| match slot {
            Slot::Effect(effect) => {
                effect.pending = None;
                effect.cleanup.take().map(Teardown::Effect)
            }
            Slot::Store(store) => {
                store.alive.set(false);
                store.unsubscribe.take().map(Teardown::Store)
            }
            _ => None,
        });
        match teardown {
            Some(Teardown::Effect(cleanup)) => cleanup(),
            Some(Teardown::Store(unsubscribe)) => unsubscribe(),
            None => {}
        }
    }
    registry::release(index);
}

// =============================================================================
// Store Subscriptions
// =============================================================================

fn subscribe_new_stores(result: &PassResult) {
    for slot_ref in &result.stores {
        let pending = engine::try_with_slot(*slot_ref, |slot| match slot {
            Slot::Store(StoreSlot { unsubscribe: Some(_), .. }) => None,
            Slot::Store(store) => Some((
                store.subscribe.clone(),
                store.get_snapshot.clone(),
                store.rendered.clone(),
                store.alive.clone(),
                store.eq,
            )),
            _ => None,
        })
        .flatten();
        let Some((subscribe, get_snapshot, rendered, alive, eq)) = pending else {
            continue;
        };

        alive.set(true);
        let listener_alive = alive.clone();
        let listener: Rc<dyn Fn()> = Rc::new(move || {
            if listener_alive.get() {
                scheduler::force(Lane::Urgent);
            }
        });
        let unsubscribe = subscribe(listener);
        engine::try_with_slot(*slot_ref, |slot| {
            if let Slot::Store(store) = slot {
                store.unsubscribe = Some(unsubscribe);
            }
        });

        // The store may have moved between render and subscription; a missed
        // notification here would leave the commit stale forever.
        let current = get_snapshot();
        if !eq(&*current, &*rendered) {
            scheduler::force(Lane::Urgent);
        }
    }
}

// =============================================================================
// Reset (for testing)
// =============================================================================

pub(crate) fn reset() {
    HOST.with(|slot| *slot.borrow_mut() = None);
    OUTPUT.with(|output| output.borrow_mut().clear());
    PASSIVE.with(|queue| queue.borrow_mut().clear());
}
