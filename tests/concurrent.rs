//! Scheduling behavior: transitions and their interruption, deferred
//! values, external store consistency, and reducer queues.

use std::cell::RefCell;
use std::rc::Rc;

use cinder::{
    Dispatch, Element, ExternalStore, NullHost, RuntimeConfig, RuntimeError, SetState,
    TransitionHandle, component, flush, flush_step, flush_sync, mount, output, start_transition,
    text, use_deferred_value, use_reducer, use_reducer_with_init, use_state, use_store,
    use_sync_external_store, use_transition,
};

fn take_copy<T: Copy>(cell: &Rc<RefCell<Option<T>>>) -> T {
    cell.borrow().as_ref().copied().expect("captured during render")
}

fn drive_to_idle() {
    for _ in 0..50 {
        if !flush_step().unwrap() {
            return;
        }
    }
    panic!("scheduler did not go idle");
}

// =============================================================================
// Transitions
// =============================================================================

struct TransitionFixture {
    tr: Rc<RefCell<Option<TransitionHandle>>>,
    set_n: Rc<RefCell<Option<SetState<i32>>>>,
    set_t: Rc<RefCell<Option<SetState<i32>>>>,
}

impl TransitionFixture {
    fn new() -> Self {
        TransitionFixture {
            tr: Rc::new(RefCell::new(None)),
            set_n: Rc::new(RefCell::new(None)),
            set_t: Rc::new(RefCell::new(None)),
        }
    }

    fn root(&self) -> Element {
        let tr_cell = self.tr.clone();
        let n_cell = self.set_n.clone();
        let t_cell = self.set_t.clone();
        component(move || {
            let (pending, tr) = use_transition();
            *tr_cell.borrow_mut() = Some(tr);
            let (n, set) = use_state(0i32);
            *n_cell.borrow_mut() = Some(set);
            let (t, set) = use_state(0i32);
            *t_cell.borrow_mut() = Some(set);
            vec![
                text(format!("n={n}")),
                text(format!("t={t}")),
                text(format!("p={pending}")),
            ]
        })
    }

    fn start(&self, updates: impl FnOnce()) {
        let tr = self.tr.borrow().as_ref().unwrap().clone();
        tr.start(updates);
    }
}

#[test]
fn transition_commits_after_the_pending_render() {
    let fx = TransitionFixture::new();
    let _handle = mount(fx.root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();
    assert_eq!(output(), vec!["n=0", "t=0", "p=false"]);

    let set_t = fx.set_t.clone();
    fx.start(move || take_copy(&set_t).set(5));

    // The urgent render shows the pending flag; the slow value is untouched.
    flush_sync().unwrap();
    assert_eq!(output(), vec!["n=0", "t=0", "p=true"]);

    flush().unwrap();
    assert_eq!(output(), vec!["n=0", "t=5", "p=false"]);
}

#[test]
fn urgent_update_interrupts_and_restarts_the_transition() {
    let fx = TransitionFixture::new();
    let _handle = mount(fx.root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();

    let set_t = fx.set_t.clone();
    fx.start(move || take_copy(&set_t).set(10));
    flush_sync().unwrap();
    assert_eq!(output(), vec!["n=0", "t=0", "p=true"]);

    // Advance the transition partway, then interrupt it.
    assert!(flush_step().unwrap());
    assert!(flush_step().unwrap());
    take_copy(&fx.set_n).set(1);

    // The urgent commit shows the new value but nothing from the discarded
    // pass, and the transition is still pending.
    flush_sync().unwrap();
    assert_eq!(output(), vec!["n=1", "t=0", "p=true"]);

    // The restarted transition commits both.
    flush().unwrap();
    assert_eq!(output(), vec!["n=1", "t=10", "p=false"]);
}

#[test]
fn interrupted_noop_transition_still_settles_its_pending_flag() {
    let fx = TransitionFixture::new();
    let _handle = mount(fx.root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();

    // The transition writes the value the cell already holds, so the
    // restarted work folds to a no-op.
    let set_t = fx.set_t.clone();
    fx.start(move || take_copy(&set_t).set(0));
    flush_sync().unwrap();
    assert_eq!(output(), vec!["n=0", "t=0", "p=true"]);

    // Advance into the pass, then interrupt it with urgent work.
    assert!(flush_step().unwrap());
    take_copy(&fx.set_n).set(1);
    flush().unwrap();

    // The pending flag must still reach a commit that lowers it.
    assert_eq!(output(), vec!["n=1", "t=0", "p=false"]);
}

#[test]
fn start_transition_tags_updates_without_a_pending_flag() {
    let fx = TransitionFixture::new();
    let _handle = mount(fx.root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();

    let set_t = fx.set_t.clone();
    start_transition(move || take_copy(&set_t).set(3));

    // Nothing urgent is scheduled; the synchronous flush is a no-op.
    flush_sync().unwrap();
    assert_eq!(output(), vec!["n=0", "t=0", "p=false"]);

    flush().unwrap();
    assert_eq!(output(), vec!["n=0", "t=3", "p=false"]);
}

// =============================================================================
// Deferred values
// =============================================================================

#[test]
fn deferred_value_lags_urgent_renders_then_catches_up() {
    let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::new(RefCell::new(None));

    let s = setter.clone();
    let _handle = mount(
        component(move || {
            let (n, set) = use_state(0i32);
            *s.borrow_mut() = Some(set);
            let deferred = use_deferred_value(n);
            vec![text(format!("{n}|{deferred}"))]
        }),
        Box::new(NullHost),
        RuntimeConfig::default(),
    )
    .unwrap();
    assert_eq!(output(), vec!["0|0"]);

    take_copy(&setter).set(1);
    flush_sync().unwrap();
    // The urgent render keeps showing the committed deferred value.
    assert_eq!(output(), vec!["1|0"]);

    flush().unwrap();
    assert_eq!(output(), vec!["1|1"]);
}

// =============================================================================
// External stores
// =============================================================================

fn consumer(store: ExternalStore<i32>) -> Element {
    component(move || vec![text(use_store(&store).to_string())])
}

#[test]
fn store_mutation_schedules_a_render_and_unmount_unsubscribes() {
    let store = ExternalStore::new(0i32);

    let st = store.clone();
    let make_root = move || {
        let st = st.clone();
        component(move || vec![consumer(st.clone()), consumer(st.clone())])
    };

    let handle = mount(make_root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();
    assert_eq!(store.listener_count(), 2);
    assert_eq!(output(), vec!["0", "0"]);

    store.set(5);
    flush().unwrap();
    assert_eq!(output(), vec!["5", "5"]);

    handle.unmount();
    assert_eq!(store.listener_count(), 0);

    // Mount/unmount again: subscriptions toggle cleanly.
    let handle = mount(make_root(), Box::new(NullHost), RuntimeConfig::default()).unwrap();
    assert_eq!(store.listener_count(), 2);
    assert_eq!(output(), vec!["5", "5"]);
    handle.unmount();
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn consumers_never_commit_torn_snapshots() {
    let store = ExternalStore::new(0i32);
    let tr_cell: Rc<RefCell<Option<TransitionHandle>>> = Rc::new(RefCell::new(None));
    let set_cell: Rc<RefCell<Option<SetState<i32>>>> = Rc::new(RefCell::new(None));

    let st = store.clone();
    let tc = tr_cell.clone();
    let sc = set_cell.clone();
    let _handle = mount(
        component(move || {
            let (_pending, tr) = use_transition();
            *tc.borrow_mut() = Some(tr);
            let (n, set) = use_state(0i32);
            *sc.borrow_mut() = Some(set);
            vec![
                consumer(st.clone()),
                consumer(st.clone()),
                text(format!("n={n}")),
            ]
        }),
        Box::new(NullHost),
        RuntimeConfig::default(),
    )
    .unwrap();
    assert_eq!(output(), vec!["0", "0", "n=0"]);

    let tr = tr_cell.borrow().as_ref().unwrap().clone();
    let sc = set_cell.clone();
    tr.start(move || take_copy(&sc).set(1));
    flush_sync().unwrap();

    // Advance the transition into its pass, then move the store under it.
    assert!(flush_step().unwrap());
    assert!(flush_step().unwrap());
    store.set(42);
    drive_to_idle();

    // Both consumers show the same snapshot and the transition landed.
    assert_eq!(output(), vec!["42", "42", "n=1"]);
}

#[test]
fn store_that_never_settles_fails_the_flush() {
    let reads = Rc::new(std::cell::Cell::new(0i32));

    let r = reads.clone();
    let result = mount(
        component(move || {
            let r = r.clone();
            let v = use_sync_external_store(
                |_listener: Rc<dyn Fn()>| -> Box<dyn FnOnce()> { Box::new(|| {}) },
                move || {
                    // A snapshot that moves on every read can never commit.
                    r.set(r.get() + 1);
                    r.get()
                },
            );
            vec![text(v.to_string())]
        }),
        Box::new(NullHost),
        RuntimeConfig::default(),
    );

    match result {
        Err(RuntimeError::StoreRetryExceeded(limit)) => assert_eq!(limit, 8),
        _ => panic!("expected the store retry limit to trip"),
    }
}

// =============================================================================
// Reducers
// =============================================================================

#[test]
fn dispatched_actions_fold_in_order() {
    let dispatcher: Rc<RefCell<Option<Dispatch<&'static str>>>> = Rc::new(RefCell::new(None));

    let d = dispatcher.clone();
    let _handle = mount(
        component(move || {
            let (n, dispatch) = use_reducer(
                |state: &i32, action: &&'static str| match *action {
                    "inc" => Ok(state + 1),
                    "double" => Ok(state * 2),
                    other => Err(format!("unknown action: {other}")),
                },
                1i32,
            );
            *d.borrow_mut() = Some(dispatch);
            vec![text(n.to_string())]
        }),
        Box::new(NullHost),
        RuntimeConfig::default(),
    )
    .unwrap();
    assert_eq!(output(), vec!["1"]);

    let dispatch = take_copy(&dispatcher);
    dispatch.dispatch("inc");
    dispatch.dispatch("double");
    flush().unwrap();
    assert_eq!(output(), vec!["4"]);

    // An unrecognized action fails the flush loudly and commits nothing.
    dispatch.dispatch("teleport");
    match flush() {
        Err(RuntimeError::ReducerRejected(reason)) => {
            assert!(reason.contains("teleport"), "unexpected reason: {reason}");
        }
        _ => panic!("expected the reducer to reject"),
    }
    assert_eq!(output(), vec!["4"]);

    // The rejected action stays queued; retrying fails the same way.
    assert!(matches!(flush(), Err(RuntimeError::ReducerRejected(_))));
    assert_eq!(output(), vec!["4"]);
}

#[test]
fn reducer_initializer_runs_once_with_its_argument() {
    let inits = Rc::new(std::cell::Cell::new(0u32));
    let dispatcher: Rc<RefCell<Option<Dispatch<i32>>>> = Rc::new(RefCell::new(None));

    let i = inits.clone();
    let d = dispatcher.clone();
    let _handle = mount(
        component(move || {
            let i = i.clone();
            let (n, dispatch) = use_reducer_with_init(
                |state: &i32, delta: &i32| Ok(state + delta),
                21i32,
                move |arg| {
                    i.set(i.get() + 1);
                    arg * 2
                },
            );
            *d.borrow_mut() = Some(dispatch);
            vec![text(n.to_string())]
        }),
        Box::new(NullHost),
        RuntimeConfig::default(),
    )
    .unwrap();
    assert_eq!(output(), vec!["42"]);

    take_copy(&dispatcher).dispatch(-2);
    flush().unwrap();
    assert_eq!(output(), vec!["40"]);
    assert_eq!(inits.get(), 1);
}
