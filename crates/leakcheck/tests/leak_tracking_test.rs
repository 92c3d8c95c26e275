//! Integration test: deferred leak verification across both lifecycle adapters.
//!
//! Run: cargo test -p leakcheck --test leak_tracking_test

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{self, Rc};
use std::sync::{Arc, Weak};
use std::thread;

use leakcheck::{
    CheckOutcome, LeakError, LeakTracker, LivenessToken, LocalLeakTracker, RecordingSink,
    Severity, TestCase, TrackLeaks, VerificationPolicy, VerifyMode,
};
use parking_lot::Mutex;

type Callback = Box<dyn Fn() + Send + Sync>;

/// Holds a callback that can capture the node itself, forming a retain cycle.
#[derive(Default)]
struct Node {
    callback: Mutex<Option<Callback>>,
}

impl Node {
    fn leak_via_self_capture(self: &Arc<Self>) {
        let captured = Arc::clone(self);
        *self.callback.lock() = Some(Box::new(move || {
            let _ = &captured;
        }));
    }
}

/// Breaks the cycle so the test process does not keep the node around.
fn release(node: &Weak<Node>) {
    if let Some(node) = node.upgrade() {
        node.callback.lock().take();
    }
}

fn tracker(sink: &Arc<RecordingSink>) -> LeakTracker {
    LeakTracker::builder()
        .mode(VerifyMode::Enforce)
        .sink(sink.clone())
        .without_log()
        .build()
}

#[test]
fn released_objects_pass_with_default_and_explicit_policy() {
    let sink = Arc::new(RecordingSink::new());
    {
        let tracker = tracker(&sink);
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        tracker.track(&a);
        tracker.track_with(&b, VerificationPolicy::FailIfLeaked);
        drop((a, b));
    }
    assert!(sink.issues().is_empty());
    assert_eq!(sink.finish_count(), 1);
}

#[test]
fn retained_object_outcomes_per_policy() {
    for (policy, fatal, warnings) in [
        (VerificationPolicy::FailIfLeaked, 1, 0),
        (VerificationPolicy::WarnIfLeaked, 0, 1),
        (VerificationPolicy::ExpectLeak, 0, 0),
    ] {
        let sink = Arc::new(RecordingSink::new());
        let weak = {
            let tracker = tracker(&sink);
            let node = Arc::new(Node::default());
            node.leak_via_self_capture();
            tracker.track_with(&node, policy);
            Arc::downgrade(&node)
        };
        assert!(weak.upgrade().is_some(), "cycle should keep the node alive");
        assert_eq!(sink.fatal_count(), fatal, "{policy:?}");
        assert_eq!(sink.warning_count(), warnings, "{policy:?}");
        release(&weak);
        assert!(weak.upgrade().is_none());
    }
}

#[test]
fn expect_leak_fails_when_object_is_released() {
    let sink = Arc::new(RecordingSink::new());
    {
        let tracker = tracker(&sink);
        let node = Arc::new(Node::default());
        tracker.track_with(&node, VerificationPolicy::ExpectLeak);
    }
    let issues = sink.issues();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].is_fatal());
    assert!(matches!(issues[0].error, LeakError::ExpectedLeakAbsent { .. }));
    assert!(
        issues[0]
            .to_string()
            .contains("expected a memory leak, but `leak_tracking_test::Node @ 0x")
    );
}

#[test]
fn zero_registrations_is_a_no_op() {
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker(&sink);
    let report = tracker.teardown().expect("first teardown runs");
    assert!(report.verdicts.is_empty());
    assert!(sink.issues().is_empty());
}

#[test]
fn concurrent_registration_loses_nothing() {
    const TASKS: usize = 64;
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker(&sink);

    thread::scope(|scope| {
        for i in 0..TASKS {
            let tracker = &tracker;
            scope.spawn(move || {
                let value = Arc::new(i);
                tracker.track(&value);
            });
        }
    });

    let registrar = tracker.registrar();
    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let registrar = registrar.clone();
            thread::spawn(move || {
                let value = Arc::new(i);
                registrar.track(&value).id()
            })
        })
        .collect();
    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let report = tracker.teardown().unwrap();
    assert_eq!(report.verdicts.len(), TASKS * 2);
    assert_eq!(report.passed(), TASKS * 2);
    assert!(sink.issues().is_empty());

    let mut all_ids: Vec<u64> = report.verdicts.iter().map(|v| v.id).collect();
    let sorted = {
        let mut s = all_ids.clone();
        s.sort_unstable();
        s
    };
    assert_eq!(all_ids, sorted, "verdicts follow registration order");
    all_ids.dedup();
    assert_eq!(all_ids.len(), TASKS * 2, "no duplicated entries");

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), TASKS);
}

#[test]
fn double_teardown_never_double_reports() {
    let sink = Arc::new(RecordingSink::new());
    let node = Arc::new(Node::default());
    {
        let tracker = tracker(&sink);
        tracker.track(&node);
        assert!(tracker.teardown().is_some());
        assert!(tracker.teardown().is_none());
    }
    assert_eq!(sink.fatal_count(), 1);
    assert_eq!(sink.finish_count(), 1);
}

#[test]
fn leak_free_default_plus_warned_cycle() {
    let sink = Arc::new(RecordingSink::new());
    let b_line;
    let weak_b = {
        let tracker = tracker(&sink);
        let a = Arc::new(Node::default());
        tracker.track(&a);

        let b = Arc::new(Node::default());
        b.leak_via_self_capture();
        b_line = line!() + 1;
        tracker.track_with(&b, VerificationPolicy::WarnIfLeaked);
        Arc::downgrade(&b)
    };

    assert_eq!(sink.fatal_count(), 0);
    let issues = sink.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Warning);
    assert_eq!(issues[0].location.line(), b_line);
    assert!(issues[0].location.file_path().ends_with("leak_tracking_test.rs"));
    release(&weak_b);
}

struct ClientFixture {
    client: Option<Arc<Node>>,
    leaks: LeakTracker,
}

impl TrackLeaks for ClientFixture {
    fn leak_tracker(&self) -> &LeakTracker {
        &self.leaks
    }
}

#[test]
fn fixture_fields_drop_before_verification() {
    let sink = Arc::new(RecordingSink::new());
    let fixture = ClientFixture {
        client: Some(Arc::new(Node::default())),
        leaks: tracker(&sink),
    };
    if let Some(client) = &fixture.client {
        fixture.track_for_leaks(client);
    }
    let token = LivenessToken::new("fixture-scratch");
    fixture.track_for_leaks_with(&token, VerificationPolicy::FailIfLeaked);
    drop(token);
    drop(fixture);

    assert!(sink.issues().is_empty());
}

#[test]
fn lenient_mode_turns_failures_into_warnings() {
    let sink = Arc::new(RecordingSink::new());
    let kept = Arc::new(Node::default());
    let report = {
        let tracker = LeakTracker::builder()
            .mode(VerifyMode::Lenient)
            .sink(sink.clone())
            .without_log()
            .build();
        tracker.track(&kept);
        tracker.teardown().unwrap()
    };
    assert_eq!(report.verdicts[0].outcome, CheckOutcome::Warn);
    assert_eq!(sink.fatal_count(), 0);
    assert_eq!(sink.warning_count(), 1);
}

#[test]
fn immediate_callback_checks_single_entry() {
    let sink = Arc::new(RecordingSink::new());
    let kept = Arc::new(Node::default());
    TestCase::with_sink("immediate", sink.clone())
        .with_mode(VerifyMode::Enforce)
        .run(|tc| {
            let released = Arc::new(Node::default());
            tc.assert_deallocated_after_test(&released);
            tc.assert_deallocated_after_test(&kept);
        });

    assert_eq!(sink.fatal_count(), 1);
    let issue = &sink.issues()[0];
    assert!(matches!(issue.error, LeakError::Leaked { .. }));
}

#[test]
#[should_panic(expected = "memory leak detected")]
fn default_sink_fails_test_on_leak() {
    let kept = Arc::new(Node::default());
    let tracker = LeakTracker::builder()
        .mode(VerifyMode::Enforce)
        .without_log()
        .build();
    tracker.track(&kept);
    drop(tracker);
}

#[test]
fn panicking_body_keeps_its_own_payload() {
    let kept = Arc::new(Node::default());
    let result: Result<(), _> = panic::catch_unwind(AssertUnwindSafe(|| {
        let tracker = LeakTracker::builder()
            .mode(VerifyMode::Enforce)
            .without_log()
            .build();
        tracker.track(&kept);
        panic!("body failed");
    }));

    // The leak is printed during unwinding; the body's panic is the one that surfaces.
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"body failed"));
    assert_eq!(Arc::strong_count(&kept), 1);
}

/// Single-threaded node; its callback can capture the owning `Rc`.
#[derive(Default)]
struct LocalNode {
    callback: Option<Box<dyn Fn()>>,
}

fn local_cycle() -> Rc<RefCell<LocalNode>> {
    let node = Rc::new(RefCell::new(LocalNode::default()));
    let captured = Rc::clone(&node);
    node.borrow_mut().callback = Some(Box::new(move || {
        let _ = &captured;
    }));
    node
}

fn release_local(node: &rc::Weak<RefCell<LocalNode>>) {
    if let Some(node) = node.upgrade() {
        let callback = node.borrow_mut().callback.take();
        drop(callback);
    }
}

fn local_tracker(sink: &Arc<RecordingSink>) -> LocalLeakTracker {
    LocalLeakTracker::builder()
        .mode(VerifyMode::Enforce)
        .sink(sink.clone())
        .without_log()
        .build_local()
}

#[test]
fn rc_refcell_cycle_outcomes_per_policy() {
    for (policy, fatal, warnings) in [
        (VerificationPolicy::FailIfLeaked, 1, 0),
        (VerificationPolicy::WarnIfLeaked, 0, 1),
        (VerificationPolicy::ExpectLeak, 0, 0),
    ] {
        let sink = Arc::new(RecordingSink::new());
        let weak = {
            let tracker = local_tracker(&sink);
            let node = local_cycle();
            tracker.track_with(&node, policy);
            Rc::downgrade(&node)
        };
        assert!(weak.upgrade().is_some(), "cycle should keep the node alive");
        assert_eq!(sink.fatal_count(), fatal, "{policy:?}");
        assert_eq!(sink.warning_count(), warnings, "{policy:?}");
        if let Some(issue) = sink.issues().first() {
            assert!(matches!(issue.error, LeakError::Leaked { .. }));
            assert!(issue.to_string().contains("RefCell<leak_tracking_test::LocalNode>"));
        }
        release_local(&weak);
        assert!(weak.upgrade().is_none());
    }
}

#[test]
fn released_rc_refcell_outcomes_per_policy() {
    for (policy, fatal) in [
        (VerificationPolicy::FailIfLeaked, 0),
        (VerificationPolicy::WarnIfLeaked, 0),
        (VerificationPolicy::ExpectLeak, 1),
    ] {
        let sink = Arc::new(RecordingSink::new());
        {
            let tracker = local_tracker(&sink);
            let node = Rc::new(RefCell::new(LocalNode::default()));
            tracker.track_with(&node, policy);
        }
        assert_eq!(sink.fatal_count(), fatal, "{policy:?}");
        assert_eq!(sink.warning_count(), 0, "{policy:?}");
        if fatal == 1 {
            assert!(matches!(
                sink.issues()[0].error,
                LeakError::ExpectedLeakAbsent { .. }
            ));
        }
    }
}

#[test]
fn non_sync_arc_is_tracked_locally() {
    let sink = Arc::new(RecordingSink::new());
    let kept = Arc::new(RefCell::new(1_u8));
    let report = {
        let tracker = local_tracker(&sink);
        let released = Arc::new(RefCell::new(2_u8));
        tracker.track(&released);
        tracker.track(&kept);
        drop(released);
        tracker.teardown().unwrap()
    };
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failures(), 1);
    assert_eq!(sink.fatal_count(), 1);
}
