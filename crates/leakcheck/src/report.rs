//! Issue reporting into the surrounding test framework.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::Issue;
use crate::tracking::Severity;

/// Receives issues from a verification pass.
///
/// `record` is called once per failing entry, in registration order; `finish` is called once
/// when the pass (or test case) is done.
pub trait IssueSink: Send + Sync {
    fn record(&self, issue: Issue);

    fn finish(&self) {}
}

/// libtest integration: warnings go to stderr, fatal issues panic from `finish`.
///
/// If the thread is already unwinding (the test body panicked and teardown is running from
/// drop), fatal issues are printed instead, since a second panic would abort the process.
#[derive(Debug, Default)]
pub struct PanicSink {
    pending: Mutex<Vec<Issue>>,
}

impl PanicSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IssueSink for PanicSink {
    fn record(&self, issue: Issue) {
        match issue.severity {
            Severity::Warning => eprintln!("warning: {issue}"),
            Severity::Fatal => self.pending.lock().push(issue),
        }
    }

    fn finish(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }
        let lines: Vec<String> = pending.iter().map(|issue| format!("  {issue}")).collect();
        let message = format!("{} leak check(s) failed:\n{}", pending.len(), lines.join("\n"));
        if std::thread::panicking() {
            eprintln!("{message}");
        } else {
            panic!("{message}");
        }
    }
}

/// Collects issues for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    issues: Mutex<Vec<Issue>>,
    finished: AtomicUsize,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in order.
    #[must_use]
    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }

    #[must_use]
    pub fn fatal_count(&self) -> usize {
        self.issues.lock().iter().filter(|i| i.is_fatal()).count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.issues.lock().iter().filter(|i| !i.is_fatal()).count()
    }

    /// How many times `finish` has been called.
    #[must_use]
    pub fn finish_count(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }
}

impl IssueSink for RecordingSink {
    fn record(&self, issue: Issue) {
        self.issues.lock().push(issue);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}
