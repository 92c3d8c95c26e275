//! Teardown-time policy evaluation.

use crate::config::VerifyMode;
use crate::error::{Issue, LeakError};
use crate::location::SourceLocation;
use crate::report::IssueSink;
use crate::tracking::{CheckOutcome, Observe, Severity, TrackedEntry, VerificationPolicy};

/// Evaluation result for a single tracked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Registry id of the entry.
    pub id: u64,
    /// Description captured at registration.
    pub description: String,
    /// Policy the entry was registered with.
    pub policy: VerificationPolicy,
    /// Registration call site.
    pub location: SourceLocation,
    /// Whether the candidate was still alive when read.
    pub leaked: bool,
    /// Decision after applying policy and mode.
    pub outcome: CheckOutcome,
}

impl Verdict {
    /// Issue to report for this verdict, if any.
    #[must_use]
    pub fn issue(&self) -> Option<Issue> {
        let severity = match self.outcome {
            CheckOutcome::Pass | CheckOutcome::Skip => return None,
            CheckOutcome::Warn => Severity::Warning,
            CheckOutcome::Fail => Severity::Fatal,
        };
        let description = self.description.clone();
        let error = match (self.policy, self.leaked) {
            (VerificationPolicy::FailIfLeaked | VerificationPolicy::WarnIfLeaked, true) => {
                LeakError::Leaked { description }
            }
            (VerificationPolicy::ExpectLeak, false) => LeakError::ExpectedLeakAbsent { description },
            // The policy was satisfied; nothing to attribute.
            _ => return None,
        };
        Some(Issue::new(severity, error, self.location.clone()))
    }
}

/// Ordered verdicts from one verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub verdicts: Vec<Verdict>,
}

impl VerificationReport {
    fn count(&self, outcome: CheckOutcome) -> usize {
        self.verdicts.iter().filter(|v| v.outcome == outcome).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(CheckOutcome::Pass)
    }

    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(CheckOutcome::Warn)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(CheckOutcome::Fail)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(CheckOutcome::Skip)
    }

    /// True when nothing fatal was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }
}

/// Decide the outcome for a liveness reading under `policy` and `mode`.
#[must_use]
pub fn decide(policy: VerificationPolicy, leaked: bool, mode: VerifyMode) -> CheckOutcome {
    if !mode.verification_enabled() {
        return CheckOutcome::Skip;
    }

    let outcome = match (policy, leaked) {
        (VerificationPolicy::FailIfLeaked, true) => CheckOutcome::Fail,
        (VerificationPolicy::WarnIfLeaked, true) => CheckOutcome::Warn,
        (VerificationPolicy::ExpectLeak, false) => CheckOutcome::Fail,
        _ => CheckOutcome::Pass,
    };

    if outcome == CheckOutcome::Fail && mode.downgrades_failures() {
        CheckOutcome::Warn
    } else {
        outcome
    }
}

/// Turns drained registry entries into verdicts and issues.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationEngine {
    mode: VerifyMode,
}

impl VerificationEngine {
    #[must_use]
    pub fn new(mode: VerifyMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    /// Evaluate one entry. Reads liveness exactly once.
    #[must_use]
    pub fn evaluate<O: Observe + ?Sized>(&self, entry: &TrackedEntry<O>) -> Verdict {
        let leaked = entry.is_alive();
        Verdict {
            id: entry.id(),
            description: entry.description().to_string(),
            policy: entry.policy(),
            location: entry.location().clone(),
            leaked,
            outcome: decide(entry.policy(), leaked, self.mode),
        }
    }

    /// Evaluate every entry in order and record issues. Entries are independent: a failure
    /// never stops evaluation of the ones after it.
    pub fn run<O: Observe + ?Sized>(
        &self,
        entries: Vec<TrackedEntry<O>>,
        sink: &dyn IssueSink,
    ) -> VerificationReport {
        let verdicts: Vec<Verdict> = entries.iter().map(|entry| self.evaluate(entry)).collect();
        // Observations go away with the entries; only the verdicts outlive the pass.
        drop(entries);

        for issue in verdicts.iter().filter_map(Verdict::issue) {
            sink.record(issue);
        }
        VerificationReport { verdicts }
    }
}
