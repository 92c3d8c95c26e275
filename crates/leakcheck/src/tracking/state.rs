//! Core tracking state types.

use serde::{Deserialize, Serialize};

/// How a liveness result at teardown turns into a test outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// The object must be deallocated by teardown; a leak fails the test.
    #[default]
    FailIfLeaked,
    /// A leak is reported as a non-fatal warning.
    WarnIfLeaked,
    /// The object must still be alive at teardown (pinning a known retain cycle).
    ExpectLeak,
}

impl VerificationPolicy {
    /// Stable snake_case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailIfLeaked => "fail_if_leaked",
            Self::WarnIfLeaked => "warn_if_leaked",
            Self::ExpectLeak => "expect_leak",
        }
    }
}

/// Result of evaluating one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    /// Policy satisfied.
    Pass,
    /// Policy violated but tolerated; reported as a non-fatal issue.
    Warn,
    /// Policy violated; reported as a fatal issue.
    Fail,
    /// Verification disabled for this pass.
    Skip,
}

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the test.
    Fatal,
    /// Recorded, but the test still passes.
    Warning,
}

/// Lifecycle of a test unit's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No registrations yet.
    Created,
    /// At least one entry registered.
    Registering,
    /// The verification pass has drained the registry.
    Verifying,
    /// The pass has completed.
    Terminated,
}

impl UnitState {
    /// Returns true while new entries are still admitted.
    #[must_use]
    pub const fn admits_registration(self) -> bool {
        matches!(self, Self::Created | Self::Registering)
    }
}
