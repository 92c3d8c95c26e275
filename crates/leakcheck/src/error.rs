//! Leak-check issue taxonomy.

use std::fmt;

use thiserror::Error;

use crate::location::SourceLocation;
use crate::tracking::Severity;

/// Why a tracked entry produced an issue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeakError {
    #[error("memory leak detected: `{description}` was not deallocated")]
    Leaked { description: String },
    #[error("expected a memory leak, but `{description}` was deallocated")]
    ExpectedLeakAbsent { description: String },
    #[error("`{description}` was registered after the leak verification pass and was not checked")]
    LateRegistration { description: String },
}

impl LeakError {
    /// Description of the candidate this error refers to.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Leaked { description }
            | Self::ExpectedLeakAbsent { description }
            | Self::LateRegistration { description } => description,
        }
    }
}

/// An issue attributed to the call site that registered the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub error: LeakError,
    pub location: SourceLocation,
}

impl Issue {
    #[must_use]
    pub fn new(severity: Severity, error: LeakError, location: SourceLocation) -> Self {
        Self {
            severity,
            error,
            location,
        }
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.error)
    }
}
