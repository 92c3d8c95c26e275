//! Aggregate view over one or more verification passes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use leakcheck::CheckOutcome;
use leakcheck::structured_log::{EVENT_CHECK, EVENT_LATE, LogEntry};

use crate::validate::{LogValidationError, validate_log_str};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{} invalid log line(s){}", .0.len(), first_error(.0))]
    InvalidLog(Vec<LogValidationError>),
    #[error("unknown output format '{0}' (expected json or plain)")]
    UnknownFormat(String),
}

fn first_error(errors: &[LogValidationError]) -> String {
    errors
        .first()
        .map(|error| format!("; first: {error}"))
        .unwrap_or_default()
}

/// A check that did not pass cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub unit: String,
    pub outcome: String,
    pub policy: String,
    pub description: String,
    pub location: String,
}

/// Totals and findings across every `leak_check` record in a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub units: usize,
    pub checks: usize,
    pub totals: BTreeMap<String, usize>,
    pub late_registrations: usize,
    pub findings: Vec<Finding>,
}

impl LogSummary {
    /// Build from parsed entries, preserving log order for findings.
    #[must_use]
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let mut summary = Self::default();
        let mut units = std::collections::BTreeSet::new();

        for entry in entries {
            if let Some(unit) = &entry.unit {
                units.insert(unit.clone());
            }
            if entry.event == EVENT_LATE {
                summary.late_registrations += 1;
                continue;
            }
            if entry.event != EVENT_CHECK {
                continue;
            }
            let Some(outcome) = entry.outcome else {
                continue;
            };

            summary.checks += 1;
            *summary
                .totals
                .entry(outcome_name(outcome).to_string())
                .or_default() += 1;

            if matches!(outcome, CheckOutcome::Warn | CheckOutcome::Fail) {
                summary.findings.push(Finding {
                    unit: entry.unit.clone().unwrap_or_default(),
                    outcome: outcome_name(outcome).to_string(),
                    policy: entry
                        .policy
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default(),
                    description: entry.description.clone().unwrap_or_default(),
                    location: entry
                        .location
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                });
            }
        }

        summary.units = units.len();
        summary
    }

    /// Validate and summarize JSONL content. Any invalid line fails the whole summary.
    pub fn from_jsonl(content: &str) -> Result<Self, HarnessError> {
        let (entries, errors) = validate_log_str(content);
        if !errors.is_empty() {
            return Err(HarnessError::InvalidLog(errors));
        }
        Ok(Self::from_entries(&entries))
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_jsonl(&content)
    }

    #[must_use]
    pub fn count(&self, outcome: CheckOutcome) -> usize {
        self.totals.get(outcome_name(outcome)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(CheckOutcome::Fail) > 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering.
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} check(s) across {} unit(s): pass={} warn={} fail={} skip={}",
            self.checks,
            self.units,
            self.count(CheckOutcome::Pass),
            self.count(CheckOutcome::Warn),
            self.count(CheckOutcome::Fail),
            self.count(CheckOutcome::Skip),
        );
        if self.late_registrations > 0 {
            let _ = writeln!(out, "late registrations: {}", self.late_registrations);
        }
        for finding in &self.findings {
            let _ = writeln!(
                out,
                "[{}] {} {} ({}) in {}",
                finding.outcome, finding.location, finding.description, finding.policy, finding.unit
            );
        }
        out
    }

    /// Render in `json` or `plain` form.
    pub fn render(&self, format: &str) -> Result<String, HarnessError> {
        match format {
            "json" => Ok(self.to_json()?),
            "plain" => Ok(self.render_plain()),
            other => Err(HarnessError::UnknownFormat(other.to_string())),
        }
    }
}

fn outcome_name(outcome: CheckOutcome) -> &'static str {
    match outcome {
        CheckOutcome::Pass => "pass",
        CheckOutcome::Warn => "warn",
        CheckOutcome::Fail => "fail",
        CheckOutcome::Skip => "skip",
    }
}
