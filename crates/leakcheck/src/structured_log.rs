//! Structured JSONL records for leak verification passes.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`global_emitter`]: process-wide emitter configured by `LEAKCHECK_LOG`.
//!
//! A pass writes `verification_start`, one `leak_check` record per verdict, then
//! `verification_end`.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{self, VerifyMode};
use crate::location::SourceLocation;
use crate::tracking::{CheckOutcome, Verdict, VerificationPolicy, VerificationReport};

pub const EVENT_START: &str = "verification_start";
pub const EVENT_CHECK: &str = "leak_check";
pub const EVENT_END: &str = "verification_end";
pub const EVENT_LATE: &str = "late_registration";

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn for_outcome(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Pass | CheckOutcome::Skip => Self::Info,
            CheckOutcome::Warn => Self::Warn,
            CheckOutcome::Fail => Self::Error,
        }
    }
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<VerificationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CheckOutcome>,
    /// Whether the candidate was still alive at teardown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            unit: None,
            mode: None,
            entry_id: None,
            policy: None,
            outcome: None,
            leaked: None,
            description: None,
            location: None,
            details: None,
        }
    }

    /// Set the test unit name.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the verify mode.
    #[must_use]
    pub fn with_mode(mut self, mode: VerifyMode) -> Self {
        self.mode = Some(mode.as_str().to_string());
        self
    }

    /// Copy the per-entry fields of a verdict.
    #[must_use]
    pub fn with_verdict(mut self, verdict: &Verdict) -> Self {
        self.entry_id = Some(verdict.id);
        self.policy = Some(verdict.policy);
        self.outcome = Some(verdict.outcome);
        self.leaked = Some(verdict.leaked);
        self.description = Some(verdict.description.clone());
        self.location = Some(verdict.location.clone());
        self
    }

    /// Set the registration site.
    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the candidate description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// In-memory writer whose contents stay readable after being handed to an emitter.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Non-empty lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries to a file or buffer.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
}

/// Emitter shared between trackers.
pub type SharedEmitter = Arc<Mutex<LogEmitter>>;

impl LogEmitter {
    /// Create an emitter that appends to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::to_writer(Box::new(std::io::BufWriter::new(file)), run_id))
    }

    /// Create an emitter that writes to a [`SharedBuffer`] (for testing).
    #[must_use]
    pub fn to_buffer(run_id: &str) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::to_writer(Box::new(buffer.clone()), run_id), buffer)
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write + Send>, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    /// Wrap for sharing between trackers.
    #[must_use]
    pub fn shared(self) -> SharedEmitter {
        Arc::new(Mutex::new(self))
    }

    fn next_trace_id(&mut self, unit: &str) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", unit, self.run_id, self.seq)
    }

    /// Emit a fully-populated log entry, filling in a trace id if it has none.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            let unit = entry.unit.clone().unwrap_or_else(|| "unit".to_string());
            entry.trace_id = self.next_trace_id(&unit);
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Emit the records for one verification pass and flush.
    pub fn emit_pass(
        &mut self,
        unit: &str,
        mode: VerifyMode,
        report: &VerificationReport,
    ) -> std::io::Result<()> {
        let start = LogEntry::new("", LogLevel::Info, EVENT_START)
            .with_unit(unit)
            .with_mode(mode)
            .with_details(serde_json::json!({ "entries": report.verdicts.len() }));
        self.emit_entry(start)?;

        for verdict in &report.verdicts {
            let check = LogEntry::new("", LogLevel::for_outcome(verdict.outcome), EVENT_CHECK)
                .with_unit(unit)
                .with_mode(mode)
                .with_verdict(verdict);
            self.emit_entry(check)?;
        }

        let level = if report.is_clean() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let end = LogEntry::new("", level, EVENT_END)
            .with_unit(unit)
            .with_mode(mode)
            .with_details(serde_json::json!({
                "pass": report.passed(),
                "warn": report.warnings(),
                "fail": report.failures(),
                "skip": report.skipped(),
            }));
        self.emit_entry(end)?;
        self.flush()
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

static GLOBAL_EMITTER: OnceLock<Option<SharedEmitter>> = OnceLock::new();

/// Process-wide emitter, present when `LEAKCHECK_LOG` names a writable file.
#[must_use]
pub fn global_emitter() -> Option<SharedEmitter> {
    GLOBAL_EMITTER
        .get_or_init(|| {
            let path = config::log_path()?;
            let run_id = format!("pid{}", std::process::id());
            match LogEmitter::to_file(path, &run_id) {
                Ok(emitter) => Some(emitter.shared()),
                Err(err) => {
                    eprintln!("leakcheck: cannot open {}: {err}", path.display());
                    None
                }
            }
        })
        .clone()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

/// RFC 3339 timestamp from unix seconds (civil-from-days conversion).
fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(outcome: CheckOutcome) -> Verdict {
        Verdict {
            id: 4,
            description: "Session".to_string(),
            policy: VerificationPolicy::WarnIfLeaked,
            location: SourceLocation::new("s.rs", "tests/s.rs", 20, 3),
            leaked: true,
            outcome,
        }
    }

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("unit::run-1::001", LogLevel::Info, EVENT_START);
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "unit::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], EVENT_START);
        assert!(parsed.get("unit").is_none());
        assert!(parsed.get("policy").is_none());
        assert!(parsed.get("location").is_none());
    }

    #[test]
    fn verdict_fields_serialize() {
        let entry = LogEntry::new("u::r::002", LogLevel::Warn, EVENT_CHECK)
            .with_unit("tests::session")
            .with_mode(VerifyMode::Enforce)
            .with_verdict(&verdict(CheckOutcome::Warn));
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["unit"], "tests::session");
        assert_eq!(parsed["mode"], "enforce");
        assert_eq!(parsed["entry_id"], 4);
        assert_eq!(parsed["policy"], "warn_if_leaked");
        assert_eq!(parsed["outcome"], "warn");
        assert_eq!(parsed["leaked"], true);
        assert_eq!(parsed["location"]["file_path"], "tests/s.rs");
        assert_eq!(parsed["location"]["line"], 20);
    }

    #[test]
    fn emit_pass_writes_start_checks_end() {
        let (mut emitter, buffer) = LogEmitter::to_buffer("run-7");
        let report = VerificationReport {
            verdicts: vec![verdict(CheckOutcome::Warn), verdict(CheckOutcome::Fail)],
        };
        emitter
            .emit_pass("tests::pass", VerifyMode::Enforce, &report)
            .unwrap();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 4);
        let entries: Vec<LogEntry> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries[0].event, EVENT_START);
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[2].level, LogLevel::Error);
        assert_eq!(entries[3].event, EVENT_END);
        assert_eq!(entries[3].level, LogLevel::Error);
        assert_eq!(entries[3].details.as_ref().unwrap()["fail"], 1);
        assert_eq!(entries[0].trace_id, "tests::pass::run-7::001");
        assert_eq!(entries[3].trace_id, "tests::pass::run-7::004");
    }

    #[test]
    fn format_utc_known_instants() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_790_000_000, 250), "2026-09-21T14:13:20.250Z");
    }
}
