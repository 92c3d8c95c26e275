//! Schema validation for leak-check JSONL logs.
//!
//! Required on every line: `timestamp`, `trace_id`, `level`, `event`.
//! `leak_check` lines additionally carry `policy`, `outcome`, `description` and a
//! `location` object with `file_path`, `line` and `column`.

use std::path::Path;

use leakcheck::structured_log::{EVENT_CHECK, EVENT_END, EVENT_LATE, EVENT_START, LogEntry};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const EVENTS: [&str; 4] = [EVENT_START, EVENT_CHECK, EVENT_END, EVENT_LATE];
const POLICIES: [&str; 3] = ["fail_if_leaked", "warn_if_leaked", "expect_leak"];
const OUTCOMES: [&str; 4] = ["pass", "warn", "fail", "skip"];
const MODES: [&str; 3] = ["enforce", "lenient", "off"];

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl LogValidationError {
    fn new(line_number: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            line_number,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn check_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
    line_number: usize,
    errors: &mut Vec<LogValidationError>,
) {
    if let Some(value) = obj.get(field).and_then(|v| v.as_str())
        && !allowed.contains(&value)
    {
        errors.push(LogValidationError::new(
            line_number,
            field,
            format!("invalid {field}: '{value}'"),
        ));
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            errors.push(LogValidationError::new(
                line_number,
                "<json>",
                format!("invalid JSON: {e}"),
            ));
            return Err(errors);
        }
    };

    let Some(obj) = value.as_object() else {
        errors.push(LogValidationError::new(
            line_number,
            "<root>",
            "expected JSON object",
        ));
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(LogValidationError::new(
                line_number,
                field,
                "required field missing",
            ));
        }
    }

    check_enum(obj, "level", &LEVELS, line_number, &mut errors);
    check_enum(obj, "event", &EVENTS, line_number, &mut errors);
    check_enum(obj, "policy", &POLICIES, line_number, &mut errors);
    check_enum(obj, "outcome", &OUTCOMES, line_number, &mut errors);
    check_enum(obj, "mode", &MODES, line_number, &mut errors);

    // Per-entry records must be traceable back to their registration site.
    if obj.get("event").and_then(|v| v.as_str()) == Some(EVENT_CHECK) {
        for field in ["policy", "outcome", "description", "location"] {
            if !obj.contains_key(field) {
                errors.push(LogValidationError::new(
                    line_number,
                    field,
                    "leak_check events must include this field",
                ));
            }
        }
    }

    if let Some(location) = obj.get("location") {
        match location.as_object() {
            Some(loc) => {
                if !loc.get("file_path").is_some_and(serde_json::Value::is_string) {
                    errors.push(LogValidationError::new(
                        line_number,
                        "location.file_path",
                        "expected string",
                    ));
                }
                for key in ["line", "column"] {
                    if !loc
                        .get(key)
                        .and_then(serde_json::Value::as_u64)
                        .is_some_and(|n| n >= 1)
                    {
                        errors.push(LogValidationError::new(
                            line_number,
                            &format!("location.{key}"),
                            "expected integer >= 1",
                        ));
                    }
                }
            }
            None => errors.push(LogValidationError::new(
                line_number,
                "location",
                "expected JSON object",
            )),
        }
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() < 3
    {
        errors.push(LogValidationError::new(
            line_number,
            "trace_id",
            format!("trace_id should follow <unit>::<run_id>::<seq> format, got: '{trace_id}'"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value).map_err(|e| {
        vec![LogValidationError::new(
            line_number,
            "<deserialization>",
            format!("failed to deserialize: {e}"),
        )]
    })
}

/// Validate JSONL content. Returns the parsed entries and any validation errors.
#[must_use]
pub fn validate_log_str(content: &str) -> (Vec<LogEntry>, Vec<LogValidationError>) {
    let mut entries = Vec::new();
    let mut all_errors = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match validate_log_line(line, i + 1) {
            Ok(entry) => entries.push(entry),
            Err(errs) => all_errors.extend(errs),
        }
    }

    (entries, all_errors)
}

/// Validate an entire JSONL file.
///
/// Returns the total line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let line_count = content.lines().filter(|l| !l.trim().is_empty()).count();
    let (_, errors) = validate_log_str(&content);
    Ok((line_count, errors))
}
