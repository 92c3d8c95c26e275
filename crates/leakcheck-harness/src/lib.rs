//! # leakcheck-harness
//!
//! Offline tooling for the JSONL logs written when `LEAKCHECK_LOG` is set:
//! schema validation and per-run summaries.

#![forbid(unsafe_code)]

pub mod summary;
pub mod validate;

pub use summary::{Finding, HarnessError, LogSummary};
pub use validate::{LogValidationError, validate_log_file, validate_log_line, validate_log_str};
