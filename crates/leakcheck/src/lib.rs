//! leakcheck core crate.
//!
//! Deferred memory-leak verification for tests: register reference-counted objects while a
//! test runs, and assert at teardown that they were released (or, for pinned retain cycles,
//! that they were not).
//!
//! - [`tracking`]: registry of non-owning observations and the verification engine.
//! - [`lifecycle`]: binds a verification pass to a test's end, either on drop
//!   ([`LeakTracker`], or [`LocalLeakTracker`] for `Rc` candidates) or through teardown blocks
//!   ([`TestCase`]).
//! - [`report`]: where issues go ([`PanicSink`] for libtest, [`RecordingSink`] for inspection).
//! - [`config`] and [`structured_log`]: `LEAKCHECK_MODE` / `LEAKCHECK_LOG` handling.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod location;
pub mod report;
pub mod structured_log;
pub mod tracking;

pub use config::VerifyMode;
pub use error::{Issue, LeakError};
pub use lifecycle::{
    LeakTracker, LocalLeakTracker, Registrar, TestCase, TrackLeaks, TrackerBuilder,
};
pub use location::SourceLocation;
pub use report::{IssueSink, PanicSink, RecordingSink};
pub use tracking::{
    CheckOutcome, EntryHandle, LivenessToken, LocalRegistry, LocalTrackable, Severity, Trackable,
    TrackingRegistry, VerificationEngine, VerificationPolicy, VerificationReport,
};
