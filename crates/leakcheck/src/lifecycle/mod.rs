//! Test-unit lifecycle adapters.
//!
//! Adapters that bind the verification pass to the end of a test:
//! - [`LeakTracker`]: destructor-triggered. Embed it in a fixture (as the last field) or keep it
//!   alive for the test body; dropping it verifies every registered entry.
//! - [`LocalLeakTracker`]: the destructor-triggered adapter for single-threaded candidates
//!   (`Rc<T>`, `Arc<RefCell<T>>`).
//! - [`TestCase`]: immediate-callback. The test body runs inside [`TestCase::run`], which invokes
//!   registered teardown blocks once the body is done.
//!
//! All of them drive the same engine through [`verify_unit`].

mod local;
mod teardown;
mod tracker;

pub use local::LocalLeakTracker;
pub use teardown::TestCase;
pub use tracker::{LeakTracker, Registrar, TrackLeaks, TrackerBuilder};

use crate::config::VerifyMode;
use crate::error::{Issue, LeakError};
use crate::report::IssueSink;
use crate::structured_log::{EVENT_LATE, LogEntry, LogLevel, SharedEmitter};
use crate::tracking::{
    EntryHandle, Observe, Severity, TrackingRegistry, VerificationEngine, VerificationReport,
};

/// Run one verification pass over `registry`.
///
/// Returns `None` if the registry was already drained. Does not call [`IssueSink::finish`];
/// that belongs to whoever owns the end of the test.
pub(crate) fn verify_unit<O: Observe + ?Sized>(
    unit: &str,
    registry: &TrackingRegistry<O>,
    mode: VerifyMode,
    sink: &dyn IssueSink,
    log: Option<&SharedEmitter>,
) -> Option<VerificationReport> {
    let entries = registry.begin_verification()?;
    let report = VerificationEngine::new(mode).run(entries, sink);
    if let Some(log) = log
        && let Err(err) = log.lock().emit_pass(unit, mode, &report)
    {
        eprintln!("leakcheck: failed to write log for {unit}: {err}");
    }
    registry.finish_verification();
    Some(report)
}

/// Warn about a registration that missed the verification pass.
pub(crate) fn report_late<O: Observe + ?Sized>(
    unit: &str,
    mode: VerifyMode,
    sink: &dyn IssueSink,
    log: Option<&SharedEmitter>,
    handle: &EntryHandle<O>,
) {
    if !mode.verification_enabled() {
        return;
    }
    if let Some(log) = log {
        let entry = LogEntry::new("", LogLevel::Warn, EVENT_LATE)
            .with_unit(unit)
            .with_mode(mode)
            .with_description(handle.description())
            .with_location(handle.location().clone());
        let mut log = log.lock();
        if let Err(err) = log.emit_entry(entry).and_then(|()| log.flush()) {
            eprintln!("leakcheck: failed to write log for {unit}: {err}");
        }
    }
    sink.record(Issue::new(
        Severity::Warning,
        LeakError::LateRegistration {
            description: handle.description().to_string(),
        },
        handle.location().clone(),
    ));
}

/// Name of the current test, as libtest names its worker threads.
pub(crate) fn current_unit_name() -> String {
    std::thread::current()
        .name()
        .filter(|name| *name != "main")
        .unwrap_or("unnamed-unit")
        .to_string()
}
