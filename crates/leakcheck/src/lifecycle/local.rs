//! Destructor-triggered verification for candidates that stay on one thread.

use std::fmt;
use std::sync::Arc;

use crate::config::VerifyMode;
use crate::lifecycle::tracker::Settings;
use crate::lifecycle::{TrackerBuilder, report_late, verify_unit};
use crate::location::SourceLocation;
use crate::report::IssueSink;
use crate::structured_log::SharedEmitter;
use crate::tracking::{
    EntryHandle, LocalRegistry, LocalTrackable, Observe, UnitState, VerificationPolicy,
    VerificationReport,
};

/// Like [`LeakTracker`](crate::LeakTracker), but accepts `Rc<T>`, `rc::Weak<T>` and
/// `Arc<T>` whose target is not `Send + Sync`.
///
/// The tracker itself is neither `Send` nor `Sync`. Build one with
/// [`TrackerBuilder::build_local`] to configure it.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use leakcheck::LocalLeakTracker;
///
/// let tracker = LocalLeakTracker::new();
/// let document = Rc::new(RefCell::new(String::from("draft")));
/// tracker.track(&document);
/// drop(document);
/// drop(tracker); // verifies: `document` was released
/// ```
pub struct LocalLeakTracker {
    unit: String,
    mode: VerifyMode,
    registry: LocalRegistry,
    sink: Arc<dyn IssueSink>,
    log: Option<SharedEmitter>,
}

impl LocalLeakTracker {
    pub(super) fn from_settings(settings: Settings) -> Self {
        Self {
            unit: settings.unit,
            mode: settings.mode,
            registry: LocalRegistry::new_local(),
            sink: settings.sink,
            log: settings.log,
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::builder().build_local()
    }

    #[must_use]
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Track `candidate` with [`VerificationPolicy::FailIfLeaked`].
    #[track_caller]
    pub fn track<C: LocalTrackable + ?Sized>(&self, candidate: &C) -> EntryHandle<dyn Observe> {
        self.register_at(
            candidate,
            VerificationPolicy::default(),
            SourceLocation::caller(),
        )
    }

    #[track_caller]
    pub fn track_with<C: LocalTrackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
    ) -> EntryHandle<dyn Observe> {
        self.register_at(candidate, policy, SourceLocation::caller())
    }

    pub fn register_at<C: LocalTrackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle<dyn Observe> {
        let handle = self.registry.register_local(candidate, policy, location);
        if !handle.is_admitted() {
            report_late(
                &self.unit,
                self.mode,
                self.sink.as_ref(),
                self.log.as_ref(),
                &handle,
            );
        }
        handle
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> UnitState {
        self.registry.state()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Run the verification pass now instead of at drop. Later calls return `None`.
    pub fn teardown(&self) -> Option<VerificationReport> {
        let report = verify_unit(
            &self.unit,
            &self.registry,
            self.mode,
            self.sink.as_ref(),
            self.log.as_ref(),
        )?;
        self.sink.finish();
        Some(report)
    }
}

impl Default for LocalLeakTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalLeakTracker {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

impl fmt::Debug for LocalLeakTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalLeakTracker")
            .field("unit", &self.unit)
            .field("mode", &self.mode)
            .field("registry", &self.registry)
            .finish()
    }
}
