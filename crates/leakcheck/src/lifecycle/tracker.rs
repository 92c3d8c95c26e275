//! Destructor-triggered leak verification.

use std::fmt;
use std::sync::Arc;

use crate::config::{self, VerifyMode};
use crate::lifecycle::{LocalLeakTracker, current_unit_name, report_late, verify_unit};
use crate::location::SourceLocation;
use crate::report::{IssueSink, PanicSink};
use crate::structured_log::{self, SharedEmitter};
use crate::tracking::{
    EntryHandle, Trackable, TrackingRegistry, UnitState, VerificationPolicy, VerificationReport,
};

struct Shared {
    unit: String,
    mode: VerifyMode,
    registry: TrackingRegistry,
    sink: Arc<dyn IssueSink>,
    log: Option<SharedEmitter>,
}

impl Shared {
    fn register<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle {
        let handle = self.registry.register(candidate, policy, location);
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
}

/// Resolved builder settings.
pub(super) struct Settings {
    pub(super) unit: String,
    pub(super) mode: VerifyMode,
    pub(super) sink: Arc<dyn IssueSink>,
    pub(super) log: Option<SharedEmitter>,
}

/// Configures a [`LeakTracker`] or a [`LocalLeakTracker`].
#[derive(Default)]
pub struct TrackerBuilder {
    unit: Option<String>,
    mode: Option<VerifyMode>,
    sink: Option<Arc<dyn IssueSink>>,
    log: Option<Option<SharedEmitter>>,
}

impl TrackerBuilder {
    /// Unit name used in logs. Defaults to the current test name.
    #[must_use]
    pub fn named(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Override the `LEAKCHECK_MODE` setting.
    #[must_use]
    pub fn mode(mut self, mode: VerifyMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Where issues go. Defaults to [`PanicSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn IssueSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Write JSONL records to `log` instead of the `LEAKCHECK_LOG` emitter.
    #[must_use]
    pub fn log(mut self, log: SharedEmitter) -> Self {
        self.log = Some(Some(log));
        self
    }

    /// Disable JSONL records for this tracker.
    #[must_use]
    pub fn without_log(mut self) -> Self {
        self.log = Some(None);
        self
    }

    fn resolve(self) -> Settings {
        Settings {
            unit: self.unit.unwrap_or_else(current_unit_name),
            mode: self.mode.unwrap_or_else(config::verify_mode),
            sink: self.sink.unwrap_or_else(|| Arc::new(PanicSink::new())),
            log: self.log.unwrap_or_else(structured_log::global_emitter),
        }
    }

    #[must_use]
    pub fn build(self) -> LeakTracker {
        let Settings {
            unit,
            mode,
            sink,
            log,
        } = self.resolve();
        let shared = Shared {
            unit,
            mode,
            registry: TrackingRegistry::new(),
            sink,
            log,
        };
        LeakTracker {
            shared: Arc::new(shared),
        }
    }

    /// Build a tracker for candidates that cannot cross threads.
    #[must_use]
    pub fn build_local(self) -> LocalLeakTracker {
        LocalLeakTracker::from_settings(self.resolve())
    }
}

/// Collects leak candidates for one test unit and verifies them when dropped.
///
/// When embedding in a fixture, declare the tracker as the **last** field: fields drop in
/// declaration order, so everything else the fixture owns is released before verification.
///
/// ```
/// use std::sync::Arc;
/// use leakcheck::LeakTracker;
///
/// let tracker = LeakTracker::new();
/// let session = Arc::new(String::from("session"));
/// tracker.track(&session);
/// drop(session);
/// drop(tracker); // verifies: `session` was released
/// ```
pub struct LeakTracker {
    shared: Arc<Shared>,
}

impl LeakTracker {
    /// Tracker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Track `candidate` with [`VerificationPolicy::FailIfLeaked`].
    #[track_caller]
    pub fn track<C: Trackable + ?Sized>(&self, candidate: &C) -> EntryHandle {
        self.register_at(
            candidate,
            VerificationPolicy::default(),
            SourceLocation::caller(),
        )
    }

    /// Track `candidate` with an explicit policy.
    #[track_caller]
    pub fn track_with<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
    ) -> EntryHandle {
        self.register_at(candidate, policy, SourceLocation::caller())
    }

    /// Track `candidate`, attributing issues to `location`.
    pub fn register_at<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle {
        self.shared.register(candidate, policy, location)
    }

    /// Cloneable handle for registering from spawned threads.
    #[must_use]
    pub fn registrar(&self) -> Registrar {
        Registrar {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.shared.unit
    }

    #[must_use]
    pub fn mode(&self) -> VerifyMode {
        self.shared.mode
    }

    #[must_use]
    pub fn state(&self) -> UnitState {
        self.shared.registry.state()
    }

    /// Entries waiting for verification.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.registry.len()
    }

    /// Run the verification pass now instead of at drop.
    ///
    /// Only the first call (explicit or from drop) evaluates anything; later calls return
    /// `None`.
    pub fn teardown(&self) -> Option<VerificationReport> {
        let shared = &self.shared;
        let report = verify_unit(
            &shared.unit,
            &shared.registry,
            shared.mode,
            shared.sink.as_ref(),
            shared.log.as_ref(),
        )?;
        shared.sink.finish();
        Some(report)
    }
}

impl Default for LeakTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LeakTracker {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

impl fmt::Debug for LeakTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakTracker")
            .field("unit", &self.shared.unit)
            .field("mode", &self.shared.mode)
            .field("registry", &self.shared.registry)
            .finish()
    }
}

/// Registration handle for concurrent tasks of the same unit.
///
/// Holds no candidates. Registrations made after the owning tracker has verified are
/// reported as late.
#[derive(Clone)]
pub struct Registrar {
    shared: Arc<Shared>,
}

impl Registrar {
    #[track_caller]
    pub fn track<C: Trackable + ?Sized>(&self, candidate: &C) -> EntryHandle {
        self.register_at(
            candidate,
            VerificationPolicy::default(),
            SourceLocation::caller(),
        )
    }

    #[track_caller]
    pub fn track_with<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
    ) -> EntryHandle {
        self.register_at(candidate, policy, SourceLocation::caller())
    }

    pub fn register_at<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle {
        self.shared.register(candidate, policy, location)
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("unit", &self.shared.unit)
            .finish()
    }
}

/// Attaches the tracking API to a fixture type that owns a [`LeakTracker`].
///
/// ```
/// use std::sync::Arc;
/// use leakcheck::{LeakTracker, TrackLeaks};
///
/// struct CacheFixture {
///     cache: Option<Arc<Vec<u8>>>,
///     leaks: LeakTracker,
/// }
///
/// impl TrackLeaks for CacheFixture {
///     fn leak_tracker(&self) -> &LeakTracker {
///         &self.leaks
///     }
/// }
///
/// let fixture = CacheFixture { cache: Some(Arc::new(vec![1, 2, 3])), leaks: LeakTracker::new() };
/// if let Some(cache) = &fixture.cache {
///     fixture.track_for_leaks(cache);
/// }
/// drop(fixture);
/// ```
pub trait TrackLeaks {
    fn leak_tracker(&self) -> &LeakTracker;

    #[track_caller]
    fn track_for_leaks<C: Trackable + ?Sized>(&self, candidate: &C) -> EntryHandle {
        self.leak_tracker().register_at(
            candidate,
            VerificationPolicy::default(),
            SourceLocation::caller(),
        )
    }

    #[track_caller]
    fn track_for_leaks_with<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
    ) -> EntryHandle {
        self.leak_tracker()
            .register_at(candidate, policy, SourceLocation::caller())
    }
}
