//! Per-unit registry of tracked candidates.
//!
//! Registries come in two flavors that differ only in the observation they store:
//! [`TrackingRegistry`] holds `Send + Sync` observations and can be shared across threads,
//! while [`LocalRegistry`] accepts single-threaded candidates such as `Rc<RefCell<T>>`.

use std::any::type_name;
use std::fmt;
use std::rc::{self, Rc};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::location::SourceLocation;
use crate::tracking::{UnitState, VerificationPolicy};

/// A non-owning observer that reports whether its target is still allocated.
///
/// Once `is_alive` returns false it must never return true again.
pub trait Observe {
    fn is_alive(&self) -> bool;
}

/// Observation that may cross threads.
pub type SyncObservation = dyn Observe + Send + Sync;

impl<T: ?Sized> Observe for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

impl<T: ?Sized> Observe for rc::Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Something whose deallocation can be observed from any thread without keeping it alive.
///
/// Implemented for `Arc<T>`, `Weak<T>` and [`LivenessToken`]. Plain values have no
/// allocation to observe, so handing one to the registry does not compile.
pub trait Trackable {
    /// Create a non-owning observation of `self`.
    fn observe(&self) -> Arc<SyncObservation>;
    /// Human-readable description, captured at registration time.
    fn describe(&self) -> String;
}

/// Single-threaded counterpart of [`Trackable`].
///
/// Covers every reference-counted pointer: `Rc<T>`, `rc::Weak<T>`, and `Arc<T>` / `Weak<T>`
/// whose target is not `Send + Sync` (for example `Arc<RefCell<T>>`).
pub trait LocalTrackable {
    fn observe_local(&self) -> Arc<dyn Observe>;
    fn describe_local(&self) -> String;
}

fn describe_ptr<T: ?Sized>(ptr: *const T) -> String {
    format!("{} @ {:p}", type_name::<T>(), ptr)
}

impl<T: ?Sized + Send + Sync + 'static> Trackable for Arc<T> {
    fn observe(&self) -> Arc<SyncObservation> {
        Arc::new(Arc::downgrade(self))
    }

    fn describe(&self) -> String {
        describe_ptr(Arc::as_ptr(self))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Trackable for Weak<T> {
    fn observe(&self) -> Arc<SyncObservation> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> String {
        describe_ptr(self.as_ptr())
    }
}

impl<T: ?Sized + 'static> LocalTrackable for Arc<T> {
    fn observe_local(&self) -> Arc<dyn Observe> {
        Arc::new(Arc::downgrade(self))
    }

    fn describe_local(&self) -> String {
        describe_ptr(Arc::as_ptr(self))
    }
}

impl<T: ?Sized + 'static> LocalTrackable for Weak<T> {
    fn observe_local(&self) -> Arc<dyn Observe> {
        Arc::new(self.clone())
    }

    fn describe_local(&self) -> String {
        describe_ptr(self.as_ptr())
    }
}

impl<T: ?Sized + 'static> LocalTrackable for Rc<T> {
    fn observe_local(&self) -> Arc<dyn Observe> {
        Arc::new(Rc::downgrade(self))
    }

    fn describe_local(&self) -> String {
        describe_ptr(Rc::as_ptr(self))
    }
}

impl<T: ?Sized + 'static> LocalTrackable for rc::Weak<T> {
    fn observe_local(&self) -> Arc<dyn Observe> {
        Arc::new(self.clone())
    }

    fn describe_local(&self) -> String {
        describe_ptr(self.as_ptr())
    }
}

/// Liveness marker for objects that are not held in a reference-counted pointer.
///
/// Embed one in the object; dropping the object drops the token, which the registered
/// observation then sees as released. This only proves the token went away, so it is weaker
/// than observing the allocation itself.
#[derive(Debug)]
pub struct LivenessToken {
    label: String,
    alive: Arc<()>,
}

impl LivenessToken {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            alive: Arc::new(()),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Trackable for LivenessToken {
    fn observe(&self) -> Arc<SyncObservation> {
        Arc::new(Arc::downgrade(&self.alive))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl LocalTrackable for LivenessToken {
    fn observe_local(&self) -> Arc<dyn Observe> {
        Arc::new(Arc::downgrade(&self.alive))
    }

    fn describe_local(&self) -> String {
        self.label.clone()
    }
}

/// A registered candidate together with its policy and origin.
pub struct TrackedEntry<O: ?Sized = SyncObservation> {
    id: u64,
    observation: Arc<O>,
    description: String,
    policy: VerificationPolicy,
    location: SourceLocation,
}

impl<O: Observe + ?Sized> TrackedEntry<O> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Point-in-time liveness read. Never blocks.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.observation.is_alive()
    }
}

impl<O: Observe + ?Sized> fmt::Debug for TrackedEntry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntry")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("policy", &self.policy)
            .field("location", &self.location)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Diagnostic handle returned from registration. Does not keep the candidate alive.
pub struct EntryHandle<O: ?Sized = SyncObservation> {
    id: u64,
    description: String,
    policy: VerificationPolicy,
    location: SourceLocation,
    observation: Arc<O>,
    admitted: bool,
}

impl<O: Observe + ?Sized> EntryHandle<O> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.observation.is_alive()
    }

    /// False when the registration arrived after the verification pass began.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }
}

impl<O: ?Sized> Clone for EntryHandle<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            description: self.description.clone(),
            policy: self.policy,
            location: self.location.clone(),
            observation: Arc::clone(&self.observation),
            admitted: self.admitted,
        }
    }
}

impl<O: ?Sized> fmt::Debug for EntryHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHandle")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("policy", &self.policy)
            .field("location", &self.location)
            .field("admitted", &self.admitted)
            .finish()
    }
}

struct RegistryInner<O: ?Sized> {
    state: UnitState,
    next_id: u64,
    entries: Vec<TrackedEntry<O>>,
}

/// Append-only collection of tracked entries for one test unit.
///
/// With the default observation type the registry is `Send + Sync`.
pub struct TrackingRegistry<O: ?Sized = SyncObservation> {
    inner: Mutex<RegistryInner<O>>,
}

/// Registry for single-threaded candidates. Neither `Send` nor `Sync`.
pub type LocalRegistry = TrackingRegistry<dyn Observe>;

impl<O: ?Sized> Default for TrackingRegistry<O> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                state: UnitState::Created,
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }
}

impl TrackingRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate. Only a weak observation of it is retained.
    pub fn register<C: Trackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle {
        self.register_observation(candidate.observe(), candidate.describe(), policy, location)
    }
}

impl LocalRegistry {
    #[must_use]
    pub fn new_local() -> Self {
        Self::default()
    }

    /// Register a single-threaded candidate. Only a weak observation of it is retained.
    pub fn register_local<C: LocalTrackable + ?Sized>(
        &self,
        candidate: &C,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle<dyn Observe> {
        self.register_observation(
            candidate.observe_local(),
            candidate.describe_local(),
            policy,
            location,
        )
    }
}

impl<O: Observe + ?Sized> TrackingRegistry<O> {
    /// Register a pre-built observation.
    pub fn register_observation(
        &self,
        observation: Arc<O>,
        description: String,
        policy: VerificationPolicy,
        location: SourceLocation,
    ) -> EntryHandle<O> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let admitted = inner.state.admits_registration();

        let handle = EntryHandle {
            id,
            description: description.clone(),
            policy,
            location: location.clone(),
            observation: Arc::clone(&observation),
            admitted,
        };

        if admitted {
            inner.state = UnitState::Registering;
            inner.entries.push(TrackedEntry {
                id,
                observation,
                description,
                policy,
                location,
            });
        }
        handle
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> UnitState {
        self.inner.lock().state
    }

    /// Number of entries waiting for verification.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot and clear the registry, entering `Verifying`.
    ///
    /// Returns `None` if a pass has already started, so a second teardown cannot
    /// re-evaluate anything.
    pub fn begin_verification(&self) -> Option<Vec<TrackedEntry<O>>> {
        let mut inner = self.inner.lock();
        if !inner.state.admits_registration() {
            return None;
        }
        inner.state = UnitState::Verifying;
        Some(std::mem::take(&mut inner.entries))
    }

    /// Mark the pass complete.
    pub fn finish_verification(&self) {
        self.inner.lock().state = UnitState::Terminated;
    }
}

impl<O: ?Sized> fmt::Debug for TrackingRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TrackingRegistry")
            .field("state", &inner.state)
            .field("entries", &inner.entries.len())
            .finish()
    }
}
