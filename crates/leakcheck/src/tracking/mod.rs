//! Leak tracking primitives: registry, entry model and verification engine.

mod registry;
mod state;
mod verify;

pub use registry::{
    EntryHandle, LivenessToken, LocalRegistry, LocalTrackable, Observe, SyncObservation,
    Trackable, TrackedEntry, TrackingRegistry,
};
pub use state::{CheckOutcome, Severity, UnitState, VerificationPolicy};
pub use verify::{Verdict, VerificationEngine, VerificationReport, decide};
