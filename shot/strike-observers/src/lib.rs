//! Observational components of the strike vision core.
//!
//! Everything here observes and records; nothing in this crate can
//! finalize or refuse a shot. Motion observers derive the per-frame
//! phase, the RS stack measures rolling-shutter observability into the
//! (stubbed) PnP boundary, and the impulse/continuity observers provide
//! the evidence the lifecycle controller acts on.

mod continuity;
mod impulse;
mod motion;
mod rs_pnp;
mod rs_probe;
mod rs_window;

pub use continuity::{PresenceContinuityLatch, MAX_LATCHED_FRAMES, MIN_PRESENCE_FRAMES};
pub use impulse::{
    ImpulseObservation, ImpulseObserver, RefractoryObserver, IMPULSE_DELTA_PX_S,
    MAX_IMPULSE_FRAMES,
};
pub use motion::{
    BallSpeedTracker, KineticEligibility, MotionInvalidReason, MotionPhaseTracker,
    MotionValidity, MotionValidityGate, SpeedSample, DEFAULT_MIN_MOTION_PX_S,
};
pub use rs_pnp::{RsPnpBridge, RsPnpFailure, RsPnpSkipReason, RsPnpVerdict};
pub use rs_probe::{
    probe_frame, RsFrameObservation, RsOutcome, RsRefusalKind, MAX_ROW_CORRELATION,
    MIN_RS_POINTS, MIN_RS_SLOPE,
};
pub use rs_window::{
    RsWindowAggregator, RsWindowSample, RsWindowSnapshot, RS_WINDOW_MAX_SPAN_SEC,
    RS_WINDOW_MAX_STALENESS_SEC, RS_WINDOW_MIN_FRAMES, RS_WINDOW_SIZE,
};
