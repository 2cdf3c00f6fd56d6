//! Authority gates and the shot lifecycle controller.
//!
//! The gates (cadence, camera regime, scene quiet, authority, deadman)
//! are observational inputs; none can finalize a shot. The controller is
//! the sole authority converting observations and guard refusals into
//! terminal [`strike_types::ShotRecord`]s.

mod authority;
mod cadence;
mod controller;
mod deadman;
mod quiet;
mod regime;

pub use authority::{
    AuthorityConfig, AuthorityDecision, AuthorityInputs, IneligibilityReason, ShotAuthorityGate,
    MAX_FRESH_MOTION_FRAMES, MIN_SHOT_INTERVAL_SEC,
};
pub use cadence::{CadenceEstimator, CADENCE_MIN_FPS, CADENCE_MIN_SAMPLES, CADENCE_WINDOW};
pub use controller::{LifecycleConfig, LifecycleInputs, ShotLifecycleController};
pub use deadman::{LifecycleDeadman, MAX_LIFECYCLE_DURATION_SEC};
pub use quiet::{SceneQuietGate, MIN_QUIET_FRAMES_TO_ENTER, QUIET_MOTION_PX_S};
pub use regime::{CameraRegime, CameraRegimeObserver, REQUIRED_STABLE_DURATION_SEC};
