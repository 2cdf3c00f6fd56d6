//! Shared types for the strike vision core.
//!
//! This crate freezes the canonical schema used across the pipeline:
//! frames, corners, cluster snapshots, motion phases, cadence verdicts and
//! the terminal [`ShotRecord`]. Every other member crate consumes these
//! definitions; no component defines a competing variant.

use serde::{Deserialize, Serialize};

mod frame;
mod geom;
mod ring;

pub use frame::{BiPlanarFrame, CameraIntrinsics, FrameError};
pub use geom::{median, median_abs_deviation, Ema2, RectPx};
pub use ring::SlidingRing;

/// Hard capacity of the per-frame corner list.
pub const MAX_CORNER_CAPACITY: usize = 4096;

/// A FAST-9 corner in ROI-SR coordinates, before mapping to the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corner {
    pub x: u16,
    pub y: u16,
    pub score: u8,
}

/// A detected feature in full-frame coordinates.
///
/// Identifiers are positional indices within the current frame's
/// detection; the core does not maintain cross-frame identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionDot {
    pub id: i32,
    pub position: (f32, f32),
    pub score: f32,
    pub predicted: bool,
    pub velocity: Option<(f32, f32)>,
}

/// One frame's ball-like cluster of corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallClusterSnapshot {
    pub center: (f32, f32),
    pub radius_px: f32,
    pub corner_count: u16,
    /// Weighted sum of count, radial-symmetry and radius-stability scores.
    pub quality: f32,
}

/// State of the ball-lock machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallLockState {
    Idle,
    Candidate,
    Locked,
}

impl std::fmt::Display for BallLockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BallLockState::Idle => "Idle",
            BallLockState::Candidate => "Candidate",
            BallLockState::Locked => "Locked",
        };
        write!(f, "{}", s)
    }
}

/// Per-frame motion classification, derived from presence and
/// instantaneous speed with hysteresis on the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionPhase {
    Idle,
    Approach,
    Impact,
    Separation,
    Stabilized,
}

impl std::fmt::Display for MotionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MotionPhase::Idle => "Idle",
            MotionPhase::Approach => "Approach",
            MotionPhase::Impact => "Impact",
            MotionPhase::Separation => "Separation",
            MotionPhase::Stabilized => "Stabilized",
        };
        write!(f, "{}", s)
    }
}

/// Capture cadence verdict over the sliding timestamp window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CadenceVerdict {
    Unknown,
    Valid(f64),
    Invalid(f64),
}

impl CadenceVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, CadenceVerdict::Valid(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, CadenceVerdict::Invalid(_))
    }
}

/// Lifecycle state of the singular shot authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotLifecycleState {
    Idle,
    PreImpact,
    ImpactObserved,
    PostImpact,
    ShotFinalized,
    Refused,
}

impl ShotLifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShotLifecycleState::ShotFinalized | ShotLifecycleState::Refused
        )
    }
}

impl std::fmt::Display for ShotLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShotLifecycleState::Idle => "Idle",
            ShotLifecycleState::PreImpact => "PreImpact",
            ShotLifecycleState::ImpactObserved => "ImpactObserved",
            ShotLifecycleState::PostImpact => "PostImpact",
            ShotLifecycleState::ShotFinalized => "ShotFinalized",
            ShotLifecycleState::Refused => "Refused",
        };
        write!(f, "{}", s)
    }
}

/// Closed set of reasons a shot can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefusalReason {
    InsufficientConfidence,
    InsufficientMotion,
    MarkerLost,
    AmbiguousDetection,
    LifecycleTimeout,
    PostImpactTimeout,
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefusalReason::InsufficientConfidence => "InsufficientConfidence",
            RefusalReason::InsufficientMotion => "InsufficientMotion",
            RefusalReason::MarkerLost => "MarkerLost",
            RefusalReason::AmbiguousDetection => "AmbiguousDetection",
            RefusalReason::LifecycleTimeout => "LifecycleTimeout",
            RefusalReason::PostImpactTimeout => "PostImpactTimeout",
        };
        write!(f, "{}", s)
    }
}

/// Immutable terminal record of one shot lifecycle.
///
/// Exactly one record is emitted per "Idle to non-Idle to Idle" cycle of
/// the lifecycle state. Records with `refused = false` always carry an
/// impact timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    pub shot_id: u32,
    pub start_ts: f64,
    pub impact_ts: Option<f64>,
    pub end_ts: f64,
    pub confidence_at_start: f32,
    /// Ordered motion phases traversed, joined with arrows.
    pub motion_phase_trace: String,
    pub peak_speed_px_s: Option<f64>,
    pub refused: bool,
    pub refusal_reason: Option<RefusalReason>,
    pub final_state: ShotLifecycleState,
}

/// A plain configuration value plus a version counter.
///
/// Components that cache derived state compare the version at frame start
/// and reset when it changed. Bump the version with [`Self::set`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedConfig<T> {
    config: T,
    version: u64,
}

impl<T> VersionedConfig<T> {
    pub fn new(config: T) -> Self {
        Self { config, version: 0 }
    }

    pub fn get(&self) -> &T {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the configuration, invalidating dependent state.
    pub fn set(&mut self, config: T) {
        self.config = config;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_record_yaml_round_trip() {
        let rec = ShotRecord {
            shot_id: 3,
            start_ts: 1.25,
            impact_ts: Some(1.30),
            end_ts: 1.5,
            confidence_at_start: 8.0,
            motion_phase_trace: "Idle\u{2192}Approach\u{2192}Impact".to_string(),
            peak_speed_px_s: Some(812.5),
            refused: false,
            refusal_reason: None,
            final_state: ShotLifecycleState::ShotFinalized,
        };
        let buf = serde_yaml::to_string(&rec).unwrap();
        let rec2: ShotRecord = serde_yaml::from_str(&buf).unwrap();
        assert_eq!(rec, rec2);
    }

    #[test]
    fn versioned_config_bumps() {
        let mut c = VersionedConfig::new(5u32);
        assert_eq!(c.version(), 0);
        c.set(6);
        assert_eq!(c.version(), 1);
        assert_eq!(*c.get(), 6);
    }
}
