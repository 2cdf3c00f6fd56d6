//! Per-frame composition of the strike vision core.
//!
//! [`ShotCore`] owns every stateful observer and the lifecycle
//! controller and advances them in the contractual per-frame order:
//! cadence, cluster/lock, motion, rolling shutter, impulse, presence
//! continuity, quiet, regime, authority, deadman, lifecycle.
//! [`StrikeEngine`] adds the GPU corner detection front end and is what
//! the capture collaborator drives one frame at a time.

use serde::{Deserialize, Serialize};

use strike_ball_lock::{BallLock, BallLockConfig};
use strike_feature_detector::{DetectorConfig, StrikeFeatureDetector};
use strike_lifecycle::{
    AuthorityConfig, AuthorityDecision, AuthorityInputs, CadenceEstimator, CameraRegimeObserver,
    LifecycleConfig, LifecycleDeadman, LifecycleInputs, SceneQuietGate, ShotAuthorityGate,
    ShotLifecycleController,
};
use strike_observers::{
    probe_frame, BallSpeedTracker, ImpulseObserver, KineticEligibility, MotionPhaseTracker,
    MotionValidity, MotionValidityGate, PresenceContinuityLatch, RefractoryObserver, RsPnpBridge,
    RsWindowAggregator, RsWindowSample,
};
use strike_telemetry::{codes, phase_log, LogPhase, TelemetryCommand, TelemetryRing};
use strike_types::{
    BallLockState, BiPlanarFrame, CameraIntrinsics, CadenceVerdict, MotionPhase, RefusalReason,
    ShotRecord, VersionedConfig, VisionDot,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("detector initialization failed: {0}")]
    Detector(#[from] strike_feature_detector::Error),
}

/// Bundle of every recognized configuration object.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub ball_lock: BallLockConfig,
    pub lifecycle: LifecycleConfig,
    pub authority: AuthorityConfig,
}

/// Everything downstream of corner detection.
///
/// Scenario tests drive this directly with synthetic corner streams; the
/// full engine feeds it from the GPU detector. Strictly one caller at a
/// time; all state is per-instance.
pub struct ShotCore {
    ball_lock_cfg: VersionedConfig<BallLockConfig>,
    authority_cfg: AuthorityConfig,
    telemetry: TelemetryRing,

    ball_lock: BallLock,
    speed: BallSpeedTracker,
    phase: MotionPhaseTracker,
    kinetic: KineticEligibility,
    validity: MotionValidityGate,
    impulse: ImpulseObserver,
    refractory: RefractoryObserver,
    latch: PresenceContinuityLatch,
    rs_window: RsWindowAggregator,
    rs_pnp: RsPnpBridge,
    cadence: CadenceEstimator,
    regime: CameraRegimeObserver,
    quiet: SceneQuietGate,
    authority: ShotAuthorityGate,
    deadman: LifecycleDeadman,
    controller: ShotLifecycleController,

    intrinsics: Option<CameraIntrinsics>,
    prev_decision: AuthorityDecision,
    frames_since_idle: u32,
    last_separation_validity: MotionValidity,
}

impl ShotCore {
    pub fn new(cfg: &EngineConfig) -> Self {
        let ball_lock_cfg = VersionedConfig::new(cfg.ball_lock.clone());
        let ball_lock = BallLock::new(&ball_lock_cfg);
        Self {
            ball_lock_cfg,
            authority_cfg: cfg.authority.clone(),
            telemetry: TelemetryRing::with_default_capacity(),
            ball_lock,
            speed: BallSpeedTracker::new(),
            phase: MotionPhaseTracker::new(cfg.authority.min_motion_px_s),
            kinetic: KineticEligibility::new(),
            validity: MotionValidityGate::new(),
            impulse: ImpulseObserver::new(),
            refractory: RefractoryObserver::new(),
            latch: PresenceContinuityLatch::new(),
            rs_window: RsWindowAggregator::new(),
            rs_pnp: RsPnpBridge::new(),
            cadence: CadenceEstimator::new(),
            regime: CameraRegimeObserver::new(),
            quiet: SceneQuietGate::new(),
            authority: ShotAuthorityGate::new(),
            deadman: LifecycleDeadman::new(),
            controller: ShotLifecycleController::new(cfg.lifecycle.clone()),
            intrinsics: None,
            prev_decision: AuthorityDecision::Ineligible(
                strike_lifecycle::IneligibilityReason::NoPresence,
            ),
            frames_since_idle: 0,
            last_separation_validity: MotionValidity::NotJudged,
        }
    }

    pub fn set_intrinsics(&mut self, intrinsics: Option<CameraIntrinsics>) {
        self.intrinsics = intrinsics;
    }

    /// Replace the ball-lock configuration; the lock resets at the next
    /// frame start.
    pub fn set_ball_lock_config(&mut self, cfg: BallLockConfig) {
        self.ball_lock_cfg.set(cfg);
    }

    /// External photometric disturbance event from the capture side.
    pub fn note_photometric_disturbance(&mut self, timestamp: f64) {
        self.regime.note_disturbance(timestamp, &mut self.telemetry);
    }

    pub fn cadence_verdict(&self) -> CadenceVerdict {
        self.cadence.verdict()
    }

    pub fn lifecycle_state(&self) -> strike_types::ShotLifecycleState {
        self.controller.state()
    }

    pub fn ball_lock_state(&self) -> BallLockState {
        self.ball_lock.state()
    }

    pub fn motion_phase(&self) -> MotionPhase {
        self.phase.phase()
    }

    pub fn telemetry(&self) -> &TelemetryRing {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryRing {
        &mut self.telemetry
    }

    /// Apply a named telemetry control command.
    pub fn handle_telemetry_command(
        &mut self,
        command: TelemetryCommand,
        dump_dir: &std::path::Path,
    ) -> std::result::Result<Option<std::path::PathBuf>, strike_telemetry::CsvError> {
        match command {
            TelemetryCommand::Pause => {
                self.telemetry.pause();
                Ok(None)
            }
            TelemetryCommand::Dump => Ok(Some(self.telemetry.dump_to_dir(dump_dir)?)),
        }
    }

    /// Advance the core one frame from detected corner positions.
    pub fn process_corners(
        &mut self,
        corners: &[(f32, f32)],
        timestamp: f64,
        frame_size: (u32, u32),
    ) -> Option<ShotRecord> {
        // Capture cadence first: it is a property of the stream itself.
        let cadence = self.cadence.push(timestamp, &mut self.telemetry);

        // Cluster and lock.
        let cluster =
            self.ball_lock
                .observe(corners, timestamp, &self.ball_lock_cfg, &mut self.telemetry);
        if self.ball_lock.state() == BallLockState::Idle {
            self.speed.reset();
            self.kinetic.reset();
        }
        let confidence = self.ball_lock.confidence();
        let raw_present = confidence >= self.authority_cfg.presence_confidence_threshold;

        // Motion observers.
        let sample = self
            .speed
            .update(cluster.map(|c| c.center), timestamp);
        let speed = sample.map(|s| s.speed_px_s);
        self.kinetic.update(sample.as_ref());
        if let Some(s) = sample {
            if s.speed_px_s >= self.authority_cfg.min_motion_px_s {
                self.validity.push(s);
            }
        }

        // Impulse, armed by the previous frame's authority decision.
        let impulse = self.impulse.update(
            self.prev_decision.is_eligible(),
            speed,
            timestamp,
            &mut self.telemetry,
        );
        if impulse.detected {
            self.refractory.observe_impulse(timestamp, &mut self.telemetry);
        }

        // Presence continuity bridges transient loss around the impact.
        let latched = self.latch.update(raw_present, impulse.detected);

        // Phase derivation closes the motion picture for this frame.
        let phase = self.phase.derive(raw_present, latched, speed);
        if phase == MotionPhase::Separation {
            self.last_separation_validity = self.validity.judge(phase);
        } else if phase == MotionPhase::Idle {
            self.last_separation_validity = MotionValidity::NotJudged;
        }

        // Rolling shutter stack.
        let rs_obs = probe_frame(corners, frame_size.1, timestamp, &mut self.telemetry);
        if let Some(c) = cluster {
            self.rs_window.push(RsWindowSample {
                center: c.center,
                radius: c.radius_px,
                timestamp,
                confidence,
            });
        }
        let rs_snapshot = self.rs_window.snapshot(timestamp);
        self.telemetry.record(
            timestamp,
            LogPhase::RsWindow,
            codes::RS_WINDOW_SNAPSHOT,
            rs_snapshot.span_sec as f32,
            rs_snapshot.frame_count as f32,
        );
        let _ = self.rs_pnp.process(&rs_snapshot, self.intrinsics.as_ref());

        // Scene and camera gates.
        self.quiet.update(
            self.ball_lock.state() == BallLockState::Locked,
            speed,
            sample.and_then(|s| s.direction),
            timestamp,
            &mut self.telemetry,
        );
        let regime = self.regime.update(timestamp, &mut self.telemetry);

        if phase == MotionPhase::Idle {
            self.frames_since_idle = 0;
        } else {
            self.frames_since_idle += 1;
        }

        // Authority decision; the impulse observer consumes it next frame.
        let decision = self.authority.decide(
            &AuthorityInputs {
                presence_ok: raw_present || latched,
                motion_phase: phase,
                frames_since_idle: self.frames_since_idle,
                time_since_last_shot: self
                    .controller
                    .last_record_ts()
                    .map(|t| timestamp - t),
                lifecycle_in_progress: self.controller.in_progress(),
            },
            timestamp,
            &mut self.telemetry,
        );

        // Layered refusal guards, deadman first.
        let refusal_reason = self
            .deadman
            .check(self.controller.state(), timestamp)
            .or_else(|| {
                if self.controller.in_progress() && cadence.is_invalid() {
                    Some(RefusalReason::InsufficientConfidence)
                } else {
                    None
                }
            })
            .or_else(|| {
                if self.controller.in_progress() && regime == strike_lifecycle::CameraRegime::Unstable
                {
                    Some(RefusalReason::InsufficientConfidence)
                } else {
                    None
                }
            });

        let record = self.controller.tick(
            &LifecycleInputs {
                timestamp,
                capture_valid: !cadence.is_invalid(),
                rs_observable: rs_obs.outcome.is_observable(),
                eligible_for_shot: decision.is_eligible(),
                ball_lock_confidence: confidence,
                motion_phase: phase,
                ball_speed_px_s: speed,
                motion_validity: self.last_separation_validity,
                refusal_reason,
            },
            &mut self.telemetry,
        );
        self.deadman
            .observe_state(self.controller.state(), timestamp);
        self.prev_decision = decision;

        record
    }
}

/// The complete vision core: GPU corner detection plus [`ShotCore`].
pub struct StrikeEngine {
    cfg: EngineConfig,
    detector: StrikeFeatureDetector,
    core: ShotCore,
    last_dots: Vec<VisionDot>,
}

impl StrikeEngine {
    /// Initialize the engine. GPU failures here are fatal; the per-frame
    /// path afterwards is total.
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        let detector = StrikeFeatureDetector::new(cfg.detector.clone())?;
        let core = ShotCore::new(&cfg);
        Ok(Self {
            cfg,
            detector,
            core,
            last_dots: Vec::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn core(&self) -> &ShotCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ShotCore {
        &mut self.core
    }

    /// Dots from the most recent frame.
    pub fn last_dots(&self) -> &[VisionDot] {
        &self.last_dots
    }

    /// Process one captured frame. Most frames return `None`; a returned
    /// record is terminal and immutable.
    pub fn process_frame(
        &mut self,
        frame: &BiPlanarFrame<'_>,
        intrinsics: Option<CameraIntrinsics>,
    ) -> Option<ShotRecord> {
        if intrinsics.is_some() {
            self.core.set_intrinsics(intrinsics);
        }
        let roi = self.core.ball_lock.locked_roi(
            self.core.ball_lock_cfg.get(),
            frame.width(),
            frame.height(),
        );
        let (corners, dots) = self.detector.detect(frame, roi);
        phase_log!(
            LogPhase::Detection,
            "t={:.4} corners={} roi={:?}",
            frame.timestamp_sec,
            corners.len(),
            roi
        );
        self.last_dots = dots;
        self.core
            .process_corners(&corners, frame.timestamp_sec, (frame.width(), frame.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_yaml_round_trip() {
        let cfg = EngineConfig::default();
        let buf = serde_yaml::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_yaml::from_str(&buf).unwrap();
        assert_eq!(cfg, cfg2);
    }

    #[test]
    fn telemetry_pause_command_stops_pushes() {
        let mut core = ShotCore::new(&EngineConfig::default());
        core.process_corners(&[], 0.0, (640, 480));
        core.handle_telemetry_command(
            strike_telemetry::TelemetryCommand::Pause,
            std::path::Path::new("."),
        )
        .unwrap();
        assert!(core.telemetry().is_paused());
        let before = core.telemetry().len();
        core.process_corners(&[], 1.0 / 120.0, (640, 480));
        assert_eq!(core.telemetry().len(), before);
    }
}
