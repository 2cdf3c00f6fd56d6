use serde::{Deserialize, Serialize};
use strike_observers::MotionValidity;
use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::{MotionPhase, RefusalReason, ShotLifecycleState, ShotRecord};

/// Thresholds the lifecycle controller judges against.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Lock confidence at or above which the ball counts as acquired.
    pub acquired_threshold: f32,
    /// Confidence below which tracking is considered lost mid-shot.
    pub tracking_floor: f32,
    /// Peak speed a shot must reach to finalize, px/s.
    pub min_valid_shot_speed_px_s: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            acquired_threshold: 6.0,
            tracking_floor: 2.0,
            min_valid_shot_speed_px_s: 400.0,
        }
    }
}

/// Per-tick inputs to the lifecycle controller.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInputs {
    pub timestamp: f64,
    pub capture_valid: bool,
    pub rs_observable: bool,
    pub eligible_for_shot: bool,
    pub ball_lock_confidence: f32,
    pub motion_phase: MotionPhase,
    pub ball_speed_px_s: Option<f64>,
    pub motion_validity: MotionValidity,
    /// Set by the layered guards; the controller is the only place that
    /// converts this into a terminal record.
    pub refusal_reason: Option<RefusalReason>,
}

/// The singular shot authority.
///
/// A pure state machine over [`ShotLifecycleState`]; every terminal
/// outcome of a physical strike is one immutable [`ShotRecord`] emitted
/// here and nowhere else. Refusal-first: ambiguity refuses, it never
/// finalizes.
pub struct ShotLifecycleController {
    cfg: LifecycleConfig,
    state: ShotLifecycleState,
    next_shot_id: u32,
    start_ts: f64,
    impact_ts: Option<f64>,
    confidence_at_start: f32,
    peak_speed_px_s: f64,
    peak_seen: bool,
    phase_trace: Vec<MotionPhase>,
    last_record_ts: Option<f64>,
}

impl ShotLifecycleController {
    pub fn new(cfg: LifecycleConfig) -> Self {
        Self {
            cfg,
            state: ShotLifecycleState::Idle,
            next_shot_id: 1,
            start_ts: 0.0,
            impact_ts: None,
            confidence_at_start: 0.0,
            peak_speed_px_s: 0.0,
            peak_seen: false,
            phase_trace: Vec::new(),
            last_record_ts: None,
        }
    }

    pub fn state(&self) -> ShotLifecycleState {
        self.state
    }

    pub fn in_progress(&self) -> bool {
        !matches!(self.state, ShotLifecycleState::Idle) && !self.state.is_terminal()
    }

    /// Timestamp of the last emitted record, if any.
    pub fn last_record_ts(&self) -> Option<f64> {
        self.last_record_ts
    }

    /// Advance one frame. Rules are evaluated in order; at most one
    /// record is emitted per tick.
    pub fn tick(
        &mut self,
        inputs: &LifecycleInputs,
        telemetry: &mut TelemetryRing,
    ) -> Option<ShotRecord> {
        self.note_phase(inputs.motion_phase);

        // Rule 1: forced refusal from the layered guards.
        if let Some(reason) = inputs.refusal_reason {
            if !self.state.is_terminal() {
                return Some(self.refuse(reason, inputs, telemetry));
            }
        }

        // Rule 2: terminal states hold until the scene settles.
        if self.state.is_terminal() {
            if inputs.motion_phase == MotionPhase::Idle
                && inputs.ball_lock_confidence < self.cfg.acquired_threshold
            {
                self.transition(self.state, ShotLifecycleState::Idle, inputs, None, telemetry);
                self.clear_shot_state();
            }
            return None;
        }

        // Track peak flight speed on every active tick after entry.
        let entered_this_tick = self.apply_transitions(inputs, telemetry);
        if self.in_progress() && !entered_this_tick {
            if let Some(speed) = inputs.ball_speed_px_s {
                self.peak_speed_px_s = self.peak_speed_px_s.max(speed);
                self.peak_seen = true;
            }
        }

        // Presence collapse before separation loses the marker.
        if matches!(
            self.state,
            ShotLifecycleState::PreImpact | ShotLifecycleState::ImpactObserved
        ) && inputs.motion_phase == MotionPhase::Idle
            && inputs.ball_lock_confidence < self.cfg.tracking_floor
        {
            return Some(self.refuse(RefusalReason::MarkerLost, inputs, telemetry));
        }

        // Rule 6: stabilization closes the lifecycle, one way or the other.
        if self.state == ShotLifecycleState::PostImpact
            && inputs.motion_phase == MotionPhase::Stabilized
        {
            if self.peak_speed_px_s >= self.cfg.min_valid_shot_speed_px_s {
                if matches!(inputs.motion_validity, MotionValidity::Invalid(_)) {
                    return Some(self.refuse(RefusalReason::InsufficientMotion, inputs, telemetry));
                }
                return Some(self.finalize(inputs, telemetry));
            }
            return Some(self.refuse(RefusalReason::InsufficientConfidence, inputs, telemetry));
        }

        None
    }

    /// Rules 3-5. Returns true when the lifecycle entered PreImpact on
    /// this tick (its speed sample is the impulse artifact, not flight).
    fn apply_transitions(
        &mut self,
        inputs: &LifecycleInputs,
        telemetry: &mut TelemetryRing,
    ) -> bool {
        let mut entered = false;

        if self.state == ShotLifecycleState::Idle {
            let fast_enough = inputs
                .ball_speed_px_s
                .map_or(false, |s| s >= self.cfg.min_valid_shot_speed_px_s);
            if matches!(
                inputs.motion_phase,
                MotionPhase::Approach | MotionPhase::Impact
            ) && fast_enough
            {
                self.start_ts = inputs.timestamp;
                self.impact_ts = None;
                self.confidence_at_start = inputs.ball_lock_confidence;
                self.peak_speed_px_s = 0.0;
                self.peak_seen = false;
                self.phase_trace = vec![MotionPhase::Idle, inputs.motion_phase];
                self.transition(
                    ShotLifecycleState::Idle,
                    ShotLifecycleState::PreImpact,
                    inputs,
                    None,
                    telemetry,
                );
                return true;
            }
            return false;
        }

        if self.state == ShotLifecycleState::PreImpact
            && matches!(
                inputs.motion_phase,
                MotionPhase::Impact | MotionPhase::Separation
            )
        {
            self.impact_ts = Some(inputs.timestamp);
            self.transition(
                ShotLifecycleState::PreImpact,
                ShotLifecycleState::ImpactObserved,
                inputs,
                None,
                telemetry,
            );
            entered = false;
        }

        if self.state == ShotLifecycleState::ImpactObserved
            && inputs.motion_phase == MotionPhase::Separation
        {
            self.transition(
                ShotLifecycleState::ImpactObserved,
                ShotLifecycleState::PostImpact,
                inputs,
                None,
                telemetry,
            );
        }

        entered
    }

    fn finalize(
        &mut self,
        inputs: &LifecycleInputs,
        telemetry: &mut TelemetryRing,
    ) -> ShotRecord {
        self.transition(
            self.state,
            ShotLifecycleState::ShotFinalized,
            inputs,
            None,
            telemetry,
        );
        let record = self.build_record(inputs, false, None);
        telemetry.record(
            inputs.timestamp,
            LogPhase::Shot,
            codes::SHOT_FINALIZED,
            self.peak_speed_px_s as f32,
            record.shot_id as f32,
        );
        self.emit(record)
    }

    fn refuse(
        &mut self,
        reason: RefusalReason,
        inputs: &LifecycleInputs,
        telemetry: &mut TelemetryRing,
    ) -> ShotRecord {
        // A refusal arriving while Idle still produces a record; the
        // guards only raise reasons worth recording.
        if self.state == ShotLifecycleState::Idle {
            self.start_ts = inputs.timestamp;
            self.confidence_at_start = inputs.ball_lock_confidence;
            if self.phase_trace.is_empty() {
                self.phase_trace.push(inputs.motion_phase);
            }
        }
        self.transition(
            self.state,
            ShotLifecycleState::Refused,
            inputs,
            Some(reason),
            telemetry,
        );
        let record = self.build_record(inputs, true, Some(reason));
        telemetry.record(
            inputs.timestamp,
            LogPhase::Shot,
            codes::SHOT_REFUSED,
            refusal_index(reason),
            record.shot_id as f32,
        );
        self.emit(record)
    }

    fn emit(&mut self, record: ShotRecord) -> ShotRecord {
        self.next_shot_id += 1;
        self.last_record_ts = Some(record.end_ts);
        record
    }

    fn build_record(
        &self,
        inputs: &LifecycleInputs,
        refused: bool,
        reason: Option<RefusalReason>,
    ) -> ShotRecord {
        let trace = self
            .phase_trace
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("\u{2192}");
        ShotRecord {
            shot_id: self.next_shot_id,
            start_ts: self.start_ts,
            impact_ts: self.impact_ts,
            end_ts: inputs.timestamp,
            confidence_at_start: self.confidence_at_start,
            motion_phase_trace: trace,
            peak_speed_px_s: if self.peak_seen {
                Some(self.peak_speed_px_s)
            } else {
                None
            },
            refused,
            refusal_reason: reason,
            final_state: if refused {
                ShotLifecycleState::Refused
            } else {
                ShotLifecycleState::ShotFinalized
            },
        }
    }

    fn clear_shot_state(&mut self) {
        self.start_ts = 0.0;
        self.impact_ts = None;
        self.confidence_at_start = 0.0;
        self.peak_speed_px_s = 0.0;
        self.peak_seen = false;
        self.phase_trace.clear();
    }

    fn note_phase(&mut self, phase: MotionPhase) {
        if self.in_progress() {
            if self.phase_trace.last() != Some(&phase) {
                self.phase_trace.push(phase);
            }
        }
    }

    fn transition(
        &mut self,
        from: ShotLifecycleState,
        to: ShotLifecycleState,
        inputs: &LifecycleInputs,
        reason: Option<RefusalReason>,
        telemetry: &mut TelemetryRing,
    ) {
        self.state = to;
        match reason {
            Some(r) => phase_log!(
                LogPhase::Shot,
                "lifecycle {} -> {} t={:.4} reason={}",
                from,
                to,
                inputs.timestamp,
                r
            ),
            None => phase_log!(
                LogPhase::Shot,
                "lifecycle {} -> {} t={:.4}",
                from,
                to,
                inputs.timestamp
            ),
        }
        telemetry.record(
            inputs.timestamp,
            LogPhase::Shot,
            codes::LIFECYCLE_TRANSITION,
            lifecycle_index(from),
            lifecycle_index(to),
        );
    }
}

fn lifecycle_index(s: ShotLifecycleState) -> f32 {
    match s {
        ShotLifecycleState::Idle => 0.0,
        ShotLifecycleState::PreImpact => 1.0,
        ShotLifecycleState::ImpactObserved => 2.0,
        ShotLifecycleState::PostImpact => 3.0,
        ShotLifecycleState::ShotFinalized => 4.0,
        ShotLifecycleState::Refused => 5.0,
    }
}

fn refusal_index(r: RefusalReason) -> f32 {
    match r {
        RefusalReason::InsufficientConfidence => 1.0,
        RefusalReason::InsufficientMotion => 2.0,
        RefusalReason::MarkerLost => 3.0,
        RefusalReason::AmbiguousDetection => 4.0,
        RefusalReason::LifecycleTimeout => 5.0,
        RefusalReason::PostImpactTimeout => 6.0,
    }
}
