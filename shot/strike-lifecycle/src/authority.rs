use serde::{Deserialize, Serialize};
use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::MotionPhase;

/// Minimum time between authoritative shots, seconds.
pub const MIN_SHOT_INTERVAL_SEC: f64 = 1.0;

/// Frames since leaving the Idle phase beyond which a motion episode is
/// stale. The strike signature lives in the first instants of motion;
/// an episode this old without an open lifecycle cannot arm one.
pub const MAX_FRESH_MOTION_FRAMES: u32 = 30;

/// Presence and motion thresholds feeding the authority decision.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityConfig {
    /// Lock corner-count confidence at or above which presence holds.
    pub presence_confidence_threshold: f32,
    /// Instantaneous speed at or above which a frame counts as moving.
    pub min_motion_px_s: f64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            presence_confidence_threshold: 6.0,
            min_motion_px_s: 18.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IneligibilityReason {
    NoPresence,
    NoMotion,
    StaleMotion,
    LifecycleInProgress,
    RecentShot,
}

impl IneligibilityReason {
    fn as_str(&self) -> &'static str {
        match self {
            IneligibilityReason::NoPresence => "no-presence",
            IneligibilityReason::NoMotion => "no-motion",
            IneligibilityReason::StaleMotion => "stale-motion",
            IneligibilityReason::LifecycleInProgress => "lifecycle-in-progress",
            IneligibilityReason::RecentShot => "recent-shot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityDecision {
    Eligible,
    Ineligible(IneligibilityReason),
}

impl AuthorityDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, AuthorityDecision::Eligible)
    }

    fn describe(&self) -> (&'static str, &'static str) {
        match self {
            AuthorityDecision::Eligible => ("true", "eligible"),
            AuthorityDecision::Ineligible(r) => ("false", r.as_str()),
        }
    }
}

/// Per-frame inputs to the authority decision. The gate consumes no
/// history beyond what is passed in.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityInputs {
    pub presence_ok: bool,
    pub motion_phase: MotionPhase,
    pub frames_since_idle: u32,
    pub time_since_last_shot: Option<f64>,
    pub lifecycle_in_progress: bool,
}

/// Pure per-frame eligibility decision; logs only on transitions.
pub struct ShotAuthorityGate {
    last: Option<AuthorityDecision>,
}

impl ShotAuthorityGate {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn decide(
        &mut self,
        inputs: &AuthorityInputs,
        timestamp: f64,
        telemetry: &mut TelemetryRing,
    ) -> AuthorityDecision {
        let decision = Self::evaluate(inputs);

        if self.last != Some(decision) {
            let (from_flag, _) = self
                .last
                .map(|d| d.describe())
                .unwrap_or(("false", "startup"));
            let (to_flag, to_reason) = decision.describe();
            phase_log!(
                LogPhase::Authority,
                "eligible={}->{}({}) frames_since_idle={} t={:.4}",
                from_flag,
                to_flag,
                to_reason,
                inputs.frames_since_idle,
                timestamp
            );
            telemetry.record(
                timestamp,
                LogPhase::Authority,
                codes::AUTHORITY_TRANSITION,
                if decision.is_eligible() { 1.0 } else { 0.0 },
                reason_index(&decision),
            );
            self.last = Some(decision);
        }
        decision
    }

    fn evaluate(inputs: &AuthorityInputs) -> AuthorityDecision {
        if !inputs.presence_ok {
            return AuthorityDecision::Ineligible(IneligibilityReason::NoPresence);
        }
        if inputs.lifecycle_in_progress {
            return AuthorityDecision::Ineligible(IneligibilityReason::LifecycleInProgress);
        }
        if matches!(
            inputs.motion_phase,
            MotionPhase::Idle | MotionPhase::Stabilized
        ) {
            return AuthorityDecision::Ineligible(IneligibilityReason::NoMotion);
        }
        if inputs.frames_since_idle > MAX_FRESH_MOTION_FRAMES {
            return AuthorityDecision::Ineligible(IneligibilityReason::StaleMotion);
        }
        if let Some(gap) = inputs.time_since_last_shot {
            if gap < MIN_SHOT_INTERVAL_SEC {
                return AuthorityDecision::Ineligible(IneligibilityReason::RecentShot);
            }
        }
        AuthorityDecision::Eligible
    }
}

impl Default for ShotAuthorityGate {
    fn default() -> Self {
        Self::new()
    }
}

fn reason_index(d: &AuthorityDecision) -> f32 {
    match d {
        AuthorityDecision::Eligible => 0.0,
        AuthorityDecision::Ineligible(IneligibilityReason::NoPresence) => 1.0,
        AuthorityDecision::Ineligible(IneligibilityReason::NoMotion) => 2.0,
        AuthorityDecision::Ineligible(IneligibilityReason::LifecycleInProgress) => 3.0,
        AuthorityDecision::Ineligible(IneligibilityReason::RecentShot) => 4.0,
        AuthorityDecision::Ineligible(IneligibilityReason::StaleMotion) => 5.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> AuthorityInputs {
        AuthorityInputs {
            presence_ok: true,
            motion_phase: MotionPhase::Approach,
            frames_since_idle: 0,
            time_since_last_shot: None,
            lifecycle_in_progress: false,
        }
    }

    #[test]
    fn eligible_on_fresh_motion() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        assert!(gate.decide(&inputs(), 0.0, &mut tel).is_eligible());
    }

    #[test]
    fn ineligible_without_presence() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        let d = gate.decide(
            &AuthorityInputs {
                presence_ok: false,
                ..inputs()
            },
            0.0,
            &mut tel,
        );
        assert_eq!(
            d,
            AuthorityDecision::Ineligible(IneligibilityReason::NoPresence)
        );
    }

    #[test]
    fn ineligible_while_idle_phase() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        let d = gate.decide(
            &AuthorityInputs {
                motion_phase: MotionPhase::Idle,
                ..inputs()
            },
            0.0,
            &mut tel,
        );
        assert_eq!(
            d,
            AuthorityDecision::Ineligible(IneligibilityReason::NoMotion)
        );
    }

    #[test]
    fn stale_motion_is_ineligible() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        // same context, only the age of the motion episode varies
        let fresh = AuthorityInputs {
            frames_since_idle: 1,
            ..inputs()
        };
        assert!(gate.decide(&fresh, 0.0, &mut tel).is_eligible());
        let stale = AuthorityInputs {
            frames_since_idle: MAX_FRESH_MOTION_FRAMES + 1,
            ..inputs()
        };
        assert_eq!(
            gate.decide(&stale, 0.01, &mut tel),
            AuthorityDecision::Ineligible(IneligibilityReason::StaleMotion)
        );
    }

    #[test]
    fn ineligible_right_after_a_shot() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        let d = gate.decide(
            &AuthorityInputs {
                time_since_last_shot: Some(0.2),
                ..inputs()
            },
            0.0,
            &mut tel,
        );
        assert_eq!(
            d,
            AuthorityDecision::Ineligible(IneligibilityReason::RecentShot)
        );
    }

    #[test]
    fn decision_transitions_are_stable() {
        let mut tel = TelemetryRing::new(64);
        let mut gate = ShotAuthorityGate::new();
        let idle = AuthorityInputs {
            motion_phase: MotionPhase::Idle,
            ..inputs()
        };
        for i in 0..10 {
            gate.decide(&idle, i as f64 / 120.0, &mut tel);
        }
        // one startup transition only
        assert_eq!(tel.len(), 1);
    }
}
