use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};

/// Time without a photometric disturbance before the camera is trusted.
pub const REQUIRED_STABLE_DURATION_SEC: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraRegime {
    Stable,
    Unstable,
}

/// Tracks whether the camera's photometric regime has settled.
///
/// Starts Unstable; external disturbance events (exposure or white
/// balance changes) reset the settling clock.
pub struct CameraRegimeObserver {
    regime: CameraRegime,
    reference_ts: Option<f64>,
}

impl CameraRegimeObserver {
    pub fn new() -> Self {
        Self {
            regime: CameraRegime::Unstable,
            reference_ts: None,
        }
    }

    pub fn regime(&self) -> CameraRegime {
        self.regime
    }

    pub fn is_stable(&self) -> bool {
        self.regime == CameraRegime::Stable
    }

    /// External photometric disturbance event.
    pub fn note_disturbance(&mut self, timestamp: f64, telemetry: &mut TelemetryRing) {
        if self.regime == CameraRegime::Stable {
            phase_log!(
                LogPhase::Camera,
                "camera regime stable -> unstable at t={:.4}",
                timestamp
            );
            telemetry.record(
                timestamp,
                LogPhase::Camera,
                codes::REGIME_TRANSITION,
                0.0,
                0.0,
            );
        }
        self.regime = CameraRegime::Unstable;
        self.reference_ts = Some(timestamp);
    }

    /// Advance one frame.
    pub fn update(&mut self, timestamp: f64, telemetry: &mut TelemetryRing) -> CameraRegime {
        let reference = *self.reference_ts.get_or_insert(timestamp);
        if self.regime == CameraRegime::Unstable
            && timestamp - reference >= REQUIRED_STABLE_DURATION_SEC
        {
            self.regime = CameraRegime::Stable;
            phase_log!(
                LogPhase::Camera,
                "camera regime unstable -> stable at t={:.4}",
                timestamp
            );
            telemetry.record(
                timestamp,
                LogPhase::Camera,
                codes::REGIME_TRANSITION,
                1.0,
                0.0,
            );
        }
        self.regime
    }
}

impl Default for CameraRegimeObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_after_quiet_period() {
        let mut tel = TelemetryRing::new(64);
        let mut obs = CameraRegimeObserver::new();
        assert_eq!(obs.update(0.0, &mut tel), CameraRegime::Unstable);
        assert_eq!(obs.update(0.2, &mut tel), CameraRegime::Unstable);
        assert_eq!(obs.update(0.31, &mut tel), CameraRegime::Stable);
    }

    #[test]
    fn disturbance_resets_the_clock() {
        let mut tel = TelemetryRing::new(64);
        let mut obs = CameraRegimeObserver::new();
        obs.update(0.0, &mut tel);
        obs.note_disturbance(0.25, &mut tel);
        assert_eq!(obs.update(0.35, &mut tel), CameraRegime::Unstable);
        assert_eq!(obs.update(0.56, &mut tel), CameraRegime::Stable);
    }
}
