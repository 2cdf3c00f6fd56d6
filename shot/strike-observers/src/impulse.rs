use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::SlidingRing;

/// Speed delta that counts as an impact impulse, px/s.
pub const IMPULSE_DELTA_PX_S: f64 = 900.0;

/// Frames the observer keeps watching after being armed.
pub const MAX_IMPULSE_FRAMES: u8 = 2;

/// Result of one impulse observation tick.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImpulseObservation {
    pub detected: bool,
    pub delta_speed_px_per_sec: f64,
    pub frames_remaining: u8,
}

/// Watches for a single large frame-to-frame speed delta while armed.
///
/// Arming comes from the authority gate's Eligible decision, which by the
/// per-frame ordering is the previous frame's. The observer therefore
/// keeps the last two signed deltas, so the strike's own delta is still
/// visible on the arming frame. Purely observational.
#[derive(Debug)]
pub struct ImpulseObserver {
    deltas: SlidingRing<f64>,
    prev_speed: f64,
    frames_remaining: u8,
    fired: bool,
}

impl ImpulseObserver {
    pub fn new() -> Self {
        Self {
            deltas: SlidingRing::new(MAX_IMPULSE_FRAMES as usize),
            prev_speed: 0.0,
            frames_remaining: 0,
            fired: false,
        }
    }

    pub fn update(
        &mut self,
        armed: bool,
        speed_px_s: Option<f64>,
        timestamp: f64,
        telemetry: &mut TelemetryRing,
    ) -> ImpulseObservation {
        let speed = speed_px_s.unwrap_or(0.0);
        let delta = speed - self.prev_speed;
        self.prev_speed = speed;
        self.deltas.push(delta);

        if armed {
            self.frames_remaining = MAX_IMPULSE_FRAMES;
        }

        let mut detected = false;
        let best_delta = self
            .deltas
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        if self.frames_remaining > 0 {
            telemetry.record(
                timestamp,
                LogPhase::Shot,
                codes::IMPULSE_DELTA,
                best_delta as f32,
                self.frames_remaining as f32,
            );
            if best_delta >= IMPULSE_DELTA_PX_S && !self.fired {
                detected = true;
                self.fired = true;
                phase_log!(
                    LogPhase::Shot,
                    "impulse detected: dv={:.0} px/s at t={:.4}",
                    best_delta,
                    timestamp
                );
                telemetry.record(
                    timestamp,
                    LogPhase::Shot,
                    codes::IMPULSE_DETECTED,
                    best_delta as f32,
                    0.0,
                );
            }
            self.frames_remaining -= 1;
        } else {
            self.fired = false;
        }

        ImpulseObservation {
            detected,
            delta_speed_px_per_sec: best_delta,
            frames_remaining: self.frames_remaining,
        }
    }

    pub fn reset(&mut self) {
        self.deltas.clear();
        self.prev_speed = 0.0;
        self.frames_remaining = 0;
        self.fired = false;
    }
}

impl Default for ImpulseObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the time between impulses as a fact; never suppresses.
#[derive(Debug, Default)]
pub struct RefractoryObserver {
    last_impulse_ts: Option<f64>,
    last_gap_sec: Option<f64>,
}

impl RefractoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_impulse(&mut self, timestamp: f64, telemetry: &mut TelemetryRing) {
        if let Some(prev) = self.last_impulse_ts {
            let gap = timestamp - prev;
            self.last_gap_sec = Some(gap);
            telemetry.record(
                timestamp,
                LogPhase::Shot,
                codes::REFRACTORY_GAP,
                gap as f32,
                0.0,
            );
        }
        self.last_impulse_ts = Some(timestamp);
    }

    pub fn last_gap_sec(&self) -> Option<f64> {
        self.last_gap_sec
    }
}
