use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::SlidingRing;

/// Consecutive quiet-candidate frames required to enter Quiet.
pub const MIN_QUIET_FRAMES_TO_ENTER: u32 = 12;

/// Speed at or below which a locked frame is a quiet candidate, px/s.
pub const QUIET_MOTION_PX_S: f64 = 20.0;

const DIRECTION_WINDOW: usize = 8;
const COHERENT_DOT: f32 = 0.6;
const COHERENCE_RATIO_BOUND: f32 = 0.60;

/// Scene-quiet gate. A frame is a quiet candidate when the scene carries
/// no coherent ball motion; after enough consecutive candidates the gate
/// enters Quiet. Any non-candidate frame exits. Logs transitions only.
pub struct SceneQuietGate {
    quiet: bool,
    streak: u32,
    directions: SlidingRing<(f32, f32)>,
}

impl SceneQuietGate {
    pub fn new() -> Self {
        Self {
            quiet: false,
            streak: 0,
            directions: SlidingRing::new(DIRECTION_WINDOW),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Advance one frame.
    pub fn update(
        &mut self,
        locked: bool,
        speed_px_s: Option<f64>,
        direction: Option<(f32, f32)>,
        timestamp: f64,
        telemetry: &mut TelemetryRing,
    ) -> bool {
        if let Some(d) = direction {
            self.directions.push(d);
        }

        let candidate = if !locked {
            true
        } else if speed_px_s.map_or(true, |s| s <= QUIET_MOTION_PX_S) {
            true
        } else {
            self.coherence_ratio() < COHERENCE_RATIO_BOUND
        };

        if candidate {
            self.streak += 1;
            if !self.quiet && self.streak >= MIN_QUIET_FRAMES_TO_ENTER {
                self.quiet = true;
                phase_log!(LogPhase::Shot, "scene quiet entered at t={:.4}", timestamp);
                telemetry.record(
                    timestamp,
                    LogPhase::Shot,
                    codes::QUIET_TRANSITION,
                    1.0,
                    self.streak as f32,
                );
            }
        } else {
            if self.quiet {
                phase_log!(LogPhase::Shot, "scene quiet exited at t={:.4}", timestamp);
                telemetry.record(
                    timestamp,
                    LogPhase::Shot,
                    codes::QUIET_TRANSITION,
                    0.0,
                    self.streak as f32,
                );
            }
            self.quiet = false;
            self.streak = 0;
        }
        self.quiet
    }

    /// Fraction of coherent consecutive direction pairs in the window.
    fn coherence_ratio(&self) -> f32 {
        let dirs: Vec<(f32, f32)> = self.directions.iter().copied().collect();
        if dirs.len() < 2 {
            return 0.0;
        }
        let coherent = dirs
            .windows(2)
            .filter(|w| w[0].0 * w[1].0 + w[0].1 * w[1].1 >= COHERENT_DOT)
            .count();
        coherent as f32 / (dirs.len() - 1) as f32
    }
}

impl Default for SceneQuietGate {
    fn default() -> Self {
        Self::new()
    }
}
