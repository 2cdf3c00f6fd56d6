use strike_types::{MotionPhase, SlidingRing};

/// Default floor for a frame to count as moving, px/s.
pub const DEFAULT_MIN_MOTION_PX_S: f64 = 18.0;

/// One frame's speed measurement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeedSample {
    pub speed_px_s: f64,
    /// Unit direction of travel, absent when the displacement is
    /// negligible.
    pub direction: Option<(f32, f32)>,
    pub position: (f32, f32),
}

/// Tracks the instantaneous ball speed from successive cluster centers.
#[derive(Debug, Default)]
pub struct BallSpeedTracker {
    last: Option<((f32, f32), f64)>,
    last_instantaneous: Option<SpeedSample>,
}

impl BallSpeedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe this frame's cluster center (if any). Returns the
    /// instantaneous sample for this frame.
    pub fn update(&mut self, center: Option<(f32, f32)>, timestamp: f64) -> Option<SpeedSample> {
        let sample = match (center, self.last) {
            (Some(c), Some((p, t))) if timestamp > t => {
                let dt = timestamp - t;
                let dx = (c.0 - p.0) as f64;
                let dy = (c.1 - p.1) as f64;
                let dist = dx.hypot(dy);
                let speed = dist / dt;
                let direction = if dist > f64::EPSILON {
                    Some(((dx / dist) as f32, (dy / dist) as f32))
                } else {
                    None
                };
                Some(SpeedSample {
                    speed_px_s: speed,
                    direction,
                    position: c,
                })
            }
            _ => None,
        };
        if let Some(c) = center {
            self.last = Some((c, timestamp));
        }
        self.last_instantaneous = sample;
        sample
    }

    pub fn last_instantaneous(&self) -> Option<SpeedSample> {
        self.last_instantaneous
    }

    /// Forget everything; called on lock loss.
    pub fn reset(&mut self) {
        self.last = None;
        self.last_instantaneous = None;
    }
}

/// Hysteretic per-frame motion phase derivation.
///
/// `Separation` holds while the object stays visible and still after
/// motion; `Stabilized` is reached when only the continuity latch keeps
/// presence alive (the object left the scene after separating) and
/// relaxes back to `Idle` once real presence returns or the latch drops.
#[derive(Debug)]
pub struct MotionPhaseTracker {
    prev: MotionPhase,
    was_moving: bool,
    min_motion_px_s: f64,
}

impl MotionPhaseTracker {
    pub fn new(min_motion_px_s: f64) -> Self {
        Self {
            prev: MotionPhase::Idle,
            was_moving: false,
            min_motion_px_s,
        }
    }

    pub fn phase(&self) -> MotionPhase {
        self.prev
    }

    pub fn was_moving(&self) -> bool {
        self.was_moving
    }

    /// Derive this frame's phase. `raw_present` is cluster presence this
    /// frame; `latched` is the continuity latch state.
    pub fn derive(
        &mut self,
        raw_present: bool,
        latched: bool,
        speed_px_s: Option<f64>,
    ) -> MotionPhase {
        let presence_ok = raw_present || latched;
        let moving_now = presence_ok
            && speed_px_s.map_or(false, |s| s >= self.min_motion_px_s);

        let phase = if !presence_ok {
            MotionPhase::Idle
        } else if moving_now && self.was_moving {
            MotionPhase::Impact
        } else if moving_now {
            MotionPhase::Approach
        } else if self.was_moving {
            MotionPhase::Separation
        } else {
            match self.prev {
                MotionPhase::Separation => {
                    if raw_present {
                        MotionPhase::Separation
                    } else {
                        MotionPhase::Stabilized
                    }
                }
                MotionPhase::Stabilized => {
                    if raw_present {
                        MotionPhase::Idle
                    } else {
                        MotionPhase::Stabilized
                    }
                }
                _ => MotionPhase::Idle,
            }
        };

        self.was_moving = moving_now;
        self.prev = phase;
        phase
    }

    pub fn reset(&mut self) {
        self.prev = MotionPhase::Idle;
        self.was_moving = false;
    }
}

const KINETIC_REQUIRED_FRAMES: u32 = 3;
const KINETIC_MIN_SUSTAINED_PX_S: f64 = 18.0;
const KINETIC_MIN_DIRECTION_DOT: f32 = 0.6;

/// Observational check for sustained, directionally coherent motion.
#[derive(Debug, Default)]
pub struct KineticEligibility {
    streak: u32,
    last_direction: Option<(f32, f32)>,
}

impl KineticEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sample: Option<&SpeedSample>) -> bool {
        match sample {
            Some(s) if s.speed_px_s >= KINETIC_MIN_SUSTAINED_PX_S => match s.direction {
                Some(d) => {
                    let coherent = match self.last_direction {
                        Some(prev) => dot(prev, d) >= KINETIC_MIN_DIRECTION_DOT,
                        None => true,
                    };
                    self.streak = if coherent { self.streak + 1 } else { 1 };
                    self.last_direction = Some(d);
                }
                None => {
                    self.streak = 0;
                    self.last_direction = None;
                }
            },
            _ => {
                self.streak = 0;
                self.last_direction = None;
            }
        }
        self.is_eligible()
    }

    pub fn is_eligible(&self) -> bool {
        self.streak >= KINETIC_REQUIRED_FRAMES
    }

    pub fn reset(&mut self) {
        self.streak = 0;
        self.last_direction = None;
    }
}

/// Why a separation trajectory was judged invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MotionInvalidReason {
    SpeedBelowFloor,
    MissingVector,
    InsufficientHistory,
    DirectionFlips,
    IncoherentPairs,
    InsufficientProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MotionValidity {
    Valid,
    Invalid(MotionInvalidReason),
    /// Judged only during Separation; any other phase is not judged.
    NotJudged,
}

const VALIDITY_HISTORY_LEN: usize = 8;
const VALIDITY_SPEED_FLOOR_PX_S: f64 = 6.0;
const VALIDITY_MIN_HISTORY: usize = 3;
const VALIDITY_FLIP_WINDOW: usize = 5;
const VALIDITY_MAX_FLIPS: usize = 1;
const VALIDITY_COHERENT_DOT: f32 = 0.6;
const VALIDITY_MIN_COHERENT_PAIRS: usize = 2;
const VALIDITY_MIN_PROGRESS_PX: f32 = 3.0;

/// Judges the quality of the separation trajectory from recent motion
/// samples. Never judges during Impact.
#[derive(Debug)]
pub struct MotionValidityGate {
    history: SlidingRing<SpeedSample>,
}

impl MotionValidityGate {
    pub fn new() -> Self {
        Self {
            history: SlidingRing::new(VALIDITY_HISTORY_LEN),
        }
    }

    /// Record a moving-frame sample.
    pub fn push(&mut self, sample: SpeedSample) {
        self.history.push(sample);
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn judge(&self, phase: MotionPhase) -> MotionValidity {
        if phase != MotionPhase::Separation {
            return MotionValidity::NotJudged;
        }
        if self.history.len() < VALIDITY_MIN_HISTORY {
            return MotionValidity::Invalid(MotionInvalidReason::InsufficientHistory);
        }
        let samples: Vec<&SpeedSample> = self.history.iter().collect();

        let peak = samples
            .iter()
            .map(|s| s.speed_px_s)
            .fold(0.0f64, f64::max);
        if peak < VALIDITY_SPEED_FLOOR_PX_S {
            return MotionValidity::Invalid(MotionInvalidReason::SpeedBelowFloor);
        }

        let directions: Vec<(f32, f32)> = match samples
            .iter()
            .map(|s| s.direction)
            .collect::<Option<Vec<_>>>()
        {
            Some(d) => d,
            None => return MotionValidity::Invalid(MotionInvalidReason::MissingVector),
        };

        let recent = &directions[directions.len().saturating_sub(VALIDITY_FLIP_WINDOW)..];
        let flips = recent
            .windows(2)
            .filter(|w| dot(w[0], w[1]) < 0.0)
            .count();
        if flips > VALIDITY_MAX_FLIPS {
            return MotionValidity::Invalid(MotionInvalidReason::DirectionFlips);
        }

        let coherent_pairs = directions
            .windows(2)
            .filter(|w| dot(w[0], w[1]) >= VALIDITY_COHERENT_DOT)
            .count();
        if coherent_pairs < VALIDITY_MIN_COHERENT_PAIRS {
            return MotionValidity::Invalid(MotionInvalidReason::IncoherentPairs);
        }

        let first = samples[0].position;
        let last = samples[samples.len() - 1].position;
        let progress = (last.0 - first.0).hypot(last.1 - first.1);
        if progress < VALIDITY_MIN_PROGRESS_PX {
            return MotionValidity::Invalid(MotionInvalidReason::InsufficientProgress);
        }

        MotionValidity::Valid
    }
}

#[inline]
fn dot(a: (f32, f32), b: (f32, f32)) -> f32 {
    a.0 * b.0 + a.1 * b.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_tracker_measures_px_per_sec() {
        let mut t = BallSpeedTracker::new();
        assert!(t.update(Some((100.0, 100.0)), 0.0).is_none());
        let s = t.update(Some((110.0, 100.0)), 0.1).unwrap();
        assert!((s.speed_px_s - 100.0).abs() < 1e-6);
        let d = s.direction.unwrap();
        assert!((d.0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn phase_idle_without_presence() {
        let mut p = MotionPhaseTracker::new(DEFAULT_MIN_MOTION_PX_S);
        assert_eq!(p.derive(false, false, None), MotionPhase::Idle);
        assert_eq!(p.derive(false, false, Some(500.0)), MotionPhase::Idle);
    }

    #[test]
    fn phase_sequence_for_a_clean_strike() {
        let mut p = MotionPhaseTracker::new(DEFAULT_MIN_MOTION_PX_S);
        // still ball
        for _ in 0..5 {
            assert_eq!(p.derive(true, false, Some(0.0)), MotionPhase::Idle);
        }
        // first moving frame
        assert_eq!(p.derive(true, false, Some(1400.0)), MotionPhase::Approach);
        // sustained motion
        assert_eq!(p.derive(true, true, Some(700.0)), MotionPhase::Impact);
        assert_eq!(p.derive(true, true, Some(650.0)), MotionPhase::Impact);
        // ball gone, latch holds presence
        assert_eq!(p.derive(false, true, None), MotionPhase::Separation);
        assert_eq!(p.derive(false, true, None), MotionPhase::Stabilized);
        assert_eq!(p.derive(false, true, None), MotionPhase::Stabilized);
        // latch expired
        assert_eq!(p.derive(false, false, None), MotionPhase::Idle);
    }

    #[test]
    fn separation_holds_while_ball_visible_and_still() {
        let mut p = MotionPhaseTracker::new(DEFAULT_MIN_MOTION_PX_S);
        p.derive(true, false, Some(0.0));
        p.derive(true, false, Some(1400.0)); // Approach
        assert_eq!(p.derive(true, true, Some(0.0)), MotionPhase::Separation);
        for _ in 0..50 {
            assert_eq!(p.derive(true, true, Some(0.0)), MotionPhase::Separation);
        }
        // object removed; only the latch keeps presence
        assert_eq!(p.derive(false, true, None), MotionPhase::Stabilized);
    }

    #[test]
    fn kinetic_eligibility_needs_three_coherent_frames() {
        let mut k = KineticEligibility::new();
        let fast = |d: (f32, f32)| SpeedSample {
            speed_px_s: 600.0,
            direction: Some(d),
            position: (0.0, 0.0),
        };
        assert!(!k.update(Some(&fast((1.0, 0.0)))));
        assert!(!k.update(Some(&fast((1.0, 0.0)))));
        assert!(k.update(Some(&fast((0.99, 0.05)))));
        // incoherent turn resets the streak
        assert!(!k.update(Some(&fast((-1.0, 0.0)))));
    }

    #[test]
    fn kinetic_eligibility_resets_on_slow_frame() {
        let mut k = KineticEligibility::new();
        let fast = SpeedSample {
            speed_px_s: 600.0,
            direction: Some((1.0, 0.0)),
            position: (0.0, 0.0),
        };
        let slow = SpeedSample {
            speed_px_s: 2.0,
            direction: Some((1.0, 0.0)),
            position: (0.0, 0.0),
        };
        k.update(Some(&fast));
        k.update(Some(&fast));
        assert!(!k.update(Some(&slow)));
        assert!(!k.is_eligible());
    }

    fn coherent_run(n: usize) -> MotionValidityGate {
        let mut g = MotionValidityGate::new();
        for i in 0..n {
            g.push(SpeedSample {
                speed_px_s: 600.0,
                direction: Some((1.0, 0.0)),
                position: (i as f32 * 5.0, 0.0),
            });
        }
        g
    }

    #[test]
    fn validity_judged_only_in_separation() {
        let g = coherent_run(5);
        assert_eq!(g.judge(MotionPhase::Impact), MotionValidity::NotJudged);
        assert_eq!(g.judge(MotionPhase::Idle), MotionValidity::NotJudged);
        assert_eq!(g.judge(MotionPhase::Separation), MotionValidity::Valid);
    }

    #[test]
    fn validity_requires_history() {
        let g = coherent_run(2);
        assert_eq!(
            g.judge(MotionPhase::Separation),
            MotionValidity::Invalid(MotionInvalidReason::InsufficientHistory)
        );
    }

    #[test]
    fn validity_rejects_direction_flips() {
        let mut g = MotionValidityGate::new();
        for i in 0..6 {
            let dir = if i % 2 == 0 { (1.0, 0.0) } else { (-1.0, 0.0) };
            g.push(SpeedSample {
                speed_px_s: 100.0,
                direction: Some(dir),
                position: (i as f32, 0.0),
            });
        }
        assert_eq!(
            g.judge(MotionPhase::Separation),
            MotionValidity::Invalid(MotionInvalidReason::DirectionFlips)
        );
    }

    #[test]
    fn validity_rejects_no_progress() {
        let mut g = MotionValidityGate::new();
        for _ in 0..5 {
            g.push(SpeedSample {
                speed_px_s: 100.0,
                direction: Some((1.0, 0.0)),
                position: (10.0, 10.0),
            });
        }
        assert_eq!(
            g.judge(MotionPhase::Separation),
            MotionValidity::Invalid(MotionInvalidReason::InsufficientProgress)
        );
    }
}
