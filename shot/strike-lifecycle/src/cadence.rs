use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::{CadenceVerdict, SlidingRing};

/// Sliding window size in timestamps.
pub const CADENCE_WINDOW: usize = 240;

/// Samples required before a verdict is reached.
pub const CADENCE_MIN_SAMPLES: usize = 120;

/// Minimum effective fps for a Valid verdict.
pub const CADENCE_MIN_FPS: f64 = 110.0;

const INTERVAL_BINS: usize = 50;
const STATS_PERIOD_SEC: f64 = 10.0;

/// Estimates the effective capture cadence over a sliding timestamp
/// window, and keeps an inter-frame-interval histogram for diagnostics.
pub struct CadenceEstimator {
    ring: SlidingRing<f64>,
    verdict: CadenceVerdict,
    histogram: IntervalHistogram,
}

impl CadenceEstimator {
    pub fn new() -> Self {
        Self {
            ring: SlidingRing::new(CADENCE_WINDOW),
            verdict: CadenceVerdict::Unknown,
            histogram: IntervalHistogram::new(),
        }
    }

    pub fn verdict(&self) -> CadenceVerdict {
        self.verdict
    }

    /// Push this frame's timestamp and update the verdict.
    pub fn push(&mut self, timestamp: f64, telemetry: &mut TelemetryRing) -> CadenceVerdict {
        if let Some(last) = self.ring.back() {
            self.histogram.push(timestamp - last, timestamp);
        }
        self.ring.push(timestamp);

        let next = if self.ring.len() < CADENCE_MIN_SAMPLES {
            CadenceVerdict::Unknown
        } else {
            let first = *self.ring.front().unwrap_or(&timestamp);
            let span = timestamp - first;
            if span <= 0.0 {
                CadenceVerdict::Unknown
            } else {
                let fps = (self.ring.len() - 1) as f64 / span;
                telemetry.record(
                    timestamp,
                    LogPhase::Camera,
                    codes::CADENCE_FPS_SAMPLE,
                    fps as f32,
                    self.ring.len() as f32,
                );
                if fps >= CADENCE_MIN_FPS {
                    CadenceVerdict::Valid(fps)
                } else {
                    CadenceVerdict::Invalid(fps)
                }
            }
        };

        if kind(&next) != kind(&self.verdict) {
            phase_log!(
                LogPhase::Camera,
                "cadence verdict {} -> {} at t={:.4}",
                kind(&self.verdict),
                kind(&next),
                timestamp
            );
            telemetry.record(
                timestamp,
                LogPhase::Camera,
                codes::CADENCE_VERDICT,
                match next {
                    CadenceVerdict::Valid(fps) | CadenceVerdict::Invalid(fps) => fps as f32,
                    CadenceVerdict::Unknown => 0.0,
                },
                if next.is_valid() { 1.0 } else { 0.0 },
            );
        }
        self.verdict = next;
        self.verdict
    }
}

impl Default for CadenceEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn kind(v: &CadenceVerdict) -> &'static str {
    match v {
        CadenceVerdict::Unknown => "unknown",
        CadenceVerdict::Valid(_) => "valid",
        CadenceVerdict::Invalid(_) => "invalid",
    }
}

/// Millisecond histogram of inter-frame gaps, reported periodically.
struct IntervalHistogram {
    msec_bins: Vec<u32>,
    longest_gap_msec: f64,
    window_start_ts: Option<f64>,
}

impl IntervalHistogram {
    fn new() -> Self {
        Self {
            msec_bins: vec![0; INTERVAL_BINS],
            longest_gap_msec: 0.0,
            window_start_ts: None,
        }
    }

    fn push(&mut self, gap_sec: f64, now: f64) {
        if gap_sec.is_nan() || gap_sec < 0.0 {
            return;
        }
        let msec = gap_sec * 1000.0;
        let bin = (msec as usize).min(INTERVAL_BINS - 1);
        self.msec_bins[bin] += 1;
        if msec > self.longest_gap_msec {
            self.longest_gap_msec = msec;
        }
        let start = *self.window_start_ts.get_or_insert(now);
        if now - start >= STATS_PERIOD_SEC {
            self.show_stats();
            *self = Self::new();
            self.window_start_ts = Some(now);
        }
    }

    fn show_stats(&self) {
        let total: u32 = self.msec_bins.iter().sum();
        if total == 0 {
            return;
        }
        let (mode, _) = self
            .msec_bins
            .iter()
            .enumerate()
            .fold((0usize, 0u32), |acc, (idx, count)| {
                if *count > acc.1 {
                    (idx, *count)
                } else {
                    acc
                }
            });
        phase_log!(
            LogPhase::Camera,
            "frame interval statistics: mode {} msec, longest {:.1} msec over {} gaps",
            mode,
            self.longest_gap_msec,
            total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> TelemetryRing {
        TelemetryRing::new(1024)
    }

    fn run_fps(fps: f64, frames: usize) -> CadenceVerdict {
        let mut tel = ring();
        let mut c = CadenceEstimator::new();
        let mut v = CadenceVerdict::Unknown;
        for i in 0..frames {
            v = c.push(i as f64 / fps, &mut tel);
        }
        v
    }

    #[test]
    fn unknown_below_minimum_samples() {
        let v = run_fps(120.0, CADENCE_MIN_SAMPLES - 1);
        assert_eq!(v, CadenceVerdict::Unknown);
    }

    #[test]
    fn valid_at_120_fps() {
        match run_fps(120.0, 240) {
            CadenceVerdict::Valid(fps) => assert!((fps - 120.0).abs() < 0.5),
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn invalid_at_60_fps() {
        match run_fps(60.0, 240) {
            CadenceVerdict::Invalid(fps) => assert!((fps - 60.0).abs() < 0.5),
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn window_slides_past_a_slow_start() {
        let mut tel = ring();
        let mut c = CadenceEstimator::new();
        let mut t = 0.0;
        // 120 slow frames, then long 120 fps run that fills the window
        for _ in 0..120 {
            t += 1.0 / 60.0;
            c.push(t, &mut tel);
        }
        for _ in 0..CADENCE_WINDOW {
            t += 1.0 / 120.0;
            c.push(t, &mut tel);
        }
        assert!(c.verdict().is_valid());
    }
}
