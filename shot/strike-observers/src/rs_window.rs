use strike_types::SlidingRing;

/// Window capacity in cluster samples.
pub const RS_WINDOW_SIZE: usize = 4;

/// Minimum samples for a valid window.
pub const RS_WINDOW_MIN_FRAMES: usize = 3;

/// Maximum temporal span of a valid window, seconds.
pub const RS_WINDOW_MAX_SPAN_SEC: f64 = 0.080;

/// Maximum age of the newest sample for a valid window, seconds.
pub const RS_WINDOW_MAX_STALENESS_SEC: f64 = 0.080;

/// One ball-cluster sample entering the RS window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RsWindowSample {
    pub center: (f32, f32),
    pub radius: f32,
    pub timestamp: f64,
    pub confidence: f32,
}

/// Validity summary of the current window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RsWindowSnapshot {
    pub is_valid: bool,
    pub frame_count: usize,
    pub span_sec: f64,
    pub staleness_sec: f64,
    /// Timestamp of the newest sample, if any.
    pub end_ts: Option<f64>,
}

/// Sliding ring of the last few ball-cluster samples.
///
/// Timestamps are monotonic by construction: out-of-order pushes are
/// dropped.
#[derive(Debug)]
pub struct RsWindowAggregator {
    ring: SlidingRing<RsWindowSample>,
}

impl RsWindowAggregator {
    pub fn new() -> Self {
        Self {
            ring: SlidingRing::new(RS_WINDOW_SIZE),
        }
    }

    pub fn push(&mut self, sample: RsWindowSample) {
        if let Some(last) = self.ring.back() {
            if sample.timestamp <= last.timestamp {
                return;
            }
        }
        self.ring.push(sample);
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn snapshot(&self, now: f64) -> RsWindowSnapshot {
        let frame_count = self.ring.len();
        let (span_sec, staleness_sec, end_ts) = match (self.ring.front(), self.ring.back()) {
            (Some(first), Some(last)) => (
                last.timestamp - first.timestamp,
                now - last.timestamp,
                Some(last.timestamp),
            ),
            _ => (0.0, f64::INFINITY, None),
        };
        let finite = self.ring.iter().all(|s| {
            s.center.0.is_finite()
                && s.center.1.is_finite()
                && s.radius.is_finite()
                && s.timestamp.is_finite()
        });
        let is_valid = frame_count >= RS_WINDOW_MIN_FRAMES
            && span_sec <= RS_WINDOW_MAX_SPAN_SEC
            && staleness_sec <= RS_WINDOW_MAX_STALENESS_SEC
            && finite;
        RsWindowSnapshot {
            is_valid,
            frame_count,
            span_sec,
            staleness_sec,
            end_ts,
        }
    }
}

impl Default for RsWindowAggregator {
    fn default() -> Self {
        Self::new()
    }
}
