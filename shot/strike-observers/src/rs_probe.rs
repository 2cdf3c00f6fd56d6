use nalgebra::{DMatrix, DVector};
use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};

/// Minimum corner count for a frame to be observable.
pub const MIN_RS_POINTS: usize = 6;

/// Minimum absolute x-on-y slope; below this the frame carries no shear
/// information.
pub const MIN_RS_SLOPE: f64 = 0.0001;

/// Above this adjacent-row correlation the pattern is flicker-aligned.
pub const MAX_ROW_CORRELATION: f64 = 0.85;

// Row-span classification bounds for telemetry.
const ROW_SPAN_NARROW_BOUND: f64 = 0.25;
const ROW_SPAN_MODERATE_BOUND: f64 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RsRefusalKind {
    InsufficientRowSupport,
    FrameIntegrityFailure,
    GlobalRowCorrelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RsOutcome {
    Observable,
    Refused(RsRefusalKind),
}

impl RsOutcome {
    pub fn is_observable(&self) -> bool {
        matches!(self, RsOutcome::Observable)
    }
}

/// Immutable per-frame rolling-shutter observability evidence.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RsFrameObservation {
    /// Absolute least-squares slope of corner x on corner y.
    pub z_max: f64,
    /// Fraction of consecutive active-row pairs.
    pub row_correlation: f64,
    pub row_span_fraction: f64,
    /// Maximum corner distance from the corner centroid.
    pub envelope_radius: f64,
    pub valid_row_count: u32,
    pub outcome: RsOutcome,
}

/// Probe one frame's corner pattern for rolling-shutter observability.
pub fn probe_frame(
    corners: &[(f32, f32)],
    image_height: u32,
    timestamp: f64,
    telemetry: &mut TelemetryRing,
) -> RsFrameObservation {
    if corners.len() < MIN_RS_POINTS {
        telemetry.record(
            timestamp,
            LogPhase::RsWindow,
            codes::RS_REFUSE_ROW_SUPPORT,
            corners.len() as f32,
            0.0,
        );
        return RsFrameObservation {
            z_max: 0.0,
            row_correlation: 0.0,
            row_span_fraction: 0.0,
            envelope_radius: 0.0,
            valid_row_count: 0,
            outcome: RsOutcome::Refused(RsRefusalKind::InsufficientRowSupport),
        };
    }

    let z_max = slope_x_on_y(corners).abs();

    let mut rows: Vec<i64> = corners.iter().map(|&(_, y)| y.round() as i64).collect();
    rows.sort_unstable();
    rows.dedup();
    let valid_row_count = rows.len() as u32;
    let row_span = (rows[rows.len() - 1] - rows[0]) as f64;
    let row_span_fraction = if image_height > 0 {
        row_span / image_height as f64
    } else {
        0.0
    };
    let adjacent_pairs = rows.windows(2).filter(|w| w[1] - w[0] == 1).count();
    let row_correlation = if rows.len() > 1 {
        adjacent_pairs as f64 / (rows.len() - 1) as f64
    } else {
        0.0
    };

    let n = corners.len() as f32;
    let cx = corners.iter().map(|c| c.0).sum::<f32>() / n;
    let cy = corners.iter().map(|c| c.1).sum::<f32>() / n;
    let envelope_radius = corners
        .iter()
        .map(|&(x, y)| ((x - cx).hypot(y - cy)) as f64)
        .fold(0.0, f64::max);

    telemetry.record(
        timestamp,
        LogPhase::RsWindow,
        codes::RS_RAW_METRICS,
        z_max as f32,
        row_correlation as f32,
    );
    telemetry.record(
        timestamp,
        LogPhase::RsWindow,
        codes::RS_ROW_STATS,
        row_span_fraction as f32,
        valid_row_count as f32,
    );
    let span_code = if row_span_fraction < ROW_SPAN_NARROW_BOUND {
        codes::ROW_SPAN_NARROW
    } else if row_span_fraction < ROW_SPAN_MODERATE_BOUND {
        codes::ROW_SPAN_MODERATE
    } else {
        codes::ROW_SPAN_WIDE
    };
    telemetry.record(
        timestamp,
        LogPhase::RsWindow,
        span_code,
        row_span_fraction as f32,
        0.0,
    );

    let outcome = if z_max < MIN_RS_SLOPE {
        telemetry.record(
            timestamp,
            LogPhase::RsWindow,
            codes::RS_REFUSE_FRAME_INTEGRITY,
            z_max as f32,
            0.0,
        );
        RsOutcome::Refused(RsRefusalKind::FrameIntegrityFailure)
    } else if row_correlation > MAX_ROW_CORRELATION {
        phase_log!(
            LogPhase::RsWindow,
            "refusing flicker-aligned frame: row correlation {:.3}",
            row_correlation
        );
        telemetry.record(
            timestamp,
            LogPhase::RsWindow,
            codes::RS_REFUSE_FLICKER_ALIGNED,
            row_correlation as f32,
            0.0,
        );
        RsOutcome::Refused(RsRefusalKind::GlobalRowCorrelation)
    } else {
        RsOutcome::Observable
    };

    RsFrameObservation {
        z_max,
        row_correlation,
        row_span_fraction,
        envelope_radius,
        valid_row_count,
        outcome,
    }
}

/// Least-squares slope of x regressed on y.
fn slope_x_on_y(corners: &[(f32, f32)]) -> f64 {
    let n = corners.len();
    let a = DMatrix::<f64>::from_fn(n, 2, |r, c| {
        if c == 0 {
            corners[r].1 as f64
        } else {
            1.0
        }
    });
    let b = DVector::<f64>::from_fn(n, |r, _| corners[r].0 as f64);
    match lstsq::lstsq(&a, &b, 1e-12) {
        Ok(fit) => fit.solution[0],
        Err(_) => 0.0,
    }
}
