use strike_telemetry::{phase_log, LogPhase};
use strike_types::CameraIntrinsics;

use crate::rs_window::RsWindowSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsPnpSkipReason {
    InvalidWindow,
    AlreadyProcessed,
    MissingIntrinsics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsPnpFailure {
    /// Pose extraction is a declared boundary; solving is not part of V1.
    NotImplemented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsPnpVerdict {
    Skipped(RsPnpSkipReason),
    Failure(RsPnpFailure),
}

impl RsPnpVerdict {
    fn kind(&self) -> &'static str {
        match self {
            RsPnpVerdict::Skipped(RsPnpSkipReason::InvalidWindow) => "skipped(invalid-window)",
            RsPnpVerdict::Skipped(RsPnpSkipReason::AlreadyProcessed) => "skipped(duplicate)",
            RsPnpVerdict::Skipped(RsPnpSkipReason::MissingIntrinsics) => {
                "skipped(missing-intrinsics)"
            }
            RsPnpVerdict::Failure(RsPnpFailure::NotImplemented) => "failure(not-implemented)",
        }
    }
}

/// Bridge between RS window observation and the (stubbed) RS-PnP solver.
///
/// Accepts valid windows only and remembers the last processed window's
/// end timestamp to avoid duplicate work. Emits one log line per verdict
/// transition.
#[derive(Debug, Default)]
pub struct RsPnpBridge {
    last_processed_end_ts: Option<f64>,
    last_verdict_kind: Option<&'static str>,
}

impl RsPnpBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(
        &mut self,
        snapshot: &RsWindowSnapshot,
        intrinsics: Option<&CameraIntrinsics>,
    ) -> RsPnpVerdict {
        let verdict = if !snapshot.is_valid {
            RsPnpVerdict::Skipped(RsPnpSkipReason::InvalidWindow)
        } else if intrinsics.is_none() {
            RsPnpVerdict::Skipped(RsPnpSkipReason::MissingIntrinsics)
        } else if snapshot.end_ts.is_some() && snapshot.end_ts == self.last_processed_end_ts {
            RsPnpVerdict::Skipped(RsPnpSkipReason::AlreadyProcessed)
        } else {
            self.last_processed_end_ts = snapshot.end_ts;
            RsPnpVerdict::Failure(RsPnpFailure::NotImplemented)
        };

        let kind = verdict.kind();
        if self.last_verdict_kind != Some(kind) {
            phase_log!(LogPhase::Pose, "rs-pnp verdict: {}", kind);
            self.last_verdict_kind = Some(kind);
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_snapshot(end_ts: f64) -> RsWindowSnapshot {
        RsWindowSnapshot {
            is_valid: true,
            frame_count: 4,
            span_sec: 0.025,
            staleness_sec: 0.008,
            end_ts: Some(end_ts),
        }
    }

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 1500.0,
            fy: 1500.0,
            cx: 960.0,
            cy: 540.0,
        }
    }

    #[test]
    fn invalid_window_is_skipped() {
        let mut bridge = RsPnpBridge::new();
        let snap = RsWindowSnapshot {
            is_valid: false,
            frame_count: 1,
            span_sec: 0.0,
            staleness_sec: 0.0,
            end_ts: None,
        };
        assert_eq!(
            bridge.process(&snap, Some(&intrinsics())),
            RsPnpVerdict::Skipped(RsPnpSkipReason::InvalidWindow)
        );
    }

    #[test]
    fn valid_window_fails_not_implemented() {
        let mut bridge = RsPnpBridge::new();
        assert_eq!(
            bridge.process(&valid_snapshot(0.5), Some(&intrinsics())),
            RsPnpVerdict::Failure(RsPnpFailure::NotImplemented)
        );
    }

    #[test]
    fn same_window_not_processed_twice() {
        let mut bridge = RsPnpBridge::new();
        let snap = valid_snapshot(0.5);
        let i = intrinsics();
        assert_eq!(
            bridge.process(&snap, Some(&i)),
            RsPnpVerdict::Failure(RsPnpFailure::NotImplemented)
        );
        assert_eq!(
            bridge.process(&snap, Some(&i)),
            RsPnpVerdict::Skipped(RsPnpSkipReason::AlreadyProcessed)
        );
        // a newer window is processed again
        assert_eq!(
            bridge.process(&valid_snapshot(0.6), Some(&i)),
            RsPnpVerdict::Failure(RsPnpFailure::NotImplemented)
        );
    }

    #[test]
    fn missing_intrinsics_skip() {
        let mut bridge = RsPnpBridge::new();
        assert_eq!(
            bridge.process(&valid_snapshot(0.5), None),
            RsPnpVerdict::Skipped(RsPnpSkipReason::MissingIntrinsics)
        );
    }
}
