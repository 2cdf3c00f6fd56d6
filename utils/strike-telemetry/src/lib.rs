//! Phase-gated logging and the telemetry ring buffer.
//!
//! Diagnostics in the vision core belong to one of a closed set of
//! [`LogPhase`]s, each independently enabled or disabled at runtime. The
//! [`phase_log!`] macro checks the enabled mask before the message is
//! constructed, so a disabled phase costs one atomic load and nothing
//! else. All lines route through `tracing`.

use std::sync::atomic::{AtomicU16, Ordering};

mod ring;

pub use ring::{
    codes, parse_command, CsvError, TelemetryCommand, TelemetryRing, TelemetrySample,
    TELEMETRY_RING_CAPACITY,
};

// Re-exported for use by the `phase_log!` macro expansion.
#[doc(hidden)]
pub use tracing;

/// Closed set of log phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogPhase {
    Camera,
    Render,
    Detection,
    BallLock,
    Shot,
    Pose,
    RsWindow,
    Authority,
    Debug,
}

impl LogPhase {
    pub const ALL: [LogPhase; 9] = [
        LogPhase::Camera,
        LogPhase::Render,
        LogPhase::Detection,
        LogPhase::BallLock,
        LogPhase::Shot,
        LogPhase::Pose,
        LogPhase::RsWindow,
        LogPhase::Authority,
        LogPhase::Debug,
    ];

    /// Lowercase name, used as the `phase` column of telemetry CSV rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogPhase::Camera => "camera",
            LogPhase::Render => "render",
            LogPhase::Detection => "detection",
            LogPhase::BallLock => "ball_lock",
            LogPhase::Shot => "shot",
            LogPhase::Pose => "pose",
            LogPhase::RsWindow => "rs_window",
            LogPhase::Authority => "authority",
            LogPhase::Debug => "debug",
        }
    }

    /// Uppercase tag used as the log-line prefix.
    pub fn as_upper(&self) -> &'static str {
        match self {
            LogPhase::Camera => "CAMERA",
            LogPhase::Render => "RENDER",
            LogPhase::Detection => "DETECTION",
            LogPhase::BallLock => "BALL_LOCK",
            LogPhase::Shot => "SHOT",
            LogPhase::Pose => "POSE",
            LogPhase::RsWindow => "RS_WINDOW",
            LogPhase::Authority => "AUTHORITY",
            LogPhase::Debug => "DEBUG",
        }
    }

    pub fn from_str(name: &str) -> Option<LogPhase> {
        LogPhase::ALL.iter().copied().find(|p| p.as_str() == name)
    }

    #[inline]
    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl std::fmt::Display for LogPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// All phases except Debug enabled by default.
const DEFAULT_MASK: u16 = 0x01FF & !(1 << (LogPhase::Debug as u16));

static ENABLED_PHASES: AtomicU16 = AtomicU16::new(DEFAULT_MASK);

/// Enable or disable a log phase process-wide.
pub fn set_phase_enabled(phase: LogPhase, enabled: bool) {
    if enabled {
        ENABLED_PHASES.fetch_or(phase.bit(), Ordering::Relaxed);
    } else {
        ENABLED_PHASES.fetch_and(!phase.bit(), Ordering::Relaxed);
    }
}

#[inline]
pub fn phase_enabled(phase: LogPhase) -> bool {
    ENABLED_PHASES.load(Ordering::Relaxed) & phase.bit() != 0
}

/// Emit one `[PHASE] message` log line if the phase is enabled.
///
/// The message arguments are not evaluated when the phase is disabled.
#[macro_export]
macro_rules! phase_log {
    ($phase:expr, $($arg:tt)*) => {{
        let phase = $phase;
        if $crate::phase_enabled(phase) {
            $crate::tracing::info!("[{}] {}", phase.as_upper(), format_args!($($arg)*));
        }
    }};
}
