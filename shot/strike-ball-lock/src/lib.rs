//! Ball cluster detection and the acquire/candidate/locked state machine.
//!
//! Each frame's corners are clustered into at most one ball-like
//! candidate; the lock machine latches onto it, smooths its center with
//! an EMA, and produces the search ROI for the next frame.

use serde::{Deserialize, Serialize};

use strike_telemetry::{codes, phase_log, LogPhase, TelemetryRing};
use strike_types::{
    BallClusterSnapshot, BallLockState, Ema2, RectPx, SlidingRing, VersionedConfig,
};

mod cluster;
use cluster::cluster_corners;

const RADIUS_HISTORY_LEN: usize = 6;

/// Configuration of clustering bounds, quality weights and lock
/// hysteresis.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BallLockConfig {
    /// Minimum corners for a cluster to be considered.
    pub min_corners: u16,
    /// Maximum corners for a cluster to be considered.
    pub max_corners: u16,
    /// Minimum cluster radius in pixels.
    pub min_radius_px: f32,
    /// Maximum cluster radius in pixels.
    pub max_radius_px: f32,
    /// Weight of the radial-symmetry score in cluster quality.
    pub symmetry_weight: f32,
    /// Weight of the corner-count score in cluster quality.
    pub count_weight: f32,
    /// Weight of the radius-stability score in cluster quality.
    pub radius_weight: f32,
    /// Quality at or above which frames count toward acquiring a lock.
    pub q_lock: f32,
    /// Quality at or above which an existing candidate or lock is held.
    pub q_stay: f32,
    /// Floor below which a cluster cannot start a new candidate.
    pub min_quality_to_enter_lock: f32,
    /// Consecutive good frames required to move Candidate to Locked.
    pub lock_after_n: u32,
    /// Consecutive bad frames required to drop a lock.
    pub unlock_after_m: u32,
    /// EMA factor for the locked center.
    pub alpha_center: f32,
    /// Locked-ROI half side as a multiple of the cluster radius.
    pub roi_radius_factor: f32,
    /// Count a locked frame as bad when the center jumps implausibly far
    /// in one frame.
    pub velocity_coherence_enabled: bool,
}

impl Default for BallLockConfig {
    fn default() -> Self {
        Self {
            min_corners: 6,
            max_corners: 60,
            min_radius_px: 10.0,
            max_radius_px: 200.0,
            symmetry_weight: 0.40,
            count_weight: 0.40,
            radius_weight: 0.20,
            q_lock: 0.55,
            q_stay: 0.45,
            min_quality_to_enter_lock: 0.40,
            lock_after_n: 3,
            unlock_after_m: 3,
            alpha_center: 0.25,
            roi_radius_factor: 0.90,
            velocity_coherence_enabled: false,
        }
    }
}

// Center jumps beyond this multiple of the radius in a single frame are
// incoherent when velocity_coherence_enabled is set.
const COHERENCE_JUMP_RADII: f32 = 3.0;

/// The ball lock state machine.
pub struct BallLock {
    state: BallLockState,
    good_frames: u32,
    bad_frames: u32,
    ema_center: Ema2,
    radius_history: SlidingRing<f32>,
    last_snapshot: Option<BallClusterSnapshot>,
    frame_cluster: Option<BallClusterSnapshot>,
    cfg_version_seen: u64,
}

impl BallLock {
    pub fn new(cfg: &VersionedConfig<BallLockConfig>) -> Self {
        Self {
            state: BallLockState::Idle,
            good_frames: 0,
            bad_frames: 0,
            ema_center: Ema2::new(cfg.get().alpha_center),
            radius_history: SlidingRing::new(RADIUS_HISTORY_LEN),
            last_snapshot: None,
            frame_cluster: None,
            cfg_version_seen: cfg.version(),
        }
    }

    pub fn state(&self) -> BallLockState {
        self.state
    }

    /// The last accepted cluster snapshot, if any.
    pub fn snapshot(&self) -> Option<&BallClusterSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Presence confidence: the corner count of this frame's cluster
    /// while a candidate or lock exists, zero otherwise. A locked frame
    /// without a cluster reports zero; the continuity latch downstream
    /// decides whether the loss is transient.
    pub fn confidence(&self) -> f32 {
        if self.state == BallLockState::Idle {
            return 0.0;
        }
        self.frame_cluster
            .map(|s| s.corner_count as f32)
            .unwrap_or(0.0)
    }

    /// Smoothed lock center.
    pub fn ema_center(&self) -> Option<(f32, f32)> {
        self.ema_center.value()
    }

    /// Search region for the next frame while locked.
    pub fn locked_roi(
        &self,
        cfg: &BallLockConfig,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<RectPx> {
        if self.state != BallLockState::Locked {
            return None;
        }
        let center = self.ema_center.value()?;
        let radius = self.last_snapshot.map(|s| s.radius_px)?;
        Some(RectPx::centered_square(
            center.0,
            center.1,
            radius * cfg.roi_radius_factor,
            frame_width,
            frame_height,
        ))
    }

    /// Advance the machine with this frame's corners.
    pub fn observe(
        &mut self,
        corners: &[(f32, f32)],
        timestamp: f64,
        cfg: &VersionedConfig<BallLockConfig>,
        telemetry: &mut TelemetryRing,
    ) -> Option<BallClusterSnapshot> {
        if cfg.version() != self.cfg_version_seen {
            phase_log!(LogPhase::BallLock, "config changed, resetting lock state");
            self.cfg_version_seen = cfg.version();
            self.reset();
        }
        let cfg = cfg.get();

        let cluster = cluster_corners(corners, cfg, &self.radius_history);
        if let Some(c) = &cluster {
            telemetry.record(
                timestamp,
                LogPhase::BallLock,
                codes::CLUSTER_QUALITY,
                c.quality,
                c.corner_count as f32,
            );
        }

        let prev_state = self.state;
        match self.state {
            BallLockState::Idle => {
                if let Some(c) = &cluster {
                    if c.quality >= cfg.q_lock && c.quality >= cfg.min_quality_to_enter_lock {
                        self.state = BallLockState::Candidate;
                        self.good_frames = 1;
                        self.bad_frames = 0;
                    }
                }
            }
            BallLockState::Candidate => match &cluster {
                Some(c) if c.quality >= cfg.q_lock => {
                    self.good_frames += 1;
                    if self.good_frames >= cfg.lock_after_n {
                        self.state = BallLockState::Locked;
                        self.bad_frames = 0;
                        self.ema_center.reset();
                        self.ema_center.update(c.center);
                        self.radius_history.push(c.radius_px);
                    }
                }
                Some(c) if c.quality >= cfg.q_stay => {
                    // hold, counter unchanged
                }
                _ => self.to_idle(),
            },
            BallLockState::Locked => {
                let accepted = match &cluster {
                    Some(c)
                        if c.quality >= cfg.q_stay
                            && (!cfg.velocity_coherence_enabled
                                || self.center_jump_plausible(c)) =>
                    {
                        Some(*c)
                    }
                    _ => None,
                };
                match accepted {
                    Some(c) => {
                        self.bad_frames = 0;
                        self.ema_center.update(c.center);
                        self.radius_history.push(c.radius_px);
                    }
                    None => {
                        self.bad_frames += 1;
                        if self.bad_frames >= cfg.unlock_after_m {
                            self.to_idle();
                        }
                    }
                }
            }
        }

        self.frame_cluster = cluster;
        if cluster.is_some() && self.state != BallLockState::Idle {
            self.last_snapshot = cluster;
        } else if self.state == BallLockState::Idle {
            self.last_snapshot = None;
        }

        if self.state != prev_state {
            phase_log!(
                LogPhase::BallLock,
                "lock {} -> {} at t={:.4}",
                prev_state,
                self.state,
                timestamp
            );
            telemetry.record(
                timestamp,
                LogPhase::BallLock,
                codes::LOCK_TRANSITION,
                state_index(prev_state),
                state_index(self.state),
            );
        }

        cluster
    }

    fn center_jump_plausible(&self, c: &BallClusterSnapshot) -> bool {
        match self.ema_center.value() {
            None => true,
            Some((ex, ey)) => {
                let jump = (c.center.0 - ex).hypot(c.center.1 - ey);
                jump <= COHERENCE_JUMP_RADII * c.radius_px.max(1.0)
            }
        }
    }

    fn to_idle(&mut self) {
        self.state = BallLockState::Idle;
        self.good_frames = 0;
        self.bad_frames = 0;
        self.ema_center.reset();
        self.radius_history.clear();
        self.last_snapshot = None;
        self.frame_cluster = None;
    }

    /// Force the machine back to Idle, e.g. on a configuration change.
    pub fn reset(&mut self) {
        self.to_idle();
    }
}

fn state_index(s: BallLockState) -> f32 {
    match s {
        BallLockState::Idle => 0.0,
        BallLockState::Candidate => 1.0,
        BallLockState::Locked => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Eight ring corners plus a stray; the trim removes the stray and
    // the kept ring is exactly centered.
    fn ball_corners(cx: f32, cy: f32) -> Vec<(f32, f32)> {
        let mut corners: Vec<(f32, f32)> = (0..8)
            .map(|i| {
                let a = i as f32 / 8.0 * std::f32::consts::TAU;
                (cx + 20.0 * a.cos(), cy + 20.0 * a.sin())
            })
            .collect();
        corners.push((cx + 48.0, cy - 36.0));
        corners
    }

    fn fixture() -> (VersionedConfig<BallLockConfig>, TelemetryRing) {
        (
            VersionedConfig::new(BallLockConfig::default()),
            TelemetryRing::new(256),
        )
    }

    #[test]
    fn locks_after_n_good_frames() {
        let (cfg, mut tel) = fixture();
        let mut lock = BallLock::new(&cfg);
        let corners = ball_corners(500.0, 400.0);
        lock.observe(&corners, 0.0, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Candidate);
        lock.observe(&corners, 0.01, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Candidate);
        lock.observe(&corners, 0.02, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Locked);
        assert!(lock.confidence() >= 6.0);
        let roi = lock
            .locked_roi(cfg.get(), 1920, 1080)
            .expect("locked roi");
        assert!(roi.w >= 32 && roi.w <= 40);
        let (cx, cy) = roi.center();
        assert!((cx - 500.0).abs() < 2.0);
        assert!((cy - 400.0).abs() < 2.0);
    }

    #[test]
    fn unlocks_after_m_bad_frames() {
        let (cfg, mut tel) = fixture();
        let mut lock = BallLock::new(&cfg);
        let corners = ball_corners(500.0, 400.0);
        for i in 0..3 {
            lock.observe(&corners, i as f64 * 0.01, &cfg, &mut tel);
        }
        assert_eq!(lock.state(), BallLockState::Locked);
        for i in 0..2 {
            lock.observe(&[], 0.03 + i as f64 * 0.01, &cfg, &mut tel);
            assert_eq!(lock.state(), BallLockState::Locked);
        }
        lock.observe(&[], 0.05, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Idle);
        assert_eq!(lock.confidence(), 0.0);
    }

    #[test]
    fn candidate_falls_back_below_stay_quality() {
        let (cfg, mut tel) = fixture();
        let mut lock = BallLock::new(&cfg);
        let corners = ball_corners(500.0, 400.0);
        lock.observe(&corners, 0.0, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Candidate);
        lock.observe(&[], 0.01, &cfg, &mut tel);
        assert_eq!(lock.state(), BallLockState::Idle);
    }

    #[test]
    fn config_change_forces_reset() {
        let (mut cfg, mut tel) = fixture();
        let mut lock = BallLock::new(&cfg);
        let corners = ball_corners(500.0, 400.0);
        for i in 0..3 {
            lock.observe(&corners, i as f64 * 0.01, &cfg, &mut tel);
        }
        assert_eq!(lock.state(), BallLockState::Locked);
        let mut new_cfg = cfg.get().clone();
        new_cfg.alpha_center = 0.5;
        cfg.set(new_cfg);
        lock.observe(&corners, 0.03, &cfg, &mut tel);
        // reset happened first, then this frame started a new candidate
        assert_eq!(lock.state(), BallLockState::Candidate);
    }

    #[test]
    fn config_yaml_round_trip() {
        let cfg = BallLockConfig::default();
        let buf = serde_yaml::to_string(&cfg).unwrap();
        let cfg2: BallLockConfig = serde_yaml::from_str(&buf).unwrap();
        assert_eq!(cfg, cfg2);
    }

    #[test]
    fn ema_center_follows_slow_drift() {
        let (cfg, mut tel) = fixture();
        let mut lock = BallLock::new(&cfg);
        for i in 0..3 {
            lock.observe(&ball_corners(500.0, 400.0), i as f64 * 0.01, &cfg, &mut tel);
        }
        for i in 0..20 {
            lock.observe(
                &ball_corners(510.0, 400.0),
                0.03 + i as f64 * 0.01,
                &cfg,
                &mut tel,
            );
        }
        let (ex, _) = lock.ema_center().unwrap();
        assert!((ex - 510.0).abs() < 1.0, "ema x = {}", ex);
    }
}
