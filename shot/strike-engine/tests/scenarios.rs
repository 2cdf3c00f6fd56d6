//! End-to-end scenarios driven through the post-detection core with
//! synthetic corner streams at capture cadence.

use strike_engine::{EngineConfig, ShotCore};
use strike_types::{
    BallLockState, CadenceVerdict, MotionPhase, RefusalReason, ShotLifecycleState, ShotRecord,
};

const FRAME: (u32, u32) = (1920, 1080);
const FPS: f64 = 120.0;

fn ring_of(n: usize, cx: f32, cy: f32, r: f32) -> Vec<(f32, f32)> {
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * std::f32::consts::TAU;
            (cx + r * a.cos(), cy + r * a.sin())
        })
        .collect()
}

// Eight ring corners plus one stray reflection; the clustering trim
// removes the stray, so the kept constellation is the exact ring.
fn ball_at(cx: f32) -> Vec<(f32, f32)> {
    let mut corners = ring_of(8, cx, 400.0, 20.0);
    corners.push((cx + 48.0, 364.0));
    corners
}

struct Run {
    core: ShotCore,
    records: Vec<(usize, ShotRecord)>,
    frame_index: usize,
}

impl Run {
    fn new() -> Self {
        Self {
            core: ShotCore::new(&EngineConfig::default()),
            records: Vec::new(),
            frame_index: 0,
        }
    }

    fn step(&mut self, corners: &[(f32, f32)]) {
        self.step_at_fps(corners, FPS);
    }

    fn step_at_fps(&mut self, corners: &[(f32, f32)], fps: f64) {
        let t = self.frame_index as f64 / fps;
        if let Some(r) = self.core.process_corners(corners, t, FRAME) {
            self.records.push((self.frame_index, r));
        }
        self.frame_index += 1;
    }
}

/// S1: pure stillness, two seconds at 120 fps, no corners.
#[test]
fn s1_pure_stillness() {
    let mut run = Run::new();
    for _ in 0..240 {
        run.step(&[]);
    }
    assert!(run.records.is_empty());
    assert_eq!(run.core.lifecycle_state(), ShotLifecycleState::Idle);
    match run.core.cadence_verdict() {
        CadenceVerdict::Valid(fps) => assert!((fps - 120.0).abs() < 0.5),
        other => panic!("expected valid cadence, got {:?}", other),
    }
}

/// S2: ball acquired, never moves.
#[test]
fn s2_acquired_never_moves() {
    let mut run = Run::new();
    for i in 0..240 {
        run.step(&ball_at(500.0));
        if i == 2 {
            assert_eq!(run.core.ball_lock_state(), BallLockState::Locked);
        }
    }
    assert!(run.records.is_empty());
    assert_eq!(run.core.lifecycle_state(), ShotLifecycleState::Idle);
    assert_eq!(run.core.ball_lock_state(), BallLockState::Locked);
    // the authority decision settled once (ineligible, no motion) and
    // never flapped
    let transitions: Vec<_> = run
        .core
        .telemetry()
        .iter()
        .filter(|s| s.code == strike_telemetry::codes::AUTHORITY_TRANSITION)
        .collect();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].value_a, 0.0);
}

/// S3: the canonical shot. Still for 60 frames, one 1440 px/s impulse,
/// coherent 600 px/s flight, then the ball leaves the frame.
#[test]
fn s3_canonical_shot() {
    let mut run = Run::new();
    for _ in 0..60 {
        run.step(&ball_at(500.0));
    }
    // impulse frame: 12 px jump = 1440 px/s at 120 fps
    run.step(&ball_at(512.0));
    // flight: 5 px per frame = 600 px/s, coherent direction
    let mut x = 512.0;
    for _ in 0..9 {
        x += 5.0;
        run.step(&ball_at(x));
    }
    // ball gone
    for _ in 0..50 {
        run.step(&[]);
    }

    assert_eq!(run.records.len(), 1, "records: {:?}", run.records);
    let (_, record) = &run.records[0];
    assert!(!record.refused);
    assert_eq!(record.final_state, ShotLifecycleState::ShotFinalized);
    assert!(record.peak_speed_px_s.unwrap() >= 600.0 - 1.0);
    // impact within one frame of the impulse
    let impulse_t = 60.0 / FPS;
    let impact = record.impact_ts.expect("impact timestamp");
    assert!(
        (impact - impulse_t).abs() <= 1.0 / FPS + 1e-9,
        "impact_ts {} vs impulse {}",
        impact,
        impulse_t
    );
    assert!(record.start_ts < impact);
    assert!(impact <= record.end_ts);
    for window in [
        "Idle\u{2192}Approach",
        "Approach\u{2192}Impact",
        "Impact\u{2192}Separation",
        "Separation\u{2192}Stabilized",
    ] {
        assert!(
            record.motion_phase_trace.contains(window),
            "trace {} missing {}",
            record.motion_phase_trace,
            window
        );
    }
}

/// S4: impulse without separation; the ball jumps once, sits still, then
/// is removed. Insufficient speed at stabilize.
#[test]
fn s4_impulse_without_separation() {
    let mut run = Run::new();
    for _ in 0..60 {
        run.step(&ball_at(500.0));
    }
    run.step(&ball_at(512.0));
    for _ in 0..9 {
        run.step(&ball_at(512.0));
    }
    for _ in 0..50 {
        run.step(&[]);
    }

    assert_eq!(run.records.len(), 1, "records: {:?}", run.records);
    let (_, record) = &run.records[0];
    assert!(record.refused);
    assert_eq!(
        record.refusal_reason,
        Some(RefusalReason::InsufficientConfidence)
    );
}

/// S5: lifecycle stall. Impulse then permanent stillness; the deadman
/// force-refuses within one second of leaving Idle.
#[test]
fn s5_lifecycle_stall() {
    let mut run = Run::new();
    for _ in 0..60 {
        run.step(&ball_at(500.0));
    }
    let left_idle_at = run.frame_index;
    run.step(&ball_at(512.0));
    for _ in 0..139 {
        run.step(&ball_at(512.0));
    }

    assert_eq!(run.records.len(), 1, "records: {:?}", run.records);
    let (at_frame, record) = &run.records[0];
    assert!(record.refused);
    assert_eq!(record.refusal_reason, Some(RefusalReason::LifecycleTimeout));
    assert!(
        at_frame - left_idle_at <= FPS.ceil() as usize,
        "refused {} frames after leaving idle",
        at_frame - left_idle_at
    );
}

/// S6: invalid cadence. At 60 fps no lifecycle may ever finalize; an
/// active one refuses with InsufficientConfidence.
#[test]
fn s6_invalid_cadence() {
    let mut run = Run::new();
    // warm the cadence window into Invalid
    for _ in 0..130 {
        run.step_at_fps(&[], 60.0);
    }
    assert!(run.core.cadence_verdict().is_invalid());
    // acquire, then strike
    for _ in 0..30 {
        run.step_at_fps(&ball_at(500.0), 60.0);
    }
    run.step_at_fps(&ball_at(512.0), 60.0); // 720 px/s at 60 fps
    let mut x = 512.0;
    for _ in 0..40 {
        x += 10.0;
        run.step_at_fps(&ball_at(x), 60.0);
    }

    assert!(!run.records.is_empty());
    for (_, record) in &run.records {
        assert!(record.refused);
        assert_eq!(
            record.refusal_reason,
            Some(RefusalReason::InsufficientConfidence)
        );
        assert_ne!(record.final_state, ShotLifecycleState::ShotFinalized);
    }
}

/// Invariant 9: the motion phase is Idle on every frame without
/// effective presence.
#[test]
fn phase_is_idle_without_presence() {
    let mut run = Run::new();
    for _ in 0..50 {
        run.step(&[]);
        assert_eq!(run.core.motion_phase(), MotionPhase::Idle);
    }
}

/// Terminal records self-reset: after a finalized shot the core re-arms
/// and can observe a second strike.
#[test]
fn core_rearms_after_finalized_shot() {
    let mut run = Run::new();
    for round in 0..2 {
        for _ in 0..60 {
            run.step(&ball_at(500.0));
        }
        run.step(&ball_at(512.0));
        let mut x = 512.0;
        for _ in 0..9 {
            x += 5.0;
            run.step(&ball_at(x));
        }
        // long gap: latch expires, lifecycle resets, shot interval passes
        for _ in 0..140 {
            run.step(&[]);
        }
        assert_eq!(run.records.len(), round + 1, "round {}", round);
    }
    assert!(run.records.iter().all(|(_, r)| !r.refused));
    assert_eq!(run.records[0].1.shot_id, 1);
    assert_eq!(run.records[1].1.shot_id, 2);
}
