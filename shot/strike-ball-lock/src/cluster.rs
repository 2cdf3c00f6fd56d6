use strike_types::{median, median_abs_deviation, BallClusterSnapshot, SlidingRing};

use crate::BallLockConfig;

/// Fraction of corners discarded as outliers before the final centroid.
const OUTLIER_FRACTION: f32 = 0.15;

/// Quantile used for the cluster radius.
const RADIUS_QUANTILE: f32 = 0.90;

/// Cluster the frame's corners into a single ball-like candidate.
///
/// The centroid of all corners is computed, the 15% furthest outliers are
/// discarded, and the remaining centroid defines the center; the radius
/// is the 90th-percentile distance. Clusters violating the configured
/// corner-count or radius bounds are rejected.
pub(crate) fn cluster_corners(
    corners: &[(f32, f32)],
    cfg: &BallLockConfig,
    radius_history: &SlidingRing<f32>,
) -> Option<BallClusterSnapshot> {
    let n = corners.len();
    if n < cfg.min_corners as usize {
        return None;
    }

    let rough = centroid(corners);
    let mut by_distance: Vec<(f32, (f32, f32))> = corners
        .iter()
        .map(|&p| (dist(p, rough), p))
        .collect();
    by_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let discard = (n as f32 * OUTLIER_FRACTION).floor() as usize;
    let kept: Vec<(f32, f32)> = by_distance[..n - discard].iter().map(|e| e.1).collect();

    if kept.len() < cfg.min_corners as usize || kept.len() > cfg.max_corners as usize {
        return None;
    }

    let center = centroid(&kept);
    let mut distances: Vec<f32> = kept.iter().map(|&p| dist(p, center)).collect();
    distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q_idx = ((distances.len() - 1) as f32 * RADIUS_QUANTILE).round() as usize;
    let radius = distances[q_idx];

    if radius < cfg.min_radius_px || radius > cfg.max_radius_px {
        return None;
    }

    let quality = quality(&kept, center, radius, cfg, radius_history);
    Some(BallClusterSnapshot {
        center,
        radius_px: radius,
        corner_count: kept.len() as u16,
        quality,
    })
}

fn quality(
    kept: &[(f32, f32)],
    center: (f32, f32),
    _radius: f32,
    cfg: &BallLockConfig,
    radius_history: &SlidingRing<f32>,
) -> f32 {
    let count = count_score(kept.len(), cfg);
    let sym = symmetry_score(kept, center);
    let stab = radius_stability(radius_history);
    (cfg.count_weight * count + cfg.symmetry_weight * sym + cfg.radius_weight * stab)
        .clamp(0.0, 1.0)
}

/// Saturating linear score over the configured corner-count bounds.
fn count_score(n: usize, cfg: &BallLockConfig) -> f32 {
    let lo = cfg.min_corners as f32;
    let hi = cfg.max_corners as f32;
    ((n as f32 - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Radial symmetry from the spread of angular gaps: the median absolute
/// deviation of consecutive gaps from the uniform gap, normalized by pi.
/// An evenly spread ring scores near 1.
fn symmetry_score(kept: &[(f32, f32)], center: (f32, f32)) -> f32 {
    if kept.len() < 3 {
        return 0.0;
    }
    let mut angles: Vec<f32> = kept
        .iter()
        .map(|&(x, y)| (y - center.1).atan2(x - center.0))
        .collect();
    angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = angles.len();
    let uniform = std::f32::consts::TAU / n as f32;
    let mut deviations = Vec::with_capacity(n);
    for i in 0..n {
        let gap = if i + 1 < n {
            angles[i + 1] - angles[i]
        } else {
            angles[0] + std::f32::consts::TAU - angles[n - 1]
        };
        deviations.push((gap - uniform).abs());
    }
    let mad = median(&deviations).unwrap_or(std::f32::consts::PI);
    (1.0 - mad / std::f32::consts::PI).clamp(0.0, 1.0)
}

/// Radius stability over the recent lock history. An empty history is
/// treated as stable so acquisition is not penalized.
fn radius_stability(history: &SlidingRing<f32>) -> f32 {
    if history.len() < 2 {
        return 1.0;
    }
    let values: Vec<f32> = history.iter().copied().collect();
    let med = match median(&values) {
        Some(m) if m > 0.0 => m,
        _ => return 0.0,
    };
    let mad = median_abs_deviation(&values).unwrap_or(0.0);
    (1.0 - mad / med).clamp(0.0, 1.0)
}

fn centroid(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

#[inline]
fn dist(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(n: usize, cx: f32, cy: f32, r: f32) -> Vec<(f32, f32)> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                (cx + r * a.cos(), cy + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn even_ring_clusters_with_high_quality() {
        let cfg = BallLockConfig::default();
        let history = SlidingRing::new(6);
        // ring plus one stray; the stray is the trimmed outlier
        let mut corners = ring_of(8, 500.0, 400.0, 20.0);
        corners.push((548.0, 364.0));
        let snap = cluster_corners(&corners, &cfg, &history).unwrap();
        assert!((snap.center.0 - 500.0).abs() < 0.5);
        assert!((snap.center.1 - 400.0).abs() < 0.5);
        assert!((snap.radius_px - 20.0).abs() < 0.5);
        assert_eq!(snap.corner_count, 8);
        assert!(snap.quality >= cfg.q_lock, "quality = {}", snap.quality);
    }

    #[test]
    fn too_few_corners_is_no_cluster() {
        let cfg = BallLockConfig::default();
        let history = SlidingRing::new(6);
        let corners = ring_of(4, 100.0, 100.0, 20.0);
        assert!(cluster_corners(&corners, &cfg, &history).is_none());
    }

    #[test]
    fn radius_bounds_reject() {
        let cfg = BallLockConfig::default();
        let history = SlidingRing::new(6);
        // tight cluster below min radius
        let corners = ring_of(8, 100.0, 100.0, 2.0);
        assert!(cluster_corners(&corners, &cfg, &history).is_none());
        // huge spread above max radius
        let corners = ring_of(8, 500.0, 500.0, 400.0);
        assert!(cluster_corners(&corners, &cfg, &history).is_none());
    }

    #[test]
    fn outliers_are_discarded() {
        let cfg = BallLockConfig::default();
        let history = SlidingRing::new(6);
        let mut corners = ring_of(8, 500.0, 400.0, 20.0);
        corners.push((900.0, 50.0));
        let snap = cluster_corners(&corners, &cfg, &history).unwrap();
        // the far outlier must not drag the center
        assert!((snap.center.0 - 500.0).abs() < 0.5);
        assert!((snap.radius_px - 20.0).abs() < 0.5);
    }

    #[test]
    fn unstable_radius_history_lowers_quality() {
        let cfg = BallLockConfig::default();
        let mut stable = SlidingRing::new(6);
        let mut unstable = SlidingRing::new(6);
        for i in 0..6 {
            stable.push(20.0);
            unstable.push(10.0 + 8.0 * (i % 2) as f32);
        }
        let mut corners = ring_of(8, 500.0, 400.0, 20.0);
        corners.push((548.0, 364.0));
        let q_stable = cluster_corners(&corners, &cfg, &stable).unwrap().quality;
        let q_unstable = cluster_corners(&corners, &cfg, &unstable).unwrap().quality;
        assert!(q_stable > q_unstable);
    }
}
