/// Axis-aligned pixel rectangle in full-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RectPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl RectPx {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            w: width,
            h: height,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 / 2.0,
            self.y as f32 + self.h as f32 / 2.0,
        )
    }

    pub fn intersect(&self, other: &RectPx) -> RectPx {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return RectPx::new(0, 0, 0, 0);
        }
        RectPx::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Grow symmetrically around the center to at least `min_w` x `min_h`,
    /// then clamp back inside a `frame_w` x `frame_h` frame.
    pub fn grown_to_min(&self, min_w: u32, min_h: u32, frame_w: u32, frame_h: u32) -> RectPx {
        let w = self.w.max(min_w).min(frame_w);
        let h = self.h.max(min_h).min(frame_h);
        let (cx, cy) = self.center();
        let x = (cx - w as f32 / 2.0).round().max(0.0) as u32;
        let y = (cy - h as f32 / 2.0).round().max(0.0) as u32;
        let x = x.min(frame_w - w);
        let y = y.min(frame_h - h);
        RectPx::new(x, y, w, h)
    }

    /// Round origin and size down to even values, for the half-resolution
    /// chroma plane.
    pub fn even_aligned(&self) -> RectPx {
        RectPx::new(self.x & !1, self.y & !1, self.w & !1, self.h & !1)
    }

    /// Integer-aligned square rectangle centered at `(cx, cy)` with the
    /// given half side, clamped to the frame.
    pub fn centered_square(cx: f32, cy: f32, half_side: f32, frame_w: u32, frame_h: u32) -> RectPx {
        let side = (2.0 * half_side).round().max(1.0) as u32;
        let side = side.min(frame_w).min(frame_h);
        let x = (cx - side as f32 / 2.0).round().max(0.0) as u32;
        let y = (cy - side as f32 / 2.0).round().max(0.0) as u32;
        let x = x.min(frame_w - side);
        let y = y.min(frame_h - side);
        RectPx::new(x, y, side, side)
    }
}

/// Exponential moving average of a 2D point.
#[derive(Debug, Clone, Copy)]
pub struct Ema2 {
    alpha: f32,
    value: Option<(f32, f32)>,
}

impl Ema2 {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, p: (f32, f32)) -> (f32, f32) {
        let next = match self.value {
            None => p,
            Some((vx, vy)) => (
                self.alpha * p.0 + (1.0 - self.alpha) * vx,
                self.alpha * p.1 + (1.0 - self.alpha) * vy,
            ),
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<(f32, f32)> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Median of a slice. Averages the middle pair for even lengths.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    })
}

/// Median absolute deviation around the median.
pub fn median_abs_deviation(values: &[f32]) -> Option<f32> {
    let m = median(values)?;
    let devs: Vec<f32> = values.iter().map(|v| (v - m).abs()).collect();
    median(&devs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = RectPx::new(0, 0, 10, 10);
        let b = RectPx::new(20, 20, 5, 5);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn intersect_overlap() {
        let a = RectPx::new(0, 0, 10, 10);
        let b = RectPx::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), RectPx::new(5, 5, 5, 5));
    }

    #[test]
    fn grow_enforces_minimum_inside_frame() {
        let r = RectPx::new(100, 100, 4, 4).grown_to_min(16, 16, 640, 480);
        assert_eq!((r.w, r.h), (16, 16));
        assert!(r.right() <= 640 && r.bottom() <= 480);
        // still centered on the original region
        assert_relative_eq!(r.center().0, 102.0, epsilon = 1.5);
    }

    #[test]
    fn grow_clamps_at_frame_edge() {
        let r = RectPx::new(638, 478, 2, 2).grown_to_min(16, 16, 640, 480);
        assert_eq!((r.w, r.h), (16, 16));
        assert_eq!(r.right(), 640);
        assert_eq!(r.bottom(), 480);
    }

    #[test]
    fn ema_converges() {
        let mut e = Ema2::new(0.5);
        assert_eq!(e.update((10.0, 0.0)), (10.0, 0.0));
        let v = e.update((20.0, 0.0));
        assert_relative_eq!(v.0, 15.0);
    }

    #[test]
    fn mad_of_constant_is_zero() {
        assert_eq!(median_abs_deviation(&[3.0, 3.0, 3.0]), Some(0.0));
    }
}
