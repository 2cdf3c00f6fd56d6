//! Corner detection orchestrator.
//!
//! Validates the requested ROI, selects the luminance or chroma plane,
//! normalizes, upscales, runs FAST-9 on the GPU and maps the detected
//! corners back to full-frame coordinates. The `detect` call is
//! synchronous at the API level; GPU work is submitted and awaited
//! inside. Transient failures produce empty results, never a panic.

use gpu_imops::GpuImops;
use strike_telemetry::{phase_log, LogPhase};
use strike_types::{BiPlanarFrame, Corner, RectPx, VisionDot};

pub use strike_feature_detector_types::{ChromaEnhancement, DetectorConfig};

mod errors;
pub use errors::{Error, Result};

const MIN_ROI_SIDE: u32 = 16;

pub struct StrikeFeatureDetector {
    gpu: GpuImops,
    cfg: DetectorConfig,
}

impl StrikeFeatureDetector {
    /// Initialize the GPU pipeline. Fails only on fatal initialization
    /// errors (no adapter, kernel validation); the per-frame path never
    /// does.
    pub fn new(cfg: DetectorConfig) -> Result<Self> {
        let gpu = GpuImops::new()?;
        Ok(Self { gpu, cfg })
    }

    pub fn with_gpu(gpu: GpuImops, cfg: DetectorConfig) -> Self {
        Self { gpu, cfg }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn set_config(&mut self, cfg: DetectorConfig) {
        self.cfg = cfg;
    }

    /// Detect corners in `frame`, optionally restricted to `roi`.
    ///
    /// Returns full-frame corner positions plus the per-frame dot list.
    /// On any transient failure both vectors are empty.
    pub fn detect(
        &mut self,
        frame: &BiPlanarFrame<'_>,
        roi: Option<RectPx>,
    ) -> (Vec<(f32, f32)>, Vec<VisionDot>) {
        match self.detect_inner(frame, roi) {
            Ok(out) => out,
            Err(e) => {
                phase_log!(LogPhase::Detection, "frame dropped: {}", e);
                (Vec::new(), Vec::new())
            }
        }
    }

    fn detect_inner(
        &mut self,
        frame: &BiPlanarFrame<'_>,
        roi: Option<RectPx>,
    ) -> Result<(Vec<(f32, f32)>, Vec<VisionDot>)> {
        let (w, h) = (frame.width(), frame.height());
        let roi = validate_roi(roi, w, h);
        if roi.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let sr_scale = self.cfg.sr_scale_for(roi.w.min(roi.h));

        // Chroma path when configured and the Cb crop succeeds; fall back
        // to luminance otherwise.
        let chroma = if self.cfg.use_chroma {
            self.try_chroma_plane(frame, &roi).ok()
        } else {
            None
        };

        let (plane, origin, to_full_scale) = match chroma {
            Some((plane, origin)) => (plane, origin, 2.0),
            None => {
                let y = self
                    .gpu
                    .upload_y(frame.y_plane(), frame.stride_y(), w, h)?;
                let crop = self.gpu.roi_crop(&y, roi.x, roi.y, roi.w, roi.h)?;
                let lo = self.gpu.plane_min(&crop)?;
                let hi = self.gpu.plane_max(&crop)?;
                let norm = self.gpu.plane_norm(&crop, &lo, &hi)?;
                (norm, (roi.x as f32, roi.y as f32), 1.0)
            }
        };

        let sr_plane = if sr_scale > 1.0 {
            self.gpu.sr_nearest(&plane, sr_scale)?
        } else {
            plane
        };

        let corners = self
            .gpu
            .fast9_corners(&sr_plane, self.cfg.fast9_threshold)?;

        let kept = select_top_corners(corners, self.cfg.max_corners);
        let map = |c: &Corner| {
            (
                origin.0 + c.x as f32 * to_full_scale / sr_scale,
                origin.1 + c.y as f32 * to_full_scale / sr_scale,
            )
        };

        let positions: Vec<(f32, f32)> = kept.iter().map(&map).collect();
        let dots: Vec<VisionDot> = kept
            .iter()
            .enumerate()
            .map(|(i, c)| VisionDot {
                id: i as i32,
                position: map(c),
                score: c.score as f32 / 255.0,
                predicted: false,
                velocity: None,
            })
            .collect();

        Ok((positions, dots))
    }

    /// Build the normalized chroma plane for `roi`. The returned origin
    /// is the even-aligned full-frame origin of the crop.
    fn try_chroma_plane(
        &mut self,
        frame: &BiPlanarFrame<'_>,
        roi: &RectPx,
    ) -> Result<(gpu_imops::Plane, (f32, f32))> {
        let croi = RectPx::new(roi.x / 2, roi.y / 2, (roi.w / 2).max(1), (roi.h / 2).max(1));
        let cb = self.gpu.upload_cb(
            frame.cbcr_plane(),
            frame.stride_cbcr(),
            frame.width() / 2,
            frame.height() / 2,
        )?;
        let crop = self.gpu.roi_crop(&cb, croi.x, croi.y, croi.w, croi.h)?;
        let boosted = self
            .gpu
            .chroma_boost(&crop, self.cfg.effective_chroma_gain())?;
        let enhanced = match self.cfg.chroma_enhancement {
            ChromaEnhancement::Off => boosted,
            ChromaEnhancement::BoxBlur => self.gpu.box_blur(&boosted)?,
            ChromaEnhancement::Bilateral => self.gpu.bilateral(&boosted)?,
        };
        Ok((enhanced, ((croi.x * 2) as f32, (croi.y * 2) as f32)))
    }
}

/// Intersect the caller ROI with the frame; empty or absent falls back to
/// the full frame; a minimum of 16x16 is enforced by symmetric growth.
fn validate_roi(roi: Option<RectPx>, width: u32, height: u32) -> RectPx {
    let frame_rect = RectPx::full_frame(width, height);
    if width == 0 || height == 0 {
        return RectPx::new(0, 0, 0, 0);
    }
    let roi = match roi {
        None => frame_rect,
        Some(r) => {
            let i = r.intersect(&frame_rect);
            if i.is_empty() {
                frame_rect
            } else {
                i
            }
        }
    };
    roi.grown_to_min(MIN_ROI_SIDE, MIN_ROI_SIDE, width, height)
}

/// Keep the highest-scoring `max_corners` corners.
fn select_top_corners(mut corners: Vec<Corner>, max_corners: usize) -> Vec<Corner> {
    corners.sort_by(|a, b| b.score.cmp(&a.score));
    corners.truncate(max_corners);
    corners
}
