//! Configuration types for strike feature detection.
//!
//! These parameters drive the per-frame corner extraction step: plane
//! selection, chroma normalization, super-resolution and FAST-9.

use serde::{Deserialize, Serialize};

/// Post-step applied after the chroma deviation boost.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ChromaEnhancement {
    /// No post-filter; the luminance path uses adaptive or fixed
    /// normalization only.
    Off,
    /// 3x3 box blur.
    BoxBlur,
    /// 5x5 bilateral filter.
    Bilateral,
}

/// Configuration parameters for feature detection.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// FAST-9 intensity threshold. Valid range is 0-255.
    pub fast9_threshold: u8,
    /// Gain applied after the chroma gain, before any post-filter.
    ///
    /// Valid range is 0.5 - 2.0.
    pub pre_filter_gain: f32,
    /// Gain applied to the absolute Cb deviation from neutral (128).
    ///
    /// Valid range is 1.0 - 8.0.
    pub chroma_gain: f32,
    /// Prefer the chroma (Cb) path when a chroma crop succeeds; fall
    /// back to luminance otherwise.
    pub use_chroma: bool,
    /// Post-filter applied on the chroma path.
    pub chroma_enhancement: ChromaEnhancement,
    /// Enable nearest-neighbor super-resolution before FAST-9.
    pub use_super_resolution: bool,
    /// Override the automatic super-resolution scale selection.
    pub sr_scale_override: Option<f32>,
    /// Bound on the number of corners returned per frame, keeping the
    /// highest-scoring first.
    pub max_corners: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fast9_threshold: 14,
            pre_filter_gain: 1.35,
            chroma_gain: 4.0,
            use_chroma: true,
            chroma_enhancement: ChromaEnhancement::Off,
            use_super_resolution: true,
            sr_scale_override: None,
            max_corners: 512,
        }
    }
}

impl DetectorConfig {
    /// Combined chroma gain with both factors clamped to their valid
    /// ranges.
    pub fn effective_chroma_gain(&self) -> f32 {
        self.chroma_gain.clamp(1.0, 8.0) * self.pre_filter_gain.clamp(0.5, 2.0)
    }

    /// Automatic integer-ish super-resolution scale for a ROI of the
    /// given minimum dimension.
    pub fn sr_scale_for(&self, min_roi_dim: u32) -> f32 {
        if !self.use_super_resolution {
            return 1.0;
        }
        if let Some(s) = self.sr_scale_override {
            return s;
        }
        if min_roi_dim < 100 {
            3.0
        } else if min_roi_dim < 180 {
            2.0
        } else {
            1.5
        }
    }
}
