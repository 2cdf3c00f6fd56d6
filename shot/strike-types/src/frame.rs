use machine_vision_formats::{pixel_format::NV12, ImageStride};

pub type Result<T> = std::result::Result<T, FrameError>;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer too small: need {expected} bytes, have {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("frame dimensions must be even and nonzero, got {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
    #[error("plane stride {stride} smaller than row width {width}")]
    StrideTooSmall { stride: usize, width: usize },
}

/// Camera intrinsic parameters, required for future RS-PnP solving.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// Borrowed view of one full-range biplanar 4:2:0 YCbCr frame.
///
/// The Y plane is full resolution, the interleaved CbCr plane is half
/// resolution in both directions. The view is immutable for the frame's
/// lifetime; the capture collaborator owns the underlying buffer.
#[derive(Debug, Clone, Copy)]
pub struct BiPlanarFrame<'a> {
    y: &'a [u8],
    cbcr: &'a [u8],
    width: u32,
    height: u32,
    stride_y: usize,
    stride_cbcr: usize,
    /// Presentation timestamp in seconds.
    pub timestamp_sec: f64,
}

impl<'a> BiPlanarFrame<'a> {
    pub fn new(
        y: &'a [u8],
        cbcr: &'a [u8],
        width: u32,
        height: u32,
        stride_y: usize,
        stride_cbcr: usize,
        timestamp_sec: f64,
    ) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::BadDimensions { width, height });
        }
        if stride_y < width as usize {
            return Err(FrameError::StrideTooSmall {
                stride: stride_y,
                width: width as usize,
            });
        }
        if stride_cbcr < width as usize {
            // interleaved Cb,Cr pairs: (width/2) * 2 bytes per row
            return Err(FrameError::StrideTooSmall {
                stride: stride_cbcr,
                width: width as usize,
            });
        }
        let need_y = stride_y * height as usize;
        if y.len() < need_y {
            return Err(FrameError::BufferTooSmall {
                expected: need_y,
                actual: y.len(),
            });
        }
        let need_c = stride_cbcr * (height as usize / 2);
        if cbcr.len() < need_c {
            return Err(FrameError::BufferTooSmall {
                expected: need_c,
                actual: cbcr.len(),
            });
        }
        Ok(Self {
            y,
            cbcr,
            width,
            height,
            stride_y,
            stride_cbcr,
            timestamp_sec,
        })
    }

    /// View an NV12 image (Y plane followed by interleaved CbCr) as a
    /// biplanar frame.
    pub fn from_nv12<S: ImageStride<NV12>>(im: &'a S, timestamp_sec: f64) -> Result<Self> {
        let width = im.width();
        let height = im.height();
        let stride = im.stride();
        let data = im.image_data();
        let y_len = stride * height as usize;
        let c_len = stride * (height as usize / 2);
        if data.len() < y_len + c_len {
            return Err(FrameError::BufferTooSmall {
                expected: y_len + c_len,
                actual: data.len(),
            });
        }
        Self::new(
            &data[..y_len],
            &data[y_len..y_len + c_len],
            width,
            height,
            stride,
            stride,
            timestamp_sec,
        )
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    #[inline]
    pub fn stride_cbcr(&self) -> usize {
        self.stride_cbcr
    }

    #[inline]
    pub fn y_plane(&self) -> &'a [u8] {
        self.y
    }

    #[inline]
    pub fn cbcr_plane(&self) -> &'a [u8] {
        self.cbcr
    }

    /// Luma sample at full-resolution pixel coordinates.
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.y[y as usize * self.stride_y + x as usize]
    }

    /// Cb sample at half-resolution chroma coordinates.
    #[inline]
    pub fn cb(&self, cx: u32, cy: u32) -> u8 {
        self.cbcr[cy as usize * self.stride_cbcr + 2 * cx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_split_and_samples() {
        const W: u32 = 4;
        const H: u32 = 4;
        let mut y = vec![0u8; (W * H) as usize];
        y[1 * W as usize + 2] = 77;
        let mut cbcr = vec![128u8; (W * H / 2) as usize];
        cbcr[0] = 10; // Cb at (0,0)
        cbcr[1] = 200; // Cr at (0,0)
        let f = BiPlanarFrame::new(&y, &cbcr, W, H, W as usize, W as usize, 0.5).unwrap();
        assert_eq!(f.luma(2, 1), 77);
        assert_eq!(f.cb(0, 0), 10);
        assert_eq!(f.timestamp_sec, 0.5);
    }

    #[test]
    fn rejects_odd_dims() {
        let y = vec![0u8; 15];
        let cbcr = vec![0u8; 8];
        assert!(BiPlanarFrame::new(&y, &cbcr, 3, 5, 3, 4, 0.0).is_err());
    }

    #[test]
    fn rejects_short_buffer() {
        let y = vec![0u8; 8];
        let cbcr = vec![0u8; 8];
        assert!(BiPlanarFrame::new(&y, &cbcr, 4, 4, 4, 4, 0.0).is_err());
    }
}
