//! Deterministic offline runner.
//!
//! Reads a Y4M file and produces the same `(frame, timestamp)` stream
//! live capture would deliver: presentation order, per-frame timestamps
//! from the container frame rate, one log line per frame. Frames are
//! repacked from 4:2:0 planar to the biplanar layout the core consumes.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use strike_engine::{EngineConfig, StrikeEngine};
use strike_telemetry::{phase_log, LogPhase};
use strike_types::{BiPlanarFrame, ShotRecord};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Y4mError: {0}")]
    Y4m(#[from] y4m::Error),
    #[error("unsupported colorspace {0:?}; need 4:2:0 planar")]
    UnsupportedColorspace(y4m::Colorspace),
    #[error("EngineError: {0}")]
    Engine(#[from] strike_engine::Error),
    #[error("TelemetryError: {0}")]
    Telemetry(#[from] strike_telemetry::CsvError),
    #[error("invalid frame rate {num}/{den}")]
    BadFrameRate { num: usize, den: usize },
}

/// One decoded frame in the capture byte layout.
pub struct OwnedFrame {
    pub y: Vec<u8>,
    pub cbcr: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_sec: f64,
}

impl OwnedFrame {
    pub fn view(&self) -> std::result::Result<BiPlanarFrame<'_>, strike_types::FrameError> {
        BiPlanarFrame::new(
            &self.y,
            &self.cbcr,
            self.width,
            self.height,
            self.width as usize,
            self.width as usize,
            self.timestamp_sec,
        )
    }
}

/// Y4M file source yielding frames in presentation-time order.
pub struct Y4mSource {
    decoder: y4m::Decoder<BufReader<std::fs::File>>,
    width: u32,
    height: u32,
    frame_interval: f64,
    frame_index: usize,
}

impl Y4mSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let decoder = y4m::decode(BufReader::new(file))?;
        match decoder.get_colorspace() {
            y4m::Colorspace::C420
            | y4m::Colorspace::C420jpeg
            | y4m::Colorspace::C420paldv
            | y4m::Colorspace::C420mpeg2 => {}
            other => return Err(Error::UnsupportedColorspace(other)),
        }
        let rate = decoder.get_framerate();
        if rate.num == 0 || rate.den == 0 {
            return Err(Error::BadFrameRate {
                num: rate.num,
                den: rate.den,
            });
        }
        let frame_interval = rate.den as f64 / rate.num as f64;
        let width = decoder.get_width() as u32;
        let height = decoder.get_height() as u32;
        Ok(Self {
            decoder,
            width,
            height,
            frame_interval,
            frame_index: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        1.0 / self.frame_interval
    }

    /// Read the next frame, repacked to biplanar. `None` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<OwnedFrame>> {
        let width = self.width;
        let height = self.height;
        let timestamp_sec = self.frame_index as f64 * self.frame_interval;
        self.frame_index += 1;
        let frame = match self.decoder.read_frame() {
            Ok(f) => f,
            Err(y4m::Error::EOF) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let y = frame.get_y_plane().to_vec();
        let u = frame.get_u_plane();
        let v = frame.get_v_plane();
        let mut cbcr = vec![0u8; u.len() + v.len()];
        for (i, (cb, cr)) in u.iter().zip(v.iter()).enumerate() {
            cbcr[2 * i] = *cb;
            cbcr[2 * i + 1] = *cr;
        }
        Ok(Some(OwnedFrame {
            y,
            cbcr,
            width,
            height,
            timestamp_sec,
        }))
    }
}

/// End-of-run summary in the style of the tracking integration tests.
#[derive(Debug)]
pub struct RunSummary {
    pub frames: usize,
    pub dots_total: usize,
    pub records: Vec<ShotRecord>,
    pub telemetry_path: Option<PathBuf>,
}

/// Drive the engine over a whole file, synchronously frame by frame.
pub fn run_file(
    input: &Path,
    cfg: EngineConfig,
    dump_telemetry_to: Option<&Path>,
) -> Result<RunSummary> {
    let mut source = Y4mSource::open(input)?;
    tracing::info!(
        "processing {} ({}x{} @ {:.2} fps)",
        input.display(),
        source.width(),
        source.height(),
        source.fps()
    );
    let mut engine = StrikeEngine::new(cfg)?;

    let mut frames = 0usize;
    let mut dots_total = 0usize;
    let mut records = Vec::new();
    while let Some(frame) = source.next_frame()? {
        phase_log!(
            LogPhase::Camera,
            "frame {} t={:.6} w={} h={}",
            frames,
            frame.timestamp_sec,
            frame.width,
            frame.height
        );
        let view = match frame.view() {
            Ok(v) => v,
            Err(e) => {
                phase_log!(LogPhase::Camera, "frame {} dropped: {}", frames, e);
                frames += 1;
                continue;
            }
        };
        if let Some(record) = engine.process_frame(&view, None) {
            tracing::info!(
                "shot {}: refused={} reason={:?} trace={}",
                record.shot_id,
                record.refused,
                record.refusal_reason,
                record.motion_phase_trace
            );
            records.push(record);
        }
        dots_total += engine.last_dots().len();
        frames += 1;
    }

    let telemetry_path = match dump_telemetry_to {
        Some(dir) => Some(engine.core().telemetry().dump_to_dir(dir)?),
        None => None,
    };

    Ok(RunSummary {
        frames,
        dots_total,
        records,
        telemetry_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Minimal hand-rolled Y4M writer for fixtures: header plus raw
    // 4:2:0 planar frames.
    fn write_y4m(path: &Path, w: usize, h: usize, frames: usize) {
        let mut f = std::fs::File::create(path).unwrap();
        write!(f, "YUV4MPEG2 W{} H{} F120:1 Ip A1:1 C420\n", w, h).unwrap();
        for i in 0..frames {
            f.write_all(b"FRAME\n").unwrap();
            let y = vec![(10 + i) as u8; w * h];
            let u = vec![128u8; w * h / 4];
            let v = vec![128u8; w * h / 4];
            f.write_all(&y).unwrap();
            f.write_all(&u).unwrap();
            f.write_all(&v).unwrap();
        }
    }

    #[test]
    fn source_preserves_order_and_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.y4m");
        write_y4m(&path, 32, 16, 5);

        let mut src = Y4mSource::open(&path).unwrap();
        assert_eq!(src.width(), 32);
        assert_eq!(src.height(), 16);
        assert!((src.fps() - 120.0).abs() < 1e-9);

        let mut n = 0;
        while let Some(frame) = src.next_frame().unwrap() {
            assert!((frame.timestamp_sec - n as f64 / 120.0).abs() < 1e-9);
            assert_eq!(frame.y[0], (10 + n) as u8);
            assert_eq!(frame.y.len(), 32 * 16);
            assert_eq!(frame.cbcr.len(), 32 * 16 / 2);
            n += 1;
        }
        assert_eq!(n, 5);
    }

    #[test]
    fn owned_frame_view_round_trips_planes() {
        let frame = OwnedFrame {
            y: vec![9u8; 16 * 8],
            cbcr: vec![128u8; 16 * 4],
            width: 16,
            height: 8,
            timestamp_sec: 0.25,
        };
        let view = frame.view().unwrap();
        assert_eq!(view.luma(3, 3), 9);
        assert_eq!(view.cb(0, 0), 128);
        assert_eq!(view.timestamp_sec, 0.25);
    }
}
