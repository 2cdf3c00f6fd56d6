use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::LogPhase;

/// Default capacity of the telemetry ring.
pub const TELEMETRY_RING_CAPACITY: usize = 8192;

const CSV_HEADER: &str = "timestamp,phase,code,valueA,valueB";

/// Stable observation-site codes.
///
/// These are part of the offline-analysis contract; add new codes, never
/// renumber existing ones.
pub mod codes {
    pub const CADENCE_FPS_SAMPLE: u16 = 0x10;
    pub const CADENCE_VERDICT: u16 = 0x11;
    pub const RS_RAW_METRICS: u16 = 0x20;
    pub const RS_ROW_STATS: u16 = 0x21;
    pub const IMPULSE_DELTA: u16 = 0x30;
    pub const IMPULSE_DETECTED: u16 = 0x31;
    pub const REFRACTORY_GAP: u16 = 0x32;
    pub const LOCK_TRANSITION: u16 = 0x40;
    pub const CLUSTER_QUALITY: u16 = 0x41;
    pub const RS_REFUSE_ROW_SUPPORT: u16 = 0x50;
    pub const RS_REFUSE_FRAME_INTEGRITY: u16 = 0x51;
    pub const RS_REFUSE_FLICKER_ALIGNED: u16 = 0x54;
    pub const RS_WINDOW_SNAPSHOT: u16 = 0x60;
    pub const ROW_SPAN_NARROW: u16 = 0x61;
    pub const ROW_SPAN_MODERATE: u16 = 0x62;
    pub const ROW_SPAN_WIDE: u16 = 0x63;
    pub const LIFECYCLE_TRANSITION: u16 = 0x70;
    pub const SHOT_FINALIZED: u16 = 0x71;
    pub const SHOT_REFUSED: u16 = 0x72;
    pub const QUIET_TRANSITION: u16 = 0x80;
    pub const REGIME_TRANSITION: u16 = 0x81;
    pub const AUTHORITY_TRANSITION: u16 = 0x90;
}

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("CsvError: {0}")]
    Csv(#[from] csv::Error),
    #[error("bad header: {0:?}")]
    BadHeader(String),
    #[error("bad field {field} in row {row}")]
    BadField { row: usize, field: &'static str },
}

/// One telemetry observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: f64,
    pub phase: LogPhase,
    pub code: u16,
    pub value_a: f32,
    pub value_b: f32,
}

/// Fixed-capacity append-only ring of telemetry samples.
///
/// Pushes are dropped while paused. The cursor is monotonic: dumping does
/// not consume samples and the same ring may be dumped repeatedly.
#[derive(Debug)]
pub struct TelemetryRing {
    buf: Vec<TelemetrySample>,
    capacity: usize,
    /// Index of the next write; wraps at capacity.
    cursor: usize,
    len: usize,
    paused: bool,
}

impl TelemetryRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            len: 0,
            paused: false,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(TELEMETRY_RING_CAPACITY)
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        if self.paused {
            return;
        }
        if self.buf.len() < self.capacity {
            self.buf.push(sample);
        } else {
            self.buf[self.cursor] = sample;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    pub fn record(&mut self, timestamp: f64, phase: LogPhase, code: u16, a: f32, b: f32) {
        self.push(TelemetrySample {
            timestamp,
            phase,
            code,
            value_a: a,
            value_b: b,
        });
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        let start = if self.len == self.capacity {
            self.cursor
        } else {
            0
        };
        (0..self.len).map(move |i| &self.buf[(start + i) % self.capacity])
    }

    /// Write the ring as CSV. Row format is fixed:
    /// `%.6f,<phase>,%u16,%.6f,%.6f`.
    pub fn dump_csv<W: Write>(&self, mut w: W) -> Result<(), CsvError> {
        writeln!(w, "{}", CSV_HEADER)?;
        for s in self.iter() {
            writeln!(
                w,
                "{:.6},{},{},{:.6},{:.6}",
                s.timestamp,
                s.phase.as_str(),
                s.code,
                s.value_a,
                s.value_b
            )?;
        }
        Ok(())
    }

    /// Dump to `rs_telemetry_YYYYMMDD_HHMMSS.csv` inside `dir`, returning
    /// the path written.
    pub fn dump_to_dir(&self, dir: &Path) -> Result<PathBuf, CsvError> {
        let name = format!(
            "rs_telemetry_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(name);
        let f = std::fs::File::create(&path)?;
        self.dump_csv(std::io::BufWriter::new(f))?;
        Ok(path)
    }
}

/// Read back a telemetry CSV dump.
pub fn read_csv<R: BufRead>(r: R) -> Result<Vec<TelemetrySample>, CsvError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(r);
    {
        let headers = rdr.headers()?;
        let joined = headers.iter().collect::<Vec<_>>().join(",");
        if joined != CSV_HEADER {
            return Err(CsvError::BadHeader(joined));
        }
    }
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let field = |idx: usize, name: &'static str| -> Result<&str, CsvError> {
            rec.get(idx).ok_or(CsvError::BadField {
                row: i,
                field: name,
            })
        };
        let timestamp: f64 = field(0, "timestamp")?
            .parse()
            .map_err(|_| CsvError::BadField {
                row: i,
                field: "timestamp",
            })?;
        let phase = LogPhase::from_str(field(1, "phase")?).ok_or(CsvError::BadField {
            row: i,
            field: "phase",
        })?;
        let code: u16 = field(2, "code")?.parse().map_err(|_| CsvError::BadField {
            row: i,
            field: "code",
        })?;
        let value_a: f32 = field(3, "valueA")?.parse().map_err(|_| CsvError::BadField {
            row: i,
            field: "valueA",
        })?;
        let value_b: f32 = field(4, "valueB")?.parse().map_err(|_| CsvError::BadField {
            row: i,
            field: "valueB",
        })?;
        out.push(TelemetrySample {
            timestamp,
            phase,
            code,
            value_a,
            value_b,
        });
    }
    Ok(out)
}

/// Named commands understood by the telemetry subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryCommand {
    Pause,
    Dump,
}

pub fn parse_command(name: &str) -> Option<TelemetryCommand> {
    match name {
        "telemetry.pause" => Some(TelemetryCommand::Pause),
        "telemetry.dump" => Some(TelemetryCommand::Dump),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: f64, code: u16) -> TelemetrySample {
        TelemetrySample {
            timestamp: ts,
            phase: LogPhase::RsWindow,
            code,
            value_a: 0.125,
            value_b: -1.5,
        }
    }

    #[test]
    fn ring_wraps_and_keeps_newest() {
        let mut ring = TelemetryRing::new(4);
        for i in 0..6 {
            ring.push(sample(i as f64, i));
        }
        let codes: Vec<u16> = ring.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![2, 3, 4, 5]);
    }

    #[test]
    fn paused_ring_drops_pushes() {
        let mut ring = TelemetryRing::new(4);
        ring.push(sample(0.0, 1));
        ring.pause();
        ring.push(sample(1.0, 2));
        assert_eq!(ring.len(), 1);
        ring.resume();
        ring.push(sample(2.0, 3));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn csv_round_trip_is_byte_identical() {
        let mut ring = TelemetryRing::new(16);
        ring.push(sample(0.008333, codes::RS_RAW_METRICS));
        ring.push(sample(0.016667, codes::ROW_SPAN_MODERATE));

        let mut first = Vec::new();
        ring.dump_csv(&mut first).unwrap();

        let parsed = read_csv(std::io::Cursor::new(&first)).unwrap();
        let mut ring2 = TelemetryRing::new(16);
        for s in parsed {
            ring2.push(s);
        }
        let mut second = Vec::new();
        ring2.dump_csv(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dump_file_name_shape() {
        let dir = tempfile::tempdir().unwrap();
        let ring = TelemetryRing::new(4);
        let path = ring.dump_to_dir(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("rs_telemetry_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "rs_telemetry_YYYYMMDD_HHMMSS.csv".len());
    }

    #[test]
    fn command_names() {
        assert_eq!(parse_command("telemetry.pause"), Some(TelemetryCommand::Pause));
        assert_eq!(parse_command("telemetry.dump"), Some(TelemetryCommand::Dump));
        assert_eq!(parse_command("telemetry.reset"), None);
    }
}
