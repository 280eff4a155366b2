//! Recording log written by the mock simulator's recorder.
//!
//! # Format
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Header (64 bytes, postcard)  │  magic "DREC", version, frame count
//! ├──────────────────────────────┤
//! │ u32 len │ LogRecord::Start   │  town, fixed delta
//! ├──────────────────────────────┤
//! │ u32 len │ LogRecord::Frame   │  one per tick
//! │ ...                          │
//! └──────────────────────────────┘
//! ```
//!
//! The header is written last, so a recorder that never reached
//! [`RecordingWriter::finish`] leaves a zeroed header that readers reject.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::ActorId;
use crate::sim::{ActorSnapshot, SignalState, SimError, SimResult};

/// Magic bytes at start of a recording log.
pub const LOG_MAGIC: [u8; 4] = *b"DREC";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Size of the log header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Largest record the reader accepts.
const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Log header (64 bytes fixed size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogHeader {
    /// Magic bytes: "DREC"
    pub magic: [u8; 4],
    /// File format version
    pub version: u16,
    /// Number of frame records
    pub frame_count: u64,
    /// Seconds per tick
    pub fixed_delta_seconds: f64,
    /// Reserved for future use
    pub reserved: [u8; 16],
}

impl LogHeader {
    pub fn is_valid(&self) -> bool {
        self.magic == LOG_MAGIC && self.version == LOG_VERSION
    }
}

/// World state captured at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Tick index within this recording, starting at 0.
    pub index: u64,
    /// Simulation time in seconds.
    pub elapsed: f64,
    pub vehicles: Vec<ActorSnapshot>,
    pub lights: Vec<(ActorId, SignalState)>,
}

/// Records stored in a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    Start { town: String, fixed_delta_seconds: f64 },
    Frame(FrameRecord),
}

fn serialize_error(e: postcard::Error) -> SimError {
    SimError::Protocol(format!("log serialization failed: {}", e))
}

/// Streaming log writer.
pub struct RecordingWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    fixed_delta_seconds: f64,
    frame_count: u64,
}

impl RecordingWriter {
    /// Create the log and write the start record. The header space stays zeroed
    /// until [`finish`](Self::finish).
    pub fn create(path: impl AsRef<Path>, town: &str, fixed_delta_seconds: f64) -> SimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;

        let mut recorder = Self {
            writer,
            path,
            fixed_delta_seconds,
            frame_count: 0,
        };
        recorder.write_record(&LogRecord::Start {
            town: town.to_string(),
            fixed_delta_seconds,
        })?;
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn write_frame(&mut self, frame: &FrameRecord) -> SimResult<()> {
        self.write_record(&LogRecord::Frame(frame.clone()))?;
        self.frame_count += 1;
        Ok(())
    }

    fn write_record(&mut self, record: &LogRecord) -> SimResult<()> {
        let bytes = postcard::to_allocvec(record).map_err(serialize_error)?;
        let len = bytes.len() as u32;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    /// Write the header and close the file. Returns the frame count.
    pub fn finish(mut self) -> SimResult<u64> {
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(0))?;

        let header = LogHeader {
            magic: LOG_MAGIC,
            version: LOG_VERSION,
            frame_count: self.frame_count,
            fixed_delta_seconds: self.fixed_delta_seconds,
            reserved: [0; 16],
        };
        let header_bytes = postcard::to_allocvec(&header).map_err(serialize_error)?;
        let mut buffer = [0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        buffer[..copy_len].copy_from_slice(&header_bytes[..copy_len]);
        self.writer.write_all(&buffer)?;
        self.writer.flush()?;

        tracing::debug!(path = %self.path.display(), frames = self.frame_count, "Recording log closed");
        Ok(self.frame_count)
    }
}

/// Streaming log reader.
pub struct RecordingReader {
    reader: BufReader<File>,
    header: LogHeader,
    town: String,
    frames_read: u64,
}

impl RecordingReader {
    /// Open a log, validating the header and reading the start record.
    pub fn open(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SimError::NotFound(format!("recording {}", path.display()))
            }
            _ => SimError::Io(e),
        })?;
        let mut reader = BufReader::new(file);

        let mut buffer = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| SimError::Corrupt("file shorter than header".to_string()))?;
        let header: LogHeader = postcard::from_bytes(&buffer)
            .map_err(|e| SimError::Corrupt(format!("unreadable header: {}", e)))?;
        if !header.is_valid() {
            return Err(SimError::Corrupt(
                "missing header, recording was not finished".to_string(),
            ));
        }

        let mut log = Self {
            reader,
            header,
            town: String::new(),
            frames_read: 0,
        };
        match log.read_record()? {
            Some(LogRecord::Start { town, .. }) => log.town = town,
            _ => return Err(SimError::Corrupt("missing start record".to_string())),
        }
        Ok(log)
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    pub fn town(&self) -> &str {
        &self.town
    }

    pub fn frame_count(&self) -> u64 {
        self.header.frame_count
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next frame, `None` after the last one.
    pub fn next_frame(&mut self) -> SimResult<Option<FrameRecord>> {
        if self.frames_read >= self.header.frame_count {
            return Ok(None);
        }
        match self.read_record()? {
            Some(LogRecord::Frame(frame)) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Some(LogRecord::Start { .. }) => Err(SimError::Corrupt(format!(
                "unexpected start record at frame {}",
                self.frames_read
            ))),
            None => Err(SimError::Corrupt(format!(
                "log ends at frame {} of {}",
                self.frames_read, self.header.frame_count
            ))),
        }
    }

    /// Skip `count` frames.
    pub fn skip(&mut self, count: u64) -> SimResult<()> {
        for _ in 0..count {
            if self.next_frame()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn read_record(&mut self) -> SimResult<Option<LogRecord>> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_RECORD_BYTES {
            return Err(SimError::Corrupt(format!("record too large: {} bytes", len)));
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(|_| {
            SimError::Corrupt(format!("truncated record after frame {}", self.frames_read))
        })?;
        let record = postcard::from_bytes(&payload)
            .map_err(|e| SimError::Corrupt(format!("undecodable record: {}", e)))?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BoundingBox, Location, Transform};
    use crate::sim::ActorCategory;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn frame(index: u64) -> FrameRecord {
        FrameRecord {
            index,
            elapsed: index as f64 * 0.05,
            vehicles: vec![ActorSnapshot {
                id: 10_000,
                category: ActorCategory::Vehicle,
                role: Some("ego".to_string()),
                transform: Transform::new(Location::new(index as f64, 0.0, 0.0), Default::default()),
                bounding_box: BoundingBox::default(),
            }],
            lights: vec![(1_000, SignalState::Red)],
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Town01_1.log");

        let mut writer = RecordingWriter::create(&path, "Town01", 0.05).unwrap();
        for i in 0..5 {
            writer.write_frame(&frame(i)).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 5);

        let mut reader = RecordingReader::open(&path).unwrap();
        assert_eq!(reader.town(), "Town01");
        assert_eq!(reader.frame_count(), 5);
        reader.skip(2).unwrap();
        assert_eq!(reader.next_frame().unwrap().map(|f| f.index), Some(2));
    }

    #[test]
    fn test_unfinished_log_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.log");
        {
            let mut writer = RecordingWriter::create(&path, "Town01", 0.05).unwrap();
            writer.write_frame(&frame(0)).unwrap();
            writer.writer.flush().unwrap();
            // Dropped without finish().
        }
        assert!(matches!(
            RecordingReader::open(&path),
            Err(SimError::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated_log_reports_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.log");
        let mut writer = RecordingWriter::create(&path, "Town01", 0.05).unwrap();
        for i in 0..4 {
            writer.write_frame(&frame(i)).unwrap();
        }
        writer.finish().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let mut reader = RecordingReader::open(&path).unwrap();
        for _ in 0..3 {
            assert!(reader.next_frame().unwrap().is_some());
        }
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, SimError::Corrupt(_)));
        assert_eq!(reader.frames_read(), 3);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            RecordingReader::open("/nonexistent/drishti.log"),
            Err(SimError::NotFound(_))
        ));
    }
}
