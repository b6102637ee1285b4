//! Timecode v2 file writer.

use crate::error::{AfsError, Result};
use crate::timebase::Rational;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// First line of a timecode v2 file.
pub const TIMECODE_HEADER: &str = "# timecode format v2";

/// Writes one millisecond timestamp per output frame.
pub struct TimecodeWriter {
    out: Box<dyn Write + Send>,
    time_base: Rational,
}

impl TimecodeWriter {
    /// Create the file at `path` and write the header.
    pub fn create(path: &Path, time_base: Rational) -> Result<Self> {
        let file = File::create(path).map_err(|e| AfsError::file_open(path, &e))?;
        debug!("opened timecode file {}", path.display());
        Self::from_writer(Box::new(BufWriter::new(file)), time_base)
    }

    /// Write into an arbitrary writer.
    pub fn from_writer(mut out: Box<dyn Write + Send>, time_base: Rational) -> Result<Self> {
        writeln!(out, "{}", TIMECODE_HEADER).map_err(|e| AfsError::write("timecode", &e))?;
        Ok(Self { out, time_base })
    }

    /// Record an output timestamp. Negative timestamps are skipped.
    pub fn write(&mut self, pts: i64) -> Result<()> {
        if pts < 0 {
            return Ok(());
        }
        let ms = pts as f64 * self.time_base.to_f64() * 1000.0;
        writeln!(self.out, "{:.6}", ms).map_err(|e| AfsError::write("timecode", &e))
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| AfsError::write("timecode", &e))
    }
}

impl std::fmt::Debug for TimecodeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimecodeWriter")
            .field("time_base", &self.time_base)
            .finish_non_exhaustive()
    }
}
