//! Per-frame diagnostic CSV log of the cadence state machine.

use crate::cadence::{Position, StreamState};
use crate::error::{AfsError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Column header of the log.
pub const LOG_HEADER: &str =
    " iframe,  sts,       ,        pos,   orig_pts, q_jit, prevjit, pos24, phase24, rff_smooth";

/// Value written in the position column for dropped frames.
const DROPPED_POSITION: i64 = -1;

/// Diagnostic log writer.
pub struct CadenceLog {
    out: Box<dyn Write + Send>,
}

impl std::fmt::Debug for CadenceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CadenceLog").finish_non_exhaustive()
    }
}

impl CadenceLog {
    /// Create the log file at `path` and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| AfsError::file_open(path, &e))?;
        debug!("opened cadence log {}", path.display());
        Self::from_writer(Box::new(BufWriter::new(file)))
    }

    /// Log into an arbitrary writer.
    pub fn from_writer(mut out: Box<dyn Write + Send>) -> Result<Self> {
        writeln!(out, "{}", LOG_HEADER).map_err(|e| AfsError::write("cadence log", &e))?;
        Ok(Self { out })
    }

    /// Append the row for `iframe` after its state update.
    pub fn write_row(
        &mut self,
        iframe: i64,
        state: &StreamState,
        position: Position,
        orig_pts: i64,
    ) -> Result<()> {
        writeln!(self.out, "{}", format_row(iframe, state, position, orig_pts))
            .map_err(|e| AfsError::write("cadence log", &e))
    }

    /// Flush buffered rows.
    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| AfsError::write("cadence log", &e))
    }
}

/// Format one log row.
pub fn format_row(iframe: i64, state: &StreamState, position: Position, orig_pts: i64) -> String {
    format!(
        "{:7}, 0x{:2x}, {}, {:10}, {:10}, {:3}, {:3}, {:3}, {:3}, {:3}",
        iframe,
        state.prev_status.bits(),
        state.prev_status.summary(),
        position.value().unwrap_or(DROPPED_POSITION),
        orig_pts,
        state.quarter_jitter,
        state.prev_jitter,
        state.position24,
        state.phase24,
        state.prev_rff_smooth,
    )
}
