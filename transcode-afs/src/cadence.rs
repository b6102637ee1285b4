//! Cadence state machine.
//!
//! Turns the per-frame status sequence into output positions. Positions are
//! the original timestamps corrected by a quarter-frame jitter; frames whose
//! correction would move them backwards are dropped. With `FORCE24` the
//! machine additionally tracks a 5-frame pulldown phase and drops one frame
//! per cycle.
//!
//! ```text
//! status(i) ──► set_status(i) ──► position(i) ──► duration(i - 2)
//! ```
//!
//! A duration is only final once the two following frames have positions,
//! since a dropped successor hands its time to its predecessor.

use crate::diag::CadenceLog;
use crate::error::{AfsError, Result};
use crate::status::CadenceStatus;
use tracing::trace;

/// Entries in the position ring.
pub const POSITION_TABLE_SIZE: usize = 16;

/// Output position of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The frame is not output.
    Drop,
    /// Output position in input time-base ticks.
    At(i64),
}

impl Position {
    /// Position value, or `None` when dropped.
    pub fn value(&self) -> Option<i64> {
        match self {
            Position::Drop => None,
            Position::At(pos) => Some(*pos),
        }
    }
}

/// Result of a duration query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDuration {
    /// Not enough lookahead has been recorded.
    NotReady,
    /// The frame is dropped.
    Drop,
    /// Duration in input time-base ticks.
    Ticks(i64),
}

/// Mutable stream state carried between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamState {
    pub prev_status: CadenceStatus,
    pub quarter_jitter: i32,
    pub prev_jitter: i32,
    pub additional_jitter: i32,
    pub prev_rff_smooth: i32,
    pub phase24: i32,
    pub position24: i32,
}

impl StreamState {
    /// State after the first frame.
    pub fn new(status: CadenceStatus, drop24: bool) -> Self {
        let mut state = Self {
            prev_status: status,
            phase24: 4,
            ..Default::default()
        };
        if drop24 || starts_pulldown(status) {
            state.phase24 = 0;
        }
        if status.contains(CadenceStatus::FORCE24) {
            state.position24 += 1;
        } else {
            state.phase24 -= state.position24 + 1;
            state.position24 = 0;
        }
        state
    }

    fn rff_smooth(&self, status: CadenceStatus) -> i32 {
        if !status.intersects(CadenceStatus::FORCE24 | CadenceStatus::SMOOTHING)
            || self.prev_rff_smooth != 0
        {
            return 0;
        }
        if self.prev_status.is_rff() {
            -1
        } else if self.prev_status.is_progressive() && status.is_rff() {
            1
        } else {
            0
        }
    }

    /// Advance by one frame and return its position.
    pub fn advance(&mut self, status: CadenceStatus, mut drop24: bool, orig_pts: i64) -> Position {
        let progressive = status.is_progressive();
        let smoothing = status.contains(CadenceStatus::SMOOTHING);
        let rff_smooth = self.rff_smooth(status);
        let mut pull_drop;
        let mut quarter_jitter;

        if progressive {
            quarter_jitter = rff_smooth;
            pull_drop = false;
            self.additional_jitter = 0;
            drop24 = false;
        } else {
            quarter_jitter = if status.contains(CadenceStatus::SHIFT0) {
                -2
            } else if self.prev_status.contains(CadenceStatus::SHIFT0) {
                if smoothing {
                    -1
                } else {
                    -2
                }
            } else {
                0
            };
            quarter_jitter += if smoothing || self.additional_jitter != -1 {
                self.additional_jitter
            } else {
                -2
            };
            quarter_jitter += rff_smooth;
            self.position24 += rff_smooth;

            pull_drop = status.contains(CadenceStatus::FRAME_DROP)
                && !(self.prev_status | status).contains(CadenceStatus::SHIFT0)
                && status.contains(CadenceStatus::SHIFT1);
            self.additional_jitter = if pull_drop { -1 } else { 0 };
            drop24 = drop24 || starts_pulldown(status);
        }

        if drop24 {
            self.phase24 = (self.position24 + 100) % 5;
        }
        let mut phase_drop = false;
        if self.position24 >= self.phase24
            && ((self.position24 + 100) % 5 == self.phase24
                || (self.position24 + 99) % 5 == self.phase24)
        {
            self.position24 -= 5;
            phase_drop = true;
        }

        if status.contains(CadenceStatus::FORCE24) {
            pull_drop = phase_drop;
            if progressive {
                quarter_jitter += self.position24;
            } else {
                quarter_jitter = self.position24;
                self.position24 += 1;
            }
        } else if !progressive {
            self.phase24 -= self.position24 + 1;
            self.position24 = 0;
        }

        let mut drop_threshold = if status.contains(CadenceStatus::FRAME_DROP) {
            0
        } else {
            -3
        };
        // Switching away from repeated-field frames drops as little as possible.
        if !progressive && self.prev_status.is_rff() {
            drop_threshold = -3;
        }
        let late = quarter_jitter - self.prev_jitter < drop_threshold;

        self.quarter_jitter = quarter_jitter;
        self.prev_rff_smooth = rff_smooth;
        self.prev_status = status;

        if late || pull_drop {
            self.prev_jitter -= 4;
            self.quarter_jitter = 0;
            Position::Drop
        } else {
            self.prev_jitter = self.quarter_jitter;
            Position::At(orig_pts + self.quarter_jitter as i64)
        }
    }
}

/// First field of a 3:2 cycle: this frame keeps its pairing and the next two shift.
fn starts_pulldown(status: CadenceStatus) -> bool {
    !status.contains(CadenceStatus::SHIFT0)
        && status.contains(CadenceStatus::SHIFT1 | CadenceStatus::SHIFT2)
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    iframe: i64,
    orig_pts: i64,
    position: Position,
}

/// Cadence state machine with its position table.
#[derive(Debug, Default)]
pub struct CadenceStateMachine {
    state: StreamState,
    last_frame: Option<i64>,
    table: [Option<Entry>; POSITION_TABLE_SIZE],
    log: Option<CadenceLog>,
}

impl CadenceStateMachine {
    /// Create a state machine without a diagnostic log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state machine writing one log row per update.
    pub fn with_log(log: CadenceLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Current stream state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Last frame index accepted.
    pub fn last_frame(&self) -> Option<i64> {
        self.last_frame
    }

    fn slot(iframe: i64) -> usize {
        iframe.rem_euclid(POSITION_TABLE_SIZE as i64) as usize
    }

    /// Record the status of `iframe`.
    ///
    /// The first call initializes the stream and is accepted for any index.
    /// Afterwards `iframe` may not skip past the last accepted frame + 1.
    pub fn set_status(
        &mut self,
        iframe: i64,
        status: CadenceStatus,
        drop24: bool,
        orig_pts: i64,
    ) -> Result<()> {
        let position = match self.last_frame {
            None => {
                self.state = StreamState::new(status, false);
                Position::At(orig_pts)
            }
            Some(last) if iframe > last + 1 => {
                return Err(AfsError::OutOfOrder { iframe, last });
            }
            Some(_) => self.state.advance(status, drop24, orig_pts),
        };
        self.last_frame = Some(iframe);
        let entry = Entry {
            iframe,
            orig_pts,
            position,
        };
        self.table[Self::slot(iframe)] = Some(entry);
        trace!(
            iframe,
            status = %status.summary(),
            ?position,
            quarter_jitter = self.state.quarter_jitter,
            "cadence update"
        );
        if let Some(log) = self.log.as_mut() {
            log.write_row(iframe, &self.state, position, orig_pts)?;
        }
        Ok(())
    }

    /// Position of `iframe`, if it is still in the table.
    pub fn position(&self, iframe: i64) -> Option<Position> {
        self.table[Self::slot(iframe)]
            .filter(|e| e.iframe == iframe)
            .map(|e| e.position)
    }

    /// Original timestamp recorded for `iframe`.
    pub fn orig_pts(&self, iframe: i64) -> Option<i64> {
        self.table[Self::slot(iframe)]
            .filter(|e| e.iframe == iframe)
            .map(|e| e.orig_pts)
    }

    /// Output duration of `iframe`.
    ///
    /// Needs the positions of `iframe + 1` and `iframe + 2`. When the next
    /// frame is dropped, the first kept frame among the next three closes the
    /// interval.
    pub fn duration(&self, iframe: i64) -> FrameDuration {
        match self.last_frame {
            Some(last) if last >= iframe + 2 => {}
            _ => return FrameDuration::NotReady,
        }
        let Some(start) = self.position(iframe).and_then(|p| p.value()) else {
            return FrameDuration::Drop;
        };
        let next = (1..=3).find_map(|k| self.position(iframe + k).and_then(|p| p.value()));
        match next {
            Some(end) if end > start => FrameDuration::Ticks(end - start),
            _ => FrameDuration::Drop,
        }
    }

    /// Flush the diagnostic log.
    pub fn flush(&mut self) -> Result<()> {
        match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        }
    }
}
