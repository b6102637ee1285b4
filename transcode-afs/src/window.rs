//! Ring of recently ingested source frames.

use crate::error::{AfsError, Result};
use crate::frame::Frame;
use std::sync::Arc;

/// Number of source frames kept.
pub const FRAME_WINDOW_SIZE: usize = 16;

#[derive(Debug)]
struct Slot {
    iframe: i64,
    frame: Arc<Frame>,
}

/// Fixed-size ring of source frames tagged with their global index.
///
/// A slot whose tag differs from the requested index reads as empty.
#[derive(Debug)]
pub struct FrameWindow {
    slots: Vec<Option<Slot>>,
    ingested: i64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            slots: (0..FRAME_WINDOW_SIZE).map(|_| None).collect(),
            ingested: 0,
            first_pts: None,
            last_pts: None,
        }
    }

    fn slot_index(iframe: i64) -> usize {
        iframe.rem_euclid(FRAME_WINDOW_SIZE as i64) as usize
    }

    /// Store `frame` under the next index and return that index.
    pub fn push(&mut self, frame: Frame) -> i64 {
        let iframe = self.ingested;
        self.first_pts.get_or_insert(frame.pts);
        self.last_pts = Some(frame.pts);
        self.slots[Self::slot_index(iframe)] = Some(Slot {
            iframe,
            frame: Arc::new(frame),
        });
        self.ingested += 1;
        iframe
    }

    /// Number of frames ingested so far.
    pub fn ingested(&self) -> i64 {
        self.ingested
    }

    /// Frame `iframe` if it is still held.
    pub fn get(&self, iframe: i64) -> Option<&Arc<Frame>> {
        match &self.slots[Self::slot_index(iframe)] {
            Some(slot) if slot.iframe == iframe => Some(&slot.frame),
            _ => None,
        }
    }

    /// Frame `iframe` with the index clamped to the ingested range.
    ///
    /// The predecessor of frame 0 is frame 0, and indices past the end map to
    /// the last ingested frame.
    pub fn get_clamped(&self, iframe: i64) -> Result<&Arc<Frame>> {
        if self.ingested == 0 {
            return Err(AfsError::internal("frame window is empty"));
        }
        let clamped = iframe.clamp(0, self.ingested - 1);
        self.get(clamped).ok_or_else(|| {
            AfsError::internal(format!(
                "frame {} is no longer held (ingested {})",
                clamped, self.ingested
            ))
        })
    }

    /// Timestamp of `iframe`, extrapolated past the last ingested frame.
    ///
    /// Extrapolation uses the average spacing over the ingested range, or
    /// `nominal_duration` when only one frame was seen.
    pub fn timestamp(&self, iframe: i64, nominal_duration: i64) -> Result<i64> {
        if iframe < self.ingested {
            return Ok(self.get_clamped(iframe)?.pts);
        }
        let (first, last) = match (self.first_pts, self.last_pts) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(AfsError::internal("no timestamps ingested")),
        };
        let spans = self.ingested - 1;
        let step = if spans > 0 {
            (last - first + spans / 2) / spans
        } else {
            nominal_duration
        };
        Ok(last + (iframe - spans) * step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn frame(pts: i64) -> Frame {
        Frame::new(8, 4, PixelFormat::Gray8).with_pts(pts)
    }

    #[test]
    fn test_tag_mismatch_reads_empty() {
        let mut window = FrameWindow::new();
        for i in 0..(FRAME_WINDOW_SIZE as i64 + 3) {
            assert_eq!(window.push(frame(i * 4)), i);
        }
        // Slot of frame 2 now holds frame 18.
        assert!(window.get(2).is_none());
        assert_eq!(window.get(18).map(|f| f.pts), Some(72));
        assert!(window.get(19).is_none());
    }

    #[test]
    fn test_clamped_lookup() {
        let mut window = FrameWindow::new();
        assert!(window.get_clamped(0).is_err());
        window.push(frame(0));
        window.push(frame(4));
        assert_eq!(window.get_clamped(-1).unwrap().pts, 0);
        assert_eq!(window.get_clamped(5).unwrap().pts, 4);
    }

    #[test]
    fn test_timestamp_extrapolation() {
        let mut window = FrameWindow::new();
        for i in 0..10 {
            window.push(frame(1000 + i));
        }
        assert_eq!(window.timestamp(3, 4).unwrap(), 1003);
        assert_eq!(window.timestamp(10, 4).unwrap(), 1010);
        assert_eq!(window.timestamp(12, 4).unwrap(), 1012);
    }

    #[test]
    fn test_single_frame_uses_nominal_duration() {
        let mut window = FrameWindow::new();
        window.push(frame(40));
        assert_eq!(window.timestamp(2, 4).unwrap(), 48);
    }
}
