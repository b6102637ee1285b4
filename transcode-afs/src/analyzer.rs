//! Field analysis backend interface.
//!
//! The cadence engine never touches pixels itself. It asks a
//! [`FieldAnalyzer`] for four kinds of work:
//!
//! | Step | Input | Output |
//! |------|-------|--------|
//! | scan | frames `i-1`, `i` | per-pixel map, field motion counts |
//! | merge | scan maps `i`, `i+1` | stripe map, stripe counts |
//! | filter | stripe map | denoised stripe map |
//! | synthesize | frames `i`, `i-1`, stripe map, status | progressive frame |
//!
//! [`CpuFieldAnalyzer`](crate::cpu::CpuFieldAnalyzer) is the scalar
//! reference backend.

use crate::config::{ClipRegion, FieldOrder};
use crate::error::Result;
use crate::frame::Frame;
use crate::status::CadenceStatus;
use std::sync::Arc;

/// What a scan computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// Only combing against `thre_shift` (analysis level 0).
    ShiftOnly,
    /// Combing, deinterlace marks and motion.
    Full,
}

/// Parameters a scan record was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanParams {
    pub mode: ScanMode,
    pub field_order: FieldOrder,
    pub thre_shift: i32,
    pub thre_deint: i32,
    pub thre_ymotion: i32,
    pub thre_cmotion: i32,
}

impl ScanParams {
    /// Whether a record computed with `self` can serve a request for `wanted`.
    ///
    /// A full-mode record serves shift-only requests; the motion and deinterlace
    /// thresholds only matter when full mode is requested.
    pub fn satisfies(&self, wanted: &ScanParams) -> bool {
        if self.field_order != wanted.field_order || self.thre_shift != wanted.thre_shift {
            return false;
        }
        match wanted.mode {
            ScanMode::ShiftOnly => true,
            ScanMode::Full => {
                self.mode == ScanMode::Full
                    && self.thre_deint == wanted.thre_deint
                    && self.thre_ymotion == wanted.thre_ymotion
                    && self.thre_cmotion == wanted.thre_cmotion
            }
        }
    }
}

/// Per-pixel flag map produced by the analyzer. Values are backend-defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FieldMap {
    /// An all-zero map.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    /// Flags at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width as usize + x]
    }

    /// Row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        let w = self.width as usize;
        &self.data[y * w..(y + 1) * w]
    }
}

/// Motion of each field between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MotionCounts {
    /// Moving pixels in the first field.
    pub first: u32,
    /// Moving pixels in the latter field.
    pub latter: u32,
}

/// Combing observed for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StripeCounts {
    /// Stripe pixels when the frame is shown as-is.
    pub unshifted: u32,
    /// Stripe pixels when the frame is shown field-shifted.
    pub shifted: u32,
}

/// Result of a scan.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub map: Arc<FieldMap>,
    pub motion: MotionCounts,
}

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub map: Arc<FieldMap>,
    pub stripes: StripeCounts,
}

/// Inputs of the output synthesizer.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisJob<'a> {
    pub iframe: i64,
    pub current: &'a Frame,
    pub previous: &'a Frame,
    pub stripe: &'a FieldMap,
    pub status: CadenceStatus,
    pub field_order: FieldOrder,
    pub analysis_level: u8,
    pub tune: bool,
}

/// Pixel analysis backend.
pub trait FieldAnalyzer: Send + Sync {
    /// Compare frame `iframe` with its predecessor.
    fn scan(
        &self,
        iframe: i64,
        previous: &Frame,
        current: &Frame,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<ScanOutput>;

    /// Combine the scans of `iframe` and `iframe + 1` into a stripe map.
    fn merge(
        &self,
        iframe: i64,
        scan: &FieldMap,
        next_scan: &FieldMap,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<MergeOutput>;

    /// Remove noise from a stripe map. Only called for analysis levels above 1.
    fn filter(&self, stripe: &FieldMap, analysis_level: u8) -> Result<FieldMap>;

    /// Build the progressive output picture.
    fn synthesize(&self, job: &SynthesisJob<'_>) -> Result<Frame>;

    /// Backend name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: ScanMode) -> ScanParams {
        ScanParams {
            mode,
            field_order: FieldOrder::TopFieldFirst,
            thre_shift: 128,
            thre_deint: 48,
            thre_ymotion: 112,
            thre_cmotion: 224,
        }
    }

    #[test]
    fn test_full_record_serves_shift_only() {
        let full = params(ScanMode::Full);
        let shift_only = params(ScanMode::ShiftOnly);
        assert!(full.satisfies(&shift_only));
        assert!(!shift_only.satisfies(&full));
        assert!(full.satisfies(&full));
    }

    #[test]
    fn test_thresholds_invalidate() {
        let stored = params(ScanMode::Full);
        let wanted = ScanParams {
            thre_deint: 64,
            ..stored
        };
        assert!(!stored.satisfies(&wanted));

        // Shift-only requests ignore the deinterlace threshold.
        let wanted = ScanParams {
            mode: ScanMode::ShiftOnly,
            thre_deint: 64,
            ..stored
        };
        assert!(stored.satisfies(&wanted));

        let wanted = ScanParams {
            field_order: FieldOrder::BottomFieldFirst,
            ..stored
        };
        assert!(!stored.satisfies(&wanted));

        let wanted = ScanParams {
            thre_shift: 127,
            ..stored
        };
        assert!(!stored.satisfies(&wanted));
    }

    #[test]
    fn test_field_map_access() {
        let mut map = FieldMap::new(4, 2);
        map.data[5] = 3;
        assert_eq!(map.get(1, 1), 3);
        assert_eq!(map.row(1), &[0, 3, 0, 0]);
    }
}
