//! Scan cache: per-frame field comparison results.
//!
//! Record `i` compares frame `i` with frame `i - 1`. A record is reused as
//! long as it was computed for the same frame under parameters that satisfy
//! the current ones (see [`ScanParams::satisfies`]). Recomputing record `i`
//! invalidates the stripe records `i - 1` and `i`, which were merged from it.

use crate::analyzer::{FieldAnalyzer, MotionCounts, ScanOutput, ScanParams};
use crate::compute::{Completion, ComputeQueue};
use crate::config::ClipRegion;
use crate::error::{AfsError, Result};
use crate::stripe::StripeCache;
use crate::window::FrameWindow;
use std::sync::Arc;
use tracing::trace;

/// Number of scan records kept.
pub const SCAN_CACHE_SIZE: usize = 16;

#[derive(Debug)]
struct ScanRecord {
    iframe: i64,
    params: ScanParams,
    clip: ClipRegion,
    result: Completion<ScanOutput>,
}

/// Where scan jobs get their frames and run.
#[derive(Clone, Copy)]
pub struct ScanSource<'a> {
    pub window: &'a FrameWindow,
    pub analyzer: &'a Arc<dyn FieldAnalyzer>,
    pub queue: &'a ComputeQueue,
}

/// Ring of scan records.
#[derive(Debug)]
pub struct ScanCache {
    records: Vec<Option<ScanRecord>>,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            records: (0..SCAN_CACHE_SIZE).map(|_| None).collect(),
        }
    }

    fn slot_index(iframe: i64) -> usize {
        iframe.rem_euclid(SCAN_CACHE_SIZE as i64) as usize
    }

    fn record(&self, iframe: i64) -> Option<&ScanRecord> {
        self.records[Self::slot_index(iframe)]
            .as_ref()
            .filter(|r| r.iframe == iframe)
    }

    /// Whether record `iframe` can be reused under `params` and `clip`.
    pub fn is_cached(&self, iframe: i64, params: &ScanParams, clip: &ClipRegion) -> bool {
        self.record(iframe)
            .is_some_and(|r| r.clip == *clip && r.params.satisfies(params))
    }

    /// Ensure record `iframe` exists for `params`, issuing a scan if needed.
    ///
    /// Returns `true` when a scan was issued. The scan itself may still be
    /// running; results are consumed through [`ScanCache::finish`].
    pub fn get_or_compute(
        &mut self,
        iframe: i64,
        params: &ScanParams,
        clip: &ClipRegion,
        source: ScanSource<'_>,
        stripes: &mut StripeCache,
    ) -> Result<bool> {
        if self.is_cached(iframe, params, clip) {
            return Ok(false);
        }
        stripes.expire(iframe - 1);
        stripes.expire(iframe);

        let previous = Arc::clone(source.window.get_clamped(iframe - 1)?);
        let current = Arc::clone(source.window.get_clamped(iframe)?);
        let analyzer = Arc::clone(source.analyzer);
        let (job_params, job_clip) = (*params, *clip);
        trace!(iframe, queue = source.queue.name(), "issue scan");
        let result = source.queue.submit(move || {
            analyzer.scan(iframe, &previous, &current, &job_params, &job_clip)
        });

        self.records[Self::slot_index(iframe)] = Some(ScanRecord {
            iframe,
            params: *params,
            clip: *clip,
            result,
        });
        Ok(true)
    }

    /// Completion token of record `iframe`, for jobs that depend on it.
    pub fn handle(&self, iframe: i64) -> Result<Completion<ScanOutput>> {
        self.record(iframe)
            .map(|r| r.result.clone())
            .ok_or_else(|| AfsError::internal(format!("scan record {} is not available", iframe)))
    }

    /// Block until record `iframe` is materialized and return it.
    pub fn finish(&self, iframe: i64) -> Result<ScanOutput> {
        self.handle(iframe)?.wait()
    }

    /// Field motion counts of record `iframe`.
    pub fn motion(&self, iframe: i64) -> Result<MotionCounts> {
        Ok(self.finish(iframe)?.motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ScanMode;
    use crate::compute::ComputeMode;
    use crate::config::FieldOrder;
    use crate::cpu::CpuFieldAnalyzer;
    use crate::frame::{Frame, PixelFormat};
    use crate::stripe::StripePhase;

    fn params() -> ScanParams {
        ScanParams {
            mode: ScanMode::Full,
            field_order: FieldOrder::TopFieldFirst,
            thre_shift: 128,
            thre_deint: 48,
            thre_ymotion: 112,
            thre_cmotion: 224,
        }
    }

    fn setup() -> (FrameWindow, Arc<dyn FieldAnalyzer>, ComputeQueue) {
        let mut window = FrameWindow::new();
        for i in 0..4 {
            let mut frame = Frame::new(16, 8, PixelFormat::Gray8).with_pts(i * 4);
            if let Some(y) = frame.plane_mut(0) {
                y.iter_mut().for_each(|p| *p = (i * 50) as u8);
            }
            window.push(frame);
        }
        let analyzer: Arc<dyn FieldAnalyzer> = Arc::new(CpuFieldAnalyzer::new());
        let queue = ComputeQueue::new("scan", ComputeMode::Synchronous).unwrap();
        (window, analyzer, queue)
    }

    #[test]
    fn test_cache_hit_and_staleness() {
        let (window, analyzer, queue) = setup();
        let source = ScanSource {
            window: &window,
            analyzer: &analyzer,
            queue: &queue,
        };
        let mut scans = ScanCache::new();
        let mut stripes = StripeCache::new();
        let clip = ClipRegion::none();

        assert!(scans
            .get_or_compute(1, &params(), &clip, source, &mut stripes)
            .unwrap());
        assert!(!scans
            .get_or_compute(1, &params(), &clip, source, &mut stripes)
            .unwrap());

        let changed = ScanParams {
            thre_shift: 200,
            ..params()
        };
        assert!(!scans.is_cached(1, &changed, &clip));
        assert!(scans
            .get_or_compute(1, &changed, &clip, source, &mut stripes)
            .unwrap());

        // A full-mode record serves a shift-only request.
        let shift_only = ScanParams {
            mode: ScanMode::ShiftOnly,
            ..changed
        };
        assert!(scans.is_cached(1, &shift_only, &clip));
    }

    #[test]
    fn test_motion_counts_by_field() {
        let (window, analyzer, queue) = setup();
        let source = ScanSource {
            window: &window,
            analyzer: &analyzer,
            queue: &queue,
        };
        let mut scans = ScanCache::new();
        let mut stripes = StripeCache::new();
        let clip = ClipRegion::none();

        scans
            .get_or_compute(-1, &params(), &clip, source, &mut stripes)
            .unwrap();
        scans
            .get_or_compute(2, &params(), &clip, source, &mut stripes)
            .unwrap();

        // The virtual predecessor of frame 0 is frame 0: no motion.
        assert_eq!(scans.motion(-1).unwrap(), MotionCounts::default());
        // Frames 1 and 2 differ everywhere by 50 levels.
        let m = scans.motion(2).unwrap();
        assert_eq!(m.first, 64);
        assert_eq!(m.latter, 64);
        assert!(scans.motion(3).is_err());
    }

    #[test]
    fn test_recompute_expires_stripes() {
        let (window, analyzer, queue) = setup();
        let source = ScanSource {
            window: &window,
            analyzer: &analyzer,
            queue: &queue,
        };
        let mut scans = ScanCache::new();
        let mut stripes = StripeCache::new();
        let clip = ClipRegion::none();
        for i in 1..=3 {
            scans
                .get_or_compute(i, &params(), &clip, source, &mut stripes)
                .unwrap();
        }
        for i in 1..=2 {
            stripes
                .ensure_merged(i, &scans, &analyzer, &queue, &params(), &clip)
                .unwrap();
        }
        assert_eq!(stripes.phase(1), StripePhase::Counted);

        let changed = ScanParams {
            thre_ymotion: 10,
            ..params()
        };
        scans
            .get_or_compute(2, &changed, &clip, source, &mut stripes)
            .unwrap();
        assert_eq!(stripes.phase(1), StripePhase::Empty);
        assert_eq!(stripes.phase(2), StripePhase::Empty);
    }
}
