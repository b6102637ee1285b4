//! The AFS filter: ingestion, classification, cadence update and emission.
//!
//! Frames run through three counters:
//!
//! ```text
//! ingested ──(5 frames)──► classified ──(3 frames preread)──► emitted
//! ```
//!
//! A frame is classified once five successors have been scanned. It is
//! emitted once the statuses of its next three frames are known, which the
//! cadence state machine needs to close its duration. After end of stream
//! the remaining frames are drained against virtual successors.

use crate::analyzer::{FieldAnalyzer, MotionCounts, StripeCounts, SynthesisJob};
use crate::cadence::{CadenceStateMachine, FrameDuration};
use crate::classify::{assemble_status, detect_telecine_cross, noise_threshold, ClassifierInput};
use crate::compute::ComputeQueue;
use crate::config::{AfsConfig, StreamInfo};
use crate::cpu::CpuFieldAnalyzer;
use crate::diag::CadenceLog;
use crate::error::{AfsError, Result};
use crate::frame::{Frame, FrameFlags};
use crate::scan::{ScanCache, ScanSource, SCAN_CACHE_SIZE};
use crate::status::{CadenceStatus, StatusTable};
use crate::stripe::{StripeCache, STRIPE_CACHE_SIZE};
use crate::timebase::{rescale, Rational};
use crate::timecode::TimecodeWriter;
use crate::window::{FrameWindow, FRAME_WINDOW_SIZE};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Frames scanned past a frame before it is classified.
pub const STABILITY_WINDOW: i64 = 5;

/// Statuses known past a frame before it is emitted.
pub const PREREAD: i64 = 3;

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AfsStats {
    /// Frames pushed.
    pub frames_in: u64,
    /// Frames emitted.
    pub frames_out: u64,
    /// Frames dropped by the cadence state machine.
    pub frames_dropped: u64,
}

/// Automatic field shift filter.
///
/// # Example
///
/// ```no_run
/// use transcode_afs::{AfsConfig, AfsFilter, Frame, PixelFormat, Rational, StreamInfo};
///
/// let stream = StreamInfo::new(720, 480, PixelFormat::Yuv420p, Rational::new(30000, 1001));
/// let mut filter = AfsFilter::with_cpu_analyzer(AfsConfig::default(), stream)?;
///
/// for i in 0..30 {
///     let frame = Frame::new(720, 480, PixelFormat::Yuv420p).with_pts(i * 4);
///     if let Some(out) = filter.process(Some(frame))? {
///         println!("pts {} duration {}", out.pts, out.duration);
///     }
/// }
/// for out in filter.flush()? {
///     println!("pts {} duration {}", out.pts, out.duration);
/// }
/// # Ok::<(), transcode_afs::AfsError>(())
/// ```
pub struct AfsFilter {
    config: AfsConfig,
    stream: StreamInfo,
    analyzer: Arc<dyn FieldAnalyzer>,
    window: FrameWindow,
    scans: ScanCache,
    stripes: StripeCache,
    statuses: StatusTable,
    cadence: CadenceStateMachine,
    scan_queue: ComputeQueue,
    merge_queue: ComputeQueue,
    timecode: Option<TimecodeWriter>,
    next_emit: i64,
    next_pts: i64,
    draining: bool,
    stats: AfsStats,
}

impl AfsFilter {
    /// Create a filter running `analyzer`.
    ///
    /// Validates the configuration and opens the log and timecode files.
    pub fn new(config: AfsConfig, stream: StreamInfo, analyzer: Arc<dyn FieldAnalyzer>) -> Result<Self> {
        let config = config.validate(&stream)?;

        let cadence = match config.log_path() {
            Some(path) => CadenceStateMachine::with_log(CadenceLog::create(&path)?),
            None => CadenceStateMachine::new(),
        };
        let timecode = config
            .timecode_path()
            .map(|path| TimecodeWriter::create(&path, stream.time_base_out))
            .transpose()?;
        let scan_queue = ComputeQueue::new("scan", config.compute)?;
        let merge_queue = ComputeQueue::new("merge", config.compute)?;

        debug!(
            analyzer = analyzer.name(),
            compute = ?config.compute,
            analyze = config.analyze,
            frames = FRAME_WINDOW_SIZE,
            scans = SCAN_CACHE_SIZE,
            stripes = STRIPE_CACHE_SIZE,
            "afs: {}x{} {} at {}",
            stream.width,
            stream.height,
            stream.format,
            stream.frame_rate
        );

        Ok(Self {
            config,
            stream,
            analyzer,
            window: FrameWindow::new(),
            scans: ScanCache::new(),
            stripes: StripeCache::new(),
            statuses: StatusTable::new(),
            cadence,
            scan_queue,
            merge_queue,
            timecode,
            next_emit: 0,
            next_pts: 0,
            draining: false,
            stats: AfsStats::default(),
        })
    }

    /// Create a filter using [`CpuFieldAnalyzer`].
    pub fn with_cpu_analyzer(config: AfsConfig, stream: StreamInfo) -> Result<Self> {
        Self::new(config, stream, Arc::new(CpuFieldAnalyzer::new()))
    }

    /// Active configuration.
    pub fn config(&self) -> &AfsConfig {
        &self.config
    }

    /// Stream description.
    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    /// Frame counters.
    pub fn stats(&self) -> AfsStats {
        self.stats
    }

    /// Nominal frame rate of the output.
    pub fn output_frame_rate(&self) -> Rational {
        self.config.output_frame_rate(self.stream.frame_rate)
    }

    /// Status of frame `iframe`, if it has been classified.
    pub fn status(&self, iframe: i64) -> Option<CadenceStatus> {
        self.statuses.get(iframe)
    }

    /// Apply new analysis parameters.
    ///
    /// Output files and the compute mode stay as configured at construction.
    /// Scan records computed under different parameters are recomputed when
    /// next needed; frames already classified keep their status.
    pub fn reconfigure(&mut self, mut config: AfsConfig) -> Result<()> {
        config.timecode = self.config.timecode;
        config.log = self.config.log;
        config.output_path = self.config.output_path.clone();
        config.compute = self.config.compute;
        let config = config.validate(&self.stream)?;
        debug!(
            analyze = config.analyze,
            thre_shift = config.thre_shift,
            "afs: reconfigured at frame {}",
            self.window.ingested()
        );
        self.config = config;
        Ok(())
    }

    /// Push a frame, or `None` to signal end of stream.
    ///
    /// Returns at most one output frame. After end of stream, keep calling
    /// with `None` until it returns `Ok(None)`, or use [`AfsFilter::flush`].
    pub fn process(&mut self, frame: Option<Frame>) -> Result<Option<Frame>> {
        match frame {
            Some(frame) => self.push_frame(frame),
            None => self.drain_step(),
        }
    }

    /// Drain all remaining frames and flush the output files.
    pub fn flush(&mut self) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        while let Some(frame) = self.drain_step()? {
            out.push(frame);
        }
        self.cadence.flush()?;
        if let Some(tc) = self.timecode.as_mut() {
            tc.flush()?;
        }
        debug!(
            frames_in = self.stats.frames_in,
            frames_out = self.stats.frames_out,
            frames_dropped = self.stats.frames_dropped,
            "afs: drained"
        );
        Ok(out)
    }

    fn check_frame(&self, frame: &Frame) -> Result<()> {
        let s = &self.stream;
        if frame.width() != s.width || frame.height() != s.height || frame.format() != s.format {
            return Err(AfsError::frame_mismatch(
                format!("{}x{} {}", s.width, s.height, s.format),
                format!("{}x{} {}", frame.width(), frame.height(), frame.format()),
            ));
        }
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame) -> Result<Option<Frame>> {
        if self.draining {
            return Err(AfsError::invalid_call("frame pushed after end of stream"));
        }
        self.check_frame(&frame)?;

        let iframe = self.window.push(frame);
        self.stats.frames_in += 1;

        let params = self.config.scan_params();
        let clip = self.config.clip;
        let source = ScanSource {
            window: &self.window,
            analyzer: &self.analyzer,
            queue: &self.scan_queue,
        };
        if iframe == 0 {
            self.scans
                .get_or_compute(-1, &params, &clip, source, &mut self.stripes)?;
        }
        self.scans
            .get_or_compute(iframe, &params, &clip, source, &mut self.stripes)?;
        if self.scan_queue.mode().extra_lookahead() > 0 && iframe > 0 {
            // Keep at most one scan in flight.
            self.scans.finish(iframe - 1)?;
        }

        if iframe >= STABILITY_WINDOW {
            self.classify(iframe - STABILITY_WINDOW)?;
        }

        let lookahead = STABILITY_WINDOW + PREREAD + self.scan_queue.mode().extra_lookahead();
        if iframe - self.next_emit >= lookahead {
            self.emit_step()
        } else {
            Ok(None)
        }
    }

    fn drain_step(&mut self) -> Result<Option<Frame>> {
        if !self.draining {
            debug!("afs: end of stream after {} frames", self.window.ingested());
            self.draining = true;
        }
        while self.next_emit < self.window.ingested() {
            if let Some(frame) = self.emit_step()? {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn classified(&self, iframe: i64) -> Result<CadenceStatus> {
        self.statuses
            .get(iframe)
            .ok_or_else(|| AfsError::internal(format!("frame {} was not classified", iframe)))
    }

    /// Classify `iframe` from frames `iframe - 1 ..= iframe + 5`.
    fn classify(&mut self, iframe: i64) -> Result<CadenceStatus> {
        if let Some(status) = self.statuses.get(iframe) {
            return Ok(status);
        }
        let params = self.config.scan_params();
        let clip = self.config.clip;
        let source = ScanSource {
            window: &self.window,
            analyzer: &self.analyzer,
            queue: &self.scan_queue,
        };
        for i in iframe - 1..=iframe + 5 {
            self.scans
                .get_or_compute(i, &params, &clip, source, &mut self.stripes)?;
        }
        let mut motion = [MotionCounts::default(); 7];
        for (k, m) in motion.iter_mut().enumerate() {
            *m = self.scans.motion(iframe - 1 + k as i64)?;
        }
        let coeff_shift = self.config.coeff_shift;
        let assume_shift: [bool; 4] = std::array::from_fn(|k| {
            detect_telecine_cross(&[motion[k], motion[k + 1], motion[k + 2], motion[k + 3]], coeff_shift)
        });

        for k in 0..4 {
            self.stripes.issue(
                iframe + k,
                &self.scans,
                &self.analyzer,
                &self.merge_queue,
                &params,
                &clip,
            )?;
        }
        let mut stripes = [StripeCounts::default(); 4];
        for (k, counts) in stripes.iter_mut().enumerate() {
            *counts = self.stripes.counts(iframe + k as i64)?;
        }

        let frame = self.window.get_clamped(iframe)?;
        let input = ClassifierInput {
            iframe,
            assume_shift,
            stripes,
            threshold: noise_threshold(
                self.stream.width,
                self.stream.height,
                &clip,
                self.config.method_switch,
            ),
            reverse: [false; 4],
            coeff_shift,
            interlaced: frame.is_interlaced(),
            repeat_field: frame.is_repeat_first_field(),
            drop: self.config.drop,
            smooth: self.config.smooth,
            force24: self.config.force24,
        };
        let (status, decision) = assemble_status(&input);
        let status = self.statuses.record(iframe, status);
        trace!(
            iframe,
            status = %status.summary(),
            below_noise = ?decision.below_noise,
            "classified"
        );
        Ok(status)
    }

    /// Feed the cadence state machine and emit frame `next_emit` unless it is dropped.
    fn emit_step(&mut self) -> Result<Option<Frame>> {
        let n = self.next_emit;
        for i in (n..=n + PREREAD).rev() {
            self.classify(i)?;
        }

        let nominal = self.stream.nominal_frame_duration();
        if n == 0 {
            for k in 0..PREREAD {
                let status = self.classified(k)?;
                let pts = self.window.timestamp(k, nominal)?;
                self.cadence.set_status(k, status, k > 0, pts)?;
            }
        }
        let ahead = n + PREREAD;
        let status = self.classified(ahead)?;
        let pts = self.window.timestamp(ahead, nominal)?;
        self.cadence.set_status(ahead, status, false, pts)?;

        self.next_emit += 1;
        match self.cadence.duration(n) {
            FrameDuration::NotReady => Err(AfsError::LookaheadUnderrun {
                iframe: n,
                required: n + 2,
            }),
            FrameDuration::Drop => {
                self.stats.frames_dropped += 1;
                trace!(iframe = n, "dropped");
                Ok(None)
            }
            FrameDuration::Ticks(ticks) => self.output(n, ticks).map(Some),
        }
    }

    fn output(&mut self, iframe: i64, ticks: i64) -> Result<Frame> {
        let duration = rescale(ticks, self.stream.time_base_in, self.stream.time_base_out);
        let pts = self.next_pts;
        self.next_pts += duration;
        if let Some(tc) = self.timecode.as_mut() {
            tc.write(pts)?;
        }

        self.stripes.ensure_merged(
            iframe,
            &self.scans,
            &self.analyzer,
            &self.merge_queue,
            &self.config.scan_params(),
            &self.config.clip,
        )?;
        let level = self.config.analysis_level();
        let stripe = self
            .stripes
            .ensure_filtered(iframe, level, self.analyzer.as_ref())?;

        let current = Arc::clone(self.window.get_clamped(iframe)?);
        let status = self.classified(iframe)?;
        let mut frame = if current.is_interlaced() || self.config.tune {
            let previous = self.window.get_clamped(iframe - 1)?;
            self.analyzer.synthesize(&SynthesisJob {
                iframe,
                current: &current,
                previous,
                stripe: &stripe,
                status,
                field_order: self.config.field_order,
                analysis_level: level,
                tune: self.config.tune,
            })?
        } else {
            current.as_ref().clone()
        };
        frame.flags = current.flags - FrameFlags::FIELD_STRUCTURE;
        frame.input_id = current.input_id;
        frame.pts = pts;
        frame.duration = duration;

        self.stats.frames_out += 1;
        trace!(iframe, pts, duration, status = %status.summary(), "emitted");
        Ok(frame)
    }
}

impl std::fmt::Debug for AfsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfsFilter")
            .field("analyzer", &self.analyzer.name())
            .field("stream", &self.stream)
            .field("next_emit", &self.next_emit)
            .field("draining", &self.draining)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn stream() -> StreamInfo {
        StreamInfo::new(16, 8, PixelFormat::Gray8, Rational::new(30, 1))
    }

    fn config() -> AfsConfig {
        AfsConfig {
            clip: crate::config::ClipRegion::none(),
            analyze: 0,
            shift: false,
            ..AfsConfig::default()
        }
    }

    fn frame(i: i64) -> Frame {
        let mut f = Frame::new(16, 8, PixelFormat::Gray8).with_pts(i);
        f.input_id = i as u64;
        f
    }

    #[test]
    fn test_holds_back_lookahead() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        for i in 0..8 {
            assert!(filter.process(Some(frame(i))).unwrap().is_none());
        }
        let out = filter.process(Some(frame(8))).unwrap().unwrap();
        assert_eq!(out.input_id, 0);
        assert_eq!(out.pts, 0);
        assert!(filter.status(3).is_some());
    }

    #[test]
    fn test_push_after_end_of_stream() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        filter.process(Some(frame(0))).unwrap();
        filter.flush().unwrap();
        let err = filter.process(Some(frame(1))).unwrap_err();
        assert!(matches!(err, AfsError::InvalidCall { .. }));
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        let wrong = Frame::new(32, 8, PixelFormat::Gray8);
        let err = filter.process(Some(wrong)).unwrap_err();
        assert!(matches!(err, AfsError::FrameMismatch { .. }));
        assert_eq!(filter.stats().frames_in, 0);
    }

    #[test]
    fn test_empty_stream_drains_nothing() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        assert!(filter.process(None).unwrap().is_none());
        assert!(filter.flush().unwrap().is_empty());
    }

    #[test]
    fn test_single_frame_stream() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        assert!(filter.process(Some(frame(0))).unwrap().is_none());
        let out = filter.flush().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, 0);
        assert_eq!(out[0].duration, stream().nominal_frame_duration());
    }

    #[test]
    fn test_stats_and_flags() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        let mut out = Vec::new();
        for i in 0..12 {
            let f = frame(i).with_flags(FrameFlags::TOP_FIELD_FIRST);
            out.extend(filter.process(Some(f)).unwrap());
        }
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|f| f.flags.is_empty()));
        assert_eq!(
            filter.stats(),
            AfsStats {
                frames_in: 12,
                frames_out: 12,
                frames_dropped: 0,
            }
        );
    }

    #[test]
    fn test_reconfigure_keeps_fixed_settings() {
        let mut filter = AfsFilter::with_cpu_analyzer(config(), stream()).unwrap();
        let changed = AfsConfig {
            thre_shift: 64,
            compute: crate::compute::ComputeMode::Overlapped,
            ..config()
        };
        filter.reconfigure(changed).unwrap();
        assert_eq!(filter.config().thre_shift, 64);
        assert_eq!(filter.config().compute, crate::compute::ComputeMode::Synchronous);

        let invalid = AfsConfig {
            analyze: 9,
            ..config()
        };
        assert!(filter.reconfigure(invalid).unwrap_err().is_config_error());
        assert_eq!(filter.config().thre_shift, 64);
    }

    #[test]
    fn test_force24_output_rate() {
        let config = AfsConfig {
            force24: true,
            ..config()
        };
        let filter = AfsFilter::with_cpu_analyzer(config, stream()).unwrap();
        assert_eq!(filter.output_frame_rate(), Rational::new(24, 1));
    }
}
