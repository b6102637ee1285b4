//! # transcode-afs
//!
//! Automatic field shift (AFS) cadence recovery for the transcode library.
//!
//! Given video that mixes progressive, interlaced and telecined content,
//! the filter detects the repeating field pattern, decides per frame
//! whether to keep it, re-pair its fields with the previous frame, or drop
//! it, and emits a progressive stream with consistent timestamps.
//!
//! ## Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | Frame window | [`window`] | ring of recent source frames |
//! | Scan cache | [`scan`] | field motion between consecutive frames |
//! | Stripe cache | [`stripe`] | merged combing counts per frame |
//! | Classifier | [`classify`] | per-frame [`CadenceStatus`] |
//! | State machine | [`cadence`] | keep/drop and output positions |
//! | Orchestrator | [`filter`] | lookahead, emission and draining |
//!
//! Pixel work goes through the [`FieldAnalyzer`] trait. [`CpuFieldAnalyzer`]
//! is the bundled reference backend.
//!
//! ## Quick Start
//!
//! ```no_run
//! use transcode_afs::{AfsConfig, AfsFilter, Frame, PixelFormat, Rational, StreamInfo};
//!
//! let stream = StreamInfo::new(720, 480, PixelFormat::Yuv420p, Rational::new(30000, 1001));
//! let config = AfsConfig {
//!     drop: true,
//!     smooth: true,
//!     ..AfsConfig::default()
//! };
//! let mut afs = AfsFilter::with_cpu_analyzer(config, stream)?;
//!
//! // let output = afs.process(Some(decoded_frame))?;
//! // ...
//! // let remaining = afs.flush()?;
//! # Ok::<(), transcode_afs::AfsError>(())
//! ```
//!
//! ## Timing
//!
//! Timestamps are expected in quarter-frame units by default
//! (`1 / (4 * fps)`), so a field shift moves a frame by 2 ticks.
//! [`StreamInfo::with_time_bases`] sets other input and output time bases.
//!
//! ## Compute Modes
//!
//! - [`ComputeMode::Synchronous`]: analysis runs inline.
//! - [`ComputeMode::Overlapped`]: scans and merges run on two worker
//!   queues, one frame ahead of classification.

#![allow(clippy::too_many_arguments)]

pub mod analyzer;
pub mod cadence;
pub mod classify;
pub mod compute;
pub mod config;
pub mod cpu;
pub mod diag;
pub mod error;
pub mod filter;
pub mod frame;
pub mod scan;
pub mod status;
pub mod stripe;
pub mod timebase;
pub mod timecode;
pub mod window;

// Re-export main types
pub use analyzer::{
    FieldAnalyzer, FieldMap, MergeOutput, MotionCounts, ScanMode, ScanOutput, ScanParams,
    StripeCounts, SynthesisJob,
};
pub use cadence::{CadenceStateMachine, FrameDuration, Position, StreamState};
pub use compute::ComputeMode;
pub use config::{AfsConfig, ClipRegion, FieldOrder, StreamInfo, TimecodeMode};
pub use cpu::CpuFieldAnalyzer;
pub use error::{AfsError, Result};
pub use filter::{AfsFilter, AfsStats};
pub use frame::{Frame, FrameFlags, PixelFormat};
pub use status::CadenceStatus;
pub use timebase::Rational;
