//! Filter configuration and stream description.

use crate::analyzer::{ScanMode, ScanParams};
use crate::compute::ComputeMode;
use crate::error::{AfsError, Result};
use crate::frame::PixelFormat;
use crate::timebase::{rescale, Rational};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Field order used to pair rows into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldOrder {
    /// Even rows are the temporally first field.
    #[default]
    TopFieldFirst,
    /// Odd rows are the temporally first field.
    BottomFieldFirst,
}

impl FieldOrder {
    /// Row parity (0 or 1) of the latter field.
    pub fn latter_parity(&self) -> usize {
        match self {
            FieldOrder::TopFieldFirst => 1,
            FieldOrder::BottomFieldFirst => 0,
        }
    }

    /// Whether `row` belongs to the latter field.
    pub fn is_latter(&self, row: usize) -> bool {
        row & 1 == self.latter_parity()
    }
}

/// Border excluded from analysis, in luma pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipRegion {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl ClipRegion {
    /// Analyze the whole picture.
    pub fn none() -> Self {
        Self {
            top: 0,
            bottom: 0,
            left: 0,
            right: 0,
        }
    }

    /// Rows `[start, end)` and columns `[start, end)` analyzed for a picture
    /// of `width`x`height`. The row range always covers whole field pairs.
    pub fn bounds(&self, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
        let (w, h) = (width as i64, height as i64);
        let (top, bottom) = (self.top as i64, self.bottom as i64);
        let (left, right) = (self.left as i64, self.right as i64);
        let y_end = h - bottom - ((h - top - bottom) & 1);
        let x_end = w - right;
        if y_end > top && x_end > left {
            Some((top as usize, y_end as usize, left as usize, x_end as usize))
        } else {
            None
        }
    }

    /// Number of pixels inside the analyzed area.
    pub fn area(&self, width: u32, height: u32) -> i64 {
        self.bounds(width, height)
            .map(|(y0, y1, x0, x1)| ((y1 - y0) * (x1 - x0)) as i64)
            .unwrap_or(0)
    }
}

impl Default for ClipRegion {
    fn default() -> Self {
        Self {
            top: 16,
            bottom: 16,
            left: 32,
            right: 32,
        }
    }
}

/// Timecode file output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimecodeMode {
    /// No timecode file.
    #[default]
    Off,
    /// `<stem>.timecode.txt`.
    Standard,
    /// `<stem>.timecode.afs.txt`.
    Afs,
}

impl TimecodeMode {
    /// Map the numeric level (0, 1, 2) to a mode.
    pub fn from_level(level: i32) -> Result<Self> {
        match level {
            0 => Ok(TimecodeMode::Off),
            1 => Ok(TimecodeMode::Standard),
            2 => Ok(TimecodeMode::Afs),
            other => Err(AfsError::invalid_parameter(
                "timecode",
                format!("must be 0, 1 or 2, got {}", other),
            )),
        }
    }

    fn suffix(&self) -> Option<&'static str> {
        match self {
            TimecodeMode::Off => None,
            TimecodeMode::Standard => Some(".timecode.txt"),
            TimecodeMode::Afs => Some(".timecode.afs.txt"),
        }
    }
}

/// Stream geometry and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Nominal input frame rate.
    pub frame_rate: Rational,
    /// Time base of input timestamps.
    pub time_base_in: Rational,
    /// Time base of output timestamps and durations.
    pub time_base_out: Rational,
}

impl StreamInfo {
    /// Describe a stream using the quarter-frame time base for input and output.
    pub fn new(width: u32, height: u32, format: PixelFormat, frame_rate: Rational) -> Self {
        let tb = Rational::quarter_frame(frame_rate);
        Self {
            width,
            height,
            format,
            frame_rate,
            time_base_in: tb,
            time_base_out: tb,
        }
    }

    /// Override the input and output time bases.
    pub fn with_time_bases(mut self, time_base_in: Rational, time_base_out: Rational) -> Self {
        self.time_base_in = time_base_in;
        self.time_base_out = time_base_out;
        self
    }

    /// Check geometry, format and timing.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AfsError::invalid_dimensions(
                self.width,
                self.height,
                "width and height must be positive",
            ));
        }
        let align = self.format.height_alignment();
        if self.height % align != 0 {
            return Err(AfsError::invalid_dimensions(
                self.width,
                self.height,
                format!("height must be a multiple of {} for {}", align, self.format),
            ));
        }
        if self.format.has_alpha() {
            return Err(AfsError::unsupported_format(format!(
                "{} (alpha channel is not supported)",
                self.format
            )));
        }
        for (name, r) in [
            ("frame_rate", self.frame_rate),
            ("time_base_in", self.time_base_in),
            ("time_base_out", self.time_base_out),
        ] {
            if !r.is_positive() {
                return Err(AfsError::invalid_parameter(
                    name,
                    format!("must be positive, got {}/{}", r.num, r.den),
                ));
            }
        }
        Ok(())
    }

    /// Duration of one nominal frame in the input time base.
    pub fn nominal_frame_duration(&self) -> i64 {
        let frame_period = Rational {
            num: self.frame_rate.den,
            den: self.frame_rate.num,
        };
        rescale(1, frame_period, self.time_base_in).max(1)
    }
}

/// AFS filter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfsConfig {
    /// Border excluded from analysis.
    pub clip: ClipRegion,
    /// Stripe-count noise threshold scale (0..=256, 1/4096 of the area).
    pub method_switch: i32,
    /// Shift decision ratio against 256 (0..=256).
    pub coeff_shift: i32,
    /// Combing threshold for shift detection (0..=1024).
    pub thre_shift: i32,
    /// Combing threshold for deinterlacing (0..=1024).
    pub thre_deint: i32,
    /// Luma motion threshold (0..=1024).
    pub thre_ymotion: i32,
    /// Chroma motion threshold (0..=1024).
    pub thre_cmotion: i32,
    /// Analysis level (0..=5). Level 0 only detects field shifts.
    pub analyze: i32,
    /// Enable field shifting.
    pub shift: bool,
    /// Drop duplicated frames.
    pub drop: bool,
    /// Smooth timestamps around drops.
    pub smooth: bool,
    /// Force 24 fps output phase.
    pub force24: bool,
    /// Output the analysis map instead of the picture.
    pub tune: bool,
    /// Field order of the source.
    pub field_order: FieldOrder,
    /// Timecode file output.
    pub timecode: TimecodeMode,
    /// Write the per-frame diagnostic log.
    pub log: bool,
    /// Output path from which the log and timecode file names are derived.
    pub output_path: Option<PathBuf>,
    /// Synchronous or overlapped analysis.
    pub compute: ComputeMode,
}

impl Default for AfsConfig {
    fn default() -> Self {
        Self {
            clip: ClipRegion::default(),
            method_switch: 0,
            coeff_shift: 192,
            thre_shift: 128,
            thre_deint: 48,
            thre_ymotion: 112,
            thre_cmotion: 224,
            analyze: 3,
            shift: true,
            drop: false,
            smooth: false,
            force24: false,
            tune: false,
            field_order: FieldOrder::TopFieldFirst,
            timecode: TimecodeMode::Off,
            log: false,
            output_path: None,
            compute: ComputeMode::Synchronous,
        }
    }
}

fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(AfsError::invalid_parameter(
            name,
            format!("must be within {}..={}, got {}", min, max, value),
        ));
    }
    Ok(())
}

fn round_to_4(name: &'static str, value: i32) -> i32 {
    if value % 4 == 0 {
        return value;
    }
    let rounded = (value + 2) & !3;
    warn!("{} should be a multiple of 4, rounded {} -> {}", name, value, rounded);
    rounded
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.with_extension("").into_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

impl AfsConfig {
    /// Validate against `stream` and return the normalized configuration.
    ///
    /// Clip left/right are rounded to a multiple of 4 and drop/smooth are
    /// turned off when shifting is disabled; both emit a warning.
    pub fn validate(mut self, stream: &StreamInfo) -> Result<Self> {
        stream.validate()?;
        let (w, h) = (stream.width as i32, stream.height as i32);

        check_range("clip.top", self.clip.top, 0, h - 1)?;
        check_range("clip.bottom", self.clip.bottom, 0, h - 1)?;
        if self.clip.top + self.clip.bottom >= h {
            return Err(AfsError::invalid_parameter(
                "clip",
                format!(
                    "top + bottom ({}) must be smaller than height {}",
                    self.clip.top + self.clip.bottom,
                    h
                ),
            ));
        }
        check_range("clip.left", self.clip.left, 0, w - 1)?;
        self.clip.left = round_to_4("clip.left", self.clip.left);
        check_range("clip.right", self.clip.right, 0, w - 1)?;
        self.clip.right = round_to_4("clip.right", self.clip.right);
        if self.clip.left + self.clip.right >= w {
            return Err(AfsError::invalid_parameter(
                "clip",
                format!(
                    "left + right ({}) must be smaller than width {}",
                    self.clip.left + self.clip.right,
                    w
                ),
            ));
        }

        check_range("method_switch", self.method_switch, 0, 256)?;
        check_range("coeff_shift", self.coeff_shift, 0, 256)?;
        check_range("thre_shift", self.thre_shift, 0, 1024)?;
        check_range("thre_deint", self.thre_deint, 0, 1024)?;
        check_range("thre_ymotion", self.thre_ymotion, 0, 1024)?;
        check_range("thre_cmotion", self.thre_cmotion, 0, 1024)?;
        check_range("analyze", self.analyze, 0, 5)?;

        if !self.shift && (self.drop || self.smooth) {
            warn!("shift is off, so drop and smooth are also turned off");
            self.drop = false;
            self.smooth = false;
        }

        if (self.log || self.timecode != TimecodeMode::Off) && self.output_path.is_none() {
            return Err(AfsError::invalid_parameter(
                "output_path",
                "required when log or timecode output is enabled",
            ));
        }
        Ok(self)
    }

    /// Analysis level as an unsigned value.
    pub fn analysis_level(&self) -> u8 {
        self.analyze.clamp(0, 5) as u8
    }

    /// Parameters under which scan records are computed.
    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            mode: if self.analyze == 0 {
                ScanMode::ShiftOnly
            } else {
                ScanMode::Full
            },
            field_order: self.field_order,
            thre_shift: self.thre_shift,
            thre_deint: self.thre_deint,
            thre_ymotion: self.thre_ymotion,
            thre_cmotion: self.thre_cmotion,
        }
    }

    /// Nominal output frame rate for an input of `frame_rate`.
    pub fn output_frame_rate(&self, frame_rate: Rational) -> Rational {
        if self.force24 {
            frame_rate.mul(Rational::new(4, 5))
        } else {
            frame_rate
        }
    }

    /// Path of the timecode file, if enabled.
    pub fn timecode_path(&self) -> Option<PathBuf> {
        let suffix = self.timecode.suffix()?;
        self.output_path.as_deref().map(|p| with_suffix(p, suffix))
    }

    /// Path of the diagnostic log, if enabled.
    pub fn log_path(&self) -> Option<PathBuf> {
        if !self.log {
            return None;
        }
        self.output_path
            .as_deref()
            .map(|p| with_suffix(p, ".afslog.csv"))
    }
}
