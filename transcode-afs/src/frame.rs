//! Planar video frames as seen by the cadence engine.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Planar 8-bit pixel formats accepted by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0.
    Yuv420p,
    /// Planar YUV 4:2:2.
    Yuv422p,
    /// Planar YUV 4:4:4.
    Yuv444p,
    /// Luma only.
    Gray8,
    /// Planar YUV 4:2:0 with an alpha plane.
    Yuva420p,
}

impl PixelFormat {
    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => 3,
            PixelFormat::Yuva420p => 4,
        }
    }

    /// Horizontal and vertical chroma subsampling shifts.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuva420p => (1, 1),
            PixelFormat::Yuv422p => (1, 0),
            PixelFormat::Yuv444p | PixelFormat::Gray8 => (0, 0),
        }
    }

    /// Whether the format carries an alpha plane.
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::Yuva420p)
    }

    /// Required alignment of the frame height so that both fields have whole
    /// chroma rows.
    pub fn height_alignment(&self) -> u32 {
        match self.chroma_shift() {
            (_, 1) => 4,
            _ => 2,
        }
    }

    /// Dimensions of `plane` for a frame of `width`x`height`.
    pub fn plane_size(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        let is_chroma = plane == 1 || plane == 2;
        if is_chroma {
            let (sx, sy) = self.chroma_shift();
            ((width + (1 << sx) - 1) >> sx, (height + (1 << sy) - 1) >> sy)
        } else {
            (width, height)
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Yuva420p => "yuva420p",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Picture structure flags carried by a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// The frame holds two fields captured at different instants.
        const INTERLACED = 0x0001;
        /// Top field is temporally first.
        const TOP_FIELD_FIRST = 0x0002;
        /// Decoder was told to repeat the first field (soft pulldown).
        const REPEAT_FIRST_FIELD = 0x0004;
        /// Copy of a frame emitted for a repeated field.
        const REPEAT_COPY = 0x0008;
    }
}

impl FrameFlags {
    /// Flags that describe field structure and are cleared on progressive output.
    pub const FIELD_STRUCTURE: FrameFlags = FrameFlags::INTERLACED
        .union(FrameFlags::TOP_FIELD_FIRST)
        .union(FrameFlags::REPEAT_FIRST_FIELD)
        .union(FrameFlags::REPEAT_COPY);
}

/// A planar frame with its timing metadata.
///
/// Plane rows are tightly packed: the stride of each plane equals its width.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Vec<u8>>,
    /// Presentation timestamp in the stream's input time base.
    pub pts: i64,
    /// Duration in the owning time base (0 when unknown).
    pub duration: i64,
    /// Picture structure flags.
    pub flags: FrameFlags,
    /// Identifier of the source frame, preserved on output.
    pub input_id: u64,
}

impl Frame {
    /// Create a black frame.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = (0..format.num_planes())
            .map(|p| {
                let (w, h) = format.plane_size(p, width, height);
                let fill = if p == 1 || p == 2 { 128 } else { 16 };
                vec![fill; (w * h) as usize]
            })
            .collect();
        Self {
            width,
            height,
            format,
            planes,
            pts: 0,
            duration: 0,
            flags: FrameFlags::empty(),
            input_id: 0,
        }
    }

    /// Frame width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Plane data.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.as_slice())
    }

    /// Mutable plane data.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(index).map(|p| p.as_mut_slice())
    }

    /// Bytes per row of `plane`.
    pub fn stride(&self, plane: usize) -> usize {
        self.format.plane_size(plane, self.width, self.height).0 as usize
    }

    /// Rows of `plane`.
    pub fn plane_height(&self, plane: usize) -> usize {
        self.format.plane_size(plane, self.width, self.height).1 as usize
    }

    /// Whether the source marks this frame as interlaced.
    pub fn is_interlaced(&self) -> bool {
        self.flags.contains(FrameFlags::INTERLACED)
    }

    /// Whether the source asks for the first field to be repeated.
    pub fn is_repeat_first_field(&self) -> bool {
        self.flags.contains(FrameFlags::REPEAT_FIRST_FIELD)
    }

    /// Whether `other` has the same geometry and format.
    pub fn same_layout(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Builder-style setter for the timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Builder-style setter for the flags.
    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pts", &self.pts)
            .field("duration", &self.duration)
            .field("flags", &self.flags)
            .field("input_id", &self.input_id)
            .finish()
    }
}
