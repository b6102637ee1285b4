//! Scalar reference implementation of [`FieldAnalyzer`].
//!
//! Thresholds are on a 10-bit scale; 8-bit sample differences are multiplied
//! by 4 before comparison. Rows are processed in parallel with rayon.

use crate::analyzer::{
    FieldAnalyzer, FieldMap, MergeOutput, MotionCounts, ScanMode, ScanOutput, ScanParams,
    StripeCounts, SynthesisJob,
};
use crate::config::{ClipRegion, FieldOrder};
use crate::error::{AfsError, Result};
use crate::frame::Frame;
use crate::status::CadenceStatus;
use rayon::prelude::*;
use std::sync::Arc;

/// Scan map: pixel differs from the previous frame.
pub const MOTION: u8 = 0x01;
/// Scan map: frame combs at this pixel as-is.
pub const COMB_UNSHIFTED: u8 = 0x02;
/// Scan map: frame combs when its latter field is taken from the predecessor.
pub const COMB_SHIFTED: u8 = 0x04;
/// Scan map: combing above the deinterlace threshold.
pub const COMB_DEINT: u8 = 0x08;
/// Stripe map: moving stripe, as-is.
pub const STRIPE_UNSHIFTED: u8 = 0x10;
/// Stripe map: moving stripe, shifted.
pub const STRIPE_SHIFTED: u8 = 0x20;
/// Stripe map: pixel needs interpolation.
pub const DEINT: u8 = 0x40;

/// CPU field analyzer.
#[derive(Debug, Clone, Default)]
pub struct CpuFieldAnalyzer;

impl CpuFieldAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self
    }
}

/// Whether `b` sticks out of both vertical neighbours by more than `thre`.
fn combs(a: u8, b: u8, c: u8, thre: i32) -> bool {
    let d1 = b as i32 - a as i32;
    let d2 = b as i32 - c as i32;
    ((d1 > 0 && d2 > 0) || (d1 < 0 && d2 < 0)) && d1.abs().min(d2.abs()) * 4 > thre
}

fn exceeds(a: u8, b: u8, thre: i32) -> bool {
    (a as i32 - b as i32).abs() * 4 > thre
}

fn luma(frame: &Frame) -> Result<&[u8]> {
    frame
        .plane(0)
        .ok_or_else(|| AfsError::compute("frame has no luma plane"))
}

fn count_in_clip(
    map: &FieldMap,
    clip: &ClipRegion,
    field_order: FieldOrder,
    mut count: impl FnMut(u8, bool),
) {
    if let Some((y0, y1, x0, x1)) = clip.bounds(map.width, map.height) {
        for y in y0..y1 {
            let latter = field_order.is_latter(y);
            for &v in &map.row(y)[x0..x1] {
                count(v, latter);
            }
        }
    }
}

impl FieldAnalyzer for CpuFieldAnalyzer {
    fn scan(
        &self,
        _iframe: i64,
        previous: &Frame,
        current: &Frame,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<ScanOutput> {
        if !previous.same_layout(current) {
            return Err(AfsError::frame_mismatch(
                format!("{:?}", previous),
                format!("{:?}", current),
            ));
        }
        let (w, h) = (current.width() as usize, current.height() as usize);
        let cur = luma(current)?;
        let prev = luma(previous)?;
        let (sx, sy) = current.format().chroma_shift();
        let chroma: Vec<(&[u8], &[u8], usize)> = (1..current.num_planes().min(3))
            .filter_map(|p| Some((current.plane(p)?, previous.plane(p)?, current.stride(p))))
            .collect();
        let order = params.field_order;
        let full = params.mode == ScanMode::Full;

        let mut map = FieldMap::new(current.width(), current.height());
        map.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            let interior = y > 0 && y + 1 < h;
            let shifted_row = |r: usize| {
                if order.is_latter(r) {
                    &prev[r * w..(r + 1) * w]
                } else {
                    &cur[r * w..(r + 1) * w]
                }
            };
            for (x, flags) in row.iter_mut().enumerate() {
                let i = y * w + x;
                let mut v = 0;
                let mut moving = exceeds(cur[i], prev[i], params.thre_ymotion);
                if !moving {
                    moving = chroma.iter().any(|(c, p, stride)| {
                        let j = (y >> sy) * stride + (x >> sx);
                        exceeds(c[j], p[j], params.thre_cmotion)
                    });
                }
                if moving {
                    v |= MOTION;
                }
                if interior {
                    let (a, b, c) = (cur[i - w], cur[i], cur[i + w]);
                    if combs(a, b, c, params.thre_shift) {
                        v |= COMB_UNSHIFTED;
                    }
                    if full && combs(a, b, c, params.thre_deint) {
                        v |= COMB_DEINT;
                    }
                    let (a, b, c) = (shifted_row(y - 1)[x], shifted_row(y)[x], shifted_row(y + 1)[x]);
                    if combs(a, b, c, params.thre_shift) {
                        v |= COMB_SHIFTED;
                    }
                }
                *flags = v;
            }
        });

        let mut motion = MotionCounts::default();
        count_in_clip(&map, clip, order, |v, latter| {
            if v & MOTION != 0 {
                if latter {
                    motion.latter += 1;
                } else {
                    motion.first += 1;
                }
            }
        });
        Ok(ScanOutput {
            map: Arc::new(map),
            motion,
        })
    }

    fn merge(
        &self,
        _iframe: i64,
        scan: &FieldMap,
        next_scan: &FieldMap,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<MergeOutput> {
        if scan.width != next_scan.width || scan.height != next_scan.height {
            return Err(AfsError::frame_mismatch(
                format!("{}x{}", scan.width, scan.height),
                format!("{}x{}", next_scan.width, next_scan.height),
            ));
        }
        let data = scan
            .data
            .par_iter()
            .zip(next_scan.data.par_iter())
            .map(|(&a, &b)| {
                if (a | b) & MOTION == 0 {
                    return 0;
                }
                let mut v = 0;
                if a & COMB_UNSHIFTED != 0 {
                    v |= STRIPE_UNSHIFTED;
                }
                if a & COMB_SHIFTED != 0 {
                    v |= STRIPE_SHIFTED;
                }
                if a & COMB_DEINT != 0 {
                    v |= DEINT;
                }
                v
            })
            .collect();
        let map = FieldMap {
            width: scan.width,
            height: scan.height,
            data,
        };

        let mut stripes = StripeCounts::default();
        count_in_clip(&map, clip, params.field_order, |v, _| {
            if v & STRIPE_UNSHIFTED != 0 {
                stripes.unshifted += 1;
            }
            if v & STRIPE_SHIFTED != 0 {
                stripes.shifted += 1;
            }
        });
        Ok(MergeOutput {
            map: Arc::new(map),
            stripes,
        })
    }

    fn filter(&self, stripe: &FieldMap, analysis_level: u8) -> Result<FieldMap> {
        let (w, h) = (stripe.width as usize, stripe.height as usize);
        let marked = |x: usize, y: usize| stripe.data[y * w + x] & DEINT != 0;
        let mut out = stripe.clone();
        out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                if *v & DEINT == 0 {
                    continue;
                }
                let horizontal = (x > 0 && marked(x - 1, y)) || (x + 1 < w && marked(x + 1, y));
                // Same-field neighbours are two rows apart.
                let vertical = analysis_level < 4
                    || (y >= 2 && marked(x, y - 2))
                    || (y + 2 < h && marked(x, y + 2));
                if !(horizontal && vertical) {
                    *v &= !DEINT;
                }
            }
        });
        Ok(out)
    }

    fn synthesize(&self, job: &SynthesisJob<'_>) -> Result<Frame> {
        let cur = job.current;
        let mut out = cur.clone();
        if job.tune {
            paint_analysis(&mut out, job.stripe);
            return Ok(out);
        }

        let shifted = !job.status.is_progressive() && job.status.contains(CadenceStatus::SHIFT0);
        if shifted {
            for p in 0..out.num_planes() {
                let stride = out.stride(p);
                let rows = out.plane_height(p);
                let Some(src) = job.previous.plane(p) else {
                    continue;
                };
                let Some(dst) = out.plane_mut(p) else {
                    continue;
                };
                for y in (0..rows).filter(|&y| job.field_order.is_latter(y)) {
                    let r = y * stride..(y + 1) * stride;
                    dst[r.clone()].copy_from_slice(&src[r]);
                }
            }
        }

        if job.analysis_level >= 1 {
            let (w, h) = (out.width() as usize, out.height() as usize);
            if let Some(y_plane) = out.plane_mut(0) {
                for y in (1..h.saturating_sub(1)).filter(|&y| job.field_order.is_latter(y)) {
                    for x in 0..w {
                        if job.stripe.get(x, y) & DEINT != 0 {
                            let above = y_plane[(y - 1) * w + x] as u16;
                            let below = y_plane[(y + 1) * w + x] as u16;
                            y_plane[y * w + x] = ((above + below + 1) / 2) as u8;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "cpu"
    }
}

/// Render the stripe map: interpolated pixels white, stripes grey.
fn paint_analysis(out: &mut Frame, stripe: &FieldMap) {
    if let Some(y_plane) = out.plane_mut(0) {
        for (dst, &v) in y_plane.iter_mut().zip(&stripe.data) {
            *dst = if v & DEINT != 0 {
                235
            } else if v & (STRIPE_UNSHIFTED | STRIPE_SHIFTED) != 0 {
                128
            } else {
                16
            };
        }
    }
    for p in 1..out.num_planes().min(3) {
        if let Some(c) = out.plane_mut(p) {
            c.fill(128);
        }
    }
}
