//! Per-frame cadence classification.
//!
//! A frame's status combines four shift decisions (the frame and its next
//! three successors). Each decision normally comes from the stripe counts:
//! shift when the as-is picture combs more than the shifted one. When both
//! stripe counts fall below the noise threshold, the motion-based
//! telecine-cross test decides instead.

use crate::analyzer::{MotionCounts, StripeCounts};
use crate::config::ClipRegion;
use crate::status::CadenceStatus;

/// Whether the motion pattern around a frame looks like a field repeat.
///
/// `m` holds the scan motion of frames `i-1`, `i`, `i+1`, `i+2`.
pub fn detect_telecine_cross(m: &[MotionCounts; 4], coeff_shift: i32) -> bool {
    let ff = |k: usize| m[k].first as i64;
    let lf = |k: usize| m[k].latter as i64;
    let coeff = coeff_shift as i64;
    let absdiff = |a: i64, b: i64| (a - b).abs();

    // Frame indices below are 0-based into `m`: sp1 = 0, ..., sp4 = 3.
    let cross = absdiff(lf(0) + lf(1), ff(1)).max(absdiff(ff(2) + ff(3), lf(2))) * coeff;
    let peak = lf(1).max(ff(2)) * coeff;

    let first = cross
        > absdiff(ff(0) + ff(1), lf(0))
            .max(absdiff(ff(1) + ff(2), lf(1)))
            .max(absdiff(lf(2) + lf(3), ff(3)))
            * 256
        && peak > ff(1) * 256;

    let second = cross
        > absdiff(ff(0) + ff(1), lf(0))
            .max(absdiff(lf(1) + lf(2), ff(2)))
            .max(absdiff(lf(2) + lf(3), ff(3)))
            * 256
        && peak > lf(2) * 256;

    first || second
}

/// Stripe-count threshold below which a frame is considered noise only.
pub fn noise_threshold(width: u32, height: u32, clip: &ClipRegion, method_switch: i32) -> i64 {
    (clip.area(width, height) * method_switch as i64) >> 12
}

/// Whether the stripe counts favour the shifted pairing.
pub fn stripe_shift(counts: StripeCounts, coeff_shift: i32) -> bool {
    counts.unshifted as i64 * coeff_shift as i64 > counts.shifted as i64 * 256
}

/// Everything the status of one frame is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierInput {
    pub iframe: i64,
    /// Telecine-cross result for offsets 0..=3.
    pub assume_shift: [bool; 4],
    /// Stripe counts for offsets 0..=3.
    pub stripes: [StripeCounts; 4],
    /// Noise threshold from [`noise_threshold`].
    pub threshold: i64,
    /// Per-offset inversion hints.
    pub reverse: [bool; 4],
    pub coeff_shift: i32,
    /// Source frame is interlaced.
    pub interlaced: bool,
    /// Source frame repeats a field.
    pub repeat_field: bool,
    pub drop: bool,
    pub smooth: bool,
    pub force24: bool,
}

/// Per-offset decision details, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub below_noise: [bool; 4],
    pub shift: [bool; 4],
}

/// Assemble the status of one frame.
pub fn assemble_status(input: &ClassifierInput) -> (CadenceStatus, Decision) {
    let mut status = CadenceStatus::empty();
    let mut decision = Decision::default();
    for k in 0..4 {
        let counts = input.stripes[k];
        let below = input.threshold > counts.shifted as i64
            && input.threshold > counts.unshifted as i64;
        let measured = if below {
            input.assume_shift[k]
        } else {
            stripe_shift(counts, input.coeff_shift)
        };
        let shift = measured ^ input.reverse[k];
        decision.below_noise[k] = below;
        decision.shift[k] = shift;
        if shift {
            status |= CadenceStatus::shift(k);
        }
    }
    if !input.interlaced {
        status |= CadenceStatus::PROGRESSIVE;
        if input.repeat_field {
            status |= CadenceStatus::RFF;
        }
    }
    if input.drop {
        if input.interlaced {
            status |= CadenceStatus::FRAME_DROP;
        }
        if input.smooth {
            status |= CadenceStatus::SMOOTHING;
        }
    }
    if input.force24 {
        status |= CadenceStatus::FORCE24;
    }
    if input.iframe < 1 {
        status.remove(CadenceStatus::SHIFT0);
    }
    (status, decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(first: u32, latter: u32) -> MotionCounts {
        MotionCounts { first, latter }
    }

    fn input() -> ClassifierInput {
        ClassifierInput {
            iframe: 10,
            assume_shift: [false; 4],
            stripes: [StripeCounts::default(); 4],
            threshold: 0,
            reverse: [false; 4],
            coeff_shift: 192,
            interlaced: true,
            repeat_field: false,
            drop: false,
            smooth: false,
            force24: false,
        }
    }

    #[test]
    fn test_telecine_cross_on_repeated_field() {
        // Frame i repeats its first field: no first-field motion.
        let m = [motion(1000, 1000), motion(0, 1000), motion(1000, 1000), motion(1000, 1000)];
        assert!(detect_telecine_cross(&m, 192));
    }

    #[test]
    fn test_telecine_cross_steady_motion() {
        let m = [motion(1000, 1000); 4];
        assert!(!detect_telecine_cross(&m, 192));
        assert!(!detect_telecine_cross(&[MotionCounts::default(); 4], 192));
    }

    #[test]
    fn test_noise_threshold() {
        let clip = ClipRegion::none();
        // 64 * 32 * 256 / 4096
        assert_eq!(noise_threshold(64, 32, &clip, 256), 128);
        assert_eq!(noise_threshold(64, 32, &clip, 0), 0);
    }

    #[test]
    fn test_stripe_decides_above_noise() {
        let mut i = input();
        i.stripes[0] = StripeCounts {
            unshifted: 1000,
            shifted: 10,
        };
        i.stripes[2] = StripeCounts {
            unshifted: 10,
            shifted: 1000,
        };
        let (status, decision) = assemble_status(&i);
        assert_eq!(status, CadenceStatus::SHIFT0);
        assert_eq!(decision.below_noise, [false; 4]);
    }

    #[test]
    fn test_motion_decides_below_noise() {
        let mut i = input();
        i.threshold = 100;
        i.assume_shift = [false, true, false, true];
        i.stripes[2] = StripeCounts {
            unshifted: 500,
            shifted: 0,
        };
        let (status, decision) = assemble_status(&i);
        assert_eq!(
            status,
            CadenceStatus::SHIFT1 | CadenceStatus::SHIFT2 | CadenceStatus::SHIFT3
        );
        assert_eq!(decision.below_noise, [true, true, false, true]);
    }

    #[test]
    fn test_reverse_hint_inverts() {
        let mut i = input();
        i.reverse = [false, false, true, false];
        let (status, _) = assemble_status(&i);
        assert_eq!(status, CadenceStatus::SHIFT2);
    }

    #[test]
    fn test_stream_flags() {
        let mut i = input();
        i.interlaced = false;
        i.repeat_field = true;
        i.drop = true;
        i.smooth = true;
        i.force24 = true;
        let (status, _) = assemble_status(&i);
        assert_eq!(
            status,
            CadenceStatus::PROGRESSIVE
                | CadenceStatus::RFF
                | CadenceStatus::SMOOTHING
                | CadenceStatus::FORCE24
        );

        let mut i = input();
        i.drop = true;
        let (status, _) = assemble_status(&i);
        assert_eq!(status, CadenceStatus::FRAME_DROP);
    }

    #[test]
    fn test_first_frame_never_shifts() {
        let mut i = input();
        i.iframe = 0;
        i.stripes = [StripeCounts {
            unshifted: 1000,
            shifted: 0,
        }; 4];
        let (status, decision) = assemble_status(&i);
        assert_eq!(status, CadenceStatus::SHIFT_MASK - CadenceStatus::SHIFT0);
        assert!(decision.shift[0]);
    }
}
