//! Property-based tests for the cadence state machine and configuration.

use proptest::prelude::*;
use transcode_afs::{
    AfsConfig, AfsError, CadenceStateMachine, CadenceStatus, FrameDuration, PixelFormat,
    Position, Rational, StreamInfo,
};

fn statuses(max_len: usize) -> impl Strategy<Value = Vec<CadenceStatus>> {
    prop::collection::vec(
        (0u16..0x200).prop_map(CadenceStatus::from_bits_truncate),
        1..max_len,
    )
}

fn feed(sm: &mut CadenceStateMachine, statuses: &[CadenceStatus]) {
    for (i, &status) in statuses.iter().enumerate() {
        let i = i as i64;
        sm.set_status(i, status, i > 0 && i < 3, i * 4).unwrap();
    }
}

proptest! {
    /// Updates that skip a frame are rejected and leave the machine unchanged.
    #[test]
    fn rejects_skipped_frames(seq in statuses(40), gap in 2i64..10) {
        let mut sm = CadenceStateMachine::new();
        feed(&mut sm, &seq);
        let last = seq.len() as i64 - 1;
        let state = sm.state();

        let err = sm.set_status(last + gap, CadenceStatus::empty(), false, 0).unwrap_err();
        prop_assert_eq!(err, AfsError::OutOfOrder { iframe: last + gap, last });
        prop_assert_eq!(sm.last_frame(), Some(last));
        prop_assert_eq!(sm.state(), state);

        prop_assert!(sm.set_status(last + 1, CadenceStatus::empty(), false, 0).is_ok());
    }

    /// A duration is available exactly when two successors were recorded.
    #[test]
    fn duration_needs_two_successors(seq in statuses(40)) {
        let mut sm = CadenceStateMachine::new();
        feed(&mut sm, &seq);
        let last = seq.len() as i64 - 1;
        for i in 0..=last {
            let not_ready = sm.duration(i) == FrameDuration::NotReady;
            prop_assert_eq!(not_ready, i + 2 > last, "frame {}", i);
        }
    }

    /// Kept frames move strictly forward, whatever the status sequence.
    #[test]
    fn kept_positions_increase(seq in statuses(60)) {
        let mut sm = CadenceStateMachine::new();
        let mut last_kept: Option<i64> = None;
        for (i, &status) in seq.iter().enumerate() {
            let i = i as i64;
            sm.set_status(i, status, i > 0 && i < 3, i * 4).unwrap();
            match sm.position(i) {
                Some(Position::At(pos)) => {
                    if let Some(prev) = last_kept {
                        prop_assert!(pos > prev, "frame {}: {} after {}", i, pos, prev);
                    }
                    last_kept = Some(pos);
                }
                Some(Position::Drop) => {}
                None => prop_assert!(false, "frame {} missing", i),
            }
        }
    }

    /// Every final duration is positive.
    #[test]
    fn durations_positive(seq in statuses(60)) {
        let mut sm = CadenceStateMachine::new();
        feed(&mut sm, &seq);
        let last = seq.len() as i64 - 1;
        for i in (last - 12).max(0)..=last - 2 {
            match sm.duration(i) {
                FrameDuration::Ticks(t) => prop_assert!(t > 0),
                FrameDuration::Drop => {}
                FrameDuration::NotReady => prop_assert!(false, "frame {} not ready", i),
            }
        }
    }

    /// Clip left/right are rounded to the nearest multiple of 4.
    #[test]
    fn clip_rounding(left in 0i32..300, right in 0i32..300) {
        let stream = StreamInfo::new(720, 480, PixelFormat::Yuv420p, Rational::new(30000, 1001));
        let mut config = AfsConfig::default();
        config.clip.left = left;
        config.clip.right = right;
        let config = config.validate(&stream).unwrap();
        prop_assert_eq!(config.clip.left, (left + 2) & !3);
        prop_assert_eq!(config.clip.right, (right + 2) & !3);
        prop_assert_eq!(config.clip.left % 4, 0);
        prop_assert!((config.clip.left - left).abs() <= 2);
    }
}
