//! Per-frame cadence status flags.

use bitflags::bitflags;

bitflags! {
    /// Classification result for one frame.
    ///
    /// `SHIFT0..SHIFT3` describe the frame itself and its next three
    /// successors: bit `k` is set when frame `i + k` should be paired with the
    /// latter field of its predecessor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CadenceStatus: u16 {
        /// Shift decision for this frame.
        const SHIFT0 = 0x001;
        /// Shift decision for the next frame.
        const SHIFT1 = 0x002;
        /// Shift decision two frames ahead.
        const SHIFT2 = 0x004;
        /// Shift decision three frames ahead.
        const SHIFT3 = 0x008;
        /// Frame dropping is enabled for this frame.
        const FRAME_DROP = 0x010;
        /// Timestamp smoothing is enabled.
        const SMOOTHING = 0x020;
        /// Lock output to a 24 fps pulldown phase.
        const FORCE24 = 0x040;
        /// Source frame is progressive.
        const PROGRESSIVE = 0x080;
        /// Progressive source frame with a repeated field.
        const RFF = 0x100;
    }
}

impl CadenceStatus {
    /// All shift bits.
    pub const SHIFT_MASK: CadenceStatus = CadenceStatus::SHIFT0
        .union(CadenceStatus::SHIFT1)
        .union(CadenceStatus::SHIFT2)
        .union(CadenceStatus::SHIFT3);

    /// Shift bit for lookahead offset `k` (0..=3).
    pub fn shift(k: usize) -> CadenceStatus {
        CadenceStatus::from_bits_truncate(CadenceStatus::SHIFT0.bits() << k) & Self::SHIFT_MASK
    }

    /// Whether this is a progressive frame carrying a repeated field.
    pub fn is_rff(&self) -> bool {
        self.contains(CadenceStatus::PROGRESSIVE | CadenceStatus::RFF)
    }

    /// Whether the frame is progressive.
    pub fn is_progressive(&self) -> bool {
        self.contains(CadenceStatus::PROGRESSIVE)
    }

    /// Six-character summary used in the diagnostic log: `p|i`, `r|-`, then
    /// one column per shift bit. Shift bits are not shown for progressive frames.
    pub fn summary(&self) -> String {
        let shifts = if self.is_progressive() {
            CadenceStatus::empty()
        } else {
            *self
        };
        let mut s = String::with_capacity(6);
        s.push(if self.is_progressive() { 'p' } else { 'i' });
        s.push(if self.is_rff() { 'r' } else { '-' });
        for (k, c) in ['0', '1', '2', '3'].into_iter().enumerate() {
            s.push(if shifts.contains(Self::shift(k)) { c } else { '-' });
        }
        s
    }
}

/// Append-only table of classification results indexed by frame number.
///
/// A status is recorded once; later writes for the same frame are ignored.
#[derive(Debug, Default)]
pub struct StatusTable {
    entries: Vec<Option<CadenceStatus>>,
}

impl StatusTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of frame `iframe`, if it has been classified.
    pub fn get(&self, iframe: i64) -> Option<CadenceStatus> {
        usize::try_from(iframe)
            .ok()
            .and_then(|i| self.entries.get(i).copied().flatten())
    }

    /// Record `status` for `iframe` and return the stored value.
    ///
    /// Negative indices are not stored.
    pub fn record(&mut self, iframe: i64, status: CadenceStatus) -> CadenceStatus {
        let Ok(i) = usize::try_from(iframe) else {
            return status;
        };
        if i >= self.entries.len() {
            self.entries.resize(i + 1, None);
        }
        *self.entries[i].get_or_insert(status)
    }

    /// Number of slots, classified or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no frame was classified yet.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_bits() {
        assert_eq!(CadenceStatus::shift(0), CadenceStatus::SHIFT0);
        assert_eq!(CadenceStatus::shift(3), CadenceStatus::SHIFT3);
        assert_eq!(CadenceStatus::shift(4), CadenceStatus::empty());
    }

    #[test]
    fn test_rff_needs_progressive() {
        assert!(!CadenceStatus::RFF.is_rff());
        assert!((CadenceStatus::RFF | CadenceStatus::PROGRESSIVE).is_rff());
    }

    #[test]
    fn test_summary() {
        let st = CadenceStatus::SHIFT0 | CadenceStatus::SHIFT2 | CadenceStatus::FRAME_DROP;
        assert_eq!(st.summary(), "i-0-2-");

        let st = CadenceStatus::PROGRESSIVE | CadenceStatus::RFF | CadenceStatus::SHIFT1;
        assert_eq!(st.summary(), "pr----");
    }

    #[test]
    fn test_table_is_write_once() {
        let mut table = StatusTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get(3), None);

        assert_eq!(table.record(3, CadenceStatus::SHIFT0), CadenceStatus::SHIFT0);
        assert_eq!(table.record(3, CadenceStatus::SHIFT1), CadenceStatus::SHIFT0);
        assert_eq!(table.get(3), Some(CadenceStatus::SHIFT0));
        assert_eq!(table.get(2), None);
        assert_eq!(table.get(-1), None);
        assert_eq!(table.len(), 4);
    }
}
