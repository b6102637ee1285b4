//! Stripe cache: merged scan results per frame.
//!
//! Each record walks `Empty -> Raw -> Counted -> Filtered`. `Raw` means the
//! merge job was issued; reading the counts waits for it and moves the record
//! to `Counted`. Filtering happens only for frames that are emitted.

use crate::analyzer::{FieldAnalyzer, FieldMap, MergeOutput, ScanParams, StripeCounts};
use crate::compute::{Completion, ComputeQueue};
use crate::config::ClipRegion;
use crate::error::{AfsError, Result};
use crate::scan::ScanCache;
use std::sync::Arc;
use tracing::trace;

/// Number of stripe records kept.
pub const STRIPE_CACHE_SIZE: usize = 8;

/// Externally visible state of a stripe record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StripePhase {
    Empty,
    Raw,
    Counted,
    Filtered,
}

#[derive(Debug)]
enum StripeState {
    Raw(Completion<MergeOutput>),
    Counted(MergeOutput),
    Filtered {
        merged: MergeOutput,
        filtered: Arc<FieldMap>,
    },
}

#[derive(Debug)]
struct StripeRecord {
    iframe: i64,
    state: StripeState,
}

/// Ring of stripe records.
#[derive(Debug)]
pub struct StripeCache {
    records: Vec<Option<StripeRecord>>,
}

impl Default for StripeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StripeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            records: (0..STRIPE_CACHE_SIZE).map(|_| None).collect(),
        }
    }

    fn slot_index(iframe: i64) -> usize {
        iframe.rem_euclid(STRIPE_CACHE_SIZE as i64) as usize
    }

    fn record_mut(&mut self, iframe: i64) -> Option<&mut StripeRecord> {
        self.records[Self::slot_index(iframe)]
            .as_mut()
            .filter(|r| r.iframe == iframe)
    }

    /// State of record `iframe`.
    pub fn phase(&self, iframe: i64) -> StripePhase {
        match &self.records[Self::slot_index(iframe)] {
            Some(r) if r.iframe == iframe => match r.state {
                StripeState::Raw(_) => StripePhase::Raw,
                StripeState::Counted(_) => StripePhase::Counted,
                StripeState::Filtered { .. } => StripePhase::Filtered,
            },
            _ => StripePhase::Empty,
        }
    }

    /// Mark record `iframe` empty. Records for other frames are untouched.
    pub fn expire(&mut self, iframe: i64) {
        let slot = &mut self.records[Self::slot_index(iframe)];
        if slot.as_ref().is_some_and(|r| r.iframe == iframe) {
            *slot = None;
        }
    }

    /// Issue the merge of scans `iframe` and `iframe + 1` unless already done.
    pub fn issue(
        &mut self,
        iframe: i64,
        scans: &ScanCache,
        analyzer: &Arc<dyn FieldAnalyzer>,
        queue: &ComputeQueue,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<()> {
        if self.phase(iframe) != StripePhase::Empty {
            return Ok(());
        }
        let scan = scans.handle(iframe)?;
        let next_scan = scans.handle(iframe + 1)?;
        let analyzer = Arc::clone(analyzer);
        let (params, clip) = (*params, *clip);
        trace!(iframe, queue = queue.name(), "issue merge");
        let pending = queue.submit(move || {
            let scan = scan.wait()?;
            let next_scan = next_scan.wait()?;
            analyzer.merge(iframe, &scan.map, &next_scan.map, &params, &clip)
        });
        self.records[Self::slot_index(iframe)] = Some(StripeRecord {
            iframe,
            state: StripeState::Raw(pending),
        });
        Ok(())
    }

    /// Stripe counts of record `iframe`, waiting for the merge if needed.
    pub fn counts(&mut self, iframe: i64) -> Result<StripeCounts> {
        let record = self
            .record_mut(iframe)
            .ok_or_else(|| AfsError::internal(format!("stripe record {} was not issued", iframe)))?;
        if let StripeState::Raw(pending) = &record.state {
            let merged = pending.wait()?;
            record.state = StripeState::Counted(merged);
        }
        match &record.state {
            StripeState::Counted(merged) | StripeState::Filtered { merged, .. } => {
                Ok(merged.stripes)
            }
            StripeState::Raw(_) => Err(AfsError::internal("stripe record left raw")),
        }
    }

    /// Issue if needed and return the counts.
    pub fn ensure_merged(
        &mut self,
        iframe: i64,
        scans: &ScanCache,
        analyzer: &Arc<dyn FieldAnalyzer>,
        queue: &ComputeQueue,
        params: &ScanParams,
        clip: &ClipRegion,
    ) -> Result<StripeCounts> {
        self.issue(iframe, scans, analyzer, queue, params, clip)?;
        self.counts(iframe)
    }

    /// Map used for synthesis of frame `iframe`.
    ///
    /// For analysis levels above 1 the merged map is filtered once and the
    /// record moves to `Filtered`; otherwise the merged map is returned as is.
    /// The record must already be counted.
    pub fn ensure_filtered(
        &mut self,
        iframe: i64,
        analysis_level: u8,
        analyzer: &dyn FieldAnalyzer,
    ) -> Result<Arc<FieldMap>> {
        let record = self
            .record_mut(iframe)
            .ok_or_else(|| AfsError::internal(format!("stripe record {} was not issued", iframe)))?;
        let merged = match &record.state {
            StripeState::Filtered { filtered, .. } => return Ok(Arc::clone(filtered)),
            StripeState::Counted(merged) => merged.clone(),
            StripeState::Raw(_) => {
                return Err(AfsError::internal(format!(
                    "stripe record {} filtered before counting",
                    iframe
                )))
            }
        };
        if analysis_level <= 1 {
            return Ok(merged.map);
        }
        let filtered = Arc::new(analyzer.filter(&merged.map, analysis_level)?);
        record.state = StripeState::Filtered {
            merged,
            filtered: Arc::clone(&filtered),
        };
        Ok(filtered)
    }
}
