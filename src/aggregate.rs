use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::models::{CaseRecord, RefundRecord, TimelineEvent};

/// Rows left out of the per-case joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DroppedRows {
    pub null_key_refunds: usize,
    pub orphan_refunds: usize,
    pub null_key_events: usize,
    pub orphan_events: usize,
}

/// Per-case refund totals and touch counts joined against the case set.
///
/// Both lookups default to zero for cases with no matching rows, so every
/// case survives the join.
#[derive(Debug, Clone, Default)]
pub struct CaseAggregates {
    refunds: HashMap<String, f64>,
    touches: HashMap<String, usize>,
    dropped: DroppedRows,
}

impl CaseAggregates {
    pub fn build(
        cases: &[CaseRecord],
        refunds: &[RefundRecord],
        timeline: &[TimelineEvent],
    ) -> Self {
        let known: HashSet<&str> = cases.iter().map(|case| case.case_id.as_str()).collect();
        let mut aggregates = Self::default();

        for refund in refunds {
            match refund.case_id.as_deref() {
                None => aggregates.dropped.null_key_refunds += 1,
                Some(case_id) if !known.contains(case_id) => {
                    trace!(refund_id = %refund.refund_id, case_id, "refund matches no case");
                    aggregates.dropped.orphan_refunds += 1;
                }
                Some(case_id) => {
                    *aggregates.refunds.entry(case_id.to_string()).or_insert(0.0) +=
                        refund.refund_amount_eur;
                }
            }
        }

        // A row counts as a touch even when its timestamp is missing.
        for event in timeline {
            match event.case_id.as_deref() {
                None => aggregates.dropped.null_key_events += 1,
                Some(case_id) if !known.contains(case_id) => {
                    aggregates.dropped.orphan_events += 1;
                }
                Some(case_id) => {
                    *aggregates.touches.entry(case_id.to_string()).or_insert(0) += 1;
                }
            }
        }

        aggregates
    }

    /// Total refunded for the case, 0 when it has no refunds.
    pub fn sum_refunds(&self, case_id: &str) -> f64 {
        self.refunds.get(case_id).copied().unwrap_or(0.0)
    }

    /// Timeline rows recorded for the case, 0 when it has none.
    pub fn count_touches(&self, case_id: &str) -> usize {
        self.touches.get(case_id).copied().unwrap_or(0)
    }

    pub fn dropped(&self) -> DroppedRows {
        self.dropped
    }
}
