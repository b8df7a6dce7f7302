use std::collections::BTreeMap;

use tracing::warn;

use crate::models::{CaseTable, RefundRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityCaseCount {
    pub priority: String,
    pub case_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityResolution {
    pub priority: String,
    pub avg_resolution_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundTotals {
    pub total_refund_eur: f64,
    pub refund_count: usize,
}

/// Descriptive case and refund KPIs, independent of the OFI scores.
#[derive(Debug, Clone)]
pub struct KpiTables {
    /// `None` when the case table has no priority column.
    pub cases_by_priority: Option<Vec<PriorityCaseCount>>,
    pub resolution_by_priority: Option<Vec<PriorityResolution>>,
    pub refunds: RefundTotals,
}

/// Groups on the priority value as recorded; cases without one are left out.
pub fn build_kpis(cases: &CaseTable, refunds: &[RefundRecord]) -> KpiTables {
    let (cases_by_priority, resolution_by_priority) = if cases.priority_available {
        let mut groups: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for case in &cases.rows {
            if let Some(priority) = case.priority.as_deref() {
                let entry = groups.entry(priority).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += case.resolution_minutes;
            }
        }

        let counts = groups
            .iter()
            .map(|(priority, (count, _))| PriorityCaseCount {
                priority: priority.to_string(),
                case_count: *count,
            })
            .collect();
        let resolution = groups
            .iter()
            .map(|(priority, (count, total))| PriorityResolution {
                priority: priority.to_string(),
                avg_resolution_minutes: total / *count as f64,
            })
            .collect();
        (Some(counts), Some(resolution))
    } else {
        warn!("cases have no priority column, skipping priority KPIs");
        (None, None)
    };

    // Every refund row counts, matched to a case or not.
    let refunds = RefundTotals {
        total_refund_eur: refunds.iter().map(|r| r.refund_amount_eur).sum(),
        refund_count: refunds.iter().filter(|r| !r.refund_id.is_empty()).count(),
    };

    KpiTables {
        cases_by_priority,
        resolution_by_priority,
        refunds,
    }
}
