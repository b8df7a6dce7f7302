use std::collections::HashSet;

use tracing::{debug, info};

use crate::aggregate::CaseAggregates;
use crate::error::{OfiError, OfiResult};
use crate::kpis::{self, KpiTables};
use crate::models::{CaseTable, CustomerScore, RefundRecord, ScoredCase, TimelineEvent};
use crate::scoring;
use crate::source::TableSource;
use crate::tiers::{self, TierClassification};
use crate::trends::{self, FrictionTrends};

/// Every derived table of one batch run, held in memory until written.
#[derive(Debug, Clone)]
pub struct OfiRun {
    /// Sorted by OFI, highest first.
    pub cases: Vec<ScoredCase>,
    pub customers: Vec<CustomerScore>,
    pub tiers: TierClassification,
    pub trends: FrictionTrends,
    pub kpis: KpiTables,
}

impl OfiRun {
    pub fn top_cases(&self, limit: usize) -> &[ScoredCase] {
        &self.cases[..limit.min(self.cases.len())]
    }
}

pub fn run<S: TableSource>(source: &S) -> OfiResult<OfiRun> {
    let cases = source.cases()?;
    let refunds = source.refunds()?;
    let timeline = source.timeline()?;
    info!(
        cases = cases.rows.len(),
        refunds = refunds.len(),
        events = timeline.len(),
        "loaded source tables"
    );

    compute(cases, &refunds, &timeline)
}

pub fn compute(
    cases: CaseTable,
    refunds: &[RefundRecord],
    timeline: &[TimelineEvent],
) -> OfiResult<OfiRun> {
    let mut seen = HashSet::new();
    for case in &cases.rows {
        if !seen.insert(case.case_id.as_str()) {
            return Err(OfiError::DuplicateCase {
                case_id: case.case_id.clone(),
            });
        }
    }

    let kpis = kpis::build_kpis(&cases, refunds);
    let aggregates = CaseAggregates::build(&cases.rows, refunds, timeline);
    let dropped = aggregates.dropped();
    debug!(
        null_key_refunds = dropped.null_key_refunds,
        orphan_refunds = dropped.orphan_refunds,
        null_key_events = dropped.null_key_events,
        orphan_events = dropped.orphan_events,
        "excluded unmatched rows from case joins"
    );

    let scored = scoring::score_cases(&cases.rows, &aggregates);
    let trends = trends::build_trends(&scored, timeline, cases.priority_available);
    let customers = tiers::customer_averages(&scored);
    let tiers = tiers::classify_customers(&customers);

    info!(
        cases = scored.len(),
        customers = customers.len(),
        weeks = trends.weekly.len(),
        months = trends.monthly.len(),
        "computed operational friction index"
    );

    Ok(OfiRun {
        cases: scored,
        customers,
        tiers,
        trends,
        kpis,
    })
}
