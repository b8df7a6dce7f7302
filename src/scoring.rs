use crate::aggregate::CaseAggregates;
use crate::models::{CaseRecord, Priority, ScoredCase, SubScores};

pub const ESCALATION_WEIGHT: f64 = 2.0;
pub const REOPEN_WEIGHT: f64 = 1.5;
pub const DELAY_MINUTES_PER_POINT: f64 = 60.0;
pub const RESOLUTION_MINUTES_PER_POINT: f64 = 120.0;
pub const REFUND_EUR_PER_POINT: f64 = 20.0;
pub const TOUCH_WEIGHT: f64 = 0.5;

/// Unknown or missing priorities score as the lowest severity.
pub fn priority_score(priority: Option<&str>) -> f64 {
    match priority.and_then(Priority::parse) {
        Some(Priority::High) => 3.0,
        Some(Priority::Medium) => 2.0,
        Some(Priority::Low) | None => 1.0,
    }
}

pub fn sub_scores(case: &CaseRecord, refund_eur: f64, touch_count: usize) -> SubScores {
    SubScores {
        priority: priority_score(case.priority.as_deref()),
        escalation: f64::from(case.escalated_flag) * ESCALATION_WEIGHT,
        reopen: f64::from(case.reopened_flag) * REOPEN_WEIGHT,
        delay: case.delay_minutes / DELAY_MINUTES_PER_POINT,
        resolution: case.resolution_minutes / RESOLUTION_MINUTES_PER_POINT,
        refund: refund_eur / REFUND_EUR_PER_POINT,
        touch: touch_count as f64 * TOUCH_WEIGHT,
    }
}

pub fn score_case(case: CaseRecord, refund_eur: f64, touch_count: usize) -> ScoredCase {
    let scores = sub_scores(&case, refund_eur, touch_count);
    ScoredCase {
        case,
        refund_eur,
        touch_count,
        ofi: scores.total(),
        scores,
    }
}

/// Scores every case and orders the result by OFI, highest first.
///
/// The sort is stable, so cases with equal OFI keep their source order.
pub fn score_cases(cases: &[CaseRecord], aggregates: &CaseAggregates) -> Vec<ScoredCase> {
    let mut scored: Vec<ScoredCase> = cases
        .iter()
        .map(|case| {
            let refund_eur = aggregates.sum_refunds(&case.case_id);
            let touch_count = aggregates.count_touches(&case.case_id);
            score_case(case.clone(), refund_eur, touch_count)
        })
        .collect();

    scored.sort_by(|a, b| b.ofi.partial_cmp(&a.ofi).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
