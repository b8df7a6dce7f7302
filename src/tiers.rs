use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::models::{CustomerScore, CustomerTierRecord, FrictionTier, ScoredCase, TierMethod};

const FALLBACK_LOW_QUANTILE: f64 = 0.33;
const FALLBACK_HIGH_QUANTILE: f64 = 0.66;

/// Upper bounds of the Low and Medium tiers. Anything above `medium_max` is High.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl TierThresholds {
    pub fn tier_for(&self, avg_ofi: f64) -> FrictionTier {
        if avg_ofi <= self.low_max {
            FrictionTier::Low
        } else if avg_ofi <= self.medium_max {
            FrictionTier::Medium
        } else {
            FrictionTier::High
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierClassification {
    pub records: Vec<CustomerTierRecord>,
    pub method: TierMethod,
}

/// Mean OFI per customer, highest first. Equal means fall back to customer id order.
pub fn customer_averages(cases: &[ScoredCase]) -> Vec<CustomerScore> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

    for scored in cases {
        let entry = totals.entry(scored.case.customer_id.as_str()).or_insert((0.0, 0));
        entry.0 += scored.ofi;
        entry.1 += 1;
    }

    let mut customers: Vec<CustomerScore> = totals
        .into_iter()
        .map(|(customer_id, (total, count))| CustomerScore {
            customer_id: customer_id.to_string(),
            avg_ofi: total / count as f64,
        })
        .collect();

    customers.sort_by(|a, b| {
        b.avg_ofi
            .partial_cmp(&a.avg_ofi)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    customers
}

/// Quantile of an ascending slice with linear interpolation between neighbours.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let position = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Equal-population cut points at the 1/3 and 2/3 quantiles.
///
/// Returns `None` when the bin edges `[min, q1, q2, max]` are not strictly
/// increasing, which happens when too many values coincide to form three
/// distinct bins.
pub fn tertile_edges(sorted: &[f64]) -> Option<TierThresholds> {
    let edges = [
        quantile(sorted, 0.0)?,
        quantile(sorted, 1.0 / 3.0)?,
        quantile(sorted, 2.0 / 3.0)?,
        quantile(sorted, 1.0)?,
    ];

    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return None;
    }

    Some(TierThresholds {
        low_max: edges[1],
        medium_max: edges[2],
    })
}

/// p33/p66 thresholds, usable for any non-empty distribution.
pub fn percentile_thresholds(sorted: &[f64]) -> Option<TierThresholds> {
    Some(TierThresholds {
        low_max: quantile(sorted, FALLBACK_LOW_QUANTILE)?,
        medium_max: quantile(sorted, FALLBACK_HIGH_QUANTILE)?,
    })
}

/// Assigns every customer a friction tier, highest mean OFI first.
pub fn classify_customers(customers: &[CustomerScore]) -> TierClassification {
    let mut values: Vec<f64> = customers.iter().map(|c| c.avg_ofi).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let (thresholds, method) = match tertile_edges(&values) {
        Some(thresholds) => (thresholds, TierMethod::Tertile),
        None => match percentile_thresholds(&values) {
            Some(thresholds) => {
                debug!("tertile bin edges are not distinct, using percentile thresholds");
                (thresholds, TierMethod::PercentileFallback)
            }
            None => {
                return TierClassification {
                    records: Vec::new(),
                    method: TierMethod::Tertile,
                }
            }
        },
    };

    info!(
        method = %method,
        low_max = thresholds.low_max,
        medium_max = thresholds.medium_max,
        customers = customers.len(),
        "classified customer friction tiers"
    );

    let mut records: Vec<CustomerTierRecord> = customers
        .iter()
        .map(|customer| CustomerTierRecord {
            customer_id: customer.customer_id.clone(),
            avg_ofi: customer.avg_ofi,
            tier: thresholds.tier_for(customer.avg_ofi),
        })
        .collect();
    records.sort_by(|a, b| {
        b.avg_ofi
            .partial_cmp(&a.avg_ofi)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    TierClassification { records, method }
}
