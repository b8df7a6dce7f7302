use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDateTime};
use tracing::warn;

use crate::models::{ScoredCase, SeverityTrendPoint, TimelineEvent, TrendPoint};

/// Priority label for cases that carry no priority value.
pub const UNKNOWN_PRIORITY: &str = "unknown";

#[derive(Debug, Clone, Default)]
pub struct FrictionTrends {
    pub weekly: Vec<TrendPoint>,
    pub monthly: Vec<TrendPoint>,
    /// `None` when the case set has no priority attribute.
    pub severity: Option<Vec<SeverityTrendPoint>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    fn value(self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Earliest timestamp per case. Events without a case or timestamp are ignored.
pub fn case_starts(timeline: &[TimelineEvent]) -> HashMap<String, NaiveDateTime> {
    let mut starts: HashMap<String, NaiveDateTime> = HashMap::new();

    for event in timeline {
        let (Some(case_id), Some(at)) = (event.case_id.as_ref(), event.event_timestamp) else {
            continue;
        };
        starts
            .entry(case_id.clone())
            .and_modify(|start| {
                if at < *start {
                    *start = at;
                }
            })
            .or_insert(at);
    }

    starts
}

/// ISO week label such as `2024-W09`, using the ISO week-based year.
pub fn week_label(at: NaiveDateTime) -> String {
    let week = at.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

pub fn month_label(at: NaiveDateTime) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

pub fn normalized_priority(priority: Option<&str>) -> String {
    match priority.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => UNKNOWN_PRIORITY.to_string(),
    }
}

pub fn build_trends(
    cases: &[ScoredCase],
    timeline: &[TimelineEvent],
    priority_available: bool,
) -> FrictionTrends {
    let starts = case_starts(timeline);
    let mut weekly: BTreeMap<String, Mean> = BTreeMap::new();
    let mut monthly: BTreeMap<String, Mean> = BTreeMap::new();
    let mut severity: BTreeMap<(String, String), Mean> = BTreeMap::new();

    for scored in cases {
        let Some(&start) = starts.get(&scored.case.case_id) else {
            continue;
        };
        let month = month_label(start);

        weekly.entry(week_label(start)).or_default().add(scored.ofi);
        if priority_available {
            let priority = normalized_priority(scored.case.priority.as_deref());
            severity
                .entry((month.clone(), priority))
                .or_default()
                .add(scored.ofi);
        }
        monthly.entry(month).or_default().add(scored.ofi);
    }

    let severity = if priority_available {
        Some(
            severity
                .into_iter()
                .map(|((month, priority), mean)| SeverityTrendPoint {
                    month,
                    priority,
                    avg_ofi: mean.value(),
                })
                .collect(),
        )
    } else {
        warn!("priority column not found in case data, skipping severity trend");
        None
    };

    FrictionTrends {
        weekly: into_points(weekly),
        monthly: into_points(monthly),
        severity,
    }
}

fn into_points(buckets: BTreeMap<String, Mean>) -> Vec<TrendPoint> {
    buckets
        .into_iter()
        .map(|(label, mean)| TrendPoint {
            label,
            avg_ofi: mean.value(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseRecord, SubScores};
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn scored(case_id: &str, priority: Option<&str>, ofi: f64) -> ScoredCase {
        ScoredCase {
            case: CaseRecord {
                case_id: case_id.to_string(),
                customer_id: "cust-1".to_string(),
                priority: priority.map(str::to_string),
                escalated_flag: 0,
                reopened_flag: 0,
                delay_minutes: 0.0,
                resolution_minutes: 0.0,
            },
            refund_eur: 0.0,
            touch_count: 0,
            scores: SubScores {
                priority: ofi,
                escalation: 0.0,
                reopen: 0.0,
                delay: 0.0,
                resolution: 0.0,
                refund: 0.0,
                touch: 0.0,
            },
            ofi,
        }
    }

    fn event(case_id: &str, timestamp: NaiveDateTime) -> TimelineEvent {
        TimelineEvent {
            case_id: Some(case_id.to_string()),
            event_timestamp: Some(timestamp),
        }
    }

    #[test]
    fn case_start_is_the_earliest_event() {
        let timeline = vec![
            event("C1", at(2024, 3, 5, 12)),
            event("C1", at(2024, 3, 4, 8)),
            event("C1", at(2024, 3, 6, 1)),
            TimelineEvent {
                case_id: Some("C1".to_string()),
                event_timestamp: None,
            },
        ];
        let starts = case_starts(&timeline);
        assert_eq!(starts.get("C1"), Some(&at(2024, 3, 4, 8)));
    }

    #[test]
    fn labels_follow_iso_weeks_and_calendar_months() {
        assert_eq!(week_label(at(2024, 3, 4, 0)), "2024-W10");
        // 2021-01-03 is a Sunday that belongs to the last ISO week of 2020.
        assert_eq!(week_label(at(2021, 1, 3, 0)), "2020-W53");
        assert_eq!(month_label(at(2021, 1, 3, 0)), "2021-01");
    }

    #[test]
    fn same_week_cases_average_into_one_row() {
        let cases = vec![scored("C1", Some("low"), 4.0), scored("C2", Some("high"), 8.0)];
        let timeline = vec![event("C1", at(2024, 3, 4, 9)), event("C2", at(2024, 3, 7, 17))];

        let trends = build_trends(&cases, &timeline, true);
        assert_eq!(trends.weekly.len(), 1);
        assert_eq!(trends.weekly[0].label, "2024-W10");
        assert!((trends.weekly[0].avg_ofi - 6.0).abs() < 1e-9);
    }

    #[test]
    fn cases_without_events_are_left_out() {
        let cases = vec![scored("C1", Some("low"), 4.0), scored("C2", Some("low"), 100.0)];
        let timeline = vec![event("C1", at(2024, 3, 4, 9))];

        let trends = build_trends(&cases, &timeline, true);
        assert_eq!(trends.monthly.len(), 1);
        assert_eq!(trends.monthly[0].avg_ofi, 4.0);
        assert_eq!(trends.weekly[0].avg_ofi, 4.0);
    }

    #[test]
    fn series_are_sorted_ascending() {
        let cases = vec![
            scored("C1", Some("low"), 2.0),
            scored("C2", Some("low"), 3.0),
            scored("C3", Some("low"), 5.0),
        ];
        let timeline = vec![
            event("C1", at(2024, 5, 1, 9)),
            event("C2", at(2024, 1, 15, 9)),
            event("C3", at(2024, 3, 10, 9)),
        ];

        let trends = build_trends(&cases, &timeline, true);
        let months: Vec<&str> = trends.monthly.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-03", "2024-05"]);
        let weeks: Vec<&str> = trends.weekly.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(weeks, vec!["2024-W03", "2024-W10", "2024-W18"]);
    }

    #[test]
    fn severity_trend_groups_by_month_and_lowercased_priority() {
        let cases = vec![
            scored("C1", Some("HIGH"), 9.0),
            scored("C2", Some("high"), 7.0),
            scored("C3", Some("Low"), 1.0),
            scored("C4", None, 2.0),
        ];
        let timeline = vec![
            event("C1", at(2024, 2, 1, 9)),
            event("C2", at(2024, 2, 20, 9)),
            event("C3", at(2024, 2, 3, 9)),
            event("C4", at(2024, 1, 3, 9)),
        ];

        let severity = build_trends(&cases, &timeline, true)
            .severity
            .expect("priority is available");
        assert_eq!(
            severity,
            vec![
                SeverityTrendPoint {
                    month: "2024-01".to_string(),
                    priority: UNKNOWN_PRIORITY.to_string(),
                    avg_ofi: 2.0,
                },
                SeverityTrendPoint {
                    month: "2024-02".to_string(),
                    priority: "high".to_string(),
                    avg_ofi: 8.0,
                },
                SeverityTrendPoint {
                    month: "2024-02".to_string(),
                    priority: "low".to_string(),
                    avg_ofi: 1.0,
                },
            ]
        );
    }

    #[test]
    fn severity_trend_is_skipped_without_priority_column() {
        let cases = vec![scored("C1", None, 3.0)];
        let timeline = vec![event("C1", at(2024, 2, 1, 9))];

        let trends = build_trends(&cases, &timeline, false);
        assert!(trends.severity.is_none());
        assert_eq!(trends.monthly.len(), 1);
    }
}
