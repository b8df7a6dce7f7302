use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Case-insensitive; anything other than low/medium/high yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub case_id: String,
    pub customer_id: String,
    pub priority: Option<String>,
    pub escalated_flag: u8,
    pub reopened_flag: u8,
    pub delay_minutes: f64,
    pub resolution_minutes: f64,
}

/// Case rows plus whether the source carried a priority column at all.
#[derive(Debug, Clone)]
pub struct CaseTable {
    pub rows: Vec<CaseRecord>,
    pub priority_available: bool,
}

#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub refund_id: String,
    pub case_id: Option<String>,
    pub refund_amount_eur: f64,
}

#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub case_id: Option<String>,
    pub event_timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub priority: f64,
    pub escalation: f64,
    pub reopen: f64,
    pub delay: f64,
    pub resolution: f64,
    pub refund: f64,
    pub touch: f64,
}

impl SubScores {
    pub fn total(&self) -> f64 {
        self.priority
            + self.escalation
            + self.reopen
            + self.delay
            + self.resolution
            + self.refund
            + self.touch
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCase {
    pub case: CaseRecord,
    pub refund_eur: f64,
    pub touch_count: usize,
    pub scores: SubScores,
    pub ofi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerScore {
    pub customer_id: String,
    pub avg_ofi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrictionTier {
    Low,
    Medium,
    High,
}

impl FrictionTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Friction",
            Self::Medium => "Medium Friction",
            Self::High => "High Friction",
        }
    }
}

impl fmt::Display for FrictionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMethod {
    Tertile,
    PercentileFallback,
}

impl fmt::Display for TierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tertile => f.write_str("tertile split"),
            Self::PercentileFallback => f.write_str("percentile fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTierRecord {
    pub customer_id: String,
    pub avg_ofi: f64,
    pub tier: FrictionTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub label: String,
    pub avg_ofi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityTrendPoint {
    pub month: String,
    pub priority: String,
    pub avg_ofi: f64,
}
