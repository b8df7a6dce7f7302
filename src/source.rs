use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};

use crate::error::{OfiError, OfiResult};
use crate::models::{CaseRecord, CaseTable, RefundRecord, TimelineEvent};

pub const CASES_FILE: &str = "cases.csv";
pub const REFUNDS_FILE: &str = "refunds.csv";
pub const TIMELINE_FILE: &str = "case_timeline.csv";

const CASE_COLUMNS: [&str; 6] = [
    "case_id",
    "customer_id",
    "escalated_flag",
    "reopened_flag",
    "delay_minutes",
    "resolution_minutes",
];
const REFUND_COLUMNS: [&str; 3] = ["refund_id", "case_id", "refund_amount_eur"];
const TIMELINE_COLUMNS: [&str; 2] = ["case_id", "event_timestamp"];

/// Supplies the three input tables of a batch run.
pub trait TableSource {
    fn cases(&self) -> OfiResult<CaseTable>;
    fn refunds(&self) -> OfiResult<Vec<RefundRecord>>;
    fn timeline(&self) -> OfiResult<Vec<TimelineEvent>>;
}

/// Reads `cases.csv`, `refunds.csv` and `case_timeline.csv` from one directory.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn open(&self, file: &str) -> OfiResult<File> {
        let path = self.dir.join(file);
        File::open(&path).map_err(|source| OfiError::Unreadable {
            path: path.display().to_string(),
            source,
        })
    }
}

impl TableSource for CsvDirectorySource {
    fn cases(&self) -> OfiResult<CaseTable> {
        read_cases(self.open(CASES_FILE)?)
    }

    fn refunds(&self) -> OfiResult<Vec<RefundRecord>> {
        read_refunds(self.open(REFUNDS_FILE)?)
    }

    fn timeline(&self) -> OfiResult<Vec<TimelineEvent>> {
        read_timeline(self.open(TIMELINE_FILE)?)
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn require_columns(headers: &csv::StringRecord, table: &str, columns: &[&str]) -> OfiResult<()> {
    let present: HashSet<&str> = headers.iter().collect();
    match columns.iter().find(|column| !present.contains(**column)) {
        Some(column) => Err(OfiError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

pub fn read_cases<R: Read>(reader: R) -> OfiResult<CaseTable> {
    #[derive(Deserialize)]
    struct CaseRow {
        #[serde(deserialize_with = "empty_string_as_none")]
        case_id: Option<String>,
        customer_id: String,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        priority: Option<String>,
        escalated_flag: Option<f64>,
        reopened_flag: Option<f64>,
        delay_minutes: Option<f64>,
        resolution_minutes: Option<f64>,
    }

    let mut csv_reader = csv_reader(reader);
    let headers = csv_reader.headers()?.clone();
    require_columns(&headers, "cases", &CASE_COLUMNS)?;
    let priority_available = headers.iter().any(|column| column == "priority");

    let mut rows = Vec::new();
    for (index, result) in csv_reader.deserialize::<CaseRow>().enumerate() {
        let row = result?;
        let case_id = row.case_id.ok_or_else(|| OfiError::InvalidCase {
            case_id: format!("<row {}>", index + 1),
            field: "case_id",
            reason: "value is missing".to_string(),
        })?;

        rows.push(CaseRecord {
            escalated_flag: flag(&case_id, "escalated_flag", row.escalated_flag)?,
            reopened_flag: flag(&case_id, "reopened_flag", row.reopened_flag)?,
            delay_minutes: minutes(&case_id, "delay_minutes", row.delay_minutes)?,
            resolution_minutes: minutes(&case_id, "resolution_minutes", row.resolution_minutes)?,
            customer_id: row.customer_id,
            priority: row.priority,
            case_id,
        });
    }

    Ok(CaseTable {
        rows,
        priority_available,
    })
}

pub fn read_refunds<R: Read>(reader: R) -> OfiResult<Vec<RefundRecord>> {
    #[derive(Deserialize)]
    struct RefundRow {
        refund_id: String,
        #[serde(deserialize_with = "empty_string_as_none")]
        case_id: Option<String>,
        refund_amount_eur: Option<f64>,
    }

    let mut csv_reader = csv_reader(reader);
    let headers = csv_reader.headers()?.clone();
    require_columns(&headers, "refunds", &REFUND_COLUMNS)?;

    let mut refunds = Vec::new();
    for result in csv_reader.deserialize::<RefundRow>() {
        let row = result?;
        let refund_amount_eur = match row.refund_amount_eur {
            None => {
                return Err(OfiError::InvalidRefund {
                    refund_id: row.refund_id,
                    reason: "value is missing".to_string(),
                })
            }
            Some(amount) if !amount.is_finite() || amount < 0.0 => {
                return Err(OfiError::InvalidRefund {
                    refund_id: row.refund_id,
                    reason: format!("{amount} is not a finite non-negative amount"),
                })
            }
            Some(amount) => amount,
        };

        refunds.push(RefundRecord {
            refund_id: row.refund_id,
            case_id: row.case_id,
            refund_amount_eur,
        });
    }

    Ok(refunds)
}

pub fn read_timeline<R: Read>(reader: R) -> OfiResult<Vec<TimelineEvent>> {
    #[derive(Deserialize)]
    struct TimelineRow {
        #[serde(deserialize_with = "empty_string_as_none")]
        case_id: Option<String>,
        #[serde(deserialize_with = "empty_string_as_none")]
        event_timestamp: Option<String>,
    }

    let mut csv_reader = csv_reader(reader);
    let headers = csv_reader.headers()?.clone();
    require_columns(&headers, "case_timeline", &TIMELINE_COLUMNS)?;

    let mut events = Vec::new();
    for result in csv_reader.deserialize::<TimelineRow>() {
        let row = result?;
        let event_timestamp = match row.event_timestamp {
            None => None,
            Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| OfiError::InvalidTimestamp {
                case_id: row.case_id.clone().unwrap_or_default(),
                value: raw.clone(),
            })?),
        };

        events.push(TimelineEvent {
            case_id: row.case_id,
            event_timestamp,
        });
    }

    Ok(events)
}

fn flag(case_id: &str, field: &'static str, value: Option<f64>) -> OfiResult<u8> {
    match value {
        Some(v) if v == 0.0 => Ok(0),
        Some(v) if v == 1.0 => Ok(1),
        Some(v) => Err(OfiError::InvalidCase {
            case_id: case_id.to_string(),
            field,
            reason: format!("expected 0 or 1, got {v}"),
        }),
        None => Err(OfiError::InvalidCase {
            case_id: case_id.to_string(),
            field,
            reason: "value is missing".to_string(),
        }),
    }
}

fn minutes(case_id: &str, field: &'static str, value: Option<f64>) -> OfiResult<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(OfiError::InvalidCase {
            case_id: case_id.to_string(),
            field,
            reason: format!("{v} is not a finite non-negative duration"),
        }),
        None => Err(OfiError::InvalidCase {
            case_id: case_id.to_string(),
            field,
            reason: "value is missing".to_string(),
        }),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]` and bare dates.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
