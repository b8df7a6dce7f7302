use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{OfiError, OfiResult};
use crate::models::{ScoredCase, TierMethod};
use crate::pipeline::OfiRun;

pub const CASE_SCORES: &str = "ofi_case_scores.csv";
pub const HIGH_FRICTION_CUSTOMERS: &str = "high_friction_customers.csv";
pub const WEEKLY_TREND: &str = "weekly_friction_trend.csv";
pub const MONTHLY_TREND: &str = "monthly_friction_trend.csv";
pub const SEVERITY_TREND: &str = "severity_trend.csv";
pub const CUSTOMER_TIERS: &str = "customer_tiers.csv";
pub const KPI_CASES_BY_PRIORITY: &str = "kpi_cases_by_priority.csv";
pub const KPI_RESOLUTION_BY_PRIORITY: &str = "kpi_avg_resolution_by_priority.csv";
pub const KPI_REFUNDS_SUMMARY: &str = "kpi_refunds_summary.csv";

/// Artifacts a run may leave out; a copy left by an earlier run is removed.
const OPTIONAL_ARTIFACTS: [&str; 3] = [
    SEVERITY_TREND,
    KPI_CASES_BY_PRIORITY,
    KPI_RESOLUTION_BY_PRIORITY,
];

pub fn top_cases_file(top_n: usize) -> String {
    format!("top_{top_n}_cases.csv")
}

#[derive(Serialize)]
struct CaseScoreRow<'a> {
    case_id: &'a str,
    customer_id: &'a str,
    priority: Option<&'a str>,
    escalated_flag: u8,
    reopened_flag: u8,
    delay_minutes: f64,
    resolution_minutes: f64,
    priority_score: f64,
    escalation_score: f64,
    reopen_score: f64,
    delay_score: f64,
    resolution_score: f64,
    refund_eur: f64,
    refund_score: f64,
    touch_count: usize,
    touch_score: f64,
    ofi: f64,
}

impl<'a> From<&'a ScoredCase> for CaseScoreRow<'a> {
    fn from(scored: &'a ScoredCase) -> Self {
        Self {
            case_id: &scored.case.case_id,
            customer_id: &scored.case.customer_id,
            priority: scored.case.priority.as_deref(),
            escalated_flag: scored.case.escalated_flag,
            reopened_flag: scored.case.reopened_flag,
            delay_minutes: scored.case.delay_minutes,
            resolution_minutes: scored.case.resolution_minutes,
            priority_score: scored.scores.priority,
            escalation_score: scored.scores.escalation,
            reopen_score: scored.scores.reopen,
            delay_score: scored.scores.delay,
            resolution_score: scored.scores.resolution,
            refund_eur: scored.refund_eur,
            refund_score: scored.scores.refund,
            touch_count: scored.touch_count,
            touch_score: scored.scores.touch,
            ofi: scored.ofi,
        }
    }
}

#[derive(Serialize)]
struct CustomerRow<'a> {
    customer_id: &'a str,
    avg_ofi: f64,
}

#[derive(Serialize)]
struct WeekRow<'a> {
    week: &'a str,
    avg_ofi: f64,
}

#[derive(Serialize)]
struct MonthRow<'a> {
    month: &'a str,
    avg_ofi: f64,
}

#[derive(Serialize)]
struct SeverityRow<'a> {
    month: &'a str,
    priority: &'a str,
    avg_ofi: f64,
}

#[derive(Serialize)]
struct TierRow<'a> {
    customer_id: &'a str,
    avg_ofi: f64,
    tier: &'static str,
}

#[derive(Serialize)]
struct PriorityCountRow<'a> {
    priority: &'a str,
    case_count: usize,
}

#[derive(Serialize)]
struct PriorityResolutionRow<'a> {
    priority: &'a str,
    avg_resolution_minutes: f64,
}

const CASE_SCORE_HEADERS: [&str; 17] = [
    "case_id",
    "customer_id",
    "priority",
    "escalated_flag",
    "reopened_flag",
    "delay_minutes",
    "resolution_minutes",
    "priority_score",
    "escalation_score",
    "reopen_score",
    "delay_score",
    "resolution_score",
    "refund_eur",
    "refund_score",
    "touch_count",
    "touch_score",
    "OFI",
];

/// Header row first, even for an empty table.
fn write_rows<W: Write, T: Serialize>(
    writer: W,
    headers: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> OfiResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(headers)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_case_scores<W: Write>(writer: W, cases: &[ScoredCase]) -> OfiResult<()> {
    write_rows(writer, &CASE_SCORE_HEADERS, cases.iter().map(CaseScoreRow::from))
}

pub fn write_customer_scores<W: Write>(writer: W, run: &OfiRun) -> OfiResult<()> {
    write_rows(
        writer,
        &["customer_id", "OFI"],
        run.customers.iter().map(|customer| CustomerRow {
            customer_id: &customer.customer_id,
            avg_ofi: customer.avg_ofi,
        }),
    )
}

pub fn write_weekly_trend<W: Write>(writer: W, run: &OfiRun) -> OfiResult<()> {
    write_rows(
        writer,
        &["week", "OFI"],
        run.trends.weekly.iter().map(|point| WeekRow {
            week: &point.label,
            avg_ofi: point.avg_ofi,
        }),
    )
}

pub fn write_monthly_trend<W: Write>(writer: W, run: &OfiRun) -> OfiResult<()> {
    write_rows(
        writer,
        &["month", "OFI"],
        run.trends.monthly.iter().map(|point| MonthRow {
            month: &point.label,
            avg_ofi: point.avg_ofi,
        }),
    )
}

/// Returns `false` without writing when the run has no severity trend.
pub fn write_severity_trend<W: Write>(writer: W, run: &OfiRun) -> OfiResult<bool> {
    let Some(severity) = run.trends.severity.as_ref() else {
        return Ok(false);
    };
    write_rows(
        writer,
        &["month", "priority_clean", "OFI"],
        severity.iter().map(|point| SeverityRow {
            month: &point.month,
            priority: &point.priority,
            avg_ofi: point.avg_ofi,
        }),
    )?;
    Ok(true)
}

pub fn write_customer_tiers<W: Write>(writer: W, run: &OfiRun) -> OfiResult<()> {
    write_rows(
        writer,
        &["customer_id", "OFI", "tier"],
        run.tiers.records.iter().map(|record| TierRow {
            customer_id: &record.customer_id,
            avg_ofi: record.avg_ofi,
            tier: record.tier.label(),
        }),
    )
}

/// Returns `false` without writing when the cases had no priority column.
pub fn write_cases_by_priority<W: Write>(writer: W, run: &OfiRun) -> OfiResult<bool> {
    let Some(counts) = run.kpis.cases_by_priority.as_ref() else {
        return Ok(false);
    };
    write_rows(
        writer,
        &["priority", "case_count"],
        counts.iter().map(|row| PriorityCountRow {
            priority: &row.priority,
            case_count: row.case_count,
        }),
    )?;
    Ok(true)
}

/// Returns `false` without writing when the cases had no priority column.
pub fn write_resolution_by_priority<W: Write>(writer: W, run: &OfiRun) -> OfiResult<bool> {
    let Some(resolution) = run.kpis.resolution_by_priority.as_ref() else {
        return Ok(false);
    };
    write_rows(
        writer,
        &["priority", "avg_resolution_minutes"],
        resolution.iter().map(|row| PriorityResolutionRow {
            priority: &row.priority,
            avg_resolution_minutes: row.avg_resolution_minutes,
        }),
    )?;
    Ok(true)
}

pub fn write_refunds_summary<W: Write>(writer: W, run: &OfiRun) -> OfiResult<()> {
    write_rows(
        writer,
        &["total_refund_eur", "refund_count"],
        [(run.kpis.refunds.total_refund_eur, run.kpis.refunds.refund_count)],
    )
}

/// File names the run produces, in write order.
pub fn artifact_names(run: &OfiRun, top_n: usize) -> Vec<String> {
    let mut names = vec![
        CASE_SCORES.to_string(),
        top_cases_file(top_n),
        HIGH_FRICTION_CUSTOMERS.to_string(),
        WEEKLY_TREND.to_string(),
        MONTHLY_TREND.to_string(),
    ];
    if run.trends.severity.is_some() {
        names.push(SEVERITY_TREND.to_string());
    }
    names.push(CUSTOMER_TIERS.to_string());
    if run.kpis.cases_by_priority.is_some() {
        names.push(KPI_CASES_BY_PRIORITY.to_string());
    }
    if run.kpis.resolution_by_priority.is_some() {
        names.push(KPI_RESOLUTION_BY_PRIORITY.to_string());
    }
    names.push(KPI_REFUNDS_SUMMARY.to_string());
    names
}

/// Writes every artifact of an already computed run into `out_dir`.
///
/// Files are rendered into a staging directory inside `out_dir` and only
/// renamed into place once all of them were written, so a failed run leaves
/// the previous artifacts untouched.
pub fn write_artifacts(run: &OfiRun, out_dir: &Path, top_n: usize) -> OfiResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let names = artifact_names(run, top_n);
    for name in &names {
        let target = out_dir.join(name);
        if target.is_dir() {
            return Err(OfiError::ArtifactBlocked {
                path: target.display().to_string(),
            });
        }
    }

    let staging = tempfile::tempdir_in(out_dir)?;
    let stage = |name: &str| -> OfiResult<File> { Ok(File::create(staging.path().join(name))?) };

    write_case_scores(stage(CASE_SCORES)?, &run.cases)?;
    write_case_scores(stage(top_cases_file(top_n).as_str())?, run.top_cases(top_n))?;
    write_customer_scores(stage(HIGH_FRICTION_CUSTOMERS)?, run)?;
    write_weekly_trend(stage(WEEKLY_TREND)?, run)?;
    write_monthly_trend(stage(MONTHLY_TREND)?, run)?;
    if run.trends.severity.is_some() {
        write_severity_trend(stage(SEVERITY_TREND)?, run)?;
    }
    write_customer_tiers(stage(CUSTOMER_TIERS)?, run)?;
    if run.kpis.cases_by_priority.is_some() {
        write_cases_by_priority(stage(KPI_CASES_BY_PRIORITY)?, run)?;
    }
    if run.kpis.resolution_by_priority.is_some() {
        write_resolution_by_priority(stage(KPI_RESOLUTION_BY_PRIORITY)?, run)?;
    }
    write_refunds_summary(stage(KPI_REFUNDS_SUMMARY)?, run)?;

    let mut written = Vec::with_capacity(names.len());
    for name in &names {
        let target = out_dir.join(name);
        fs::rename(staging.path().join(name), &target)?;
        written.push(target);
    }

    for name in OPTIONAL_ARTIFACTS {
        let stale = out_dir.join(name);
        if !names.iter().any(|produced| produced == name) && stale.is_file() {
            debug!(path = %stale.display(), "removing artifact not produced by this run");
            fs::remove_file(&stale)?;
        }
    }

    info!(
        artifacts = written.len(),
        out_dir = %out_dir.display(),
        "wrote OFI artifacts"
    );
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub cases_scored: usize,
    pub customers: usize,
    pub avg_ofi: f64,
    pub max_ofi: f64,
    pub tier_method: TierMethod,
    pub weekly_buckets: usize,
    pub monthly_buckets: usize,
    pub severity_trend: bool,
    pub artifacts: Vec<String>,
}

pub fn summarize(run: &OfiRun, top_n: usize) -> RunSummary {
    let cases_scored = run.cases.len();
    let avg_ofi = if cases_scored == 0 {
        0.0
    } else {
        run.cases.iter().map(|c| c.ofi).sum::<f64>() / cases_scored as f64
    };
    let max_ofi = run.cases.first().map(|c| c.ofi).unwrap_or(0.0);

    RunSummary {
        cases_scored,
        customers: run.customers.len(),
        avg_ofi,
        max_ofi,
        tier_method: run.tiers.method,
        weekly_buckets: run.trends.weekly.len(),
        monthly_buckets: run.trends.monthly.len(),
        severity_trend: run.trends.severity.is_some(),
        artifacts: artifact_names(run, top_n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaseTable;
    use crate::pipeline::compute;
    use crate::source::{read_cases, read_refunds, read_timeline};

    const CASES: &str = "case_id,customer_id,priority,escalated_flag,reopened_flag,delay_minutes,resolution_minutes\n\
1,A,high,1,0,60,120\n\
2,B,low,0,0,0,0\n\
3,C,medium,0,1,90,60\n";
    const REFUNDS: &str = "refund_id,case_id,refund_amount_eur\nR1,3,20\n";
    const TIMELINE: &str = "case_id,event_timestamp\n1,2024-03-04 09:00:00\n3,2024-03-05 09:00:00\n";

    fn sample_run(cases: &str) -> OfiRun {
        let table: CaseTable = read_cases(cases.as_bytes()).expect("cases parse");
        let refunds = read_refunds(REFUNDS.as_bytes()).expect("refunds parse");
        let timeline = read_timeline(TIMELINE.as_bytes()).expect("timeline parses");
        compute(table, &refunds, &timeline).expect("run computes")
    }

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> OfiResult<()>,
    {
        let mut buffer = Vec::new();
        write(&mut buffer).expect("artifact renders");
        String::from_utf8(buffer).expect("utf-8 output")
    }

    #[test]
    fn case_scores_carry_every_derived_field() {
        let run = sample_run(CASES);
        let output = render(|buffer| write_case_scores(buffer, &run.cases));
        let mut lines = output.lines();

        assert_eq!(
            lines.next(),
            Some(
                "case_id,customer_id,priority,escalated_flag,reopened_flag,delay_minutes,\
resolution_minutes,priority_score,escalation_score,reopen_score,delay_score,resolution_score,\
refund_eur,refund_score,touch_count,touch_score,OFI"
            )
        );
        assert_eq!(
            lines.next(),
            Some("1,A,high,1,0,60.0,120.0,3.0,2.0,0.0,1.0,1.0,0.0,0.0,1,0.5,7.5")
        );
    }

    #[test]
    fn weekly_trend_has_label_and_mean() {
        let run = sample_run(CASES);
        let output = render(|buffer| write_weekly_trend(buffer, &run));

        assert_eq!(output, "week,OFI\n2024-W10,7.25\n");
    }

    #[test]
    fn tiers_use_friction_labels() {
        let run = sample_run(CASES);
        let output = render(|buffer| write_customer_tiers(buffer, &run));

        assert!(output.starts_with("customer_id,OFI,tier\n"));
        assert!(output.contains("Low Friction"));
        assert!(output.contains("High Friction"));
    }

    #[test]
    fn artifacts_are_byte_identical_across_runs() {
        let first = tempfile::tempdir().expect("temp dir");
        let second = tempfile::tempdir().expect("temp dir");

        let first_paths =
            write_artifacts(&sample_run(CASES), first.path(), 50).expect("first write");
        write_artifacts(&sample_run(CASES), second.path(), 50).expect("second write");

        assert_eq!(first_paths.len(), 10);
        for path in first_paths {
            let name = path.file_name().expect("file name");
            let a = fs::read(&path).expect("read first");
            let b = fs::read(second.path().join(name)).expect("read second");
            assert_eq!(a, b, "{} differs between runs", name.to_string_lossy());
        }
    }

    #[test]
    fn severity_trend_is_omitted_without_priority() {
        let cases = "case_id,customer_id,escalated_flag,reopened_flag,delay_minutes,resolution_minutes\n\
1,A,1,0,60,120\n";
        let run = sample_run(cases);
        let dir = tempfile::tempdir().expect("temp dir");

        let written = write_artifacts(&run, dir.path(), 10).expect("artifacts written");
        assert_eq!(written.len(), 7);
        assert!(!dir.path().join(SEVERITY_TREND).exists());
        assert!(dir.path().join("top_10_cases.csv").exists());
        assert!(!summarize(&run, 10).artifacts.contains(&SEVERITY_TREND.to_string()));
    }

    #[test]
    fn kpi_artifacts_follow_the_case_and_refund_tables() {
        let run = sample_run(CASES);
        let dir = tempfile::tempdir().expect("temp dir");
        write_artifacts(&run, dir.path(), 50).expect("artifacts written");

        let by_priority =
            fs::read_to_string(dir.path().join(KPI_CASES_BY_PRIORITY)).expect("read counts");
        assert_eq!(by_priority, "priority,case_count\nhigh,1\nlow,1\nmedium,1\n");
        let resolution = fs::read_to_string(dir.path().join(KPI_RESOLUTION_BY_PRIORITY))
            .expect("read resolution");
        assert!(resolution.starts_with("priority,avg_resolution_minutes\nhigh,120.0\n"));
        let refunds =
            fs::read_to_string(dir.path().join(KPI_REFUNDS_SUMMARY)).expect("read refunds");
        assert_eq!(refunds, "total_refund_eur,refund_count\n20.0,1\n");
    }

    #[test]
    fn blocked_destination_leaves_previous_artifacts_untouched() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join(CASE_SCORES), "previous run\n").expect("seed old artifact");
        fs::create_dir(dir.path().join(CUSTOMER_TIERS)).expect("blocking directory");

        let err = write_artifacts(&sample_run(CASES), dir.path(), 50).expect_err("blocked");
        assert!(matches!(err, OfiError::ArtifactBlocked { .. }));

        let mut entries: Vec<String> = fs::read_dir(dir.path())
            .expect("list output dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec![CUSTOMER_TIERS.to_string(), CASE_SCORES.to_string()]);
        assert_eq!(
            fs::read_to_string(dir.path().join(CASE_SCORES)).expect("read old artifact"),
            "previous run\n"
        );
    }

    #[test]
    fn rerun_without_priority_removes_stale_priority_artifacts() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_artifacts(&sample_run(CASES), dir.path(), 50).expect("first write");
        assert!(dir.path().join(SEVERITY_TREND).is_file());

        let cases = "case_id,customer_id,escalated_flag,reopened_flag,delay_minutes,resolution_minutes\n\
1,A,1,0,60,120\n";
        write_artifacts(&sample_run(cases), dir.path(), 50).expect("second write");

        for name in OPTIONAL_ARTIFACTS {
            assert!(!dir.path().join(name).exists(), "{name} survived the rerun");
        }
        assert!(dir.path().join(KPI_REFUNDS_SUMMARY).is_file());
        let leftovers = fs::read_dir(dir.path())
            .expect("list output dir")
            .filter(|entry| entry.as_ref().map(|e| e.path().is_dir()).unwrap_or(false))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn summary_reports_mean_and_max() {
        let run = sample_run(CASES);
        let summary = summarize(&run, 50);

        assert_eq!(summary.cases_scored, 3);
        assert_eq!(summary.customers, 3);
        assert_eq!(summary.max_ofi, 7.5);
        assert!((summary.avg_ofi - (7.5 + 1.0 + 7.0) / 3.0).abs() < 1e-9);
        assert_eq!(summary.artifacts.len(), 10);
    }
}
