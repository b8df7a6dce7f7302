use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

mod aggregate;
mod config;
mod error;
mod kpis;
mod models;
mod pipeline;
mod report;
mod scoring;
mod source;
mod telemetry;
mod tiers;
mod trends;

use config::OfiConfig;
use source::CsvDirectorySource;

#[derive(Parser)]
#[command(name = "ofi")]
#[command(about = "Operational Friction Index scoring, customer tiers and trends", long_about = None)]
struct Cli {
    /// Directory holding cases.csv, refunds.csv and case_timeline.csv
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every case and write all OFI artifacts
    Build {
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Print the highest-friction cases
    Score {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print customer friction tiers
    Tiers {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print run summary statistics
    Summary {
        #[arg(long)]
        json: bool,
        #[arg(long)]
        top: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = OfiConfig::load().context("failed to load OFI configuration")?;
    telemetry::init(&config.log_level).context("failed to initialise logging")?;

    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir.clone());
    let source = CsvDirectorySource::new(data_dir);
    let run = pipeline::run(&source)
        .with_context(|| format!("OFI batch failed for {}", source.dir().display()))?;

    match cli.command {
        Commands::Build { out_dir, top } => {
            let out_dir = out_dir.unwrap_or(config.output_dir);
            let top_n = top.unwrap_or(config.top_n);
            let written = report::write_artifacts(&run, &out_dir, top_n)
                .with_context(|| format!("failed to write artifacts to {}", out_dir.display()))?;
            info!(artifacts = written.len(), "OFI build complete");
            println!("Wrote {} artifacts to {}.", written.len(), out_dir.display());
        }
        Commands::Score { limit } => {
            if run.cases.is_empty() {
                println!("No cases found in {}.", source.dir().display());
                return Ok(());
            }

            println!("Top cases by OFI:");
            for scored in run.top_cases(limit) {
                println!(
                    "- case {} (customer {}, {}) OFI {:.2} across {} touches, {:.2} EUR refunded",
                    scored.case.case_id,
                    scored.case.customer_id,
                    scored.case.priority.as_deref().unwrap_or("no priority"),
                    scored.ofi,
                    scored.touch_count,
                    scored.refund_eur
                );
            }
        }
        Commands::Tiers { limit } => {
            if run.tiers.records.is_empty() {
                println!("No customers found in {}.", source.dir().display());
                return Ok(());
            }

            println!("Customer friction tiers ({}):", run.tiers.method);
            for record in run.tiers.records.iter().take(limit) {
                println!(
                    "- customer {} avg OFI {:.2}: {}",
                    record.customer_id, record.avg_ofi, record.tier
                );
            }
        }
        Commands::Summary { json, top } => {
            let summary = report::summarize(&run, top.unwrap_or(config.top_n));
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Cases scored: {}", summary.cases_scored);
                println!("Customers: {}", summary.customers);
                println!("Average OFI: {:.2}", summary.avg_ofi);
                println!("Max OFI: {:.2}", summary.max_ofi);
                println!("Tier method: {}", summary.tier_method);
                println!(
                    "Trend buckets: {} weeks, {} months",
                    summary.weekly_buckets, summary.monthly_buckets
                );
                println!("Artifacts: {}", summary.artifacts.join(", "));
            }
        }
    }

    Ok(())
}
