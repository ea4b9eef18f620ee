//! k12qa: data-quality checks and KPIs for K-12 administrative extracts.
//!
//! Reads a directory of raw CSV extracts, runs every enabled quality rule,
//! writes a schema-validated QA report, curated tables, and district KPIs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use k12qa_core::logging::{LogFormat, init_logging};
use k12qa_core::quality::RatioBounds;
use k12qa_core::{
    CuratedTables, Dataset, InputConfig, K12QaError, MetricCalculator, PipelineConfig, QaReport,
    Result, RuleRegistry, initialize_report_validator, pipeline,
};
use tracing::{error, info, warn};

mod output;

/// Exit code used when `--fail-on-halt` is set and the report says halt.
const HALT_EXIT_CODE: i32 = 2;

/// Command-line interface for k12qa.
#[derive(Parser)]
#[command(name = "k12qa")]
#[command(about = "Data-quality checks and KPIs for K-12 administrative extracts")]
#[command(version)]
#[command(
    long_about = "Validates school, student, educator, staffing, and assessment extracts \
    against a fixed set of data-quality rules, then builds curated tables and district KPIs. \
    Findings are written to a JSON report; data problems never abort the run."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format (text or json)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run quality checks, then write the report, curated tables, and KPIs
    Run(RunArgs),
    /// Run quality checks only
    Check(CheckArgs),
    /// Build curated tables and KPIs without quality checks
    Metrics(MetricsArgs),
    /// List the registered quality rules
    Rules,
}

/// Options shared by every command that reads an input directory.
#[derive(Args)]
struct InputArgs {
    /// Directory holding the raw CSV extracts
    #[arg(short, long, default_value = "data/raw")]
    input: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// School year applied to enrollment rows that do not carry one
    #[arg(long)]
    school_year: Option<i32>,

    /// Timestamp recorded in the report (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    run_timestamp: Option<DateTime<Utc>>,
}

/// Overrides for the quality section of the configuration.
#[derive(Args)]
struct QualityArgs {
    /// Halt when any warning is found, not only on errors
    #[arg(long)]
    halt_on_warning: bool,

    /// Acceptable students-per-teacher range as MIN:MAX
    #[arg(long, value_parser = parse_ratio_bounds)]
    ratio_bounds: Option<RatioBounds>,

    /// Skip a rule by id (repeatable)
    #[arg(long = "disable-rule", value_name = "RULE_ID")]
    disabled_rules: Vec<String>,

    /// Exit with status 2 after writing outputs when the report says halt
    #[arg(long)]
    fail_on_halt: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    quality: QualityArgs,

    /// Output directory
    #[arg(short, long, default_value = "data/processed")]
    output: PathBuf,

    /// Report path, defaults to <output>/qa_report.json
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    quality: QualityArgs,

    /// Report path, prints the report to stdout when omitted
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct MetricsArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output directory
    #[arg(short, long, default_value = "data/processed")]
    output: PathBuf,
}

fn parse_ratio_bounds(s: &str) -> std::result::Result<RatioBounds, String> {
    let (min, max) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got '{s}'"))?;
    let min: f64 = min
        .trim()
        .parse()
        .map_err(|e| format!("invalid minimum '{min}': {e}"))?;
    let max: f64 = max
        .trim()
        .parse()
        .map_err(|e| format!("invalid maximum '{max}': {e}"))?;
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(format!("invalid ratio bounds {min}:{max}"));
    }
    Ok(RatioBounds::new(min, max))
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{s}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format)?;

    // Compile the report schema once before any run
    initialize_report_validator().map_err(|e| {
        K12QaError::configuration(format!("Failed to initialize report validator: {e}"))
    })?;

    let result = match cli.command {
        Command::Run(args) => run_pipeline(&args).await,
        Command::Check(args) => check(&args).await,
        Command::Metrics(args) => metrics(&args).await,
        Command::Rules => {
            list_rules();
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!("{e}");
    }
    result
}

/// Loads the configuration file, if any, and applies CLI overrides.
fn build_config(input: &InputArgs, quality: Option<&QualityArgs>) -> Result<PipelineConfig> {
    let mut config = match &input.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(year) = input.school_year {
        config.input.default_school_year = Some(year);
    }

    if let Some(quality) = quality {
        if quality.halt_on_warning {
            config.quality.halt_on_warning = true;
        }
        if let Some(bounds) = quality.ratio_bounds {
            config.quality.staffing_ratio = bounds;
        }
        let known: Vec<&str> = RuleRegistry::standard().rules().iter().map(|r| r.id()).collect();
        for rule_id in &quality.disabled_rules {
            if !known.contains(&rule_id.as_str()) {
                return Err(K12QaError::configuration(format!(
                    "Unknown rule '{rule_id}', run `k12qa rules` for the list"
                )));
            }
            config.quality.disabled_rules.push(rule_id.clone());
        }
    }

    config.validate()?;
    Ok(config)
}

/// Decodes the input directory on a blocking thread.
async fn load_dataset(dir: &Path, input: &InputConfig) -> Result<Dataset> {
    info!("Loading extracts from {}", dir.display());
    let dir = dir.to_path_buf();
    let input = input.clone();
    let dataset = tokio::task::spawn_blocking(move || Dataset::load_dir(&dir, &input))
        .await
        .map_err(|e| K12QaError::configuration(format!("Input loading task failed: {e}")))??;
    Ok(dataset)
}

fn log_summary(report: &QaReport) {
    info!(
        "QA complete: {} findings ({} errors, {} warnings, {} info)",
        report.summary.total,
        report.summary.error_count,
        report.summary.warning_count,
        report.summary.info_count
    );
    for (rule_id, count) in report.summary.by_rule.iter().filter(|(_, count)| **count > 0) {
        info!("  {rule_id}: {count}");
    }
}

fn exit_if_halted(report: &QaReport, fail_on_halt: bool) {
    if report.should_halt {
        warn!("Report indicates downstream publishing should halt");
        if fail_on_halt {
            std::process::exit(HALT_EXIT_CODE);
        }
    }
}

async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = build_config(&args.input, Some(&args.quality))?;
    let timestamp = args.input.run_timestamp.unwrap_or_else(Utc::now);
    let dataset = load_dataset(&args.input.input, &config.input).await?;

    let result = pipeline::run(Arc::new(dataset), &config, timestamp).await?;
    log_summary(&result.report);

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.output.join(output::REPORT_FILE));
    output::save_report(&result.report, &report_path).await?;
    output::save_curated(&result.curated, &args.output).await?;
    output::save_kpis(&result.kpis, &args.output).await?;

    info!("Run {} finished", result.report.run_id);
    exit_if_halted(&result.report, args.quality.fail_on_halt);
    Ok(())
}

async fn check(args: &CheckArgs) -> Result<()> {
    let config = build_config(&args.input, Some(&args.quality))?;
    let timestamp = args.input.run_timestamp.unwrap_or_else(Utc::now);
    let dataset = load_dataset(&args.input.input, &config.input).await?;

    let report = pipeline::run_quality(&dataset, &config.quality, timestamp)?;
    log_summary(&report);

    match &args.report {
        Some(path) => output::save_report(&report, path).await?,
        None => println!("{}", report.to_json()?),
    }

    exit_if_halted(&report, args.quality.fail_on_halt);
    Ok(())
}

async fn metrics(args: &MetricsArgs) -> Result<()> {
    let config = build_config(&args.input, None)?;
    let dataset = load_dataset(&args.input.input, &config.input).await?;

    let curated = CuratedTables::build(&dataset);
    let kpis = MetricCalculator::new(config.metrics).compute(&curated);
    info!("Computed {} KPI rows", kpis.len());

    output::save_curated(&curated, &args.output).await?;
    output::save_kpis(&kpis, &args.output).await?;
    Ok(())
}

fn list_rules() {
    for rule in RuleRegistry::standard().rules() {
        println!("{:<24} {}", rule.id(), rule.description());
    }
}
