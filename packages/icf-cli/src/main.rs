//! ICF drafting CLI
//!
//! Loads a protocol and a section registry, extracts every section with the
//! configured model, and writes `extraction_report.json` and `draft_icf.md`.
//! Ctrl-C cancels the run; the partial report is still written.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use icf_extraction::{
    assemble::{ReportSummary, DRAFT_FILE, REPORT_FILE},
    load_protocol, load_registry, write_draft, write_report_json, AICredentials,
    ExtractionEngine, ExtractionReport, ExtractionStatus, OpenAI, Orchestrator, RateLimitedAI,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.default_log_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    // Everything fatal happens before the first variable is processed
    let provider = args.provider().context("Invalid --backend")?;
    let engine_config = args.engine_config().context("Invalid engine settings")?;
    let orchestrator_config = args
        .orchestrator_config()
        .context("Invalid orchestrator settings")?;

    let variables = load_registry(&args.registry)
        .with_context(|| format!("Failed to load registry {}", args.registry.display()))?;
    let store = load_protocol(&args.protocol)
        .with_context(|| format!("Failed to load protocol {}", args.protocol.display()))?;

    let mut credentials = AICredentials::from_env(provider, args.model.clone())
        .context("Missing API credential")?;
    if let Some(url) = &args.base_url {
        credentials = credentials.with_base_url(url.clone());
    }

    tracing::info!(
        backend = %provider,
        model = %args.model,
        endpoint = credentials.endpoint(),
        variables = variables.len(),
        pages = store.page_count(),
        workers = orchestrator_config.effective_workers(),
        "Starting ICF extraction"
    );

    let ai = RateLimitedAI::per_minute(OpenAI::new(credentials), args.requests_per_minute);
    let orchestrator = Orchestrator::new(ExtractionEngine::new(ai, engine_config), orchestrator_config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let report = orchestrator.run(&variables, &store, &cancel).await;

    let report_path =
        write_report_json(&report, &args.output_dir).context("Failed to write report")?;
    let draft_path =
        write_draft(&report, &variables, &args.output_dir).context("Failed to write draft")?;

    print_summary(&report);
    println!();
    println!("  {} {}", REPORT_FILE.bold(), report_path.display());
    println!("  {} {}", DRAFT_FILE.bold(), draft_path.display());

    Ok(())
}

fn print_summary(report: &ExtractionReport) {
    let summary = ReportSummary::from_report(report);

    println!();
    println!("{}", "EXTRACTION SUMMARY".bright_cyan().bold());
    println!("  Total sections:  {}", summary.total_sections);

    for (status, count) in report.counts.iter() {
        let label = format!("{:<15}", status.as_str());
        let line = format!("  {} {}", label, count);
        let line = match status {
            ExtractionStatus::Found | ExtractionStatus::StandardText => line.green(),
            ExtractionStatus::Partial => line.yellow(),
            ExtractionStatus::NotFound | ExtractionStatus::Skipped => line.normal(),
            ExtractionStatus::Error if count > 0 => line.red().bold(),
            ExtractionStatus::Error => line.normal(),
        };
        println!("{}", line);
    }

    let issues = format!("  Validation issues: {}", summary.validation_issues);
    if summary.validation_issues > 0 {
        println!("{}", issues.yellow());
    } else {
        println!("{}", issues);
    }
    println!("  Elapsed:         {:.1}s", summary.elapsed_seconds);

    if summary.cancelled {
        println!(
            "{}",
            "  Run was cancelled; unfinished sections are marked ERROR.".red()
        );
    }
}
