//! custody-export CLI
//!
//! Usage:
//!   custody-export run --config cfg.yaml --accounts accounts.csv --start 2025-03-01 --end 2025-03-31
//!   custody-export check-templates --config cfg.yaml
//!
//! A `.env` file next to the working directory is read first, so
//! `CUSTODY_EXPORT_CONFIG` and `CUSTODY_EXPORT_PASSWORD` can live there.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use custody_export::vision::{TemplateLibrary, ALL_TEMPLATES};
use custody_export::{
    AccountStatus, AppConfig, AttemptOutcome, BatchReport, DateRange, DocumentKind, ExportLog,
    FileLogSink,
};
use tracing::{error, info};

mod accounts;
mod logging;

#[derive(Parser)]
#[command(name = "custody-export")]
#[command(about = "Export bank statements, receipts and reconciliations from the custody portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// YAML configuration file
    #[clap(long, short = 'c', env = "CUSTODY_EXPORT_CONFIG")]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[clap(flatten)]
    config: ConfigArgs,

    /// CSV with `project,account` rows
    #[clap(long, short = 'a')]
    accounts: PathBuf,

    /// First day of the period (YYYY-MM-DD)
    #[clap(long)]
    start: String,

    /// Last day of the period (YYYY-MM-DD)
    #[clap(long)]
    end: String,

    /// Overrides `download_root` from the configuration
    #[clap(long)]
    download_root: Option<PathBuf>,

    /// Overrides `portal.password` from the configuration
    #[clap(long, env = "CUSTODY_EXPORT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every account in the list for the given period
    Run(RunArgs),
    /// Check that every template image resolves and decodes
    CheckTemplates(ConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init_logging();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::CheckTemplates(args) => check_templates(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut config = AppConfig::read(&args.config.config)?;
    if let Some(root) = args.download_root {
        config.download_root = root;
    }
    if let Some(password) = args.password {
        config.portal.password = password;
    }
    config.validate()?;

    let range = DateRange::parse(&args.start, &args.end)?;
    let batch = accounts::load_accounts(&args.accounts)?;

    let sink = FileLogSink::new(config.log_root())?;
    info!(
        accounts = batch.len(),
        %range,
        run_log = %sink.path().display(),
        diagnostics = %logging::log_dir().display(),
        "starting export"
    );
    let log = ExportLog::new().with_sink(Arc::new(sink));

    let report = custody_export::run_export(&config, &batch, range, log)
        .await
        .context("export run aborted")?;
    print_summary(&report);
    Ok(ExitCode::SUCCESS)
}

fn outcome_cell(outcome: Option<&AttemptOutcome>) -> &'static str {
    match outcome {
        Some(AttemptOutcome::Success(_)) => "ok",
        Some(AttemptOutcome::Skipped(_)) => "skipped",
        Some(AttemptOutcome::Failed(_)) => "FAILED",
        None => "-",
    }
}

fn print_summary(report: &BatchReport) {
    println!(
        "{:<24} {:<22} {:<16} {:<8} {:<10} {:<8}",
        "PROJECT", "ACCOUNT", "STATUS", "RECEIPT", "STATEMENT", "PRINT"
    );
    for account in &report.accounts {
        let status = match &account.status {
            AccountStatus::Processed => "processed".to_string(),
            AccountStatus::NoData => "no data".to_string(),
            AccountStatus::Failed { stage, .. } => format!("failed at {stage}"),
        };
        println!(
            "{:<24} {:<22} {:<16} {:<8} {:<10} {:<8}",
            account.entry.project_name,
            account.entry.account_identifier,
            status,
            outcome_cell(account.outcome(DocumentKind::Receipt)),
            outcome_cell(account.outcome(DocumentKind::Statement)),
            outcome_cell(account.outcome(DocumentKind::Reconciliation)),
        );
    }
    println!(
        "\n{} accounts, {} files exported, {} accounts failed",
        report.accounts.len(),
        report.exported_files().len(),
        report.failed_accounts()
    );
}

fn check_templates(args: ConfigArgs) -> Result<ExitCode> {
    let config = AppConfig::read(&args.config)?;
    let library = TemplateLibrary::new(
        config.resource_dir(),
        config.base_dir.clone(),
        config.matcher.threshold,
    );

    let mut missing = 0;
    for (name, outcome) in library.check(&ALL_TEMPLATES) {
        match outcome {
            Ok(path) => println!("ok       {name:<32} {}", path.display()),
            Err(e) => {
                missing += 1;
                println!("MISSING  {name:<32} {e}");
            }
        }
    }
    if missing == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\n{missing} of {} templates unusable", ALL_TEMPLATES.len());
        Ok(ExitCode::FAILURE)
    }
}
