use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use shed_migrate_lib::import::{purge_migrated, GateFile, OneShotGate};
use shed_migrate_lib::{db, logging, migrate, run_import, AppError, ImportConfig};

/// Exit code when the import rolled back.
const ROLLED_BACK_EXIT_CODE: i32 = 2;
/// Exit code when another process holds the run lock.
const ALREADY_RUNNING_EXIT_CODE: i32 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "shed-migrate",
    about = "Import a legacy Writing Shed store into the current database",
    version
)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct PathArgs {
    /// Support directory holding the legacy store, database and gate.
    #[arg(long, global = true)]
    support_dir: Option<PathBuf>,
    /// Legacy store file to read.
    #[arg(long, global = true)]
    legacy_store: Option<PathBuf>,
    /// Target database file.
    #[arg(long, global = true)]
    target_db: Option<PathBuf>,
    /// One-shot gate file.
    #[arg(long, global = true)]
    gate_file: Option<PathBuf>,
    /// Directory for persisted import reports.
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the import once and print the final report as JSON.
    Run {
        /// Also write logs to a daily-rolling file in the support directory.
        #[arg(long)]
        log_file: bool,
    },
    /// Show gate state and whether a legacy store is present.
    Status,
    /// Delete migration-created rows and re-open the gate.
    Purge,
    /// Re-open the gate without touching data.
    ResetGate,
}

fn resolve_config(paths: PathArgs) -> Result<ImportConfig> {
    let mut config = match paths.support_dir {
        Some(dir) => ImportConfig::for_support_dir(dir),
        None => ImportConfig::from_env().context("resolve support directory")?,
    };
    if let Some(path) = paths.legacy_store {
        config = config.with_legacy_store(path);
    }
    if let Some(path) = paths.target_db {
        config = config.with_target_db(path);
    }
    if let Some(path) = paths.gate_file {
        config = config.with_gate_file(path);
    }
    if let Some(path) = paths.reports_dir {
        config = config.with_reports_dir(path);
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    match handle_cli(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn handle_cli(cli: Cli) -> Result<i32> {
    let config = resolve_config(cli.paths)?;
    let _guard = match &cli.command {
        Commands::Run { log_file: true } => Some(logging::init_with_file(&config.logs_dir)?),
        _ => {
            logging::init();
            None
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    match cli.command {
        Commands::Run { .. } => runtime.block_on(handle_run(&config)),
        Commands::Status => handle_status(&config),
        Commands::Purge => runtime.block_on(handle_purge(&config)),
        Commands::ResetGate => {
            GateFile::new(&config.gate_file).store(OneShotGate::Allowed)?;
            println!("Import gate reset to allowed.");
            Ok(0)
        }
    }
}

async fn handle_run(config: &ImportConfig) -> Result<i32> {
    let run = match run_import(config).await {
        Ok(run) => run,
        Err(err) if err.code() == "IMPORT/ALREADY_RUNNING" => {
            eprintln!("Error: {err}");
            return Ok(ALREADY_RUNNING_EXIT_CODE);
        }
        Err(err) => return Err(err.into()),
    };

    let payload = json!({
        "report": run.report,
        "gate": run.gate,
        "reportPath": run.report_path,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("serialize import report")?
    );

    if run.report.is_rolled_back() {
        eprintln!("The import did not complete and nothing was imported. Try again later.");
        return Ok(ROLLED_BACK_EXIT_CODE);
    }
    Ok(0)
}

fn handle_status(config: &ImportConfig) -> Result<i32> {
    let gate_file = GateFile::new(&config.gate_file);
    let gate = gate_file.load()?;
    let payload = json!({
        "gate": gate,
        "gateFile": gate_file.path().display().to_string(),
        "legacyStore": config.legacy_store.display().to_string(),
        "legacyStorePresent": shed_migrate_lib::legacy::is_present(&config.legacy_store),
        "targetDb": config.target_db.display().to_string(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("serialize status")?
    );
    Ok(0)
}

async fn handle_purge(config: &ImportConfig) -> Result<i32> {
    let gate_file = GateFile::new(&config.gate_file);
    let _lock = gate_file.lock().map_err(AppError::from)?;

    let pool = db::open_target_pool(&config.target_db).await?;
    migrate::apply_migrations(&pool).await?;
    let summary = purge_migrated(&pool).await;
    pool.close().await;
    let summary = summary?;

    gate_file.store(OneShotGate::Allowed)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("serialize purge summary")?
    );
    Ok(0)
}
