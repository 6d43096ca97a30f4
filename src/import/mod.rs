pub mod folders;
pub mod gate;
pub mod mapping;
pub mod orchestrator;
pub mod progress;
pub mod purge;
pub mod report;
mod table_order;

use std::path::PathBuf;

use tracing::{error, info, warn};

pub use folders::{FolderSynthesizer, Routed, CATCH_ALL_FOLDER};
pub use gate::{GateFile, OneShotGate, RunLock};
pub use mapping::{IdCache, Mapped};
pub use orchestrator::ImportOrchestrator;
pub use progress::{ImportProgress, ProgressTracker};
pub use purge::{purge_migrated, PurgeSummary};
pub use report::{
    write_import_report, EntityCounters, FatalError, ImportReport, ImportState, ImportWarning,
    WarningKind,
};

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::store::TargetStore;
use crate::{db, migrate};

/// What a host invocation of the import produced.
#[derive(Debug)]
pub struct ImportRun {
    pub report: ImportReport,
    pub gate: OneShotGate,
    /// Set when the report was written to the reports directory.
    pub report_path: Option<PathBuf>,
}

/// Full host entry point: takes the run lock, loads the gate, prepares the
/// target database, runs the orchestrator and persists the gate. A consumed
/// gate returns before the target database is opened.
pub async fn run_import(config: &ImportConfig) -> Result<ImportRun, AppError> {
    let gate_file = GateFile::new(&config.gate_file);
    let _lock = gate_file.lock()?;
    let mut gate = gate_file.load()?;
    if !gate.is_allowed() {
        info!(target: "shed_migrate", event = "import_skipped", reason = "gate_consumed");
        let mut report = ImportReport::new();
        report.finish(ImportState::Done, 0);
        return Ok(ImportRun {
            report,
            gate,
            report_path: None,
        });
    }

    let pool = db::open_target_pool(&config.target_db).await?;
    migrate::apply_migrations(&pool).await?;

    let mut orchestrator =
        ImportOrchestrator::new(&config.legacy_store, TargetStore::new(pool.clone()));
    let report = orchestrator.run(&mut gate).await;
    pool.close().await;

    if !gate.is_allowed() {
        if let Err(err) = gate_file.store(gate) {
            // Committed rows with an allowed gate would be imported again.
            error!(
                target: "shed_migrate",
                event = "gate_store_failed",
                error = %err
            );
            return Err(err.into());
        }
    }

    // The outcome is already final here; a missing report file only costs
    // the persisted copy.
    let report_path = match write_import_report(&config.reports_dir, &config.legacy_store, &report) {
        Ok(path) => {
            info!(target: "shed_migrate", event = "import_report_written", path = %path.display());
            Some(path)
        }
        Err(err) => {
            warn!(
                target: "shed_migrate",
                event = "import_report_write_failed",
                error = %format!("{err:#}")
            );
            None
        }
    };

    Ok(ImportRun {
        report,
        gate,
        report_path,
    })
}
