//! One-time migration of a legacy Writing Shed object store into the
//! current project database.

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod legacy;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod rich_text;
pub mod store;
pub mod time;

pub use config::ImportConfig;
pub use error::{AppError, AppResult, ImportError};
pub use import::{run_import, ImportOrchestrator, ImportReport, ImportRun, ImportState, OneShotGate};
pub use store::{TargetStore, TargetTx};
