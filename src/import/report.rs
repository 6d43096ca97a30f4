use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::mapping::Mapped;
use crate::error::ImportError;
use crate::legacy::LegacyKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ImportState {
    Idle,
    Connecting,
    Mapping,
    Committing,
    Done,
    RolledBack,
}

impl ImportState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ImportState::Idle => "idle",
            ImportState::Connecting => "connecting",
            ImportState::Mapping => "mapping",
            ImportState::Committing => "committing",
            ImportState::Done => "done",
            ImportState::RolledBack => "rolled_back",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ImportState::Done | ImportState::RolledBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum WarningKind {
    /// A default value replaced a defective one; the record was imported.
    Substituted,
    /// The record was left out.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ImportWarning {
    pub entity: String,
    pub legacy_key: Option<String>,
    pub kind: WarningKind,
    pub message: String,
}

impl ImportWarning {
    pub fn substituted(key: LegacyKey, message: impl Into<String>) -> Self {
        Self {
            entity: key.entity.label().to_string(),
            legacy_key: Some(key.to_string()),
            kind: WarningKind::Substituted,
            message: message.into(),
        }
    }

    pub fn skipped(key: LegacyKey, message: impl Into<String>) -> Self {
        Self {
            entity: key.entity.label().to_string(),
            legacy_key: Some(key.to_string()),
            kind: WarningKind::Skipped,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EntityCounters {
    #[ts(type = "number")]
    pub imported: u64,
    #[ts(type = "number")]
    pub substituted: u64,
    #[ts(type = "number")]
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct FatalError {
    pub code: String,
    pub message: String,
}

impl From<&ImportError> for FatalError {
    fn from(error: &ImportError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one import run, handed to the caller for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ImportReport {
    pub state: ImportState,
    #[ts(type = "number")]
    pub projects_processed: u64,
    /// Documents imported.
    #[ts(type = "number")]
    pub success_count: u64,
    #[ts(type = "number")]
    pub warning_count: u64,
    pub warnings: Vec<ImportWarning>,
    pub entities: BTreeMap<String, EntityCounters>,
    pub fatal: Option<FatalError>,
    pub started_at: String,
    pub finished_at: Option<String>,
    #[ts(type = "number")]
    pub duration_ms: u64,
}

impl ImportReport {
    pub fn new() -> Self {
        Self {
            state: ImportState::Idle,
            projects_processed: 0,
            success_count: 0,
            warning_count: 0,
            warnings: Vec::new(),
            entities: BTreeMap::new(),
            fatal: None,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            duration_ms: 0,
        }
    }

    pub fn warn(&mut self, warning: ImportWarning) {
        self.warnings.push(warning);
        self.warning_count = self.warnings.len() as u64;
    }

    /// Folds a mapping outcome into the counters and warnings, returning
    /// the value when there is one to insert.
    pub fn absorb<T>(&mut self, entity: &'static str, outcome: Mapped<T>) -> Option<T> {
        let counters = self.entities.entry(entity.to_string()).or_default();
        match outcome {
            Mapped::Ok(value) => {
                counters.imported += 1;
                Some(value)
            }
            Mapped::Substituted(value, warnings) => {
                counters.imported += 1;
                counters.substituted += 1;
                for warning in warnings {
                    self.warn(warning);
                }
                Some(value)
            }
            Mapped::Skipped(warning) => {
                counters.skipped += 1;
                self.warn(warning);
                None
            }
        }
    }

    pub fn count_imported(&mut self, entity: &'static str) {
        self.entities.entry(entity.to_string()).or_default().imported += 1;
    }

    pub fn finish(&mut self, state: ImportState, duration_ms: u64) {
        self.state = state;
        self.finished_at = Some(Utc::now().to_rfc3339());
        self.duration_ms = duration_ms;
    }

    pub fn is_rolled_back(&self) -> bool {
        self.state == ImportState::RolledBack
    }
}

impl Default for ImportReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportReportFile<'a> {
    generated_at: String,
    legacy_store: String,
    report: &'a ImportReport,
}

pub fn write_import_report(
    reports_dir: &Path,
    legacy_store: &Path,
    report: &ImportReport,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let timestamp = Utc::now().format("import-%Y%m%d-%H%M%S.json");
    let path = reports_dir.join(timestamp.to_string());
    let payload = ImportReportFile {
        generated_at: Utc::now().to_rfc3339(),
        legacy_store: legacy_store.display().to_string(),
        report,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize import report")?;
    fs::write(&path, json).with_context(|| format!("write import report {}", path.display()))?;
    Ok(path)
}
