use serde::Serialize;
use tokio::sync::watch;
use ts_rs::TS;

use super::report::ImportState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ImportProgress {
    pub state: ImportState,
    pub current_project: Option<String>,
    pub phase: Option<String>,
    #[ts(type = "number")]
    pub projects_done: u64,
    #[ts(type = "number")]
    pub projects_total: u64,
    #[ts(type = "number")]
    pub records_processed: u64,
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self {
            state: ImportState::Idle,
            current_project: None,
            phase: None,
            projects_done: 0,
            projects_total: 0,
            records_processed: 0,
        }
    }
}

/// Publishes progress snapshots. Receivers can only observe; nothing flows
/// back into the run.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<ImportProgress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ImportProgress::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportProgress> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ImportProgress {
        self.tx.borrow().clone()
    }

    pub fn set_state(&self, state: ImportState) {
        self.tx.send_modify(|progress| {
            progress.state = state;
            if state.is_terminal() {
                progress.current_project = None;
                progress.phase = None;
            }
        });
    }

    pub fn set_total(&self, projects_total: u64) {
        self.tx
            .send_modify(|progress| progress.projects_total = projects_total);
    }

    pub fn start_project(&self, name: &str) {
        self.tx.send_modify(|progress| {
            progress.state = ImportState::Mapping;
            progress.current_project = Some(name.to_string());
            progress.phase = None;
        });
    }

    pub fn set_phase(&self, phase: &'static str) {
        self.tx
            .send_modify(|progress| progress.phase = Some(phase.to_string()));
    }

    pub fn record_processed(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.tx
            .send_modify(|progress| progress.records_processed += count);
    }

    pub fn finish_project(&self) {
        self.tx.send_modify(|progress| {
            progress.projects_done += 1;
            progress.phase = None;
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
