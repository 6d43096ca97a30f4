//! The persisted run-once flag plus the advisory lock held while a run is
//! in progress.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OneShotGate {
    #[default]
    Allowed,
    Consumed,
}

impl OneShotGate {
    pub fn is_allowed(self) -> bool {
        self == OneShotGate::Allowed
    }

    pub fn consume(&mut self) {
        *self = OneShotGate::Consumed;
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OneShotGate::Allowed => "allowed",
            OneShotGate::Consumed => "consumed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateRecord {
    state: OneShotGate,
    updated_at: String,
}

#[derive(Debug, Clone)]
pub struct GateFile {
    path: PathBuf,
}

impl GateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn gate_error(&self, source: io::Error) -> ImportError {
        ImportError::Gate {
            path: self.path.clone(),
            source,
        }
    }

    /// A missing file reads as `Allowed`.
    pub fn load(&self) -> Result<OneShotGate, ImportError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(OneShotGate::Allowed),
            Err(err) => return Err(self.gate_error(err)),
        };
        let record: GateRecord = serde_json::from_str(&raw)
            .map_err(|err| self.gate_error(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        Ok(record.state)
    }

    pub fn store(&self, gate: OneShotGate) -> Result<(), ImportError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.gate_error(err))?;
        }
        let record = GateRecord {
            state: gate,
            updated_at: Utc::now().to_rfc3339(),
        };
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|err| self.gate_error(io::Error::new(io::ErrorKind::InvalidData, err)))?;

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(|err| self.gate_error(err))?;
        file.write_all(&bytes).map_err(|err| self.gate_error(err))?;
        file.sync_all().map_err(|err| self.gate_error(err))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|err| self.gate_error(err))?;

        info!(
            target: "shed_migrate",
            event = "gate_stored",
            state = gate.as_str(),
            path = %self.path.display()
        );
        Ok(())
    }

    /// Takes the exclusive run lock without blocking.
    pub fn lock(&self) -> Result<RunLock, ImportError> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.gate_error(err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| self.gate_error(err))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(RunLock {
                file,
                path: lock_path,
            }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                warn!(
                    target: "shed_migrate",
                    event = "gate_lock_contended",
                    path = %lock_path.display()
                );
                Err(ImportError::AlreadyRunning(lock_path))
            }
            Err(err) => Err(self.gate_error(err)),
        }
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(
                target: "shed_migrate",
                event = "gate_unlock_failed",
                path = %self.path.display(),
                error = %err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateFile::new(dir.path().join("gate.json"));
        assert_eq!(gate.load().unwrap(), OneShotGate::Allowed);
    }

    #[test]
    fn store_round_trips_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateFile::new(dir.path().join("nested").join("gate.json"));
        gate.store(OneShotGate::Consumed).unwrap();
        assert_eq!(gate.load().unwrap(), OneShotGate::Consumed);
        assert!(!gate.path().with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_gate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        fs::write(&path, "{ nope").unwrap();
        let err = GateFile::new(&path).load().unwrap_err();
        assert_eq!(err.code(), "IMPORT/GATE");
    }

    #[test]
    fn second_lock_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateFile::new(dir.path().join("gate.json"));
        let held = gate.lock().unwrap();
        let err = gate.lock().unwrap_err();
        assert!(matches!(err, ImportError::AlreadyRunning(_)));
        drop(held);
        assert!(gate.lock().is_ok());
    }

    #[test]
    fn default_gate_is_allowed_until_consumed() {
        let mut gate = OneShotGate::default();
        assert!(gate.is_allowed());
        gate.consume();
        assert!(!gate.is_allowed());
        assert_eq!(gate.as_str(), "consumed");
    }
}
