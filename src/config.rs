use std::path::{Path, PathBuf};

use anyhow::anyhow;

/// Identifier of the per-installation support directory.
pub const BUNDLE_ID: &str = "com.writingshed.pro";
/// Overrides the support directory (tests and headless runs).
pub const FAKE_APPDATA_ENV: &str = "SHED_FAKE_APPDATA";
/// Overrides the legacy store location.
pub const LEGACY_STORE_ENV: &str = "SHED_LEGACY_STORE";

const LEGACY_STORE_DIR: &str = "Legacy";
const LEGACY_STORE_FILE: &str = "WritingShed.sqlite";
const TARGET_DB_FILE: &str = "shed.sqlite3";
const STATE_DIR: &str = ".legacy-import";
const GATE_FILE: &str = "gate.json";
const REPORTS_DIR: &str = "reports";
const LOGS_DIR: &str = "logs";

/// Filesystem locations used by one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub support_dir: PathBuf,
    pub legacy_store: PathBuf,
    pub target_db: PathBuf,
    pub gate_file: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ImportConfig {
    /// Derives every path from a support directory.
    pub fn for_support_dir(support_dir: impl AsRef<Path>) -> Self {
        let support_dir = support_dir.as_ref().to_path_buf();
        Self {
            legacy_store: support_dir.join(LEGACY_STORE_DIR).join(LEGACY_STORE_FILE),
            target_db: support_dir.join(TARGET_DB_FILE),
            gate_file: support_dir.join(STATE_DIR).join(GATE_FILE),
            reports_dir: support_dir.join(REPORTS_DIR),
            logs_dir: support_dir.join(LOGS_DIR),
            support_dir,
        }
    }

    /// Resolves the platform support directory, honouring the env overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let support_dir = match std::env::var(FAKE_APPDATA_ENV) {
            Ok(fake) if !fake.trim().is_empty() => PathBuf::from(fake),
            _ => dirs::data_dir()
                .or_else(|| std::env::current_dir().ok())
                .ok_or_else(|| anyhow!("failed to resolve application support directory"))?
                .join(BUNDLE_ID),
        };
        let mut config = Self::for_support_dir(support_dir);
        if let Ok(explicit) = std::env::var(LEGACY_STORE_ENV) {
            if !explicit.trim().is_empty() {
                config.legacy_store = PathBuf::from(explicit);
            }
        }
        Ok(config)
    }

    pub fn with_legacy_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_store = path.into();
        self
    }

    pub fn with_target_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_db = path.into();
        self
    }

    pub fn with_gate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.gate_file = path.into();
        self
    }

    pub fn with_reports_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports_dir = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_support_dir_layout() {
        let config = ImportConfig::for_support_dir("/data/shed");
        assert_eq!(
            config.legacy_store,
            PathBuf::from("/data/shed/Legacy/WritingShed.sqlite")
        );
        assert_eq!(config.target_db, PathBuf::from("/data/shed/shed.sqlite3"));
        assert_eq!(
            config.gate_file,
            PathBuf::from("/data/shed/.legacy-import/gate.json")
        );
        assert_eq!(config.reports_dir, PathBuf::from("/data/shed/reports"));
    }

    #[test]
    fn overrides_replace_single_paths() {
        let config = ImportConfig::for_support_dir("/data/shed")
            .with_legacy_store("/tmp/old.sqlite")
            .with_target_db("/tmp/new.sqlite3");
        assert_eq!(config.legacy_store, PathBuf::from("/tmp/old.sqlite"));
        assert_eq!(config.target_db, PathBuf::from("/tmp/new.sqlite3"));
        assert_eq!(
            config.gate_file,
            PathBuf::from("/data/shed/.legacy-import/gate.json")
        );
    }
}
