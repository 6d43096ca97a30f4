use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use std::io::Error as IoError;
use thiserror::Error;
use ts_rs::TS;

/// A structured application error that can be serialized and handed to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[ts(as = "Option<HashMap<String, String>>", optional)]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(table) = db.table() {
                    app_error = app_error.with_context("table", table.to_string());
                }
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::PoolTimedOut | SqlxError::PoolClosed => {
                AppError::new("SQLX/POOL", error.to_string())
            }
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

/// Conditions that abort a whole import run.
///
/// Record-level defects never travel through this type; they are carried by
/// [`crate::import::mapping::Mapped`] and end up as report warnings.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("legacy store unavailable at {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("failed to read {entity} from legacy store: {source}")]
    SourceRead {
        entity: &'static str,
        #[source]
        source: SqlxError,
    },
    #[error("target store write failed during {step}: {source}")]
    TargetWrite {
        step: &'static str,
        #[source]
        source: SqlxError,
    },
    #[error("import pipeline invariant violated: {0}")]
    PipelineInvariant(String),
    #[error("failed to persist import gate at {path}: {source}")]
    Gate {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("another import run holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("rollback failed after {original}: {source}")]
    RollbackFailed {
        original: Box<ImportError>,
        #[source]
        source: SqlxError,
    },
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::SourceUnavailable { .. } => "IMPORT/SOURCE_UNAVAILABLE",
            ImportError::SourceRead { .. } => "IMPORT/SOURCE_READ",
            ImportError::TargetWrite { .. } => "IMPORT/TARGET_WRITE",
            ImportError::PipelineInvariant(_) => "IMPORT/PIPELINE_INVARIANT",
            ImportError::Gate { .. } => "IMPORT/GATE",
            ImportError::AlreadyRunning(_) => "IMPORT/ALREADY_RUNNING",
            ImportError::RollbackFailed { .. } => "IMPORT/ROLLBACK_FAILED",
        }
    }

    pub(crate) fn source_read(entity: &'static str) -> impl FnOnce(SqlxError) -> ImportError {
        move |source| ImportError::SourceRead { entity, source }
    }

    pub(crate) fn target_write(step: &'static str) -> impl FnOnce(SqlxError) -> ImportError {
        move |source| ImportError::TargetWrite { step, source }
    }
}

impl From<ImportError> for AppError {
    fn from(error: ImportError) -> Self {
        let code = error.code();
        let message = error.to_string();
        match error {
            ImportError::SourceUnavailable { path, .. } => {
                AppError::new(code, message).with_context("path", path.display().to_string())
            }
            ImportError::SourceRead { entity, source } => AppError::new(code, message)
                .with_context("entity", entity)
                .with_cause(source),
            ImportError::TargetWrite { step, source } => AppError::new(code, message)
                .with_context("step", step)
                .with_cause(source),
            ImportError::Gate { path, source } => AppError::new(code, message)
                .with_context("path", path.display().to_string())
                .with_cause(source),
            ImportError::AlreadyRunning(path) => {
                AppError::new(code, message).with_context("lock", path.display().to_string())
            }
            ImportError::RollbackFailed { original, source } => AppError::new(code, message)
                .with_context("original_code", original.code())
                .with_cause(source),
            ImportError::PipelineInvariant(_) => AppError::new(code, message),
        }
    }
}
