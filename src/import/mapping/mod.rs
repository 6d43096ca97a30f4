//! Pure per-entity mapping from legacy records to target objects.
//!
//! Mappers never fail. Defects in a record surface as [`Mapped::Substituted`]
//! or [`Mapped::Skipped`] and end up in the report; only the orchestrator
//! raises fatal errors.

mod document;
mod project;
mod scene;
mod submission;
mod version;

use std::collections::HashMap;
use std::hash::Hash;

use uuid::Uuid;

pub use document::{map_document, untitled};
pub use project::{map_project, parse_project_kind};
pub use scene::{map_scene_metadata, SceneReferences};
pub use submission::{
    map_collected_version, map_collection, map_collection_submission, map_publication,
    parse_status, ImportedPublication, ImportedVersion,
};
pub use version::{map_version, order_versions, ContentInput};

use super::report::ImportWarning;
use crate::error::ImportError;
use crate::legacy::{LegacyKey, LegacyRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Mapped<T> {
    Ok(T),
    Substituted(T, Vec<ImportWarning>),
    Skipped(ImportWarning),
}

impl<T> Mapped<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Mapped::Ok(value) | Mapped::Substituted(value, _) => Some(value),
            Mapped::Skipped(_) => None,
        }
    }

    pub fn warnings(&self) -> Vec<&ImportWarning> {
        match self {
            Mapped::Ok(_) => Vec::new(),
            Mapped::Substituted(_, warnings) => warnings.iter().collect(),
            Mapped::Skipped(warning) => vec![warning],
        }
    }
}

/// Collects substitution warnings while a single record is mapped.
pub(crate) struct Substitutions {
    key: LegacyKey,
    warnings: Vec<ImportWarning>,
}

impl Substitutions {
    /// Starts with one warning per attribute that was decoded lossily.
    pub(crate) fn for_record(record: &LegacyRecord) -> Self {
        let key = record.key();
        let warnings = record
            .lossy_attributes()
            .map(|attribute| {
                ImportWarning::substituted(
                    key,
                    format!("{attribute} was not valid UTF-8; invalid bytes replaced"),
                )
            })
            .collect();
        Self { key, warnings }
    }

    pub(crate) fn note(&mut self, message: impl Into<String>) {
        self.warnings
            .push(ImportWarning::substituted(self.key, message));
    }

    pub(crate) fn finish<T>(self, value: T) -> Mapped<T> {
        if self.warnings.is_empty() {
            Mapped::Ok(value)
        } else {
            Mapped::Substituted(value, self.warnings)
        }
    }
}

/// Identity preserved from `uniqueId` when it parses; synthesized otherwise.
pub(crate) fn legacy_identity(record: &LegacyRecord, notes: &mut Substitutions) -> Uuid {
    match record.text("uniqueId") {
        None => Uuid::new_v4(),
        Some(raw) => match Uuid::parse_str(raw.trim()) {
            Ok(id) => id,
            Err(_) => {
                notes.note(format!("malformed identifier {raw:?} replaced"));
                Uuid::new_v4()
            }
        },
    }
}

pub(crate) fn required_name(record: &LegacyRecord, notes: &mut Substitutions) -> String {
    match record.text("name") {
        Some(name) => name.trim().to_string(),
        None => {
            notes.note("missing name replaced with \"Untitled\"");
            untitled()
        }
    }
}

/// Legacy key to target value. One cache per entity type, filled by the
/// phase that produces it and read only by later phases.
#[derive(Debug)]
pub struct IdCache<K, V> {
    label: &'static str,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + std::fmt::Display, V> IdCache<K, V> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Lookup that must succeed; a miss means a phase ran out of order.
    pub fn require(&self, key: &K) -> Result<&V, ImportError> {
        self.entries.get(key).ok_or_else(|| {
            ImportError::PipelineInvariant(format!("{} cache has no entry for {key}", self.label))
        })
    }
}
