use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::schema::LegacyEntity;
use crate::time::legacy_seconds_to_ms;

/// One column value as stored in the legacy file.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Stable reference to a legacy row, used in warnings and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LegacyKey {
    pub entity: LegacyEntity,
    pub pk: i64,
}

impl fmt::Display for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity.entity_name(), self.pk)
    }
}

/// A legacy object: its entity, primary key and scalar attributes. Foreign
/// keys are kept under their relationship attribute name.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    entity: LegacyEntity,
    pk: i64,
    attributes: BTreeMap<&'static str, LegacyValue>,
    /// Text attributes whose stored bytes were not valid UTF-8.
    lossy: BTreeSet<&'static str>,
}

impl LegacyRecord {
    pub fn new(entity: LegacyEntity, pk: i64) -> Self {
        Self {
            entity,
            pk,
            attributes: BTreeMap::new(),
            lossy: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, name: &'static str, value: LegacyValue) -> Self {
        self.attributes.insert(name, value);
        self
    }

    /// Text decoded with replacement characters.
    pub fn with_lossy_text(mut self, name: &'static str, text: impl Into<String>) -> Self {
        self.attributes.insert(name, LegacyValue::Text(text.into()));
        self.lossy.insert(name);
        self
    }

    pub(crate) fn set(&mut self, name: &'static str, value: LegacyValue) {
        self.attributes.insert(name, value);
    }

    pub(crate) fn mark_lossy(&mut self, name: &'static str) {
        self.lossy.insert(name);
    }

    pub fn lossy_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.lossy.iter().copied()
    }

    pub fn entity(&self) -> LegacyEntity {
        self.entity
    }

    pub fn pk(&self) -> i64 {
        self.pk
    }

    pub fn key(&self) -> LegacyKey {
        LegacyKey {
            entity: self.entity,
            pk: self.pk,
        }
    }

    pub fn value(&self, name: &str) -> Option<&LegacyValue> {
        self.attributes.get(name)
    }

    /// Text attribute; empty and whitespace-only strings count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(LegacyValue::Text(value)) if !value.trim().is_empty() => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(LegacyValue::Integer(value)) => Some(*value),
            Some(LegacyValue::Real(value)) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            Some(LegacyValue::Text(value)) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.integer(name).map(|value| value != 0)
    }

    /// Timestamp attribute converted from reference-date seconds to Unix ms.
    pub fn timestamp_ms(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(LegacyValue::Real(value)) => legacy_seconds_to_ms(*value),
            Some(LegacyValue::Integer(value)) => legacy_seconds_to_ms(*value as f64),
            _ => None,
        }
    }
}
