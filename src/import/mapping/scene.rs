use uuid::Uuid;

use super::{Mapped, Substitutions};
use crate::legacy::LegacyRecord;
use crate::model::{SceneKind, SceneMetadata};

/// Cross references gathered by the orchestrator before mapping. Names are
/// stored as found; nothing reconciles them after a rename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneReferences {
    pub character_names: Vec<String>,
    pub location_names: Vec<String>,
    pub related_scene_ids: Vec<String>,
    /// Related scenes that were never imported.
    pub unresolved_scenes: Vec<String>,
}

fn dedup_in_order(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

pub fn map_scene_metadata(
    record: &LegacyRecord,
    document_id: Uuid,
    kind: SceneKind,
    references: SceneReferences,
) -> Mapped<SceneMetadata> {
    let mut notes = Substitutions::for_record(record);
    for missing in &references.unresolved_scenes {
        notes.note(format!("reference to scene {missing} dropped; scene was not imported"));
    }

    let summary = match kind {
        SceneKind::Scene => record.text("synopsis").or_else(|| record.text("description")),
        SceneKind::Character | SceneKind::Location => {
            record.text("description").or_else(|| record.text("synopsis"))
        }
    };

    notes.finish(SceneMetadata {
        document_id,
        kind,
        summary: summary.map(str::to_string),
        character_names: dedup_in_order(references.character_names),
        location_names: dedup_in_order(references.location_names),
        related_scene_ids: dedup_in_order(references.related_scene_ids),
    })
}
