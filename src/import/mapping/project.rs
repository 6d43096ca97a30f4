use super::{legacy_identity, required_name, Mapped, Substitutions};
use crate::legacy::LegacyRecord;
use crate::model::{Project, ProjectKind};

/// Parses the free-text legacy project type. `None` when the tag is not
/// recognised.
pub fn parse_project_kind(tag: &str) -> Option<ProjectKind> {
    let normalized = tag.trim().to_ascii_lowercase();
    let kind = match normalized.as_str() {
        "novel" | "fiction" | "prose" => ProjectKind::Novel,
        "poetry" | "poem" | "poems" => ProjectKind::Poetry,
        "script" | "screenplay" | "play" => ProjectKind::Script,
        "short_story" | "short story" | "shortstory" | "story" => ProjectKind::ShortStory,
        "blank" => ProjectKind::Blank,
        _ => return None,
    };
    Some(kind)
}

pub fn map_project(record: &LegacyRecord, now_ms: i64) -> Mapped<Project> {
    let mut notes = Substitutions::for_record(record);
    let id = legacy_identity(record, &mut notes);
    let name = required_name(record, &mut notes);

    let kind = match record.text("type") {
        Some(tag) => parse_project_kind(tag).unwrap_or_else(|| {
            notes.note(format!("unrecognised project type {tag:?}; using blank"));
            ProjectKind::Blank
        }),
        None => {
            notes.note("missing project type; using blank");
            ProjectKind::Blank
        }
    };

    let created_at = record.timestamp_ms("created").unwrap_or(now_ms);
    let updated_at = record.timestamp_ms("modified").unwrap_or(created_at);

    notes.finish(Project {
        id,
        name,
        kind,
        details: record.text("notes").map(str::to_string),
        created_at,
        updated_at,
    })
}
