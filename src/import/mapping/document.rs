use uuid::Uuid;

use super::{legacy_identity, required_name, Mapped, Substitutions};
use crate::legacy::LegacyRecord;
use crate::model::{Document, DocumentKind, Folder};

pub fn untitled() -> String {
    String::from("Untitled")
}

/// Maps a legacy text (or one of its subtypes) into a document placed in
/// `folder`. Position comes from the caller, which orders siblings.
pub fn map_document(
    record: &LegacyRecord,
    project_id: Uuid,
    folder: &Folder,
    kind: DocumentKind,
    position: i64,
    now_ms: i64,
) -> Mapped<Document> {
    let mut notes = Substitutions::for_record(record);
    let id = legacy_identity(record, &mut notes);
    let name = required_name(record, &mut notes);
    let created_at = record.timestamp_ms("created").unwrap_or(now_ms);
    let updated_at = record.timestamp_ms("modified").unwrap_or(now_ms).max(created_at);

    notes.finish(Document {
        id,
        project_id,
        folder_id: folder.id,
        name,
        kind,
        position,
        created_at,
        updated_at,
    })
}
