use uuid::Uuid;

use super::{Mapped, Substitutions};
use crate::import::report::ImportWarning;
use crate::legacy::LegacyRecord;
use crate::model::Version;
use crate::rich_text;

/// What the reader found behind a version's content relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentInput {
    /// No Content record is linked.
    Missing,
    /// A Content record exists; its blob may be empty or NULL.
    Blob(Option<Vec<u8>>),
}

/// Orders a document's versions for sequence numbering: ascending date,
/// ties by primary key, undated versions last with a warning each.
pub fn order_versions(mut records: Vec<LegacyRecord>) -> (Vec<LegacyRecord>, Vec<ImportWarning>) {
    records.sort_by_key(|record| {
        let date = record.timestamp_ms("date");
        (date.is_none(), date.unwrap_or(i64::MAX), record.pk())
    });
    let warnings = records
        .iter()
        .filter(|record| record.timestamp_ms("date").is_none())
        .map(|record| ImportWarning::substituted(record.key(), "undated version numbered last"))
        .collect();
    (records, warnings)
}

/// Fuses a legacy Version and its Content into one target version.
pub fn map_version(
    record: &LegacyRecord,
    document_id: Uuid,
    sequence: i64,
    content: ContentInput,
    now_ms: i64,
) -> Mapped<Version> {
    let mut notes = Substitutions::for_record(record);

    let (plain_text, rich_payload) = match content {
        ContentInput::Missing => {
            notes.note("version has no content; imported as empty text");
            (String::new(), None)
        }
        ContentInput::Blob(None) => (String::new(), None),
        ContentInput::Blob(Some(blob)) => {
            let conversion = rich_text::convert(&blob);
            if let Some(warning) = conversion.warning {
                notes.note(warning);
            }
            (conversion.plain_text, conversion.rich_payload)
        }
    };

    notes.finish(Version {
        id: Uuid::new_v4(),
        document_id,
        sequence,
        plain_text,
        rich_payload,
        locked: record.flag("locked").unwrap_or(false),
        notes: record.text("notes").map(str::to_string),
        created_at: record.timestamp_ms("date").unwrap_or(now_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{LegacyEntity, LegacyValue};

    fn version(pk: i64, date: Option<f64>) -> LegacyRecord {
        let record = LegacyRecord::new(LegacyEntity::Version, pk);
        match date {
            Some(date) => record.with_attribute("date", LegacyValue::Real(date)),
            None => record,
        }
    }

    #[test]
    fn versions_order_by_date_then_key() {
        let (ordered, warnings) = order_versions(vec![
            version(1, Some(300.0)),
            version(2, None),
            version(3, Some(100.0)),
            version(4, Some(100.0)),
        ]);
        let pks: Vec<_> = ordered.iter().map(|r| r.pk()).collect();
        assert_eq!(pks, vec![3, 4, 1, 2]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].legacy_key.as_deref(), Some("Version#2"));
    }

    #[test]
    fn decodable_blob_keeps_rich_payload() {
        let record = version(1, Some(1.0)).with_attribute("locked", LegacyValue::Integer(1));
        let blob = br"{\rtf1 Hello}".to_vec();
        let outcome = map_version(&record, Uuid::new_v4(), 1, ContentInput::Blob(Some(blob)), 0);
        let Mapped::Ok(mapped) = outcome else {
            panic!("expected clean mapping");
        };
        assert_eq!(mapped.plain_text, "Hello");
        assert!(mapped.rich_payload.is_some());
        assert!(mapped.locked);
    }

    #[test]
    fn undecodable_blob_substitutes_plain_text() {
        let blob = b"\x00\x01garbled words".to_vec();
        let outcome = map_version(&version(1, Some(1.0)), Uuid::new_v4(), 1, ContentInput::Blob(Some(blob)), 0);
        let Mapped::Substituted(mapped, warnings) = outcome else {
            panic!("expected substitution");
        };
        assert!(mapped.rich_payload.is_none());
        assert!(mapped.plain_text.contains("garbled words"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn missing_content_warns_and_null_blob_does_not() {
        let missing = map_version(&version(1, None), Uuid::new_v4(), 1, ContentInput::Missing, 9);
        assert_eq!(missing.warnings().len(), 1);
        assert_eq!(missing.value().unwrap().created_at, 9);

        let null = map_version(&version(2, None), Uuid::new_v4(), 1, ContentInput::Blob(None), 9);
        assert!(null.warnings().is_empty());
        assert_eq!(null.value().unwrap().plain_text, "");
    }
}
