use uuid::Uuid;

use super::{required_name, IdCache, Mapped, Substitutions};
use crate::import::report::ImportWarning;
use crate::legacy::{LegacyEntity, LegacyKey, LegacyRecord};
use crate::model::{Publication, Submission, SubmissionStatus, SubmittedFile};

fn key(entity: LegacyEntity, pk: i64) -> LegacyKey {
    LegacyKey { entity, pk }
}

/// Where an imported legacy version landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedVersion {
    pub project_id: Uuid,
    pub document_id: Uuid,
    pub version_id: Uuid,
}

/// Where an imported legacy publication landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedPublication {
    pub project_id: Uuid,
    pub publication_id: Uuid,
}

pub fn map_publication(record: &LegacyRecord, project_id: Uuid, now_ms: i64) -> Mapped<Publication> {
    let mut notes = Substitutions::for_record(record);
    let name = required_name(record, &mut notes);
    notes.finish(Publication {
        id: Uuid::new_v4(),
        project_id,
        name,
        kind: record.text("type").map(str::to_string),
        url: record.text("url").map(str::to_string),
        notes: record.text("notes").map(str::to_string),
        created_at: now_ms,
    })
}

/// A legacy collection becomes a submission with no publication.
pub fn map_collection(record: &LegacyRecord, project_id: Uuid, now_ms: i64) -> Mapped<Submission> {
    let mut notes = Substitutions::for_record(record);
    let name = required_name(record, &mut notes);
    notes.finish(Submission {
        id: Uuid::new_v4(),
        project_id,
        publication_id: None,
        name,
        submitted_on: None,
        response_on: None,
        accepted: None,
        notes: record.text("notes").map(str::to_string),
        created_at: record.timestamp_ms("created").unwrap_or(now_ms),
    })
}

/// Legacy status codes: 0 pending, 1 accepted, 2 rejected, 3 withdrawn.
/// `None` for codes outside that set.
pub fn parse_status(code: i64) -> Option<SubmissionStatus> {
    match code {
        0 => Some(SubmissionStatus::Pending),
        1 => Some(SubmissionStatus::Accepted),
        2 => Some(SubmissionStatus::Rejected),
        3 => Some(SubmissionStatus::Withdrawn),
        _ => None,
    }
}

/// One collection member. Members pointing at a version of another project
/// are skipped.
pub fn map_collected_version(
    record: &LegacyRecord,
    collection: &Submission,
    versions: &IdCache<LegacyKey, ImportedVersion>,
    now_ms: i64,
) -> Mapped<SubmittedFile> {
    let Some(version_pk) = record.integer("version") else {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            "collected version has no version",
        ));
    };
    let version_key = key(LegacyEntity::Version, version_pk);
    let Some(&imported) = versions.get(&version_key) else {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            format!("{version_key} was not imported"),
        ));
    };
    if imported.project_id != collection.project_id {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            format!("{version_key} belongs to another project"),
        ));
    }

    let mut notes = Substitutions::for_record(record);
    let status = match record.integer("status") {
        None => SubmissionStatus::Pending,
        Some(code) => parse_status(code).unwrap_or_else(|| {
            notes.note(format!("unknown status code {code}; using pending"));
            SubmissionStatus::Pending
        }),
    };

    notes.finish(SubmittedFile {
        id: Uuid::new_v4(),
        submission_id: collection.id,
        document_id: imported.document_id,
        version_id: imported.version_id,
        status,
        created_at: now_ms,
    })
}

/// A collection sent to a publication becomes a second, independent
/// submission carrying a copy of the collection's files.
pub fn map_collection_submission(
    record: &LegacyRecord,
    collections: &IdCache<LegacyKey, (Submission, Vec<SubmittedFile>)>,
    publications: &IdCache<LegacyKey, ImportedPublication>,
    now_ms: i64,
) -> Mapped<(Submission, Vec<SubmittedFile>)> {
    let collection = record
        .integer("collection")
        .map(|pk| key(LegacyEntity::Collection, pk))
        .and_then(|key| collections.get(&key));
    let Some((collection, files)) = collection else {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            "submission has no imported collection",
        ));
    };
    let publication = record
        .integer("publication")
        .map(|pk| key(LegacyEntity::Publication, pk))
        .and_then(|key| publications.get(&key));
    let Some(&publication) = publication else {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            "submission has no imported publication",
        ));
    };
    if publication.project_id != collection.project_id {
        return Mapped::Skipped(ImportWarning::skipped(
            record.key(),
            "publication belongs to another project",
        ));
    }

    let submission = Submission {
        id: Uuid::new_v4(),
        project_id: collection.project_id,
        publication_id: Some(publication.publication_id),
        name: collection.name.clone(),
        submitted_on: record.timestamp_ms("submittedOn"),
        response_on: record.timestamp_ms("responseDate"),
        accepted: record.flag("accepted"),
        notes: record.text("notes").map(str::to_string),
        created_at: record.timestamp_ms("submittedOn").unwrap_or(now_ms),
    };
    let copies = files
        .iter()
        .map(|file| SubmittedFile {
            id: Uuid::new_v4(),
            submission_id: submission.id,
            created_at: now_ms,
            ..file.clone()
        })
        .collect();
    Mapped::Ok((submission, copies))
}
