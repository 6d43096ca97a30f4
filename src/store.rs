//! Insert primitives over the target database. All writes of an import run
//! go through a single [`TargetTx`].

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{error, info, warn};

use crate::error::ImportError;
use crate::model::{
    Document, Folder, Origin, Project, Publication, SceneMetadata, Submission, SubmittedFile,
    Version,
};

#[derive(Debug, Clone)]
pub struct TargetStore {
    pool: SqlitePool,
}

impl TargetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self, origin: Origin) -> Result<TargetTx, ImportError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(ImportError::target_write("begin"))?;
        info!(target: "shed_migrate", event = "target_tx_begin", origin = origin.as_str());
        Ok(TargetTx {
            tx,
            origin,
            inserted: 0,
        })
    }
}

pub struct TargetTx {
    tx: Transaction<'static, Sqlite>,
    origin: Origin,
    inserted: u64,
}

impl TargetTx {
    pub async fn insert_project(&mut self, project: &Project) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO projects (id, name, kind, details, origin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(project.kind.as_str())
        .bind(project.details.as_deref())
        .bind(self.origin.as_str())
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_project"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_folder(&mut self, folder: &Folder) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO folders (id, project_id, parent_id, name, role, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(folder.id.to_string())
        .bind(folder.project_id.to_string())
        .bind(folder.parent_id.map(|id| id.to_string()))
        .bind(&folder.name)
        .bind(folder.role.as_str())
        .bind(self.origin.as_str())
        .bind(folder.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_folder"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_document(&mut self, document: &Document) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO documents (id, project_id, folder_id, name, kind, position, origin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(document.id.to_string())
        .bind(document.project_id.to_string())
        .bind(document.folder_id.to_string())
        .bind(&document.name)
        .bind(document.kind.as_str())
        .bind(document.position)
        .bind(self.origin.as_str())
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_document"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_version(&mut self, version: &Version) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO versions (id, document_id, sequence, plain_text, rich_payload, locked, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(version.id.to_string())
        .bind(version.document_id.to_string())
        .bind(version.sequence)
        .bind(&version.plain_text)
        .bind(version.rich_payload.as_deref())
        .bind(i64::from(version.locked))
        .bind(version.notes.as_deref())
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_version"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_scene_metadata(
        &mut self,
        metadata: &SceneMetadata,
    ) -> Result<(), ImportError> {
        let encode = |values: &[String]| {
            serde_json::to_string(values).map_err(|err| {
                ImportError::PipelineInvariant(format!("encode scene references: {err}"))
            })
        };
        sqlx::query(
            "INSERT INTO scene_metadata (document_id, kind, summary, character_names, location_names, related_scene_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(metadata.document_id.to_string())
        .bind(metadata.kind.as_str())
        .bind(metadata.summary.as_deref())
        .bind(encode(&metadata.character_names)?)
        .bind(encode(&metadata.location_names)?)
        .bind(encode(&metadata.related_scene_ids)?)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_scene_metadata"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_publication(
        &mut self,
        publication: &Publication,
    ) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO publications (id, project_id, name, kind, url, notes, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(publication.id.to_string())
        .bind(publication.project_id.to_string())
        .bind(&publication.name)
        .bind(publication.kind.as_deref())
        .bind(publication.url.as_deref())
        .bind(publication.notes.as_deref())
        .bind(self.origin.as_str())
        .bind(publication.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_publication"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_submission(&mut self, submission: &Submission) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO submissions (id, project_id, publication_id, name, submitted_on, response_on, accepted, notes, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(submission.id.to_string())
        .bind(submission.project_id.to_string())
        .bind(submission.publication_id.map(|id| id.to_string()))
        .bind(&submission.name)
        .bind(submission.submitted_on)
        .bind(submission.response_on)
        .bind(submission.accepted.map(i64::from))
        .bind(submission.notes.as_deref())
        .bind(self.origin.as_str())
        .bind(submission.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_submission"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn insert_submitted_file(&mut self, file: &SubmittedFile) -> Result<(), ImportError> {
        sqlx::query(
            "INSERT INTO submitted_files (id, submission_id, document_id, version_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(file.id.to_string())
        .bind(file.submission_id.to_string())
        .bind(file.document_id.to_string())
        .bind(file.version_id.to_string())
        .bind(file.status.as_str())
        .bind(file.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ImportError::target_write("insert_submitted_file"))?;
        self.inserted += 1;
        Ok(())
    }

    pub async fn commit(self) -> Result<u64, ImportError> {
        let inserted = self.inserted;
        self.tx
            .commit()
            .await
            .map_err(ImportError::target_write("commit"))?;
        info!(target: "shed_migrate", event = "target_tx_commit", rows = inserted);
        Ok(inserted)
    }

    /// Discards every row written through this transaction.
    pub async fn rollback(self) -> Result<u64, sqlx::Error> {
        let discarded = self.inserted;
        match self.tx.rollback().await {
            Ok(()) => {
                warn!(target: "shed_migrate", event = "target_tx_rollback", rows = discarded);
                Ok(discarded)
            }
            Err(err) => {
                error!(target: "shed_migrate", event = "target_tx_rollback_failed", error = %err);
                Err(err)
            }
        }
    }
}
