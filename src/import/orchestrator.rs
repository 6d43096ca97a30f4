//! Top-level import state machine.
//!
//! `Idle -> Connecting -> Mapping (per project) -> Committing -> Done`, with
//! any fatal error leading to `RolledBack`. Every write of a run goes
//! through one [`TargetTx`]; a rollback therefore discards all projects, not
//! only the one in progress.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::folders::FolderSynthesizer;
use super::gate::OneShotGate;
use super::mapping::{
    map_collected_version, map_collection, map_collection_submission, map_document,
    map_project, map_publication, map_scene_metadata, map_version, order_versions, untitled,
    ContentInput, IdCache, ImportedPublication, ImportedVersion, Mapped, SceneReferences,
};
use super::progress::{ImportProgress, ProgressTracker};
use super::report::{FatalError, ImportReport, ImportState, ImportWarning};
use crate::error::ImportError;
use crate::legacy::{self, LegacyEntity, LegacyKey, LegacyRecord, LegacySourceReader};
use crate::model::{DocumentKind, Origin, Project, SceneKind, Submission, SubmittedFile};
use crate::store::{TargetStore, TargetTx};
use crate::time::now_ms;

const RICH_ATTRIBUTE: &str = "attributedString";

pub struct ImportOrchestrator {
    legacy_path: PathBuf,
    store: TargetStore,
    progress: ProgressTracker,
    state: ImportState,
}

impl ImportOrchestrator {
    pub fn new(legacy_path: impl Into<PathBuf>, store: TargetStore) -> Self {
        Self {
            legacy_path: legacy_path.into(),
            store,
            progress: ProgressTracker::new(),
            state: ImportState::Idle,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportProgress> {
        self.progress.subscribe()
    }

    fn transition(&mut self, next: ImportState) {
        debug!(
            target: "shed_migrate",
            event = "import_state",
            from = self.state.as_str(),
            to = next.as_str()
        );
        self.state = next;
        self.progress.set_state(next);
    }

    /// Runs the import once. The gate is read at entry and flipped to
    /// consumed only when the transaction commits.
    pub async fn run(&mut self, gate: &mut OneShotGate) -> ImportReport {
        let started = Instant::now();
        let mut report = ImportReport::new();

        if !gate.is_allowed() {
            info!(target: "shed_migrate", event = "import_skipped", reason = "gate_consumed");
            return self.finish(report, ImportState::Done, started);
        }
        if !legacy::is_present(&self.legacy_path) {
            info!(
                target: "shed_migrate",
                event = "import_skipped",
                reason = "source_absent",
                path = %self.legacy_path.display()
            );
            return self.finish(report, ImportState::Done, started);
        }

        self.transition(ImportState::Connecting);
        let reader = match LegacySourceReader::connect(&self.legacy_path).await {
            Ok(reader) => reader,
            Err(err) => return self.fail(report, err, started),
        };
        let mut tx = match self.store.begin(Origin::Migration).await {
            Ok(tx) => tx,
            Err(err) => {
                reader.close().await;
                return self.fail(report, err, started);
            }
        };

        self.transition(ImportState::Mapping);
        let outcome = {
            let mut pipeline = Pipeline::new(&reader, &self.progress, now_ms());
            pipeline.run(&mut tx, &mut report).await
        };
        reader.close().await;

        if let Err(err) = outcome {
            let err = match tx.rollback().await {
                Ok(_) => err,
                Err(source) => ImportError::RollbackFailed {
                    original: Box::new(err),
                    source,
                },
            };
            return self.fail(report, err, started);
        }

        self.transition(ImportState::Committing);
        match tx.commit().await {
            Ok(rows) => {
                gate.consume();
                info!(target: "shed_migrate", event = "import_committed", rows);
                self.finish(report, ImportState::Done, started)
            }
            Err(err) => self.fail(report, err, started),
        }
    }

    fn fail(&mut self, mut report: ImportReport, err: ImportError, started: Instant) -> ImportReport {
        error!(
            target: "shed_migrate",
            event = "import_rolled_back",
            code = err.code(),
            error = %err
        );
        report.fatal = Some(FatalError::from(&err));
        // Nothing survived the rollback.
        report.success_count = 0;
        self.finish(report, ImportState::RolledBack, started)
    }

    fn finish(&mut self, mut report: ImportReport, state: ImportState, started: Instant) -> ImportReport {
        self.transition(state);
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.finish(state, elapsed);
        info!(
            target: "shed_migrate",
            event = "import_finished",
            state = state.as_str(),
            projects = report.projects_processed,
            successes = report.success_count,
            warnings = report.warning_count,
            duration_ms = report.duration_ms
        );
        report
    }
}

/// One run's mapping pass. Caches are filled in dependency order: projects,
/// publications, documents with their versions, then collections and their
/// publication submissions.
struct Pipeline<'r> {
    reader: &'r LegacySourceReader,
    progress: &'r ProgressTracker,
    now_ms: i64,
    folders: FolderSynthesizer,
    projects: IdCache<LegacyKey, Uuid>,
    documents: IdCache<LegacyKey, Uuid>,
    versions: IdCache<LegacyKey, ImportedVersion>,
    publications: IdCache<LegacyKey, ImportedPublication>,
    collections: IdCache<LegacyKey, (Submission, Vec<SubmittedFile>)>,
    claimed_ids: HashSet<Uuid>,
}

impl<'r> Pipeline<'r> {
    fn new(reader: &'r LegacySourceReader, progress: &'r ProgressTracker, now_ms: i64) -> Self {
        Self {
            reader,
            progress,
            now_ms,
            folders: FolderSynthesizer::new(),
            projects: IdCache::new("project"),
            documents: IdCache::new("document"),
            versions: IdCache::new("version"),
            publications: IdCache::new("publication"),
            collections: IdCache::new("collection"),
            claimed_ids: HashSet::new(),
        }
    }

    fn phase(&self, phase: &'static str) {
        debug!(target: "shed_migrate", event = "import_phase_start", phase);
        self.progress.set_phase(phase);
    }

    /// Preserved legacy identifiers may collide; later holders get a fresh
    /// id so the insert cannot fail on the primary key.
    fn claim_id(&mut self, id: Uuid, key: LegacyKey, report: &mut ImportReport) -> Uuid {
        if self.claimed_ids.insert(id) {
            return id;
        }
        let fresh = Uuid::new_v4();
        self.claimed_ids.insert(fresh);
        report.warn(ImportWarning::substituted(
            key,
            format!("duplicate identifier {id} replaced"),
        ));
        fresh
    }

    async fn run(&mut self, tx: &mut TargetTx, report: &mut ImportReport) -> Result<(), ImportError> {
        let projects = self.reader.fetch_all(LegacyEntity::Project).await?;
        self.progress.set_total(projects.len() as u64);
        info!(target: "shed_migrate", event = "import_projects_found", count = projects.len());

        for record in &projects {
            self.import_project(record, tx, report).await?;
            report.projects_processed += 1;
            self.progress.finish_project();
        }

        self.sweep_orphans(report).await
    }

    async fn import_project(
        &mut self,
        record: &LegacyRecord,
        tx: &mut TargetTx,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        self.progress
            .start_project(record.text("name").unwrap_or("Untitled"));
        info!(
            target: "shed_migrate",
            event = "import_project_start",
            legacy_key = %record.key()
        );

        let Some(mut project) = report.absorb("project", map_project(record, self.now_ms)) else {
            return Ok(());
        };
        project.id = self.claim_id(project.id, record.key(), report);
        tx.insert_project(&project).await?;
        self.projects.insert(record.key(), project.id);

        self.phase("publications");
        for publication_record in self.reader.fetch_related(record, "publications").await? {
            let mapped = map_publication(&publication_record, project.id, self.now_ms);
            if let Some(publication) = report.absorb("publication", mapped) {
                tx.insert_publication(&publication).await?;
                self.publications.insert(
                    publication_record.key(),
                    ImportedPublication {
                        project_id: project.id,
                        publication_id: publication.id,
                    },
                );
            }
        }

        self.phase("documents");
        let texts = ordered(self.reader.fetch_related(record, "texts").await?);
        for (position, text) in texts.iter().enumerate() {
            self.import_document(text, &project, DocumentKind::Text, position, tx, report)
                .await?;
        }

        // Scenes first so characters and locations can resolve them.
        for kind in [SceneKind::Scene, SceneKind::Character, SceneKind::Location] {
            self.import_scene_kind(record, &project, kind, tx, report)
                .await?;
        }

        self.phase("collections");
        let collections = self.reader.fetch_related(record, "collections").await?;
        for collection_record in &collections {
            self.import_collection(collection_record, &project, tx, report)
                .await?;
        }

        self.phase("submissions");
        for collection_record in &collections {
            for submission_record in self
                .reader
                .fetch_related(collection_record, "submissions")
                .await?
            {
                let mapped = map_collection_submission(
                    &submission_record,
                    &self.collections,
                    &self.publications,
                    self.now_ms,
                );
                let Some((submission, files)) = report.absorb("submission", mapped) else {
                    continue;
                };
                tx.insert_submission(&submission).await?;
                for file in &files {
                    tx.insert_submitted_file(file).await?;
                    report.count_imported("submitted_file");
                }
            }
        }

        info!(
            target: "shed_migrate",
            event = "import_project_done",
            legacy_key = %record.key(),
            project_id = %project.id
        );
        Ok(())
    }

    async fn import_document(
        &mut self,
        record: &LegacyRecord,
        project: &Project,
        kind: DocumentKind,
        position: usize,
        tx: &mut TargetTx,
        report: &mut ImportReport,
    ) -> Result<Option<Uuid>, ImportError> {
        let routed = self
            .folders
            .route(project.id, kind, record.text("tag"), self.now_ms);
        if routed.created {
            tx.insert_folder(&routed.folder).await?;
            report.count_imported("folder");
        }

        let mapped = map_document(
            record,
            project.id,
            &routed.folder,
            kind,
            position as i64,
            self.now_ms,
        );
        let Some(mut document) = report.absorb("document", mapped) else {
            return Ok(None);
        };
        document.id = self.claim_id(document.id, record.key(), report);
        tx.insert_document(&document).await?;
        report.success_count += 1;
        self.documents.insert(record.key(), document.id);

        self.import_versions(record, project.id, tx, report).await?;
        self.progress.record_processed(1);
        Ok(Some(document.id))
    }

    async fn import_versions(
        &mut self,
        document_record: &LegacyRecord,
        project_id: Uuid,
        tx: &mut TargetTx,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let document_id = *self.documents.require(&document_record.key())?;
        let (ordered, warnings) =
            order_versions(self.reader.fetch_related(document_record, "versions").await?);
        for warning in warnings {
            report.warn(warning);
        }

        for (index, version_record) in ordered.iter().enumerate() {
            let content = match self
                .reader
                .fetch_related(version_record, "content")
                .await?
                .into_iter()
                .next()
            {
                None => ContentInput::Missing,
                Some(content) => ContentInput::Blob(
                    self.reader
                        .fetch_rich_attribute(&content, RICH_ATTRIBUTE)
                        .await?,
                ),
            };
            let sequence = index as i64 + 1;
            let mapped = map_version(version_record, document_id, sequence, content, self.now_ms);
            if let Some(version) = report.absorb("version", mapped) {
                tx.insert_version(&version).await?;
                self.versions.insert(
                    version_record.key(),
                    ImportedVersion {
                        project_id,
                        document_id,
                        version_id: version.id,
                    },
                );
            }
        }
        Ok(())
    }

    async fn import_scene_kind(
        &mut self,
        project_record: &LegacyRecord,
        project: &Project,
        kind: SceneKind,
        tx: &mut TargetTx,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let relationship = match kind {
            SceneKind::Scene => "scenes",
            SceneKind::Character => "characters",
            SceneKind::Location => "locations",
        };
        self.phase(relationship);
        let records = ordered(self.reader.fetch_related(project_record, relationship).await?);

        for (position, record) in records.iter().enumerate() {
            let Some(document_id) = self
                .import_document(record, project, kind.document_kind(), position, tx, report)
                .await?
            else {
                continue;
            };

            let references = self.scene_references(record, kind).await?;
            let mapped = map_scene_metadata(record, document_id, kind, references);
            if let Some(metadata) = report.absorb("scene_metadata", mapped) {
                tx.insert_scene_metadata(&metadata).await?;
            }
        }
        Ok(())
    }

    async fn scene_references(
        &self,
        record: &LegacyRecord,
        kind: SceneKind,
    ) -> Result<SceneReferences, ImportError> {
        let mut references = SceneReferences::default();
        match kind {
            SceneKind::Scene => {
                references.character_names =
                    names(&self.reader.fetch_related(record, "characters").await?);
                references.location_names =
                    names(&self.reader.fetch_related(record, "locations").await?);
            }
            SceneKind::Character | SceneKind::Location => {
                for scene in self.reader.fetch_related(record, "scenes").await? {
                    match self.documents.get(&scene.key()) {
                        Some(id) => references.related_scene_ids.push(id.to_string()),
                        None => references.unresolved_scenes.push(scene.key().to_string()),
                    }
                }
            }
        }
        Ok(references)
    }

    async fn import_collection(
        &mut self,
        record: &LegacyRecord,
        project: &Project,
        tx: &mut TargetTx,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let Some(collection) =
            report.absorb("submission", map_collection(record, project.id, self.now_ms))
        else {
            return Ok(());
        };
        tx.insert_submission(&collection).await?;

        let mut files = Vec::new();
        for member in self
            .reader
            .fetch_related(record, "collectedVersions")
            .await?
        {
            let mapped = map_collected_version(&member, &collection, &self.versions, self.now_ms);
            if let Some(file) = report.absorb("submitted_file", mapped) {
                tx.insert_submitted_file(&file).await?;
                files.push(file);
            }
        }
        self.collections.insert(record.key(), (collection, files));
        Ok(())
    }

    /// Texts whose project is missing were never reached through a project;
    /// they are reported as skipped.
    async fn sweep_orphans(&mut self, report: &mut ImportReport) -> Result<(), ImportError> {
        self.phase("orphans");
        for entity in [
            LegacyEntity::Document,
            LegacyEntity::Scene,
            LegacyEntity::Character,
            LegacyEntity::Location,
        ] {
            for record in self.reader.fetch_all(entity).await? {
                if self.documents.contains(&record.key()) {
                    continue;
                }
                warn!(
                    target: "shed_migrate",
                    event = "record_skipped",
                    legacy_key = %record.key(),
                    reason = "orphaned"
                );
                report.absorb::<()>(
                    "document",
                    Mapped::Skipped(ImportWarning::skipped(
                        record.key(),
                        "document has no imported project",
                    )),
                );
            }
        }
        Ok(())
    }
}

/// Sibling order: legacy `order` attribute, then primary key.
fn ordered(mut records: Vec<LegacyRecord>) -> Vec<LegacyRecord> {
    records.sort_by_key(|record| (record.integer("order").unwrap_or(i64::MAX), record.pk()));
    records
}

fn names(records: &[LegacyRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            record
                .text("name")
                .map(|name| name.trim().to_string())
                .unwrap_or_else(untitled)
        })
        .collect()
}
