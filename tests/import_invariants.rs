mod util;

use std::collections::BTreeSet;

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::tempdir;

use shed_migrate_lib::{ImportOrchestrator, ImportReport, ImportState, OneShotGate};
use util::{
    count, rtf, target, undecodable_blob, LegacyFixture, ENT_CHARACTER, ENT_LOCATION, ENT_SCENE,
    JAN_2020,
};

async fn import(dir: &std::path::Path, legacy: LegacyFixture) -> Result<(SqlitePool, ImportReport)> {
    let legacy_path = legacy.close().await;
    let (pool, store) = target(dir).await?;
    let mut orchestrator = ImportOrchestrator::new(legacy_path, store);
    let mut gate = OneShotGate::Allowed;
    let report = orchestrator.run(&mut gate).await;
    assert_eq!(report.state, ImportState::Done, "{:?}", report.fatal);
    Ok((pool, report))
}

#[tokio::test]
async fn one_folder_per_distinct_tag_per_project() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let first = legacy.project("First", Some("novel")).await?;
    let second = legacy.project("Second", Some("novel")).await?;
    for name in ["a", "b", "c"] {
        legacy.document(first, name, Some("Draft")).await?;
    }
    legacy.document(first, "d", Some("draft")).await?;
    legacy.document(first, "e", None).await?;
    legacy.document(first, "f", Some("")).await?;
    legacy.document(second, "g", Some("Draft")).await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.success_count, 7);

    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT p.name, f.name, f.role FROM folders f JOIN projects p ON p.id = f.project_id
         ORDER BY p.name, f.name",
    )
    .fetch_all(&pool)
    .await?;
    let expected = vec![
        ("First".into(), "Draft".into(), "tag".into()),
        ("First".into(), "Unsorted".into(), "catch_all".into()),
        ("First".into(), "draft".into(), "tag".into()),
        ("Second".into(), "Draft".into(), "tag".into()),
    ];
    assert_eq!(rows, expected);

    let in_draft = count(
        &pool,
        "SELECT COUNT(*) FROM documents d JOIN folders f ON f.id = d.folder_id
         JOIN projects p ON p.id = f.project_id WHERE f.name = 'Draft' AND p.name = 'First'",
    )
    .await?;
    assert_eq!(in_draft, 3);
    Ok(())
}

#[tokio::test]
async fn every_version_and_document_has_its_parent() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Graph", Some("poetry")).await?;
    for index in 0..4 {
        let doc = legacy
            .document(project, &format!("Poem {index}"), Some("Poems"))
            .await?;
        for day in 0..3 {
            legacy
                .version(doc, Some(JAN_2020 + f64::from(day) * 86_400.0), &rtf("line"))
                .await?;
        }
    }

    let (pool, _report) = import(dir.path(), legacy).await?;
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM versions").await?, 12);
    let orphan_versions = count(
        &pool,
        "SELECT COUNT(*) FROM versions v LEFT JOIN documents d ON d.id = v.document_id WHERE d.id IS NULL",
    )
    .await?;
    assert_eq!(orphan_versions, 0);
    let homeless_documents = count(
        &pool,
        "SELECT COUNT(*) FROM documents d LEFT JOIN folders f ON f.id = d.folder_id
         WHERE f.id IS NULL OR f.project_id <> d.project_id",
    )
    .await?;
    assert_eq!(homeless_documents, 0);
    let fk_problems: Vec<(String,)> = sqlx::query_as("SELECT \"table\" FROM pragma_foreign_key_check")
        .fetch_all(&pool)
        .await?;
    assert!(fk_problems.is_empty());
    Ok(())
}

#[tokio::test]
async fn versions_are_numbered_by_date() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Order", Some("novel")).await?;
    let doc = legacy.document(project, "Only", None).await?;
    legacy.version(doc, Some(JAN_2020 + 200.0), &rtf("third")).await?;
    legacy.version(doc, None, &rtf("undated")).await?;
    legacy.version(doc, Some(JAN_2020), &rtf("first")).await?;
    legacy.version(doc, Some(JAN_2020 + 100.0), &rtf("second")).await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    let texts: Vec<String> = sqlx::query_scalar("SELECT plain_text FROM versions ORDER BY sequence")
        .fetch_all(&pool)
        .await?;
    assert_eq!(texts, vec!["first", "second", "third", "undated"]);
    assert_eq!(report.warning_count, 1);
    Ok(())
}

#[tokio::test]
async fn failed_rich_conversion_keeps_plain_text() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Blobs", Some("novel")).await?;
    let blobs: Vec<Vec<u8>> = vec![
        undecodable_blob(),
        b"{\\rtf1 unterminated {\\b bold".to_vec(),
        b"plain words only".to_vec(),
    ];
    for (index, blob) in blobs.iter().enumerate() {
        let doc = legacy.document(project, &format!("Doc {index}"), None).await?;
        legacy.version(doc, Some(JAN_2020), blob).await?;
    }

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.warning_count, 3);
    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT plain_text, rich_payload FROM versions")
            .fetch_all(&pool)
            .await?;
    assert_eq!(rows.len(), 3);
    for (plain, rich) in rows {
        assert!(!plain.is_empty());
        assert!(rich.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn publication_submission_duplicates_the_collection() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Poems", Some("Poetry")).await?;
    let publication = legacy.publication(project, "The Quarterly").await?;
    let mut versions = Vec::new();
    for name in ["Tide", "Salt"] {
        let doc = legacy.document(project, name, Some("Final")).await?;
        versions.push(legacy.version(doc, Some(JAN_2020), &rtf(name)).await?);
    }
    let collection = legacy.collection(project, "Spring batch").await?;
    legacy.collected_version(collection, versions[0], 1).await?;
    legacy.collected_version(collection, versions[1], 2).await?;
    legacy
        .collection_submission(collection, publication, Some(true))
        .await?;

    let (pool, _report) = import(dir.path(), legacy).await?;

    let submissions: Vec<(String, Option<String>, Option<i64>)> = sqlx::query_as(
        "SELECT id, publication_id, accepted FROM submissions ORDER BY publication_id IS NOT NULL",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(submissions.len(), 2);
    assert!(submissions[0].1.is_none());
    assert!(submissions[1].1.is_some());
    assert_eq!(submissions[1].2, Some(1));

    let mut file_sets = Vec::new();
    for (id, _, _) in &submissions {
        let files: BTreeSet<(String, String, String)> = sqlx::query_as(
            "SELECT document_id, version_id, status FROM submitted_files WHERE submission_id = ?1",
        )
        .bind(id)
        .fetch_all(&pool)
        .await?
        .into_iter()
        .collect();
        file_sets.push(files);
    }
    assert_eq!(file_sets[0].len(), 2);
    assert_eq!(file_sets[0], file_sets[1]);
    let statuses: BTreeSet<String> = file_sets[0].iter().map(|(_, _, s)| s.clone()).collect();
    assert_eq!(
        statuses,
        BTreeSet::from(["accepted".to_string(), "rejected".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn scene_subtypes_become_documents_with_metadata() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Mystery", Some("novel")).await?;
    let scene = legacy
        .text(ENT_SCENE, Some(project), "Arrival", Some("Act 1"))
        .await?;
    legacy
        .set_text_attribute(scene, "ZSYNOPSIS", "The inspector arrives.")
        .await?;
    let character = legacy
        .text(ENT_CHARACTER, Some(project), "Inspector Vale", None)
        .await?;
    let location = legacy
        .text(ENT_LOCATION, Some(project), "Station", None)
        .await?;
    legacy.link_character(scene, character).await?;
    legacy.link_location(scene, location).await?;
    legacy.version(scene, Some(JAN_2020), &rtf("Rain.")).await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.success_count, 3);

    let folders: Vec<(String, String)> =
        sqlx::query_as("SELECT name, role FROM folders ORDER BY name")
            .fetch_all(&pool)
            .await?;
    assert_eq!(
        folders,
        vec![
            ("Characters".to_string(), "characters".to_string()),
            ("Locations".to_string(), "locations".to_string()),
            ("Scenes".to_string(), "scenes".to_string()),
        ]
    );

    let (scene_id, summary, characters, locations): (String, Option<String>, String, String) =
        sqlx::query_as(
            "SELECT document_id, summary, character_names, location_names FROM scene_metadata
             WHERE kind = 'scene'",
        )
        .fetch_one(&pool)
        .await?;
    assert_eq!(summary.as_deref(), Some("The inspector arrives."));
    assert_eq!(
        serde_json::from_str::<Vec<String>>(&characters)?,
        vec!["Inspector Vale"]
    );
    assert_eq!(serde_json::from_str::<Vec<String>>(&locations)?, vec!["Station"]);

    let related: String =
        sqlx::query_scalar("SELECT related_scene_ids FROM scene_metadata WHERE kind = 'character'")
            .fetch_one(&pool)
            .await?;
    assert_eq!(serde_json::from_str::<Vec<String>>(&related)?, vec![scene_id]);
    Ok(())
}

#[tokio::test]
async fn texts_without_a_project_are_reported_skipped() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Home", Some("novel")).await?;
    legacy.document(project, "Kept", None).await?;
    legacy.text(util::ENT_TEXT, None, "Stray", None).await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.success_count, 1);
    assert_eq!(report.warning_count, 1);
    assert_eq!(report.entities["document"].skipped, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM documents").await?, 1);
    Ok(())
}

#[tokio::test]
async fn soft_defects_are_substituted() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Odd", Some("memoir")).await?;
    let doc = legacy.document(project, "Doc", None).await?;
    legacy
        .set_text_attribute(doc, "ZUNIQUEID", "not-a-uuid")
        .await?;
    legacy.version_with_content(doc, Some(JAN_2020), None).await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    let kind: String = sqlx::query_scalar("SELECT kind FROM projects")
        .fetch_one(&pool)
        .await?;
    assert_eq!(kind, "blank");
    // Unknown project type, malformed identifier, missing content.
    assert_eq!(report.warning_count, 3, "{:?}", report.warnings);
    let plain: String = sqlx::query_scalar("SELECT plain_text FROM versions")
        .fetch_one(&pool)
        .await?;
    assert_eq!(plain, "");
    Ok(())
}

#[tokio::test]
async fn imported_rows_carry_the_migration_origin() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Origin", Some("script")).await?;
    legacy.document(project, "Act", Some("Acts")).await?;

    let (pool, _report) = import(dir.path(), legacy).await?;
    for table in ["projects", "folders", "documents"] {
        let user_rows = count(
            &pool,
            &format!("SELECT COUNT(*) FROM {table} WHERE origin <> 'migration'"),
        )
        .await?;
        assert_eq!(user_rows, 0, "{table}");
    }
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_text_is_a_soft_defect() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let project = legacy.project("Damaged", Some("novel")).await?;
    let damaged = legacy.document(project, "placeholder", Some("Draft")).await?;
    legacy.document(project, "Intact", Some("Draft")).await?;
    sqlx::query("UPDATE ZTEXT SET ZNAME = CAST(X'4261FF64' AS TEXT) WHERE Z_PK = ?1")
        .bind(damaged)
        .execute(legacy.pool())
        .await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.success_count, 2);
    assert_eq!(report.warning_count, 1, "{:?}", report.warnings);
    assert!(report.warnings[0].message.contains("UTF-8"));

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM documents ORDER BY name")
        .fetch_all(&pool)
        .await?;
    assert_eq!(names, vec!["Ba\u{FFFD}d".to_string(), "Intact".to_string()]);
    Ok(())
}

#[tokio::test]
async fn links_across_projects_are_skipped() -> Result<()> {
    let dir = tempdir()?;
    let legacy = LegacyFixture::create(dir.path()).await?;
    let first = legacy.project("First", Some("poetry")).await?;
    let second = legacy.project("Second", Some("poetry")).await?;
    let publication = legacy.publication(first, "The Quarterly").await?;
    let doc = legacy.document(first, "Tide", None).await?;
    let version = legacy.version(doc, Some(JAN_2020), &rtf("Tide")).await?;
    let collection = legacy.collection(second, "Borrowed").await?;
    legacy.collected_version(collection, version, 0).await?;
    legacy
        .collection_submission(collection, publication, None)
        .await?;

    let (pool, report) = import(dir.path(), legacy).await?;
    assert_eq!(report.warning_count, 2, "{:?}", report.warnings);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM submitted_files").await?, 0);
    let pointing_at_publication = count(
        &pool,
        "SELECT COUNT(*) FROM submissions WHERE publication_id IS NOT NULL",
    )
    .await?;
    assert_eq!(pointing_at_publication, 0);
    let mismatched = count(
        &pool,
        "SELECT COUNT(*) FROM submissions s JOIN publications p ON p.id = s.publication_id
         WHERE p.project_id <> s.project_id",
    )
    .await?;
    assert_eq!(mismatched, 0);
    Ok(())
}
