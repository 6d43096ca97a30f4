#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use shed_migrate_lib::{db, migrate, TargetStore};

pub const ENT_COLLECTION: i64 = 1;
pub const ENT_COLLECTED_VERSION: i64 = 2;
pub const ENT_COLLECTION_SUBMISSION: i64 = 3;
pub const ENT_CONTENT: i64 = 4;
pub const ENT_PROJECT: i64 = 5;
pub const ENT_PUBLICATION: i64 = 6;
pub const ENT_TEXT: i64 = 7;
pub const ENT_CHARACTER: i64 = 8;
pub const ENT_LOCATION: i64 = 9;
pub const ENT_SCENE: i64 = 10;
pub const ENT_VERSION: i64 = 11;

const LEGACY_SCHEMA: &str = include_str!("fixtures/legacy_schema.sql");

/// Seconds since the legacy reference date, as the legacy store keeps them.
pub const JAN_2020: f64 = 599_616_000.0;

pub fn rtf(text: &str) -> Vec<u8> {
    format!("{{\\rtf1\\ansi{{\\fonttbl\\f0 Helvetica;}}\\f0\\fs24 {text}}}").into_bytes()
}

/// Bytes that are not RTF at all, like an archived attributed string.
pub fn undecodable_blob() -> Vec<u8> {
    b"bplist00\xd4\x01\x02\x03Chapter two draft\x00\x08".to_vec()
}

/// Builds a legacy store file row by row.
pub struct LegacyFixture {
    pub path: PathBuf,
    pool: SqlitePool,
}

impl LegacyFixture {
    pub async fn create(dir: &Path) -> Result<Self> {
        let path = dir.join("WritingShed.sqlite");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(LEGACY_SCHEMA).execute(&pool).await?;
        Ok(Self { path, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) -> PathBuf {
        self.pool.close().await;
        self.path
    }

    pub async fn project(&self, name: &str, kind: Option<&str>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZPROJECT (Z_ENT, Z_OPT, ZNAME, ZTYPE, ZCREATED, ZMODIFIED)
             VALUES (?1, 1, ?2, ?3, ?4, ?4)",
        )
        .bind(ENT_PROJECT)
        .bind(name)
        .bind(kind)
        .bind(JAN_2020)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts a text row; `ent` picks Text, Scene, Character or Location.
    pub async fn text(&self, ent: i64, project: Option<i64>, name: &str, tag: Option<&str>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZTEXT (Z_ENT, Z_OPT, ZPROJECT, ZNAME, ZTAG, ZCREATED, ZMODIFIED)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(ent)
        .bind(project)
        .bind(name)
        .bind(tag)
        .bind(JAN_2020)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn document(&self, project: i64, name: &str, tag: Option<&str>) -> Result<i64> {
        self.text(ENT_TEXT, Some(project), name, tag).await
    }

    pub async fn set_text_attribute(&self, pk: i64, column: &str, value: &str) -> Result<()> {
        sqlx::query(&format!("UPDATE ZTEXT SET {column} = ?1 WHERE Z_PK = ?2"))
            .bind(value)
            .bind(pk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn content(&self, blob: Option<&[u8]>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO ZCONTENT (Z_ENT, Z_OPT, ZATTRIBUTEDSTRING) VALUES (?1, 1, ?2)")
            .bind(ENT_CONTENT)
            .bind(blob)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// A version with a content record holding `blob`.
    pub async fn version(&self, text: i64, date: Option<f64>, blob: &[u8]) -> Result<i64> {
        let content = self.content(Some(blob)).await?;
        self.version_with_content(text, date, Some(content)).await
    }

    pub async fn version_with_content(&self, text: i64, date: Option<f64>, content: Option<i64>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZVERSION (Z_ENT, Z_OPT, ZTEXT, ZCONTENT, ZDATE, ZLOCKED)
             VALUES (?1, 1, ?2, ?3, ?4, 0)",
        )
        .bind(ENT_VERSION)
        .bind(text)
        .bind(content)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn collection(&self, project: i64, name: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZCOLLECTION (Z_ENT, Z_OPT, ZPROJECT, ZNAME, ZCREATED) VALUES (?1, 1, ?2, ?3, ?4)",
        )
        .bind(ENT_COLLECTION)
        .bind(project)
        .bind(name)
        .bind(JAN_2020)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn collected_version(&self, collection: i64, version: i64, status: i64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZCOLLECTEDVERSION (Z_ENT, Z_OPT, ZCOLLECTION, ZVERSION, ZSTATUS) VALUES (?1, 1, ?2, ?3, ?4)",
        )
        .bind(ENT_COLLECTED_VERSION)
        .bind(collection)
        .bind(version)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn publication(&self, project: i64, name: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZPUBLICATION (Z_ENT, Z_OPT, ZPROJECT, ZNAME, ZTYPE) VALUES (?1, 1, ?2, ?3, 'magazine')",
        )
        .bind(ENT_PUBLICATION)
        .bind(project)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn collection_submission(&self, collection: i64, publication: i64, accepted: Option<bool>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO ZCOLLECTIONSUBMISSION (Z_ENT, Z_OPT, ZCOLLECTION, ZPUBLICATION, ZSUBMITTEDON, ZACCEPTED)
             VALUES (?1, 1, ?2, ?3, ?4, ?5)",
        )
        .bind(ENT_COLLECTION_SUBMISSION)
        .bind(collection)
        .bind(publication)
        .bind(JAN_2020 + 86_400.0)
        .bind(accepted.map(i64::from))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn link_character(&self, scene: i64, character: i64) -> Result<()> {
        sqlx::query("INSERT INTO Z_SCENECHARACTERS (Z_SCENE, Z_CHARACTER) VALUES (?1, ?2)")
            .bind(scene)
            .bind(character)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn link_location(&self, scene: i64, location: i64) -> Result<()> {
        sqlx::query("INSERT INTO Z_SCENELOCATIONS (Z_SCENE, Z_LOCATION) VALUES (?1, ?2)")
            .bind(scene)
            .bind(location)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Fresh target database with the schema applied.
pub async fn target(dir: &Path) -> Result<(SqlitePool, TargetStore)> {
    let pool = db::open_target_pool(&dir.join("shed.sqlite3")).await?;
    migrate::apply_migrations(&pool).await?;
    Ok((pool.clone(), TargetStore::new(pool)))
}

pub async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

/// Rows anywhere in the target that a migration run produced.
pub async fn migration_rows(pool: &SqlitePool) -> Result<i64> {
    let mut total = 0;
    for table in ["projects", "folders", "documents", "publications", "submissions"] {
        total += count(pool, &format!("SELECT COUNT(*) FROM {table} WHERE origin = 'migration'")).await?;
    }
    total += count(pool, "SELECT COUNT(*) FROM versions").await?;
    total += count(pool, "SELECT COUNT(*) FROM submitted_files").await?;
    total += count(pool, "SELECT COUNT(*) FROM scene_metadata").await?;
    Ok(total)
}
