//! Read-only access to the legacy object store.

mod record;
mod schema;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

pub use record::{LegacyKey, LegacyRecord, LegacyValue};
pub use schema::{column_for, relationship, LegacyEntity, Relationship, RelationshipKind};

use crate::error::ImportError;

const REGISTRY_TABLE: &str = "Z_PRIMARYKEY";

/// True when a file exists at `path`. Presence says nothing about whether
/// the file is a readable legacy store.
pub fn is_present(path: &Path) -> bool {
    path.is_file()
}

pub struct LegacySourceReader {
    pool: SqlitePool,
    path: PathBuf,
    entity_ids: HashMap<LegacyEntity, i64>,
    columns: HashMap<&'static str, HashSet<String>>,
}

impl std::fmt::Debug for LegacySourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacySourceReader")
            .field("path", &self.path)
            .field("entity_ids", &self.entity_ids)
            .finish()
    }
}

fn quote_ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn unavailable(path: &Path, reason: impl Into<String>) -> ImportError {
    ImportError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl LegacySourceReader {
    /// Opens the store read-only and checks the entity registry and tables.
    pub async fn connect(path: &Path) -> Result<Self, ImportError> {
        if !is_present(path) {
            return Err(unavailable(path, "file not found"));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .log_statements(log::LevelFilter::Off);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| unavailable(path, format!("unreadable: {err}")))?;

        let registry: Vec<(i64, String)> = sqlx::query_as(&format!(
            "SELECT Z_ENT, Z_NAME FROM {}",
            quote_ident(REGISTRY_TABLE)
        ))
        .fetch_all(&pool)
        .await
        .map_err(|err| unavailable(path, format!("schema incompatible: {err}")))?;
        let registered: HashMap<String, i64> =
            registry.into_iter().map(|(id, name)| (name, id)).collect();

        let mut entity_ids = HashMap::new();
        for entity in LegacyEntity::ALL {
            let id = registered.get(entity.entity_name()).ok_or_else(|| {
                unavailable(
                    path,
                    format!(
                        "schema incompatible: entity {} not registered",
                        entity.entity_name()
                    ),
                )
            })?;
            entity_ids.insert(entity, *id);
        }

        let mut tables: Vec<&'static str> = LegacyEntity::ALL.iter().map(|e| e.table()).collect();
        tables.extend(schema::join_tables());
        tables.sort_unstable();
        tables.dedup();

        let mut columns = HashMap::new();
        for table in tables {
            let names: Vec<String> =
                sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
                    .bind(table)
                    .fetch_all(&pool)
                    .await
                    .map_err(|err| unavailable(path, format!("unreadable: {err}")))?;
            if names.is_empty() {
                return Err(unavailable(
                    path,
                    format!("schema incompatible: table {table} missing"),
                ));
            }
            columns.insert(table, names.into_iter().collect::<HashSet<_>>());
        }

        info!(
            target: "shed_migrate",
            event = "legacy_connect",
            path = %path.display(),
            entities = entity_ids.len()
        );

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            entity_ids,
            columns,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!(target: "shed_migrate", event = "legacy_closed", path = %self.path.display());
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns
            .get(table)
            .map(|cols| cols.contains(column))
            .unwrap_or(false)
    }

    /// Attributes of `entity` that exist in this file; older stores may
    /// lack optional columns.
    fn present_attributes(&self, entity: LegacyEntity) -> Vec<&'static str> {
        entity
            .attributes()
            .iter()
            .copied()
            .filter(|attr| self.has_column(entity.table(), &column_for(attr)))
            .collect()
    }

    fn select_list(&self, entity: LegacyEntity, alias: &str) -> (String, Vec<&'static str>) {
        let attrs = self.present_attributes(entity);
        let mut cols = vec![format!("{alias}.Z_PK")];
        cols.extend(
            attrs
                .iter()
                .map(|attr| format!("{alias}.{}", quote_ident(&column_for(attr)))),
        );
        (cols.join(", "), attrs)
    }

    fn entity_filter(&self, entity: LegacyEntity, alias: &str) -> Option<(String, i64)> {
        if entity.shares_table() {
            self.entity_ids
                .get(&entity)
                .map(|id| (format!("{alias}.Z_ENT = ?"), *id))
        } else {
            None
        }
    }

    fn decode_row(
        entity: LegacyEntity,
        attrs: &[&'static str],
        row: &SqliteRow,
    ) -> Result<LegacyRecord, sqlx::Error> {
        let pk: i64 = row.try_get(0)?;
        let mut record = LegacyRecord::new(entity, pk);
        for (offset, attr) in attrs.iter().enumerate() {
            let decoded = decode_value(row, offset + 1)?;
            if decoded.lossy {
                warn!(
                    target: "shed_migrate",
                    event = "legacy_text_lossy",
                    legacy_key = %record.key(),
                    attribute = *attr
                );
                record.mark_lossy(*attr);
            }
            record.set(*attr, decoded.value);
        }
        Ok(record)
    }

    /// Every record of exactly `entity`, ordered by primary key. Fetching
    /// `Document` does not include its subtypes.
    pub async fn fetch_all(&self, entity: LegacyEntity) -> Result<Vec<LegacyRecord>, ImportError> {
        let (select, attrs) = self.select_list(entity, "t");
        let mut sql = format!("SELECT {select} FROM {} t", quote_ident(entity.table()));
        let filter = self.entity_filter(entity, "t");
        if let Some((clause, _)) = &filter {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY t.Z_PK");

        let mut query = sqlx::query(&sql);
        if let Some((_, id)) = filter {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ImportError::source_read(entity.label()))?;
        let records = rows
            .iter()
            .map(|row| Self::decode_row(entity, &attrs, row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ImportError::source_read(entity.label()))?;
        debug!(
            target: "shed_migrate",
            event = "legacy_fetch_all",
            entity = entity.label(),
            count = records.len()
        );
        Ok(records)
    }

    /// Follows `relationship` from `record`. Unknown relationship names are
    /// a pipeline bug, not a data defect.
    pub async fn fetch_related(
        &self,
        record: &LegacyRecord,
        relationship_name: &str,
    ) -> Result<Vec<LegacyRecord>, ImportError> {
        let rel = schema::relationship(record.entity(), relationship_name).ok_or_else(|| {
            ImportError::PipelineInvariant(format!(
                "unknown relationship {}.{}",
                record.entity().entity_name(),
                relationship_name
            ))
        })?;
        let target = rel.target;
        let (select, attrs) = self.select_list(target, "t");
        let target_table = quote_ident(target.table());
        let filter = self.entity_filter(target, "t");

        let (mut sql, key) = match rel.kind {
            RelationshipKind::ToOne { attribute } => {
                let Some(fk) = record.integer(attribute) else {
                    return Ok(Vec::new());
                };
                (format!("SELECT {select} FROM {target_table} t WHERE t.Z_PK = ?"), fk)
            }
            RelationshipKind::ToMany { inverse_attribute } => {
                let column = column_for(inverse_attribute);
                if !self.has_column(target.table(), &column) {
                    return Ok(Vec::new());
                }
                (
                    format!(
                        "SELECT {select} FROM {target_table} t WHERE t.{} = ?",
                        quote_ident(&column)
                    ),
                    record.pk(),
                )
            }
            RelationshipKind::ManyToMany {
                join_table,
                source_column,
                target_column,
            } => (
                format!(
                    "SELECT {select} FROM {target_table} t JOIN {} j ON j.{} = t.Z_PK WHERE j.{} = ?",
                    quote_ident(join_table),
                    quote_ident(target_column),
                    quote_ident(source_column)
                ),
                record.pk(),
            ),
        };
        if let Some((clause, _)) = &filter {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY t.Z_PK");

        let mut query = sqlx::query(&sql).bind(key);
        if let Some((_, id)) = filter {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ImportError::source_read(target.label()))?;
        rows.iter()
            .map(|row| Self::decode_row(target, &attrs, row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ImportError::source_read(target.label()))
    }

    /// Loads one blob attribute of `record`. `None` when the column is
    /// absent or NULL.
    pub async fn fetch_rich_attribute(
        &self,
        record: &LegacyRecord,
        attribute: &str,
    ) -> Result<Option<Vec<u8>>, ImportError> {
        let entity = record.entity();
        if !entity.blob_attributes().contains(&attribute) {
            return Err(ImportError::PipelineInvariant(format!(
                "{} has no blob attribute {attribute}",
                entity.entity_name()
            )));
        }
        let column = column_for(attribute);
        if !self.has_column(entity.table(), &column) {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE Z_PK = ?",
            quote_ident(&column),
            quote_ident(entity.table())
        );
        let row = sqlx::query(&sql)
            .bind(record.pk())
            .fetch_optional(&self.pool)
            .await
            .map_err(ImportError::source_read(entity.label()))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw = row
            .try_get_raw(0)
            .map_err(ImportError::source_read(entity.label()))?;
        if raw.is_null() {
            return Ok(None);
        }
        // Archived content is read byte for byte, whatever the declared type.
        match raw.type_info().name().to_ascii_uppercase().as_str() {
            "INTEGER" | "BOOLEAN" | "REAL" => Ok(None),
            _ => row
                .try_get_unchecked::<Vec<u8>, _>(0)
                .map(Some)
                .map_err(ImportError::source_read(entity.label())),
        }
    }
}

/// A decoded column. `lossy` is set when TEXT bytes were not valid UTF-8
/// and had to be replaced.
struct Decoded {
    value: LegacyValue,
    lossy: bool,
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Decoded, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Decoded {
            value: LegacyValue::Null,
            lossy: false,
        });
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let (value, lossy) = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => (LegacyValue::Integer(row.try_get(index)?), false),
        "REAL" => (LegacyValue::Real(row.try_get(index)?), false),
        "TEXT" => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            match String::from_utf8(bytes) {
                Ok(text) => (LegacyValue::Text(text), false),
                Err(err) => (
                    LegacyValue::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
                    true,
                ),
            }
        }
        _ => (LegacyValue::Blob(row.try_get_unchecked(index)?), false),
    };
    Ok(Decoded { value, lossy })
}
