//! Development affordance: remove everything a previous import created so
//! the import can run again.

use std::collections::BTreeMap;

use futures::FutureExt;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use super::table_order::table_order_key;
use crate::db::run_in_tx;
use crate::error::AppError;

/// Each target table with the predicate selecting migration-created rows.
/// Tables without their own origin column follow their owner.
const PURGE_TARGETS: &[(&str, &str)] = &[
    ("projects", "origin = 'migration'"),
    ("publications", "origin = 'migration'"),
    ("folders", "origin = 'migration'"),
    ("documents", "origin = 'migration'"),
    (
        "versions",
        "document_id IN (SELECT id FROM documents WHERE origin = 'migration')",
    ),
    (
        "scene_metadata",
        "document_id IN (SELECT id FROM documents WHERE origin = 'migration')",
    ),
    ("submissions", "origin = 'migration'"),
    (
        "submitted_files",
        "submission_id IN (SELECT id FROM submissions WHERE origin = 'migration')",
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub tables: BTreeMap<String, u64>,
    pub total: u64,
}

/// Deletes migration-origin rows in one transaction. User rows are left
/// alone.
pub async fn purge_migrated(pool: &SqlitePool) -> Result<PurgeSummary, AppError> {
    let mut targets: Vec<(&'static str, &'static str)> = PURGE_TARGETS.to_vec();
    targets.sort_by_key(|(table, _)| table_order_key(table));

    let summary = run_in_tx(pool, move |tx| {
        async move {
            let mut summary = PurgeSummary::default();
            for (table, predicate) in targets {
                let sql = format!("DELETE FROM {table} WHERE {predicate}");
                let deleted = sqlx::query(&sql).execute(&mut **tx).await?.rows_affected();
                summary.tables.insert(table.to_string(), deleted);
                summary.total += deleted;
            }
            Ok::<_, AppError>(summary)
        }
        .boxed()
    })
    .await?;

    info!(
        target: "shed_migrate",
        event = "purge_migrated",
        rows = summary.total
    );
    Ok(summary)
}
