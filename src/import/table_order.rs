const SUBMITTED_FILES_RANK: u16 = 0;
const SUBMISSIONS_RANK: u16 = 10;
const DOCUMENT_CHILD_RANK: u16 = 20;
const DOCUMENTS_RANK: u16 = 30;
const FOLDERS_RANK: u16 = 40;
const PROJECT_CHILD_RANK: u16 = 50;
const PROJECTS_RANK: u16 = 60;
const DEFAULT_RANK: u16 = 1000;

/// Deletion order for target tables: dependents sort before the rows they
/// reference.
pub(crate) fn table_order_key(table: &str) -> (u16, &str) {
    let rank = match table {
        "submitted_files" => SUBMITTED_FILES_RANK,
        "submissions" => SUBMISSIONS_RANK,
        "versions" | "scene_metadata" => DOCUMENT_CHILD_RANK,
        "documents" => DOCUMENTS_RANK,
        "folders" => FOLDERS_RANK,
        "publications" => PROJECT_CHILD_RANK,
        "projects" => PROJECTS_RANK,
        _ => DEFAULT_RANK,
    };

    (rank, table)
}
