//! Target-side entities written by the import. Every value here is created
//! once per run and never mutated after insertion.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ProjectKind {
    Novel,
    Poetry,
    Script,
    ShortStory,
    Blank,
}

impl ProjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectKind::Novel => "novel",
            ProjectKind::Poetry => "poetry",
            ProjectKind::Script => "script",
            ProjectKind::ShortStory => "short_story",
            ProjectKind::Blank => "blank",
        }
    }
}

/// Provenance marker stored on every top-level row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Migration,
}

impl Origin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Origin::User => "user",
            Origin::Migration => "migration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub kind: ProjectKind,
    pub details: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderRole {
    /// Synthesized from a legacy document tag.
    Tag,
    /// Holds documents that had no tag.
    CatchAll,
    Scenes,
    Characters,
    Locations,
}

impl FolderRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            FolderRole::Tag => "tag",
            FolderRole::CatchAll => "catch_all",
            FolderRole::Scenes => "scenes",
            FolderRole::Characters => "characters",
            FolderRole::Locations => "locations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub role: FolderRole,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Text,
    Scene,
    Character,
    Location,
}

impl DocumentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Scene => "scene",
            DocumentKind::Character => "character",
            DocumentKind::Location => "location",
        }
    }

    pub const fn is_scene_derived(self) -> bool {
        !matches!(self, DocumentKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub kind: DocumentKind,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    pub sequence: i64,
    pub plain_text: String,
    pub rich_payload: Option<String>,
    pub locked: bool,
    pub notes: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub kind: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
}

/// A submission without a publication stands for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub project_id: Uuid,
    pub publication_id: Option<Uuid>,
    pub name: String,
    pub submitted_on: Option<i64>,
    pub response_on: Option<i64>,
    pub accepted: Option<bool>,
    pub notes: Option<String>,
    pub created_at: i64,
}

impl Submission {
    pub fn is_collection(&self) -> bool {
        self.publication_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SubmissionStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl SubmissionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Withdrawn => "withdrawn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedFile {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub status: SubmissionStatus,
    pub created_at: i64,
}

impl SubmittedFile {
    /// The identity of a file inside a submission, ignoring row ids.
    pub fn content_key(&self) -> (Uuid, Uuid, SubmissionStatus) {
        (self.document_id, self.version_id, self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    Scene,
    Character,
    Location,
}

impl SceneKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SceneKind::Scene => "scene",
            SceneKind::Character => "character",
            SceneKind::Location => "location",
        }
    }

    pub const fn document_kind(self) -> DocumentKind {
        match self {
            SceneKind::Scene => DocumentKind::Scene,
            SceneKind::Character => DocumentKind::Character,
            SceneKind::Location => DocumentKind::Location,
        }
    }

    pub const fn folder_role(self) -> FolderRole {
        match self {
            SceneKind::Scene => FolderRole::Scenes,
            SceneKind::Character => FolderRole::Characters,
            SceneKind::Location => FolderRole::Locations,
        }
    }
}

/// Subtype data for scene-derived documents. References are by name or by
/// document id string; the target schema has no relation for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneMetadata {
    pub document_id: Uuid,
    pub kind: SceneKind,
    pub summary: Option<String>,
    pub character_names: Vec<String>,
    pub location_names: Vec<String>,
    pub related_scene_ids: Vec<String>,
}
