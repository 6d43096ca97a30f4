//! Synthesizes per-project folders from flat legacy tags.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{DocumentKind, Folder, FolderRole};

pub const CATCH_ALL_FOLDER: &str = "Unsorted";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FolderKey {
    Tag(String),
    Role(FolderRole),
}

/// Result of routing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub folder: Folder,
    /// True the first time this folder is needed; the caller inserts it.
    pub created: bool,
}

/// Folders are created lazily, on the first document that needs them, and
/// reused for every later document with the same key. Tags match exactly
/// and case-sensitively.
#[derive(Debug, Default)]
pub struct FolderSynthesizer {
    folders: HashMap<(Uuid, FolderKey), Folder>,
}

impl FolderSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &mut self,
        project_id: Uuid,
        kind: DocumentKind,
        tag: Option<&str>,
        now_ms: i64,
    ) -> Routed {
        let key = match kind {
            DocumentKind::Scene => FolderKey::Role(FolderRole::Scenes),
            DocumentKind::Character => FolderKey::Role(FolderRole::Characters),
            DocumentKind::Location => FolderKey::Role(FolderRole::Locations),
            DocumentKind::Text => match tag.filter(|tag| !tag.trim().is_empty()) {
                Some(tag) => FolderKey::Tag(tag.to_string()),
                None => FolderKey::Role(FolderRole::CatchAll),
            },
        };

        if let Some(folder) = self.folders.get(&(project_id, key.clone())) {
            return Routed {
                folder: folder.clone(),
                created: false,
            };
        }

        let (name, role) = match &key {
            FolderKey::Tag(tag) => (tag.clone(), FolderRole::Tag),
            FolderKey::Role(role) => (fixed_folder_name(*role).to_string(), *role),
        };
        let folder = Folder {
            id: Uuid::new_v4(),
            project_id,
            parent_id: None,
            name,
            role,
            created_at: now_ms,
        };
        self.folders.insert((project_id, key), folder.clone());
        Routed {
            folder,
            created: true,
        }
    }

    #[cfg(test)]
    fn folders_for(&self, project_id: Uuid) -> Vec<&Folder> {
        let mut folders: Vec<_> = self
            .folders
            .iter()
            .filter(|((owner, _), _)| *owner == project_id)
            .map(|(_, folder)| folder)
            .collect();
        folders.sort_by_key(|folder| folder.created_at);
        folders
    }
}

fn fixed_folder_name(role: FolderRole) -> &'static str {
    match role {
        FolderRole::Scenes => "Scenes",
        FolderRole::Characters => "Characters",
        FolderRole::Locations => "Locations",
        FolderRole::CatchAll | FolderRole::Tag => CATCH_ALL_FOLDER,
    }
}
