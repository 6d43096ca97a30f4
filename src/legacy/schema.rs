//! Static description of the legacy object model: entity tables, scalar
//! attributes and relationships.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LegacyEntity {
    Project,
    Document,
    Scene,
    Character,
    Location,
    Version,
    Content,
    Collection,
    CollectedVersion,
    CollectionSubmission,
    Publication,
}

impl LegacyEntity {
    pub const ALL: [LegacyEntity; 11] = [
        LegacyEntity::Project,
        LegacyEntity::Document,
        LegacyEntity::Scene,
        LegacyEntity::Character,
        LegacyEntity::Location,
        LegacyEntity::Version,
        LegacyEntity::Content,
        LegacyEntity::Collection,
        LegacyEntity::CollectedVersion,
        LegacyEntity::CollectionSubmission,
        LegacyEntity::Publication,
    ];

    /// Name registered in `Z_PRIMARYKEY`.
    pub const fn entity_name(self) -> &'static str {
        match self {
            LegacyEntity::Project => "Project",
            LegacyEntity::Document => "Text",
            LegacyEntity::Scene => "Scene",
            LegacyEntity::Character => "Character",
            LegacyEntity::Location => "Location",
            LegacyEntity::Version => "Version",
            LegacyEntity::Content => "Content",
            LegacyEntity::Collection => "Collection",
            LegacyEntity::CollectedVersion => "CollectedVersion",
            LegacyEntity::CollectionSubmission => "CollectionSubmission",
            LegacyEntity::Publication => "Publication",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            LegacyEntity::Project => "project",
            LegacyEntity::Document => "document",
            LegacyEntity::Scene => "scene",
            LegacyEntity::Character => "character",
            LegacyEntity::Location => "location",
            LegacyEntity::Version => "version",
            LegacyEntity::Content => "content",
            LegacyEntity::Collection => "collection",
            LegacyEntity::CollectedVersion => "collected_version",
            LegacyEntity::CollectionSubmission => "collection_submission",
            LegacyEntity::Publication => "publication",
        }
    }

    pub const fn table(self) -> &'static str {
        match self {
            LegacyEntity::Project => "ZPROJECT",
            LegacyEntity::Document
            | LegacyEntity::Scene
            | LegacyEntity::Character
            | LegacyEntity::Location => "ZTEXT",
            LegacyEntity::Version => "ZVERSION",
            LegacyEntity::Content => "ZCONTENT",
            LegacyEntity::Collection => "ZCOLLECTION",
            LegacyEntity::CollectedVersion => "ZCOLLECTEDVERSION",
            LegacyEntity::CollectionSubmission => "ZCOLLECTIONSUBMISSION",
            LegacyEntity::Publication => "ZPUBLICATION",
        }
    }

    /// Entities sharing a table are told apart by `Z_ENT`.
    pub const fn shares_table(self) -> bool {
        matches!(
            self,
            LegacyEntity::Document
                | LegacyEntity::Scene
                | LegacyEntity::Character
                | LegacyEntity::Location
        )
    }

    /// Scalar and foreign-key attributes loaded by `fetch_all`. Blob
    /// attributes are deliberately absent.
    pub const fn attributes(self) -> &'static [&'static str] {
        match self {
            LegacyEntity::Project => &["name", "type", "uniqueId", "created", "modified", "notes"],
            LegacyEntity::Document
            | LegacyEntity::Scene
            | LegacyEntity::Character
            | LegacyEntity::Location => &[
                "project",
                "name",
                "tag",
                "uniqueId",
                "created",
                "modified",
                "synopsis",
                "description",
                "order",
            ],
            LegacyEntity::Version => &["text", "content", "date", "locked", "notes"],
            LegacyEntity::Content => &[],
            LegacyEntity::Collection => &["project", "name", "created", "notes"],
            LegacyEntity::CollectedVersion => &["collection", "version", "status"],
            LegacyEntity::CollectionSubmission => &[
                "collection",
                "publication",
                "submittedOn",
                "responseDate",
                "accepted",
                "notes",
            ],
            LegacyEntity::Publication => &["project", "name", "type", "url", "notes"],
        }
    }

    pub const fn blob_attributes(self) -> &'static [&'static str] {
        match self {
            LegacyEntity::Content => &["attributedString"],
            _ => &[],
        }
    }
}

/// Maps an attribute name to its column, e.g. `uniqueId` -> `ZUNIQUEID`.
pub fn column_for(attribute: &str) -> String {
    format!("Z{}", attribute.to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Foreign key attribute on the source record.
    ToOne { attribute: &'static str },
    /// Foreign key attribute on the target records pointing back.
    ToMany { inverse_attribute: &'static str },
    /// Join table with one column per side.
    ManyToMany {
        join_table: &'static str,
        source_column: &'static str,
        target_column: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub source: LegacyEntity,
    pub name: &'static str,
    pub target: LegacyEntity,
    pub kind: RelationshipKind,
}

const fn to_one(
    source: LegacyEntity,
    name: &'static str,
    target: LegacyEntity,
    attribute: &'static str,
) -> Relationship {
    Relationship {
        source,
        name,
        target,
        kind: RelationshipKind::ToOne { attribute },
    }
}

const fn to_many(
    source: LegacyEntity,
    name: &'static str,
    target: LegacyEntity,
    inverse_attribute: &'static str,
) -> Relationship {
    Relationship {
        source,
        name,
        target,
        kind: RelationshipKind::ToMany { inverse_attribute },
    }
}

const fn many_to_many(
    source: LegacyEntity,
    name: &'static str,
    target: LegacyEntity,
    join_table: &'static str,
    source_column: &'static str,
    target_column: &'static str,
) -> Relationship {
    Relationship {
        source,
        name,
        target,
        kind: RelationshipKind::ManyToMany {
            join_table,
            source_column,
            target_column,
        },
    }
}

use LegacyEntity as E;

pub static RELATIONSHIPS: &[Relationship] = &[
    to_many(E::Project, "texts", E::Document, "project"),
    to_many(E::Project, "scenes", E::Scene, "project"),
    to_many(E::Project, "characters", E::Character, "project"),
    to_many(E::Project, "locations", E::Location, "project"),
    to_many(E::Project, "collections", E::Collection, "project"),
    to_many(E::Project, "publications", E::Publication, "project"),
    to_many(E::Document, "versions", E::Version, "text"),
    to_many(E::Scene, "versions", E::Version, "text"),
    to_many(E::Character, "versions", E::Version, "text"),
    to_many(E::Location, "versions", E::Version, "text"),
    to_one(E::Version, "content", E::Content, "content"),
    to_many(E::Collection, "collectedVersions", E::CollectedVersion, "collection"),
    to_many(E::Collection, "submissions", E::CollectionSubmission, "collection"),
    to_one(E::CollectedVersion, "collection", E::Collection, "collection"),
    to_one(E::CollectedVersion, "version", E::Version, "version"),
    to_one(E::CollectionSubmission, "collection", E::Collection, "collection"),
    to_one(E::CollectionSubmission, "publication", E::Publication, "publication"),
    many_to_many(
        E::Scene,
        "characters",
        E::Character,
        "Z_SCENECHARACTERS",
        "Z_SCENE",
        "Z_CHARACTER",
    ),
    many_to_many(
        E::Scene,
        "locations",
        E::Location,
        "Z_SCENELOCATIONS",
        "Z_SCENE",
        "Z_LOCATION",
    ),
    many_to_many(
        E::Character,
        "scenes",
        E::Scene,
        "Z_SCENECHARACTERS",
        "Z_CHARACTER",
        "Z_SCENE",
    ),
    many_to_many(
        E::Location,
        "scenes",
        E::Scene,
        "Z_SCENELOCATIONS",
        "Z_LOCATION",
        "Z_SCENE",
    ),
];

pub fn relationship(source: LegacyEntity, name: &str) -> Option<&'static Relationship> {
    RELATIONSHIPS
        .iter()
        .find(|rel| rel.source == source && rel.name == name)
}

/// Join tables the reader requires next to the entity tables.
pub fn join_tables() -> impl Iterator<Item = &'static str> {
    let mut seen: Vec<&'static str> = Vec::new();
    RELATIONSHIPS.iter().filter_map(move |rel| match rel.kind {
        RelationshipKind::ManyToMany { join_table, .. } if !seen.contains(&join_table) => {
            seen.push(join_table);
            Some(join_table)
        }
        _ => None,
    })
}
