//! Project ▸ Collection ▸ Saga ▸ Tome containers.
//!
//! # Responsibility
//! - Describe the four container levels with one record shape.
//! - Define the read-only nested tree view returned to callers.
//!
//! # Invariants
//! - A project has no parent; every other level has exactly one parent of
//!   the level directly above it.
//! - Siblings are ordered by `created_at ASC, id ASC`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type CollectionId = Uuid;
pub type SagaId = Uuid;
pub type TomeId = Uuid;

/// Container level inside the project hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Project,
    Collection,
    Saga,
    Tome,
}

impl HierarchyLevel {
    /// Storage table holding rows of this level.
    pub fn table(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Collection => "collections",
            Self::Saga => "sagas",
            Self::Tome => "tomes",
        }
    }

    /// Foreign-key column pointing at the parent row, if any.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            Self::Project => None,
            Self::Collection => Some("project_id"),
            Self::Saga => Some("collection_id"),
            Self::Tome => Some("saga_id"),
        }
    }

    /// Level that owns this one.
    pub fn parent_level(self) -> Option<HierarchyLevel> {
        match self {
            Self::Project => None,
            Self::Collection => Some(Self::Project),
            Self::Saga => Some(Self::Collection),
            Self::Tome => Some(Self::Saga),
        }
    }

    /// Stable lowercase label used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Collection => "collection",
            Self::Saga => "saga",
            Self::Tome => "tome",
        }
    }
}

/// One stored container row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRecord {
    pub id: Uuid,
    pub level: HierarchyLevel,
    /// `None` only for projects.
    pub parent_id: Option<Uuid>,
    pub name: String,
    /// Only tomes carry a summary.
    pub summary: Option<String>,
    /// Epoch ms; primary sibling ordering key.
    pub created_at: i64,
    /// Epoch ms of the last update; `None` until first update.
    pub updated_at: Option<i64>,
}

/// Project with every collection, saga and tome loaded in one snapshot.
///
/// Vectors carry no ordering guarantee; the tree builder sorts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOutline {
    pub project: HierarchyRecord,
    pub collections: Vec<HierarchyRecord>,
    pub sagas: Vec<HierarchyRecord>,
    pub tomes: Vec<HierarchyRecord>,
}

/// Node of the nested project tree. Tomes are leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: Uuid,
    pub title: String,
    pub level: HierarchyLevel,
    pub children: Vec<TreeNode>,
}
