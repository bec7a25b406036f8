//! Collection-scoped tags.
//!
//! # Invariants
//! - A tag belongs to exactly one collection.
//! - A tag attaches only to entities whose kind equals its `scope`.

use crate::model::hierarchy::CollectionId;
use crate::model::lore::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TagId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub collection_id: CollectionId,
    pub name: String,
    pub color: Option<String>,
    pub note: Option<String>,
    pub scope: EntityKind,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Input for creating a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    pub color: Option<String>,
    pub note: Option<String>,
    pub scope: EntityKind,
}

/// Partial tag update; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPatch {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub scope: Option<EntityKind>,
}
