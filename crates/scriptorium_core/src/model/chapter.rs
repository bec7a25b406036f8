//! Chapter records.
//!
//! # Invariants
//! - For one tome, chapter positions form exactly `1..=count`.
//! - `position` is owned by the sequencer; content updates never touch it.

use crate::model::hierarchy::TomeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type ChapterId = Uuid;

/// Full chapter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub tome_id: TomeId,
    pub title: String,
    pub content: String,
    /// 1-based, dense within the tome.
    pub position: i64,
    pub notes: Option<String>,
    /// Editor annotations; passed through uninterpreted.
    pub annotations: Option<Value>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Ordering projection returned by list and move operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: ChapterId,
    pub title: String,
    pub position: i64,
}

/// Input for creating a chapter at the end of a tome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewChapter {
    pub title: String,
    pub content: String,
    pub notes: Option<String>,
    pub annotations: Option<Value>,
}

/// Partial update; `None` leaves the field unchanged.
///
/// Nested options distinguish "leave" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub notes: Option<Option<String>>,
    pub annotations: Option<Option<Value>>,
}

impl ChapterPatch {
    /// Returns whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.notes.is_none()
            && self.annotations.is_none()
    }
}
