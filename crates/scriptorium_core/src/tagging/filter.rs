//! Tag-set and free-text filtering over taggable entities.
//!
//! # Responsibility
//! - Decide inclusion of one entity from its tag ids and searchable text.
//! - Filter candidate lists without reordering them.
//!
//! # Invariants
//! - An empty requested tag set passes every entity.
//! - Text and tag conditions are ANDed.
//! - Output order equals input order; callers impose their own sort.

use crate::model::tag::TagId;
use crate::model::text::contains_ignore_case;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entity exposing its attached tag ids.
pub trait Taggable {
    fn tag_ids(&self) -> &BTreeSet<TagId>;
}

/// Entity exposing the fields free-text filters look at.
pub trait TextSearchable {
    fn search_fields(&self) -> Vec<&str>;
}

/// Multi-tag semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// At least one requested tag is present (OR).
    #[default]
    Any,
    /// Every requested tag is present (AND).
    All,
}

impl MatchMode {
    /// `"all"` in any case selects [`MatchMode::All`]; everything else,
    /// including absent input, is [`MatchMode::Any`].
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.trim().eq_ignore_ascii_case("all") => Self::All,
            _ => Self::Any,
        }
    }
}

/// Requested tag ids plus match mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub tag_ids: BTreeSet<TagId>,
    pub mode: MatchMode,
}

impl TagFilter {
    pub fn new(tag_ids: impl IntoIterator<Item = TagId>, mode: MatchMode) -> Self {
        Self {
            tag_ids: tag_ids.into_iter().collect(),
            mode,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.tag_ids.is_empty()
    }

    pub fn matches(&self, entity_tags: &BTreeSet<TagId>) -> bool {
        if self.tag_ids.is_empty() {
            return true;
        }
        match self.mode {
            MatchMode::Any => !self.tag_ids.is_disjoint(entity_tags),
            MatchMode::All => self.tag_ids.is_subset(entity_tags),
        }
    }
}

/// Combined text + tag filter for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    /// Case-insensitive substring; blank text is ignored.
    pub text: Option<String>,
    pub tags: TagFilter,
}

impl EntityFilter {
    pub fn new(text: Option<String>, tags: TagFilter) -> Self {
        Self { text, tags }
    }

    pub fn matches<T: Taggable + TextSearchable>(&self, entity: &T) -> bool {
        self.matches_text(entity) && self.tags.matches(entity.tag_ids())
    }

    fn matches_text<T: TextSearchable>(&self, entity: &T) -> bool {
        let Some(needle) = self
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        else {
            return true;
        };
        let needle = needle.to_lowercase();
        entity
            .search_fields()
            .into_iter()
            .any(|field| contains_ignore_case(field, &needle))
    }
}

/// Keeps the entities that pass `filter`, preserving input order.
pub fn filter_tagged<T: Taggable + TextSearchable>(entities: Vec<T>, filter: &EntityFilter) -> Vec<T> {
    entities
        .into_iter()
        .filter(|entity| filter.matches(entity))
        .collect()
}
