//! Taggable lore entities: characters, places, items and events.
//!
//! # Responsibility
//! - Define the four collection-owned entity shapes.
//! - Validate required fields before any write.
//! - Expose tag ids and searchable text to the shared filters.
//!
//! # Invariants
//! - `tag_ids` holds only tags of the same collection whose scope equals the
//!   entity kind; the set type rules out duplicates.
//! - `content` is opaque JSON and never interpreted here.

use crate::model::hierarchy::CollectionId;
use crate::model::tag::TagId;
use crate::tagging::filter::{Taggable, TextSearchable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type CharacterId = Uuid;
pub type PlaceId = Uuid;
pub type ItemId = Uuid;
pub type EventId = Uuid;

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name given to items created with a blank name.
pub const DEFAULT_ITEM_NAME: &str = "New item";

/// The four taggable kinds. Doubles as the tag scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Place,
    Item,
    Event,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Character,
        EntityKind::Place,
        EntityKind::Item,
        EntityKind::Event,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Place => "place",
            Self::Item => "item",
            Self::Event => "event",
        }
    }

    /// Parses a stored or requested scope label.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "character" => Some(Self::Character),
            "place" => Some(Self::Place),
            "item" => Some(Self::Item),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    /// Entity table for this kind.
    pub fn table(self) -> &'static str {
        match self {
            Self::Character => "characters",
            Self::Place => "places",
            Self::Item => "items",
            Self::Event => "events",
        }
    }

    /// Association table linking this kind to tags, and its entity column.
    pub fn tag_link(self) -> (&'static str, &'static str) {
        match self {
            Self::Character => ("character_tags", "character_id"),
            Self::Place => ("place_tags", "place_id"),
            Self::Item => ("item_tags", "item_id"),
            Self::Event => ("event_tags", "event_id"),
        }
    }
}

/// Rejected lore input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoreValidationError {
    /// Required text field is blank.
    MissingField(&'static str),
    /// Date text is neither `YYYY-MM-DD` nor an ISO datetime.
    InvalidDate(String),
    /// Event ends before it starts.
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    /// Template payload is not `{ fields: [{ id, type, label }, ...] }`.
    InvalidTemplate(&'static str),
}

impl Display for LoreValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "`{field}` is required"),
            Self::InvalidDate(value) => {
                write!(f, "invalid date `{value}`, expected YYYY-MM-DD")
            }
            Self::EndBeforeStart { start, end } => {
                write!(f, "end date {end} is before start date {start}")
            }
            Self::InvalidTemplate(details) => write!(f, "invalid template: {details}"),
        }
    }
}

impl Error for LoreValidationError {}

/// Parses `YYYY-MM-DD`, or the date prefix of an ISO datetime.
pub fn parse_lore_date(value: &str) -> Result<NaiveDate, LoreValidationError> {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();
    let candidate = if bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        trimmed.get(..10).unwrap_or(trimmed)
    } else {
        trimmed
    };
    NaiveDate::parse_from_str(candidate, DATE_FORMAT)
        .map_err(|_| LoreValidationError::InvalidDate(trimmed.to_string()))
}

/// Parses an optional date; blank input means "no date".
pub fn parse_optional_lore_date(
    value: Option<&str>,
) -> Result<Option<NaiveDate>, LoreValidationError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_lore_date(value).map(Some),
        None => Ok(None),
    }
}

fn require(value: &str, field: &'static str) -> Result<(), LoreValidationError> {
    if value.trim().is_empty() {
        return Err(LoreValidationError::MissingField(field));
    }
    Ok(())
}

/// A person in the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub collection_id: CollectionId,
    pub firstname: String,
    pub lastname: String,
    pub age: Option<i64>,
    pub birthdate: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub content: Value,
    pub tag_ids: BTreeSet<TagId>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Character {
    /// Creates an untagged character with empty content.
    pub fn new(
        collection_id: CollectionId,
        firstname: impl Into<String>,
        lastname: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            firstname: firstname.into(),
            lastname: lastname.into(),
            age: None,
            birthdate: None,
            avatar_url: None,
            content: Value::Object(Default::default()),
            tag_ids: BTreeSet::new(),
            created_at: crate::model::now_epoch_ms(),
            updated_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), LoreValidationError> {
        require(&self.firstname, "firstname")?;
        require(&self.lastname, "lastname")
    }

    /// `"firstname lastname"`, trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }
}

/// A location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub collection_id: CollectionId,
    pub name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub content: Value,
    pub tag_ids: BTreeSet<TagId>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Place {
    pub fn new(collection_id: CollectionId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            name: name.into(),
            location: None,
            description: None,
            images: Vec::new(),
            content: Value::Object(Default::default()),
            tag_ids: BTreeSet::new(),
            created_at: crate::model::now_epoch_ms(),
            updated_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), LoreValidationError> {
        require(&self.name, "name")
    }
}

/// An object or artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub collection_id: CollectionId,
    pub name: String,
    pub category: Option<String>,
    pub description: String,
    pub images: Vec<String>,
    pub content: Value,
    pub tag_ids: BTreeSet<TagId>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Item {
    pub fn new(collection_id: CollectionId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            name: name.into(),
            category: None,
            description: String::new(),
            images: Vec::new(),
            content: Value::Object(Default::default()),
            tag_ids: BTreeSet::new(),
            created_at: crate::model::now_epoch_ms(),
            updated_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), LoreValidationError> {
        require(&self.name, "name")
    }
}

/// A dated occurrence. `end_date` is optional for point events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub collection_id: CollectionId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: String,
    pub images: Vec<String>,
    pub content: Value,
    pub tag_ids: BTreeSet<TagId>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Event {
    pub fn new(collection_id: CollectionId, name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            name: name.into(),
            start_date,
            end_date: None,
            description: String::new(),
            images: Vec::new(),
            content: Value::Object(Default::default()),
            tag_ids: BTreeSet::new(),
            created_at: crate::model::now_epoch_ms(),
            updated_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), LoreValidationError> {
        require(&self.name, "name")?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(LoreValidationError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }

    /// `"start"` or `"start → end"`.
    pub fn date_hint(&self) -> String {
        match self.end_date {
            Some(end) => format!("{} → {}", self.start_date, end),
            None => self.start_date.to_string(),
        }
    }
}

macro_rules! impl_taggable {
    ($($ty:ty),+) => {
        $(
            impl Taggable for $ty {
                fn tag_ids(&self) -> &BTreeSet<TagId> {
                    &self.tag_ids
                }
            }
        )+
    };
}

impl_taggable!(Character, Place, Item, Event);

impl TextSearchable for Character {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.firstname.as_str(), self.lastname.as_str()]
    }
}

impl TextSearchable for Place {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.location.as_deref());
        fields
    }
}

impl TextSearchable for Item {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.description.as_str()];
        fields.extend(self.category.as_deref());
        fields
    }
}

impl TextSearchable for Event {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.description.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lore_date_accepts_plain_and_iso_datetime() {
        let expected = NaiveDate::from_ymd_opt(1204, 4, 13).unwrap();
        assert_eq!(parse_lore_date("1204-04-13").unwrap(), expected);
        assert_eq!(parse_lore_date("1204-04-13T08:30:00Z").unwrap(), expected);
    }

    #[test]
    fn parse_lore_date_rejects_garbage() {
        let err = parse_lore_date("13/04/1204").unwrap_err();
        assert!(matches!(err, LoreValidationError::InvalidDate(_)));
        assert_eq!(parse_optional_lore_date(Some("  ")).unwrap(), None);
    }

    #[test]
    fn event_validation_rejects_end_before_start() {
        let start = NaiveDate::from_ymd_opt(1204, 4, 13).unwrap();
        let mut event = Event::new(Uuid::new_v4(), "Sack of the city", start);
        event.end_date = NaiveDate::from_ymd_opt(1204, 4, 1);
        assert!(matches!(
            event.validate(),
            Err(LoreValidationError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn character_requires_both_names() {
        let character = Character::new(Uuid::new_v4(), "Ada", " ");
        assert_eq!(
            character.validate(),
            Err(LoreValidationError::MissingField("lastname"))
        );
    }

    #[test]
    fn entity_kind_round_trips_through_labels() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("chapter"), None);
    }
}
