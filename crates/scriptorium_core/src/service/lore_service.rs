//! Lore and tag use-case service.
//!
//! # Responsibility
//! - Create, patch, list and delete characters, places, items and events.
//! - Manage collection tags and scoped tag assignment.
//! - Serve character templates, falling back to the built-in default.
//!
//! # Invariants
//! - Requested tag ids always pass scoped resolution before they are linked;
//!   unknown, foreign and mis-scoped ids are dropped without error.
//! - Lists are filtered first (text AND tags), then sorted here:
//!   characters by last/first name, places and items by name, events by
//!   start date then name.
//! - Blank optional text clears the field; `None` leaves it unchanged.

use crate::error::CoreErrorKind;
use crate::model::hierarchy::CollectionId;
use crate::model::lore::{
    parse_lore_date, parse_optional_lore_date, Character, CharacterId, EntityKind, Event, EventId,
    Item, ItemId, LoreValidationError, Place, PlaceId, DEFAULT_ITEM_NAME,
};
use crate::model::tag::{NewTag, Tag, TagId, TagPatch};
use crate::model::template::{default_character_template, validate_template};
use crate::model::text::{normalize_label, normalize_optional};
use crate::repo::error::RepoError;
use crate::repo::lore_repo::LoreRepository;
use crate::repo::tag_repo::TagRepository;
use crate::tagging::filter::{
    filter_tagged, EntityFilter, MatchMode, TagFilter, Taggable, TextSearchable,
};
use chrono::NaiveDate;
use log::info;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from lore and tag operations.
#[derive(Debug)]
pub enum LoreServiceError {
    /// Entity or template input rejected before any write.
    Validation(LoreValidationError),
    /// Tag name is blank after trim.
    InvalidTagName,
    CollectionNotFound(CollectionId),
    EntityNotFound { kind: EntityKind, id: Uuid },
    TagNotFound(TagId),
    /// Repository-level failure.
    Repo(RepoError),
}

impl LoreServiceError {
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidTagName => CoreErrorKind::Validation,
            Self::CollectionNotFound(_) | Self::EntityNotFound { .. } | Self::TagNotFound(_) => {
                CoreErrorKind::NotFound
            }
            Self::Repo(err) => err.kind(),
        }
    }
}

impl Display for LoreServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidTagName => write!(f, "tag name must not be blank"),
            Self::CollectionNotFound(id) => write!(f, "collection not found: {id}"),
            Self::EntityNotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::TagNotFound(id) => write!(f, "tag not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoreServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoreValidationError> for LoreServiceError {
    fn from(value: LoreValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for LoreServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound {
                entity: "collection",
                id,
            } => Self::CollectionNotFound(id),
            RepoError::NotFound { entity: "tag", id } => Self::TagNotFound(id),
            RepoError::NotFound { entity, id } => match EntityKind::parse(entity) {
                Some(kind) => Self::EntityNotFound { kind, id },
                None => Self::Repo(RepoError::NotFound { entity, id }),
            },
            other => Self::Repo(other),
        }
    }
}

/// Character create/patch body. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterDraft {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// `Some(None)` clears the age.
    pub age: Option<Option<i64>>,
    /// `YYYY-MM-DD` or ISO datetime; blank clears.
    pub birthdate: Option<String>,
    pub avatar_url: Option<String>,
    pub content: Option<Value>,
    /// Full replacement set, resolved against the collection's character tags.
    pub tag_ids: Option<Vec<TagId>>,
}

/// Place create/patch body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceDraft {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub content: Option<Value>,
    pub tag_ids: Option<Vec<TagId>>,
}

/// Item create/patch body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDraft {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub content: Option<Value>,
    pub tag_ids: Option<Vec<TagId>>,
}

/// Event create/patch body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDraft {
    pub name: Option<String>,
    /// Required on create.
    pub start_date: Option<String>,
    /// Blank clears.
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub content: Option<Value>,
    pub tag_ids: Option<Vec<TagId>>,
}

/// Text + tag filter for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoreListQuery {
    pub text: Option<String>,
    pub tag_ids: Vec<TagId>,
    pub mode: MatchMode,
}

impl LoreListQuery {
    fn filter(&self) -> EntityFilter {
        EntityFilter::new(
            self.text.clone(),
            TagFilter::new(self.tag_ids.iter().copied(), self.mode),
        )
    }
}

/// Overlap window for event lists; raw date text, blank means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventWindow {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Lore service facade over the lore and tag repositories.
pub struct LoreService<L: LoreRepository, T: TagRepository> {
    lore: L,
    tags: T,
}

impl<L: LoreRepository, T: TagRepository> LoreService<L, T> {
    /// Creates service from repository implementations.
    pub fn new(lore: L, tags: T) -> Self {
        Self { lore, tags }
    }

    pub fn create_character(
        &self,
        collection_id: CollectionId,
        draft: CharacterDraft,
    ) -> Result<Character, LoreServiceError> {
        let mut character = Character::new(collection_id, "", "");
        apply_character_draft(&mut character, draft)?;
        let created = self.lore.insert_character(&character)?;
        log_write("create", EntityKind::Character, created.id, created.tag_ids.len());
        Ok(created)
    }

    pub fn update_character(
        &self,
        id: CharacterId,
        draft: CharacterDraft,
    ) -> Result<Character, LoreServiceError> {
        let mut character = self
            .lore
            .get_character(id)?
            .ok_or(not_found(EntityKind::Character, id))?;
        apply_character_draft(&mut character, draft)?;
        let updated = self.lore.update_character(&character)?;
        log_write("update", EntityKind::Character, id, updated.tag_ids.len());
        Ok(updated)
    }

    pub fn get_character(&self, id: CharacterId) -> Result<Option<Character>, LoreServiceError> {
        Ok(self.lore.get_character(id)?)
    }

    /// Filtered characters ordered by last name, then first name.
    pub fn list_characters(
        &self,
        collection_id: CollectionId,
        query: &LoreListQuery,
    ) -> Result<Vec<Character>, LoreServiceError> {
        self.ensure_collection(collection_id)?;
        let characters = self.lore.list_characters(collection_id)?;
        Ok(filter_and_sort(characters, query, |left, right| {
            cmp_text(&left.lastname, &right.lastname)
                .then_with(|| cmp_text(&left.firstname, &right.firstname))
                .then(left.id.cmp(&right.id))
        }))
    }

    pub fn create_place(
        &self,
        collection_id: CollectionId,
        draft: PlaceDraft,
    ) -> Result<Place, LoreServiceError> {
        let mut place = Place::new(collection_id, "");
        apply_place_draft(&mut place, draft);
        let created = self.lore.insert_place(&place)?;
        log_write("create", EntityKind::Place, created.id, created.tag_ids.len());
        Ok(created)
    }

    pub fn update_place(&self, id: PlaceId, draft: PlaceDraft) -> Result<Place, LoreServiceError> {
        let mut place = self
            .lore
            .get_place(id)?
            .ok_or(not_found(EntityKind::Place, id))?;
        apply_place_draft(&mut place, draft);
        let updated = self.lore.update_place(&place)?;
        log_write("update", EntityKind::Place, id, updated.tag_ids.len());
        Ok(updated)
    }

    pub fn get_place(&self, id: PlaceId) -> Result<Option<Place>, LoreServiceError> {
        Ok(self.lore.get_place(id)?)
    }

    /// Filtered places ordered by name.
    pub fn list_places(
        &self,
        collection_id: CollectionId,
        query: &LoreListQuery,
    ) -> Result<Vec<Place>, LoreServiceError> {
        self.ensure_collection(collection_id)?;
        let places = self.lore.list_places(collection_id)?;
        Ok(filter_and_sort(places, query, |left, right| {
            cmp_text(&left.name, &right.name).then(left.id.cmp(&right.id))
        }))
    }

    /// Creates an item; a blank name becomes [`DEFAULT_ITEM_NAME`].
    pub fn create_item(
        &self,
        collection_id: CollectionId,
        mut draft: ItemDraft,
    ) -> Result<Item, LoreServiceError> {
        let name = draft
            .name
            .take()
            .and_then(|name| normalize_label(&name))
            .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string());
        let mut item = Item::new(collection_id, name);
        apply_item_draft(&mut item, draft);
        let created = self.lore.insert_item(&item)?;
        log_write("create", EntityKind::Item, created.id, created.tag_ids.len());
        Ok(created)
    }

    pub fn update_item(&self, id: ItemId, draft: ItemDraft) -> Result<Item, LoreServiceError> {
        let mut item = self
            .lore
            .get_item(id)?
            .ok_or(not_found(EntityKind::Item, id))?;
        apply_item_draft(&mut item, draft);
        let updated = self.lore.update_item(&item)?;
        log_write("update", EntityKind::Item, id, updated.tag_ids.len());
        Ok(updated)
    }

    pub fn get_item(&self, id: ItemId) -> Result<Option<Item>, LoreServiceError> {
        Ok(self.lore.get_item(id)?)
    }

    /// Filtered items ordered by name.
    pub fn list_items(
        &self,
        collection_id: CollectionId,
        query: &LoreListQuery,
    ) -> Result<Vec<Item>, LoreServiceError> {
        self.ensure_collection(collection_id)?;
        let items = self.lore.list_items(collection_id)?;
        Ok(filter_and_sort(items, query, |left, right| {
            cmp_text(&left.name, &right.name).then(left.id.cmp(&right.id))
        }))
    }

    pub fn create_event(
        &self,
        collection_id: CollectionId,
        mut draft: EventDraft,
    ) -> Result<Event, LoreServiceError> {
        let start = draft
            .start_date
            .take()
            .filter(|value| !value.trim().is_empty())
            .ok_or(LoreValidationError::MissingField("start_date"))?;
        let mut event = Event::new(collection_id, "", parse_lore_date(&start)?);
        apply_event_draft(&mut event, draft)?;
        let created = self.lore.insert_event(&event)?;
        log_write("create", EntityKind::Event, created.id, created.tag_ids.len());
        Ok(created)
    }

    pub fn update_event(&self, id: EventId, draft: EventDraft) -> Result<Event, LoreServiceError> {
        let mut event = self
            .lore
            .get_event(id)?
            .ok_or(not_found(EntityKind::Event, id))?;
        apply_event_draft(&mut event, draft)?;
        let updated = self.lore.update_event(&event)?;
        log_write("update", EntityKind::Event, id, updated.tag_ids.len());
        Ok(updated)
    }

    pub fn get_event(&self, id: EventId) -> Result<Option<Event>, LoreServiceError> {
        Ok(self.lore.get_event(id)?)
    }

    /// Filtered events overlapping `window`, ordered by start date then name.
    pub fn list_events(
        &self,
        collection_id: CollectionId,
        query: &LoreListQuery,
        window: &EventWindow,
    ) -> Result<Vec<Event>, LoreServiceError> {
        let from = parse_optional_lore_date(window.from.as_deref())?;
        let to = parse_optional_lore_date(window.to.as_deref())?;
        self.ensure_collection(collection_id)?;

        let events: Vec<Event> = self
            .lore
            .list_events(collection_id)?
            .into_iter()
            .filter(|event| overlaps(event, from, to))
            .collect();
        Ok(filter_and_sort(events, query, |left, right| {
            left.start_date
                .cmp(&right.start_date)
                .then_with(|| cmp_text(&left.name, &right.name))
                .then(left.id.cmp(&right.id))
        }))
    }

    /// Deletes one entity of any kind; its tag links cascade away.
    pub fn delete_entity(&self, kind: EntityKind, id: Uuid) -> Result<(), LoreServiceError> {
        self.lore.delete_entity(kind, id)?;
        info!(
            "event=lore_delete module=lore status=ok kind={} id={id}",
            kind.as_str()
        );
        Ok(())
    }

    pub fn create_tag(
        &self,
        collection_id: CollectionId,
        tag: NewTag,
    ) -> Result<Tag, LoreServiceError> {
        let name = normalize_label(&tag.name).ok_or(LoreServiceError::InvalidTagName)?;
        let tag = NewTag {
            name,
            color: normalize_optional(tag.color.as_deref()),
            note: normalize_optional(tag.note.as_deref()),
            scope: tag.scope,
        };
        let created = self.tags.create_tag(collection_id, &tag)?;
        info!(
            "event=tag_create module=lore status=ok tag={} scope={}",
            created.id,
            created.scope.as_str()
        );
        Ok(created)
    }

    /// Partial tag update. A scope change drops links to the old kind.
    pub fn update_tag(&self, id: TagId, mut patch: TagPatch) -> Result<Tag, LoreServiceError> {
        if let Some(name) = patch.name.take() {
            patch.name = Some(normalize_label(&name).ok_or(LoreServiceError::InvalidTagName)?);
        }
        patch.color = patch.color.map(|color| normalize_optional(color.as_deref()));
        patch.note = patch.note.map(|note| normalize_optional(note.as_deref()));
        Ok(self.tags.update_tag(id, &patch)?)
    }

    pub fn delete_tag(&self, id: TagId) -> Result<(), LoreServiceError> {
        self.tags.delete_tag(id)?;
        info!("event=tag_delete module=lore status=ok tag={id}");
        Ok(())
    }

    pub fn get_tag(&self, id: TagId) -> Result<Option<Tag>, LoreServiceError> {
        Ok(self.tags.get_tag(id)?)
    }

    /// Tags of one collection ordered by name, optionally limited to a scope.
    pub fn list_tags(
        &self,
        collection_id: CollectionId,
        scope: Option<EntityKind>,
    ) -> Result<Vec<Tag>, LoreServiceError> {
        self.ensure_collection(collection_id)?;
        Ok(self.tags.list_tags(collection_id, scope)?)
    }

    /// Tags among `tag_ids` attachable to a `kind` entity of the collection.
    pub fn resolve_tags(
        &self,
        collection_id: CollectionId,
        kind: EntityKind,
        tag_ids: &[TagId],
    ) -> Result<Vec<Tag>, LoreServiceError> {
        Ok(self.tags.resolve_scoped_tags(collection_id, kind, tag_ids)?)
    }

    /// Replaces the entity's tags with the resolved subset of `tag_ids`.
    pub fn set_entity_tags(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        tag_ids: &[TagId],
    ) -> Result<BTreeSet<TagId>, LoreServiceError> {
        let attached = self.tags.set_entity_tags(kind, entity_id, tag_ids)?;
        info!(
            "event=entity_tags_set module=lore status=ok kind={} id={entity_id} requested={} attached={}",
            kind.as_str(),
            tag_ids.len(),
            attached.len()
        );
        Ok(attached)
    }

    /// Stored character template, or the built-in default.
    pub fn character_template(&self, collection_id: CollectionId) -> Result<Value, LoreServiceError> {
        self.ensure_collection(collection_id)?;
        Ok(self
            .lore
            .character_template(collection_id)?
            .unwrap_or_else(default_character_template))
    }

    pub fn put_character_template(
        &self,
        collection_id: CollectionId,
        template: Value,
    ) -> Result<Value, LoreServiceError> {
        validate_template(&template)?;
        self.lore.put_character_template(collection_id, &template)?;
        Ok(template)
    }

    fn ensure_collection(&self, collection_id: CollectionId) -> Result<(), LoreServiceError> {
        if self.lore.collection_exists(collection_id)? {
            Ok(())
        } else {
            Err(LoreServiceError::CollectionNotFound(collection_id))
        }
    }
}

fn apply_character_draft(
    character: &mut Character,
    draft: CharacterDraft,
) -> Result<(), LoreServiceError> {
    if let Some(firstname) = draft.firstname {
        character.firstname = firstname.trim().to_string();
    }
    if let Some(lastname) = draft.lastname {
        character.lastname = lastname.trim().to_string();
    }
    if let Some(age) = draft.age {
        character.age = age;
    }
    if let Some(birthdate) = draft.birthdate {
        character.birthdate = parse_optional_lore_date(Some(&birthdate))?;
    }
    if let Some(avatar_url) = draft.avatar_url {
        character.avatar_url = normalize_optional(Some(&avatar_url));
    }
    if let Some(content) = draft.content {
        character.content = content;
    }
    if let Some(tag_ids) = draft.tag_ids {
        character.tag_ids = tag_ids.into_iter().collect();
    }
    Ok(())
}

fn apply_place_draft(place: &mut Place, draft: PlaceDraft) {
    if let Some(name) = draft.name {
        place.name = name.trim().to_string();
    }
    if let Some(location) = draft.location {
        place.location = normalize_optional(Some(&location));
    }
    if let Some(description) = draft.description {
        place.description = normalize_optional(Some(&description));
    }
    if let Some(images) = draft.images {
        place.images = images;
    }
    if let Some(content) = draft.content {
        place.content = content;
    }
    if let Some(tag_ids) = draft.tag_ids {
        place.tag_ids = tag_ids.into_iter().collect();
    }
}

fn apply_item_draft(item: &mut Item, draft: ItemDraft) {
    if let Some(name) = draft.name {
        item.name = name.trim().to_string();
    }
    if let Some(category) = draft.category {
        item.category = normalize_optional(Some(&category));
    }
    if let Some(description) = draft.description {
        item.description = description.trim().to_string();
    }
    if let Some(images) = draft.images {
        item.images = images;
    }
    if let Some(content) = draft.content {
        item.content = content;
    }
    if let Some(tag_ids) = draft.tag_ids {
        item.tag_ids = tag_ids.into_iter().collect();
    }
}

fn apply_event_draft(event: &mut Event, draft: EventDraft) -> Result<(), LoreServiceError> {
    if let Some(name) = draft.name {
        event.name = name.trim().to_string();
    }
    if let Some(start_date) = draft.start_date {
        event.start_date = parse_lore_date(&start_date)?;
    }
    if let Some(end_date) = draft.end_date {
        event.end_date = parse_optional_lore_date(Some(&end_date))?;
    }
    if let Some(description) = draft.description {
        event.description = description.trim().to_string();
    }
    if let Some(images) = draft.images {
        event.images = images;
    }
    if let Some(content) = draft.content {
        event.content = content;
    }
    if let Some(tag_ids) = draft.tag_ids {
        event.tag_ids = tag_ids.into_iter().collect();
    }
    Ok(())
}

/// `from` keeps events still running at or after it; `to` keeps events that
/// started at or before it.
fn overlaps(event: &Event, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    let after_from = from.map_or(true, |from| event.end_date.map_or(true, |end| end >= from));
    let before_to = to.map_or(true, |to| event.start_date <= to);
    after_from && before_to
}

fn filter_and_sort<E, F>(entities: Vec<E>, query: &LoreListQuery, compare: F) -> Vec<E>
where
    E: Taggable + TextSearchable,
    F: FnMut(&E, &E) -> Ordering,
{
    let mut entities = filter_tagged(entities, &query.filter());
    entities.sort_by(compare);
    entities
}

fn cmp_text(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}

fn not_found(kind: EntityKind, id: Uuid) -> LoreServiceError {
    LoreServiceError::EntityNotFound { kind, id }
}

fn log_write(action: &'static str, kind: EntityKind, id: Uuid, tag_count: usize) {
    info!(
        "event=lore_{action} module=lore status=ok kind={} id={id} tags={tag_count}",
        kind.as_str()
    );
}
