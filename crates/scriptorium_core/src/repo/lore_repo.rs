//! Character, place, item and event persistence plus character templates.
//!
//! # Responsibility
//! - Map the four lore entity shapes to their tables.
//! - Write an entity and its scoped tag links in one transaction.
//! - Store per-collection character templates.
//!
//! # Invariants
//! - Entities are validated before any statement runs.
//! - `tag_ids` on a written entity is treated as a request: only tags that
//!   pass scoped resolution are linked, replacing any prior links.
//! - JSON columns (`content`, `images`, templates) round-trip untouched.

use crate::model::hierarchy::{CollectionId, HierarchyLevel};
use crate::model::lore::{
    Character, CharacterId, EntityKind, Event, EventId, Item, ItemId, Place, PlaceId, DATE_FORMAT,
};
use crate::model::now_epoch_ms;
use crate::model::tag::TagId;
use crate::repo::error::{ensure_schema, parse_uuid, RepoError, RepoResult, TableSpec};
use crate::repo::hierarchy_repo::node_exists;
use crate::repo::tag_repo::{
    entity_collection, load_entity_tag_ids, replace_entity_tags, resolve_scoped,
};
use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

const REQUIRED_TABLES: &[TableSpec] = &[
    (
        "characters",
        &[
            "id",
            "collection_id",
            "firstname",
            "lastname",
            "age",
            "birthdate",
            "avatar_url",
            "content",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "places",
        &[
            "id",
            "collection_id",
            "name",
            "location",
            "description",
            "images",
            "content",
        ],
    ),
    (
        "items",
        &[
            "id",
            "collection_id",
            "name",
            "category",
            "description",
            "images",
            "content",
        ],
    ),
    (
        "events",
        &[
            "id",
            "collection_id",
            "name",
            "start_date",
            "end_date",
            "description",
            "images",
            "content",
        ],
    ),
    (
        "character_templates",
        &["collection_id", "template", "updated_at"],
    ),
];

const CHARACTER_SELECT_SQL: &str = "SELECT
    id, collection_id, firstname, lastname, age, birthdate, avatar_url, content,
    created_at, updated_at
FROM characters";

const PLACE_SELECT_SQL: &str = "SELECT
    id, collection_id, name, location, description, images, content,
    created_at, updated_at
FROM places";

const ITEM_SELECT_SQL: &str = "SELECT
    id, collection_id, name, category, description, images, content,
    created_at, updated_at
FROM items";

const EVENT_SELECT_SQL: &str = "SELECT
    id, collection_id, name, start_date, end_date, description, images, content,
    created_at, updated_at
FROM events";

/// Repository interface for lore entities.
///
/// Lists return rows in creation order; callers impose display ordering.
pub trait LoreRepository {
    fn collection_exists(&self, collection_id: CollectionId) -> RepoResult<bool>;
    /// Owning collection of one entity, if it exists.
    fn entity_collection(&self, kind: EntityKind, id: Uuid) -> RepoResult<Option<CollectionId>>;
    fn delete_entity(&self, kind: EntityKind, id: Uuid) -> RepoResult<()>;

    fn insert_character(&self, character: &Character) -> RepoResult<Character>;
    fn update_character(&self, character: &Character) -> RepoResult<Character>;
    fn get_character(&self, id: CharacterId) -> RepoResult<Option<Character>>;
    fn list_characters(&self, collection_id: CollectionId) -> RepoResult<Vec<Character>>;

    fn insert_place(&self, place: &Place) -> RepoResult<Place>;
    fn update_place(&self, place: &Place) -> RepoResult<Place>;
    fn get_place(&self, id: PlaceId) -> RepoResult<Option<Place>>;
    fn list_places(&self, collection_id: CollectionId) -> RepoResult<Vec<Place>>;

    fn insert_item(&self, item: &Item) -> RepoResult<Item>;
    fn update_item(&self, item: &Item) -> RepoResult<Item>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>>;
    fn list_items(&self, collection_id: CollectionId) -> RepoResult<Vec<Item>>;

    fn insert_event(&self, event: &Event) -> RepoResult<Event>;
    fn update_event(&self, event: &Event) -> RepoResult<Event>;
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    fn list_events(&self, collection_id: CollectionId) -> RepoResult<Vec<Event>>;

    /// Stored template, or `None` when the collection has none yet.
    fn character_template(&self, collection_id: CollectionId) -> RepoResult<Option<Value>>;
    fn put_character_template(&self, collection_id: CollectionId, template: &Value)
        -> RepoResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Update,
}

/// SQLite-backed lore repository.
pub struct SqliteLoreRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoreRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    /// Runs one entity write plus its tag replacement atomically.
    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        collection_id: CollectionId,
        requested_tags: &BTreeSet<TagId>,
        mode: WriteMode,
        sql: &str,
        values: &[&dyn ToSql],
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if mode == WriteMode::Insert
            && !node_exists(&tx, HierarchyLevel::Collection, collection_id)?
        {
            return Err(RepoError::not_found("collection", collection_id));
        }

        let changed = tx.execute(sql, values)?;
        if changed == 0 {
            return Err(RepoError::not_found(kind.as_str(), entity_id));
        }

        let requested: Vec<TagId> = requested_tags.iter().copied().collect();
        let attached: BTreeSet<TagId> = resolve_scoped(&tx, collection_id, kind, &requested)?
            .into_iter()
            .map(|tag| tag.id)
            .collect();
        replace_entity_tags(&tx, kind, entity_id, &attached)?;
        tx.commit()?;
        Ok(())
    }

    fn collection_tag_map(
        &self,
        kind: EntityKind,
        collection_id: CollectionId,
    ) -> RepoResult<HashMap<Uuid, BTreeSet<TagId>>> {
        let (link_table, entity_column) = kind.tag_link();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT l.{entity_column}, l.tag_id
             FROM {link_table} l
             INNER JOIN {table} e ON e.id = l.{entity_column}
             WHERE e.collection_id = ?1;",
            table = kind.table()
        ))?;
        let mut rows = stmt.query([collection_id.to_string()])?;
        let mut map: HashMap<Uuid, BTreeSet<TagId>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let entity: String = row.get(0)?;
            let tag: String = row.get(1)?;
            map.entry(parse_uuid(&entity, "entity_id")?)
                .or_default()
                .insert(parse_uuid(&tag, "tag_id")?);
        }
        Ok(map)
    }

    fn load_one<T>(
        &self,
        kind: EntityKind,
        select_sql: &str,
        id: Uuid,
        parse: fn(&Row<'_>, BTreeSet<TagId>) -> RepoResult<T>,
    ) -> RepoResult<Option<T>> {
        let mut stmt = self.conn.prepare(&format!("{select_sql} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            let tag_ids = load_entity_tag_ids(self.conn, kind, id)?;
            return Ok(Some(parse(row, tag_ids)?));
        }
        Ok(None)
    }

    fn load_all<T>(
        &self,
        kind: EntityKind,
        select_sql: &str,
        collection_id: CollectionId,
        parse: fn(&Row<'_>, BTreeSet<TagId>) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        let mut tags = self.collection_tag_map(kind, collection_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "{select_sql} WHERE collection_id = ?1 ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([collection_id.to_string()])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let tag_ids = tags
                .remove(&parse_uuid(&id, "id")?)
                .unwrap_or_default();
            entities.push(parse(row, tag_ids)?);
        }
        Ok(entities)
    }
}

impl LoreRepository for SqliteLoreRepository<'_> {
    fn collection_exists(&self, collection_id: CollectionId) -> RepoResult<bool> {
        node_exists(self.conn, HierarchyLevel::Collection, collection_id)
    }

    fn entity_collection(&self, kind: EntityKind, id: Uuid) -> RepoResult<Option<CollectionId>> {
        entity_collection(self.conn, kind, id)
    }

    fn delete_entity(&self, kind: EntityKind, id: Uuid) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", kind.table()),
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(kind.as_str(), id));
        }
        Ok(())
    }

    fn insert_character(&self, character: &Character) -> RepoResult<Character> {
        character.validate()?;
        self.persist(
            EntityKind::Character,
            character.id,
            character.collection_id,
            &character.tag_ids,
            WriteMode::Insert,
            "INSERT INTO characters (
                id, collection_id, firstname, lastname, age, birthdate, avatar_url, content,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                character.id.to_string(),
                character.collection_id.to_string(),
                character.firstname,
                character.lastname,
                character.age,
                encode_date(character.birthdate),
                character.avatar_url,
                encode_json(&character.content)?,
                character.created_at,
            ],
        )?;
        self.get_character(character.id)?
            .ok_or(RepoError::not_found("character", character.id))
    }

    fn update_character(&self, character: &Character) -> RepoResult<Character> {
        character.validate()?;
        self.persist(
            EntityKind::Character,
            character.id,
            character.collection_id,
            &character.tag_ids,
            WriteMode::Update,
            "UPDATE characters
             SET firstname = ?2, lastname = ?3, age = ?4, birthdate = ?5, avatar_url = ?6,
                 content = ?7, updated_at = ?8
             WHERE id = ?1;",
            params![
                character.id.to_string(),
                character.firstname,
                character.lastname,
                character.age,
                encode_date(character.birthdate),
                character.avatar_url,
                encode_json(&character.content)?,
                now_epoch_ms(),
            ],
        )?;
        self.get_character(character.id)?
            .ok_or(RepoError::not_found("character", character.id))
    }

    fn get_character(&self, id: CharacterId) -> RepoResult<Option<Character>> {
        self.load_one(EntityKind::Character, CHARACTER_SELECT_SQL, id, parse_character_row)
    }

    fn list_characters(&self, collection_id: CollectionId) -> RepoResult<Vec<Character>> {
        self.load_all(
            EntityKind::Character,
            CHARACTER_SELECT_SQL,
            collection_id,
            parse_character_row,
        )
    }

    fn insert_place(&self, place: &Place) -> RepoResult<Place> {
        place.validate()?;
        self.persist(
            EntityKind::Place,
            place.id,
            place.collection_id,
            &place.tag_ids,
            WriteMode::Insert,
            "INSERT INTO places (
                id, collection_id, name, location, description, images, content, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                place.id.to_string(),
                place.collection_id.to_string(),
                place.name,
                place.location,
                place.description,
                encode_images(&place.images)?,
                encode_json(&place.content)?,
                place.created_at,
            ],
        )?;
        self.get_place(place.id)?
            .ok_or(RepoError::not_found("place", place.id))
    }

    fn update_place(&self, place: &Place) -> RepoResult<Place> {
        place.validate()?;
        self.persist(
            EntityKind::Place,
            place.id,
            place.collection_id,
            &place.tag_ids,
            WriteMode::Update,
            "UPDATE places
             SET name = ?2, location = ?3, description = ?4, images = ?5, content = ?6,
                 updated_at = ?7
             WHERE id = ?1;",
            params![
                place.id.to_string(),
                place.name,
                place.location,
                place.description,
                encode_images(&place.images)?,
                encode_json(&place.content)?,
                now_epoch_ms(),
            ],
        )?;
        self.get_place(place.id)?
            .ok_or(RepoError::not_found("place", place.id))
    }

    fn get_place(&self, id: PlaceId) -> RepoResult<Option<Place>> {
        self.load_one(EntityKind::Place, PLACE_SELECT_SQL, id, parse_place_row)
    }

    fn list_places(&self, collection_id: CollectionId) -> RepoResult<Vec<Place>> {
        self.load_all(EntityKind::Place, PLACE_SELECT_SQL, collection_id, parse_place_row)
    }

    fn insert_item(&self, item: &Item) -> RepoResult<Item> {
        item.validate()?;
        self.persist(
            EntityKind::Item,
            item.id,
            item.collection_id,
            &item.tag_ids,
            WriteMode::Insert,
            "INSERT INTO items (
                id, collection_id, name, category, description, images, content, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                item.id.to_string(),
                item.collection_id.to_string(),
                item.name,
                item.category,
                item.description,
                encode_images(&item.images)?,
                encode_json(&item.content)?,
                item.created_at,
            ],
        )?;
        self.get_item(item.id)?
            .ok_or(RepoError::not_found("item", item.id))
    }

    fn update_item(&self, item: &Item) -> RepoResult<Item> {
        item.validate()?;
        self.persist(
            EntityKind::Item,
            item.id,
            item.collection_id,
            &item.tag_ids,
            WriteMode::Update,
            "UPDATE items
             SET name = ?2, category = ?3, description = ?4, images = ?5, content = ?6,
                 updated_at = ?7
             WHERE id = ?1;",
            params![
                item.id.to_string(),
                item.name,
                item.category,
                item.description,
                encode_images(&item.images)?,
                encode_json(&item.content)?,
                now_epoch_ms(),
            ],
        )?;
        self.get_item(item.id)?
            .ok_or(RepoError::not_found("item", item.id))
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        self.load_one(EntityKind::Item, ITEM_SELECT_SQL, id, parse_item_row)
    }

    fn list_items(&self, collection_id: CollectionId) -> RepoResult<Vec<Item>> {
        self.load_all(EntityKind::Item, ITEM_SELECT_SQL, collection_id, parse_item_row)
    }

    fn insert_event(&self, event: &Event) -> RepoResult<Event> {
        event.validate()?;
        self.persist(
            EntityKind::Event,
            event.id,
            event.collection_id,
            &event.tag_ids,
            WriteMode::Insert,
            "INSERT INTO events (
                id, collection_id, name, start_date, end_date, description, images, content,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                event.id.to_string(),
                event.collection_id.to_string(),
                event.name,
                event.start_date.format(DATE_FORMAT).to_string(),
                encode_date(event.end_date),
                event.description,
                encode_images(&event.images)?,
                encode_json(&event.content)?,
                event.created_at,
            ],
        )?;
        self.get_event(event.id)?
            .ok_or(RepoError::not_found("event", event.id))
    }

    fn update_event(&self, event: &Event) -> RepoResult<Event> {
        event.validate()?;
        self.persist(
            EntityKind::Event,
            event.id,
            event.collection_id,
            &event.tag_ids,
            WriteMode::Update,
            "UPDATE events
             SET name = ?2, start_date = ?3, end_date = ?4, description = ?5, images = ?6,
                 content = ?7, updated_at = ?8
             WHERE id = ?1;",
            params![
                event.id.to_string(),
                event.name,
                event.start_date.format(DATE_FORMAT).to_string(),
                encode_date(event.end_date),
                event.description,
                encode_images(&event.images)?,
                encode_json(&event.content)?,
                now_epoch_ms(),
            ],
        )?;
        self.get_event(event.id)?
            .ok_or(RepoError::not_found("event", event.id))
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        self.load_one(EntityKind::Event, EVENT_SELECT_SQL, id, parse_event_row)
    }

    fn list_events(&self, collection_id: CollectionId) -> RepoResult<Vec<Event>> {
        self.load_all(EntityKind::Event, EVENT_SELECT_SQL, collection_id, parse_event_row)
    }

    fn character_template(&self, collection_id: CollectionId) -> RepoResult<Option<Value>> {
        let raw = self
            .conn
            .query_row(
                "SELECT template FROM character_templates WHERE collection_id = ?1;",
                [collection_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        raw.map(|raw| decode_json(&raw, "character_templates.template"))
            .transpose()
    }

    fn put_character_template(
        &self,
        collection_id: CollectionId,
        template: &Value,
    ) -> RepoResult<()> {
        if !self.collection_exists(collection_id)? {
            return Err(RepoError::not_found("collection", collection_id));
        }
        self.conn.execute(
            "INSERT INTO character_templates (collection_id, template, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(collection_id) DO UPDATE SET
                template = excluded.template,
                updated_at = excluded.updated_at;",
            params![
                collection_id.to_string(),
                encode_json(template)?,
                now_epoch_ms()
            ],
        )?;
        Ok(())
    }
}

fn parse_character_row(row: &Row<'_>, tag_ids: BTreeSet<TagId>) -> RepoResult<Character> {
    let id: String = row.get("id")?;
    let collection_id: String = row.get("collection_id")?;
    let content: String = row.get("content")?;
    Ok(Character {
        id: parse_uuid(&id, "characters.id")?,
        collection_id: parse_uuid(&collection_id, "characters.collection_id")?,
        firstname: row.get("firstname")?,
        lastname: row.get("lastname")?,
        age: row.get("age")?,
        birthdate: decode_optional_date(row.get("birthdate")?, "characters.birthdate")?,
        avatar_url: row.get("avatar_url")?,
        content: decode_json(&content, "characters.content")?,
        tag_ids,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_place_row(row: &Row<'_>, tag_ids: BTreeSet<TagId>) -> RepoResult<Place> {
    let id: String = row.get("id")?;
    let collection_id: String = row.get("collection_id")?;
    let images: String = row.get("images")?;
    let content: String = row.get("content")?;
    Ok(Place {
        id: parse_uuid(&id, "places.id")?,
        collection_id: parse_uuid(&collection_id, "places.collection_id")?,
        name: row.get("name")?,
        location: row.get("location")?,
        description: row.get("description")?,
        images: decode_images(&images, "places.images")?,
        content: decode_json(&content, "places.content")?,
        tag_ids,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_item_row(row: &Row<'_>, tag_ids: BTreeSet<TagId>) -> RepoResult<Item> {
    let id: String = row.get("id")?;
    let collection_id: String = row.get("collection_id")?;
    let images: String = row.get("images")?;
    let content: String = row.get("content")?;
    Ok(Item {
        id: parse_uuid(&id, "items.id")?,
        collection_id: parse_uuid(&collection_id, "items.collection_id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        description: row.get("description")?,
        images: decode_images(&images, "items.images")?,
        content: decode_json(&content, "items.content")?,
        tag_ids,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_event_row(row: &Row<'_>, tag_ids: BTreeSet<TagId>) -> RepoResult<Event> {
    let id: String = row.get("id")?;
    let collection_id: String = row.get("collection_id")?;
    let start_date: String = row.get("start_date")?;
    let images: String = row.get("images")?;
    let content: String = row.get("content")?;
    Ok(Event {
        id: parse_uuid(&id, "events.id")?,
        collection_id: parse_uuid(&collection_id, "events.collection_id")?,
        name: row.get("name")?,
        start_date: decode_date(&start_date, "events.start_date")?,
        end_date: decode_optional_date(row.get("end_date")?, "events.end_date")?,
        description: row.get("description")?,
        images: decode_images(&images, "events.images")?,
        content: decode_json(&content, "events.content")?,
        tag_ids,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|date| date.format(DATE_FORMAT).to_string())
}

fn decode_date(raw: &str, column: &'static str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{raw}` in {column}")))
}

fn decode_optional_date(
    raw: Option<String>,
    column: &'static str,
) -> RepoResult<Option<NaiveDate>> {
    raw.map(|raw| decode_date(&raw, column)).transpose()
}

fn encode_json(value: &Value) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("value not encodable as JSON: {err}")))
}

fn decode_json(raw: &str, column: &'static str) -> RepoResult<Value> {
    serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("invalid JSON in {column}: {err}")))
}

fn encode_images(images: &[String]) -> RepoResult<String> {
    serde_json::to_string(images)
        .map_err(|err| RepoError::InvalidData(format!("images not encodable: {err}")))
}

fn decode_images(raw: &str, column: &'static str) -> RepoResult<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("invalid image list in {column}: {err}")))
}
