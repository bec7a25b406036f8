//! Tag persistence and tag association writes.
//!
//! # Responsibility
//! - CRUD for collection-scoped tags.
//! - Resolve requested tag ids through the scope filter before attaching.
//! - Replace an entity's tag set as one transaction.
//!
//! # Invariants
//! - Association rows only ever reference tags of the entity's collection
//!   whose scope equals the entity kind.
//! - Changing a tag's scope drops its links to entities of the old kind in
//!   the same transaction.

use crate::model::hierarchy::{CollectionId, HierarchyLevel};
use crate::model::lore::EntityKind;
use crate::model::now_epoch_ms;
use crate::model::tag::{NewTag, Tag, TagId, TagPatch};
use crate::repo::error::{ensure_schema, parse_uuid, RepoError, RepoResult, TableSpec};
use crate::repo::hierarchy_repo::node_exists;
use crate::tagging::scope::{requested_set, retain_in_scope};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeSet;
use uuid::Uuid;

const REQUIRED_TABLES: &[TableSpec] = &[
    (
        "tags",
        &[
            "id",
            "collection_id",
            "name",
            "color",
            "note",
            "scope",
            "created_at",
            "updated_at",
        ],
    ),
    ("character_tags", &["character_id", "tag_id"]),
    ("place_tags", &["place_id", "tag_id"]),
    ("item_tags", &["item_id", "tag_id"]),
    ("event_tags", &["event_id", "tag_id"]),
];

const TAG_SELECT_SQL: &str = "SELECT
    id,
    collection_id,
    name,
    color,
    note,
    scope,
    created_at,
    updated_at
FROM tags";

/// Repository interface for tags and tag associations.
pub trait TagRepository {
    fn create_tag(&self, collection_id: CollectionId, tag: &NewTag) -> RepoResult<Tag>;
    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>>;
    /// Tags of one collection ordered by name, optionally limited to a scope.
    fn list_tags(
        &self,
        collection_id: CollectionId,
        scope: Option<EntityKind>,
    ) -> RepoResult<Vec<Tag>>;
    fn update_tag(&self, id: TagId, patch: &TagPatch) -> RepoResult<Tag>;
    fn delete_tag(&self, id: TagId) -> RepoResult<()>;
    /// Subset of `tag_ids` that exist, belong to `collection_id` and carry
    /// `kind` as scope. Never fails on unknown ids.
    fn resolve_scoped_tags(
        &self,
        collection_id: CollectionId,
        kind: EntityKind,
        tag_ids: &[TagId],
    ) -> RepoResult<Vec<Tag>>;
    /// Full replace of one entity's tags with the resolved subset.
    fn set_entity_tags(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        tag_ids: &[TagId],
    ) -> RepoResult<BTreeSet<TagId>>;
    fn entity_tag_ids(&self, kind: EntityKind, entity_id: Uuid) -> RepoResult<BTreeSet<TagId>>;
}

/// SQLite-backed tag repository.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn create_tag(&self, collection_id: CollectionId, tag: &NewTag) -> RepoResult<Tag> {
        if !node_exists(self.conn, HierarchyLevel::Collection, collection_id)? {
            return Err(RepoError::not_found("collection", collection_id));
        }

        let id = TagId::new_v4();
        self.conn.execute(
            "INSERT INTO tags (id, collection_id, name, color, note, scope, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                collection_id.to_string(),
                tag.name,
                tag.color,
                tag.note,
                tag.scope.as_str(),
                now_epoch_ms(),
            ],
        )?;
        load_tag(self.conn, id)?.ok_or(RepoError::not_found("tag", id))
    }

    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>> {
        load_tag(self.conn, id)
    }

    fn list_tags(
        &self,
        collection_id: CollectionId,
        scope: Option<EntityKind>,
    ) -> RepoResult<Vec<Tag>> {
        let mut bind = vec![collection_id.to_string()];
        let mut sql = format!("{TAG_SELECT_SQL} WHERE collection_id = ?1");
        if let Some(scope) = scope {
            sql.push_str(" AND scope = ?2");
            bind.push(scope.as_str().to_string());
        }
        sql.push_str(" ORDER BY name COLLATE NOCASE ASC, id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind.iter()))?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn update_tag(&self, id: TagId, patch: &TagPatch) -> RepoResult<Tag> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut tag = load_tag(&tx, id)?.ok_or(RepoError::not_found("tag", id))?;
        let previous_scope = tag.scope;

        if let Some(name) = &patch.name {
            tag.name = name.clone();
        }
        if let Some(color) = &patch.color {
            tag.color = color.clone();
        }
        if let Some(note) = &patch.note {
            tag.note = note.clone();
        }
        if let Some(scope) = patch.scope {
            tag.scope = scope;
        }

        tx.execute(
            "UPDATE tags
             SET name = ?2, color = ?3, note = ?4, scope = ?5, updated_at = ?6
             WHERE id = ?1;",
            params![
                id.to_string(),
                tag.name,
                tag.color,
                tag.note,
                tag.scope.as_str(),
                now_epoch_ms(),
            ],
        )?;
        if tag.scope != previous_scope {
            let (link_table, _) = previous_scope.tag_link();
            tx.execute(
                &format!("DELETE FROM {link_table} WHERE tag_id = ?1;"),
                [id.to_string()],
            )?;
        }

        let updated = load_tag(&tx, id)?.ok_or(RepoError::not_found("tag", id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_tag(&self, id: TagId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tags WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::not_found("tag", id));
        }
        Ok(())
    }

    fn resolve_scoped_tags(
        &self,
        collection_id: CollectionId,
        kind: EntityKind,
        tag_ids: &[TagId],
    ) -> RepoResult<Vec<Tag>> {
        resolve_scoped(self.conn, collection_id, kind, tag_ids)
    }

    fn set_entity_tags(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        tag_ids: &[TagId],
    ) -> RepoResult<BTreeSet<TagId>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let collection_id = entity_collection(&tx, kind, entity_id)?
            .ok_or(RepoError::not_found(kind.as_str(), entity_id))?;

        let resolved = resolve_scoped(&tx, collection_id, kind, tag_ids)?;
        let attached: BTreeSet<TagId> = resolved.iter().map(|tag| tag.id).collect();
        replace_entity_tags(&tx, kind, entity_id, &attached)?;
        tx.commit()?;
        Ok(attached)
    }

    fn entity_tag_ids(&self, kind: EntityKind, entity_id: Uuid) -> RepoResult<BTreeSet<TagId>> {
        load_entity_tag_ids(self.conn, kind, entity_id)
    }
}

/// Owning collection of one lore entity.
pub(crate) fn entity_collection(
    conn: &Connection,
    kind: EntityKind,
    entity_id: Uuid,
) -> RepoResult<Option<CollectionId>> {
    let collection = conn
        .query_row(
            &format!("SELECT collection_id FROM {} WHERE id = ?1;", kind.table()),
            [entity_id.to_string()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    collection
        .map(|value| parse_uuid(&value, "collection_id"))
        .transpose()
}

pub(crate) fn resolve_scoped(
    conn: &Connection,
    collection_id: CollectionId,
    kind: EntityKind,
    tag_ids: &[TagId],
) -> RepoResult<Vec<Tag>> {
    let requested = requested_set(tag_ids);
    if requested.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (1..=requested.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("{TAG_SELECT_SQL} WHERE id IN ({placeholders});");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(requested.iter().map(Uuid::to_string)))?;
    let mut candidates = Vec::new();
    while let Some(row) = rows.next()? {
        candidates.push(parse_tag_row(row)?);
    }

    Ok(retain_in_scope(candidates, collection_id, kind, &requested))
}

/// Deletes every link of the entity, then inserts `tag_ids`. Callers run
/// this inside their own transaction.
pub(crate) fn replace_entity_tags(
    conn: &Connection,
    kind: EntityKind,
    entity_id: Uuid,
    tag_ids: &BTreeSet<TagId>,
) -> RepoResult<()> {
    let (link_table, entity_column) = kind.tag_link();
    let entity_key = entity_id.to_string();
    conn.execute(
        &format!("DELETE FROM {link_table} WHERE {entity_column} = ?1;"),
        [entity_key.as_str()],
    )?;

    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {link_table} ({entity_column}, tag_id) VALUES (?1, ?2);"
    ))?;
    for tag_id in tag_ids {
        stmt.execute(params![entity_key, tag_id.to_string()])?;
    }
    Ok(())
}

pub(crate) fn load_entity_tag_ids(
    conn: &Connection,
    kind: EntityKind,
    entity_id: Uuid,
) -> RepoResult<BTreeSet<TagId>> {
    let (link_table, entity_column) = kind.tag_link();
    let mut stmt = conn.prepare(&format!(
        "SELECT tag_id FROM {link_table} WHERE {entity_column} = ?1;"
    ))?;
    let mut rows = stmt.query([entity_id.to_string()])?;
    let mut tag_ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tag_ids.insert(parse_uuid(&value, "tag_id")?);
    }
    Ok(tag_ids)
}

fn load_tag(conn: &Connection, id: TagId) -> RepoResult<Option<Tag>> {
    let mut stmt = conn.prepare(&format!("{TAG_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_tag_row(row)?));
    }
    Ok(None)
}

fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    let id: String = row.get("id")?;
    let collection_id: String = row.get("collection_id")?;
    let scope: String = row.get("scope")?;
    let scope = EntityKind::parse(&scope)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid tag scope `{scope}`")))?;

    Ok(Tag {
        id: parse_uuid(&id, "tags.id")?,
        collection_id: parse_uuid(&collection_id, "tags.collection_id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        note: row.get("note")?,
        scope,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
