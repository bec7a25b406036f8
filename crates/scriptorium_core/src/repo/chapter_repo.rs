//! Chapter persistence and position batches.
//!
//! # Responsibility
//! - Store chapter content and metadata.
//! - Apply append/remove/move position plans from [`crate::ordering::position`]
//!   atomically.
//!
//! # Invariants
//! - Every position-changing call runs read → plan → write → re-check inside
//!   one `BEGIN IMMEDIATE` transaction; SQLite's writer lock serialises
//!   concurrent calls against the same tome.
//! - Each batch row is guarded by its planned `from` position. A row that no
//!   longer matches aborts the batch and the transaction rolls back.
//! - The tome's positions are re-read and checked for density before commit.

use crate::model::chapter::{Chapter, ChapterId, ChapterPatch, ChapterSummary, NewChapter};
use crate::model::hierarchy::{CollectionId, TomeId};
use crate::model::now_epoch_ms;
use crate::ordering::position::{
    ensure_dense, next_position, plan_move, plan_remove, MovePlan, PositionError, PositionSlot,
    PositionUpdate,
};
use crate::repo::error::{ensure_schema, parse_uuid, RepoError, RepoResult, TableSpec};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;

const REQUIRED_TABLES: &[TableSpec] = &[
    (
        "chapters",
        &[
            "id",
            "tome_id",
            "title",
            "content",
            "position",
            "notes",
            "annotations",
            "created_at",
            "updated_at",
        ],
    ),
    ("tomes", &["id", "saga_id"]),
    ("sagas", &["id", "collection_id"]),
];

const CHAPTER_SELECT_SQL: &str = "SELECT
    id,
    tome_id,
    title,
    content,
    position,
    notes,
    annotations,
    created_at,
    updated_at
FROM chapters";

/// Result of a committed (or no-op) move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub tome_id: TomeId,
    pub plan: MovePlan,
    /// Fresh ordering of the whole tome after the move.
    pub chapters: Vec<ChapterSummary>,
}

/// Result of a committed removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub tome_id: TomeId,
    pub chapter_id: ChapterId,
    pub removed_position: i64,
    /// Number of later chapters moved one step left.
    pub shifted: usize,
}

/// Repository interface for chapters.
pub trait ChapterRepository {
    fn tome_exists(&self, tome_id: TomeId) -> RepoResult<bool>;
    fn get_chapter(&self, id: ChapterId) -> RepoResult<Option<Chapter>>;
    /// Summaries ordered by position, then creation time, then id.
    fn list_chapters(&self, tome_id: TomeId) -> RepoResult<Vec<ChapterSummary>>;
    /// Inserts a chapter at `max(position) + 1` (or 1 for an empty tome).
    fn append_chapter(&self, tome_id: TomeId, chapter: &NewChapter) -> RepoResult<Chapter>;
    /// Applies a content patch; positions are never touched here.
    fn update_chapter(&self, id: ChapterId, patch: &ChapterPatch) -> RepoResult<Chapter>;
    /// Removes the chapter at `position` and closes the gap.
    fn remove_at(&self, tome_id: TomeId, position: i64) -> RepoResult<RemovalOutcome>;
    /// Removes one chapter by id and closes the gap.
    fn delete_chapter(&self, id: ChapterId) -> RepoResult<RemovalOutcome>;
    /// Moves one chapter to `requested_to` (clamped into `1..=N`).
    fn move_chapter(&self, id: ChapterId, requested_to: i64) -> RepoResult<MoveOutcome>;
    /// Collection owning the chapter's tome, if the chapter exists.
    fn chapter_collection(&self, id: ChapterId) -> RepoResult<Option<CollectionId>>;
}

/// SQLite-backed chapter repository.
pub struct SqliteChapterRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChapterRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn immediate(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl ChapterRepository for SqliteChapterRepository<'_> {
    fn tome_exists(&self, tome_id: TomeId) -> RepoResult<bool> {
        tome_exists(self.conn, tome_id)
    }

    fn get_chapter(&self, id: ChapterId) -> RepoResult<Option<Chapter>> {
        load_chapter(self.conn, id)
    }

    fn list_chapters(&self, tome_id: TomeId) -> RepoResult<Vec<ChapterSummary>> {
        list_summaries(self.conn, tome_id)
    }

    fn append_chapter(&self, tome_id: TomeId, chapter: &NewChapter) -> RepoResult<Chapter> {
        let tx = self.immediate()?;
        if !tome_exists(&tx, tome_id)? {
            return Err(RepoError::not_found("tome", tome_id));
        }

        let slots = load_slots(&tx, tome_id)?;
        let position = next_position(&slots);
        let id = ChapterId::new_v4();
        tx.execute(
            "INSERT INTO chapters (
                id,
                tome_id,
                title,
                content,
                position,
                notes,
                annotations,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                tome_id.to_string(),
                chapter.title,
                chapter.content,
                position,
                chapter.notes,
                encode_annotations(chapter.annotations.as_ref())?,
                now_epoch_ms(),
            ],
        )?;

        let created = load_chapter(&tx, id)?.ok_or(RepoError::not_found("chapter", id))?;
        tx.commit()?;
        Ok(created)
    }

    fn update_chapter(&self, id: ChapterId, patch: &ChapterPatch) -> RepoResult<Chapter> {
        let tx = self.immediate()?;
        let mut chapter = load_chapter(&tx, id)?.ok_or(RepoError::not_found("chapter", id))?;

        if let Some(title) = &patch.title {
            chapter.title = title.clone();
        }
        if let Some(content) = &patch.content {
            chapter.content = content.clone();
        }
        if let Some(notes) = &patch.notes {
            chapter.notes = notes.clone();
        }
        if let Some(annotations) = &patch.annotations {
            chapter.annotations = annotations.clone();
        }

        tx.execute(
            "UPDATE chapters
             SET title = ?2,
                 content = ?3,
                 notes = ?4,
                 annotations = ?5,
                 updated_at = ?6
             WHERE id = ?1;",
            params![
                id.to_string(),
                chapter.title,
                chapter.content,
                chapter.notes,
                encode_annotations(chapter.annotations.as_ref())?,
                now_epoch_ms(),
            ],
        )?;

        let updated = load_chapter(&tx, id)?.ok_or(RepoError::not_found("chapter", id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn remove_at(&self, tome_id: TomeId, position: i64) -> RepoResult<RemovalOutcome> {
        let tx = self.immediate()?;
        if !tome_exists(&tx, tome_id)? {
            return Err(RepoError::not_found("tome", tome_id));
        }
        let outcome = remove_in_tx(&tx, tome_id, position)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn delete_chapter(&self, id: ChapterId) -> RepoResult<RemovalOutcome> {
        let tx = self.immediate()?;
        let (tome_id, position) = tx
            .query_row(
                "SELECT tome_id, position FROM chapters WHERE id = ?1;",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?
            .ok_or(RepoError::not_found("chapter", id))?;
        let tome_id = parse_uuid(&tome_id, "chapters.tome_id")?;

        let outcome = remove_in_tx(&tx, tome_id, position)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn move_chapter(&self, id: ChapterId, requested_to: i64) -> RepoResult<MoveOutcome> {
        let tx = self.immediate()?;
        let tome_id = tx
            .query_row(
                "SELECT tome_id FROM chapters WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or(RepoError::not_found("chapter", id))?;
        let tome_id = parse_uuid(&tome_id, "chapters.tome_id")?;

        let slots = load_slots(&tx, tome_id)?;
        let plan = plan_move(&slots, id, requested_to)?;
        if !plan.is_noop() {
            apply_batch(&tx, tome_id, &plan.updates)?;
            ensure_dense(&load_slots(&tx, tome_id)?)?;
        }

        let chapters = list_summaries(&tx, tome_id)?;
        tx.commit()?;
        Ok(MoveOutcome {
            tome_id,
            plan,
            chapters,
        })
    }

    fn chapter_collection(&self, id: ChapterId) -> RepoResult<Option<CollectionId>> {
        let collection = self
            .conn
            .query_row(
                "SELECT s.collection_id
                 FROM chapters c
                 INNER JOIN tomes t ON t.id = c.tome_id
                 INNER JOIN sagas s ON s.id = t.saga_id
                 WHERE c.id = ?1;",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        collection
            .map(|value| parse_uuid(&value, "sagas.collection_id"))
            .transpose()
    }
}

fn tome_exists(conn: &Connection, tome_id: TomeId) -> RepoResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tomes WHERE id = ?1;",
            [tome_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn remove_in_tx(conn: &Connection, tome_id: TomeId, position: i64) -> RepoResult<RemovalOutcome> {
    let slots = load_slots(conn, tome_id)?;
    let updates = plan_remove(&slots, position)?;
    let chapter_id = slots
        .iter()
        .find(|slot| slot.position == position)
        .map(|slot| slot.chapter_id)
        .ok_or(PositionError::PositionNotFound(position))?;

    let deleted = conn.execute(
        "DELETE FROM chapters WHERE id = ?1 AND tome_id = ?2 AND position = ?3;",
        params![chapter_id.to_string(), tome_id.to_string(), position],
    )?;
    if deleted != 1 {
        return Err(RepoError::Conflict(format!(
            "chapter {chapter_id} left position {position} during removal"
        )));
    }

    apply_batch(conn, tome_id, &updates)?;
    ensure_dense(&load_slots(conn, tome_id)?)?;

    Ok(RemovalOutcome {
        tome_id,
        chapter_id,
        removed_position: position,
        shifted: updates.len(),
    })
}

fn apply_batch(conn: &Connection, tome_id: TomeId, updates: &[PositionUpdate]) -> RepoResult<()> {
    let updated_at = now_epoch_ms();
    let tome_key = tome_id.to_string();
    let mut stmt = conn.prepare(
        "UPDATE chapters
         SET position = ?1, updated_at = ?2
         WHERE id = ?3 AND tome_id = ?4 AND position = ?5;",
    )?;
    for update in updates {
        let changed = stmt.execute(params![
            update.to,
            updated_at,
            update.chapter_id.to_string(),
            tome_key,
            update.from,
        ])?;
        if changed != 1 {
            return Err(RepoError::Conflict(format!(
                "chapter {} no longer at position {}",
                update.chapter_id, update.from
            )));
        }
    }
    Ok(())
}

fn load_slots(conn: &Connection, tome_id: TomeId) -> RepoResult<Vec<PositionSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, position, created_at
         FROM chapters
         WHERE tome_id = ?1
         ORDER BY position ASC, created_at ASC, id ASC;",
    )?;
    let mut rows = stmt.query([tome_id.to_string()])?;
    let mut slots = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        slots.push(PositionSlot {
            chapter_id: parse_uuid(&id, "chapters.id")?,
            position: row.get(1)?,
            created_at: row.get(2)?,
        });
    }
    Ok(slots)
}

fn list_summaries(conn: &Connection, tome_id: TomeId) -> RepoResult<Vec<ChapterSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, position
         FROM chapters
         WHERE tome_id = ?1
         ORDER BY position ASC, created_at ASC, id ASC;",
    )?;
    let mut rows = stmt.query([tome_id.to_string()])?;
    let mut summaries = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        summaries.push(ChapterSummary {
            id: parse_uuid(&id, "chapters.id")?,
            title: row.get(1)?,
            position: row.get(2)?,
        });
    }
    Ok(summaries)
}

fn load_chapter(conn: &Connection, id: ChapterId) -> RepoResult<Option<Chapter>> {
    let mut stmt = conn.prepare(&format!("{CHAPTER_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_chapter_row(row)?));
    }
    Ok(None)
}

fn parse_chapter_row(row: &Row<'_>) -> RepoResult<Chapter> {
    let id: String = row.get("id")?;
    let tome_id: String = row.get("tome_id")?;
    let annotations = row
        .get::<_, Option<String>>("annotations")?
        .map(|raw| {
            serde_json::from_str::<Value>(&raw).map_err(|err| {
                RepoError::InvalidData(format!("chapter {id} annotations are not JSON: {err}"))
            })
        })
        .transpose()?;

    Ok(Chapter {
        id: parse_uuid(&id, "chapters.id")?,
        tome_id: parse_uuid(&tome_id, "chapters.tome_id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        position: row.get("position")?,
        notes: row.get("notes")?,
        annotations,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_annotations(annotations: Option<&Value>) -> RepoResult<Option<String>> {
    annotations
        .map(|value| {
            serde_json::to_string(value)
                .map_err(|err| RepoError::InvalidData(format!("annotations not encodable: {err}")))
        })
        .transpose()
}
