//! Project/collection/saga/tome persistence.
//!
//! # Responsibility
//! - CRUD for the four container levels through one level-parameterised
//!   contract.
//! - Load a whole project outline from a single read snapshot.
//!
//! # Invariants
//! - Sibling listings are ordered `created_at ASC, id ASC`.
//! - Deletes rely on `ON DELETE CASCADE`; descendants never outlive parents.

use crate::model::hierarchy::{HierarchyLevel, HierarchyRecord, ProjectId, ProjectOutline};
use crate::model::now_epoch_ms;
use crate::repo::error::{ensure_schema, parse_uuid, RepoError, RepoResult, TableSpec};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const REQUIRED_TABLES: &[TableSpec] = &[
    ("projects", &["id", "name", "created_at", "updated_at"]),
    ("collections", &["id", "project_id", "name", "created_at"]),
    ("sagas", &["id", "collection_id", "name", "created_at"]),
    ("tomes", &["id", "saga_id", "name", "summary", "created_at"]),
];

/// Repository interface for the container hierarchy.
pub trait HierarchyRepository {
    /// Inserts one container; `parent_id` must be `None` only for projects.
    fn create_node(
        &self,
        level: HierarchyLevel,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> RepoResult<HierarchyRecord>;
    fn get_node(&self, level: HierarchyLevel, id: Uuid) -> RepoResult<Option<HierarchyRecord>>;
    /// Lists siblings under `parent_id` (all projects when `level` is project).
    fn list_nodes(
        &self,
        level: HierarchyLevel,
        parent_id: Option<Uuid>,
    ) -> RepoResult<Vec<HierarchyRecord>>;
    fn rename_node(&self, level: HierarchyLevel, id: Uuid, name: &str) -> RepoResult<()>;
    fn set_tome_summary(&self, tome_id: Uuid, summary: Option<&str>) -> RepoResult<()>;
    /// Deletes one container and, through cascades, everything it owns.
    fn delete_node(&self, level: HierarchyLevel, id: Uuid) -> RepoResult<()>;
    /// Loads the project and all of its collections, sagas and tomes.
    fn load_outline(&self, project_id: ProjectId) -> RepoResult<Option<ProjectOutline>>;
}

/// SQLite-backed hierarchy repository.
pub struct SqliteHierarchyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHierarchyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl HierarchyRepository for SqliteHierarchyRepository<'_> {
    fn create_node(
        &self,
        level: HierarchyLevel,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> RepoResult<HierarchyRecord> {
        let id = Uuid::new_v4();
        let created_at = now_epoch_ms();

        match (level.parent_column(), level.parent_level(), parent_id) {
            (None, _, None) => {
                self.conn.execute(
                    "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3);",
                    params![id.to_string(), name, created_at],
                )?;
            }
            (Some(column), Some(parent_level), Some(parent_id)) => {
                if !node_exists(self.conn, parent_level, parent_id)? {
                    return Err(RepoError::not_found(parent_level.as_str(), parent_id));
                }
                self.conn.execute(
                    &format!(
                        "INSERT INTO {table} (id, {column}, name, created_at)
                         VALUES (?1, ?2, ?3, ?4);",
                        table = level.table()
                    ),
                    params![id.to_string(), parent_id.to_string(), name, created_at],
                )?;
            }
            _ => {
                return Err(RepoError::InvalidData(format!(
                    "{} parent must be {}",
                    level.as_str(),
                    if level == HierarchyLevel::Project {
                        "absent"
                    } else {
                        "present"
                    }
                )));
            }
        }

        self.get_node(level, id)?
            .ok_or(RepoError::not_found(level.as_str(), id))
    }

    fn get_node(&self, level: HierarchyLevel, id: Uuid) -> RepoResult<Option<HierarchyRecord>> {
        let sql = format!("{} WHERE id = ?1;", select_sql(level));
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row, level)?));
        }
        Ok(None)
    }

    fn list_nodes(
        &self,
        level: HierarchyLevel,
        parent_id: Option<Uuid>,
    ) -> RepoResult<Vec<HierarchyRecord>> {
        match (level.parent_column(), parent_id) {
            (Some(column), Some(parent_id)) => query_records(
                self.conn,
                level,
                &format!(
                    "{} WHERE {column} = ?1 ORDER BY created_at ASC, id ASC;",
                    select_sql(level)
                ),
                &[parent_id.to_string()],
            ),
            (None, _) => query_records(
                self.conn,
                level,
                &format!("{} ORDER BY created_at ASC, id ASC;", select_sql(level)),
                &[],
            ),
            (Some(_), None) => Err(RepoError::InvalidData(format!(
                "listing {} requires a parent id",
                level.table()
            ))),
        }
    }

    fn rename_node(&self, level: HierarchyLevel, id: Uuid, name: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET name = ?2, updated_at = ?3 WHERE id = ?1;",
                level.table()
            ),
            params![id.to_string(), name, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(level.as_str(), id));
        }
        Ok(())
    }

    fn set_tome_summary(&self, tome_id: Uuid, summary: Option<&str>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tomes SET summary = ?2, updated_at = ?3 WHERE id = ?1;",
            params![tome_id.to_string(), summary, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("tome", tome_id));
        }
        Ok(())
    }

    fn delete_node(&self, level: HierarchyLevel, id: Uuid) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", level.table()),
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(level.as_str(), id));
        }
        Ok(())
    }

    fn load_outline(&self, project_id: ProjectId) -> RepoResult<Option<ProjectOutline>> {
        // Deferred read transaction: all four queries see one snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let project_key = project_id.to_string();

        let project = {
            let sql = format!("{} WHERE id = ?1;", select_sql(HierarchyLevel::Project));
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query([project_key.as_str()])?;
            let record = match rows.next()? {
                Some(row) => Some(parse_record_row(row, HierarchyLevel::Project)?),
                None => None,
            };
            record
        };
        let Some(project) = project else {
            return Ok(None);
        };

        let params = [project_key.clone()];
        let collections = query_records(
            &tx,
            HierarchyLevel::Collection,
            &format!(
                "{} WHERE project_id = ?1;",
                select_sql(HierarchyLevel::Collection)
            ),
            &params,
        )?;
        let sagas = query_records(
            &tx,
            HierarchyLevel::Saga,
            &format!(
                "{} WHERE collection_id IN (SELECT id FROM collections WHERE project_id = ?1);",
                select_sql(HierarchyLevel::Saga)
            ),
            &params,
        )?;
        let tomes = query_records(
            &tx,
            HierarchyLevel::Tome,
            &format!(
                "{} WHERE saga_id IN (
                    SELECT s.id
                    FROM sagas s
                    INNER JOIN collections c ON c.id = s.collection_id
                    WHERE c.project_id = ?1
                );",
                select_sql(HierarchyLevel::Tome)
            ),
            &params,
        )?;
        tx.commit()?;

        Ok(Some(ProjectOutline {
            project,
            collections,
            sagas,
            tomes,
        }))
    }
}

/// Returns whether a container row exists.
pub(crate) fn node_exists(conn: &Connection, level: HierarchyLevel, id: Uuid) -> RepoResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1;", level.table()),
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn select_sql(level: HierarchyLevel) -> String {
    let summary = if level == HierarchyLevel::Tome {
        "summary"
    } else {
        "NULL"
    };
    format!(
        "SELECT
            id,
            {parent} AS parent_id,
            name,
            {summary} AS summary,
            created_at,
            updated_at
         FROM {table}",
        parent = level.parent_column().unwrap_or("NULL"),
        table = level.table()
    )
}

fn query_records(
    conn: &Connection,
    level: HierarchyLevel,
    sql: &str,
    bind: &[String],
) -> RepoResult<Vec<HierarchyRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(bind.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(row, level)?);
    }
    Ok(records)
}

fn parse_record_row(row: &Row<'_>, level: HierarchyLevel) -> RepoResult<HierarchyRecord> {
    let id_text: String = row.get("id")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_id")?
        .map(|value| parse_uuid(&value, "parent_id"))
        .transpose()?;

    Ok(HierarchyRecord {
        id: parse_uuid(&id_text, "id")?,
        level,
        parent_id,
        name: row.get("name")?,
        summary: row.get("summary")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
