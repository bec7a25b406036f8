//! Embedded SQL migrations and their executor.
//!
//! # Invariants
//! - `version` values are strictly increasing; a shipped migration is never
//!   edited, only followed by a new one.
//! - The applied version is mirrored to `PRAGMA user_version` inside the same
//!   transaction as the DDL it records.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "hierarchy",
        sql: include_str!("0001_hierarchy.sql"),
    },
    Migration {
        version: 2,
        name: "lore",
        sql: include_str!("0002_lore.sql"),
    },
    Migration {
        version: 3,
        name: "tags",
        sql: include_str!("0003_tags.sql"),
    },
];

/// Returns the latest schema version this binary can write.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the connection's schema up to [`latest_version`].
///
/// All pending steps run in one transaction: either every step lands or the
/// database keeps its previous version.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_steps(conn, MIGRATIONS)
}

fn apply_steps(conn: &mut Connection, steps: &[Migration]) -> DbResult<()> {
    let found = current_user_version(conn)?;
    let supported = steps.last().map_or(0, |migration| migration.version);

    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }
    if found == supported {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in steps.iter().filter(|migration| migration.version > found) {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|source| {
                error!(
                    "event=db_migrate module=db status=error version={} name={} error={source}",
                    migration.version, migration.name
                );
                DbError::MigrationFailed {
                    version: migration.version,
                    name: migration.name,
                    source,
                }
            })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_steps, current_user_version, Migration, MIGRATIONS};
    use crate::db::DbError;
    use rusqlite::Connection;

    #[test]
    fn versions_strictly_increase() {
        assert!(MIGRATIONS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
    }

    #[test]
    fn failing_step_names_itself_and_rolls_back_earlier_steps() {
        let steps = [
            Migration {
                version: 1,
                name: "drafts",
                sql: "CREATE TABLE drafts (id TEXT PRIMARY KEY);",
            },
            Migration {
                version: 2,
                name: "broken",
                sql: "ALTER TABLE missing_table ADD COLUMN title TEXT;",
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();

        match apply_steps(&mut conn, &steps).unwrap_err() {
            DbError::MigrationFailed { version, name, .. } => {
                assert_eq!(version, 2);
                assert_eq!(name, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(current_user_version(&conn).unwrap(), 0);
        let drafts: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'drafts';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(drafts, 0);
    }
}
