//! Repository error shared by all SQLite repositories.

use crate::db::migrations::current_user_version;
use crate::db::DbError;
use crate::error::CoreErrorKind;
use crate::model::lore::LoreValidationError;
use crate::ordering::position::PositionError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Entity refused by its own validation before the write.
    Validation(LoreValidationError),
    /// Referenced row does not exist.
    NotFound { entity: &'static str, id: Uuid },
    /// Position planning refused the stored snapshot.
    Ordering(PositionError),
    /// A batch row no longer matched the snapshot it was planned from.
    Conflict(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Caller-facing classification.
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::Validation(_) | Self::Ordering(PositionError::NegativeTarget(_)) => {
                CoreErrorKind::Validation
            }
            Self::NotFound { .. } | Self::Ordering(PositionError::PositionNotFound(_)) => {
                CoreErrorKind::NotFound
            }
            Self::Ordering(PositionError::ChapterNotInTome(_))
            | Self::Ordering(PositionError::NotDense { .. }) => CoreErrorKind::InvariantViolation,
            Self::Db(_)
            | Self::Conflict(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => CoreErrorKind::Storage,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Ordering(err) => write!(f, "{err}"),
            Self::Conflict(details) => write!(f, "write conflict: {details}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "repository requires column `{column}` in table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Ordering(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<LoreValidationError> for RepoError {
    fn from(value: LoreValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<PositionError> for RepoError {
    fn from(value: PositionError) -> Self {
        Self::Ordering(value)
    }
}

/// Required table with the columns a repository reads or writes.
pub(crate) type TableSpec = (&'static str, &'static [&'static str]);

/// Rejects connections that are not fully migrated or lack required columns.
pub(crate) fn ensure_schema(conn: &rusqlite::Connection, tables: &[TableSpec]) -> RepoResult<()> {
    let expected_version = crate::db::migrations::latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in tables {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !present.iter().any(|name| name.as_str() == column) {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_columns(conn: &rusqlite::Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
