//! Cross-kind lore autocomplete.
//!
//! # Responsibility
//! - Match a short query against characters, places, items and events of
//!   one collection.
//! - Label each hit for display and merge all kinds into one list.
//!
//! # Invariants
//! - Queries shorter than [`MIN_QUERY_CHARS`] return an empty list without
//!   touching storage.
//! - Output is sorted by lowercase label and truncated to the overall limit;
//!   each kind is fetched with the same limit first.
//! - LIKE wildcards in user input match literally.
//! - Matching ignores case for all of Unicode, not only ASCII: both sides go
//!   through `unicode_lower` before `LIKE`.

use crate::db::DbError;
use crate::error::CoreErrorKind;
use crate::model::hierarchy::CollectionId;
use crate::model::lore::{EntityKind, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Queries with fewer characters than this yield no hits.
pub const MIN_QUERY_CHARS: usize = 3;
/// Limit applied when the caller passes none.
pub const DEFAULT_LIMIT: u32 = 10;
/// Upper bound for caller-provided limits.
pub const MAX_LIMIT: u32 = 50;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error.
#[derive(Debug)]
pub enum SearchError {
    CollectionNotFound(CollectionId),
    Db(DbError),
    InvalidData(String),
}

impl SearchError {
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::CollectionNotFound(_) => CoreErrorKind::NotFound,
            Self::Db(_) | Self::InvalidData(_) => CoreErrorKind::Storage,
        }
    }
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CollectionNotFound(id) => write!(f, "collection not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Autocomplete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocompleteQuery {
    pub collection_id: CollectionId,
    pub text: String,
    /// Overall cap; defaults to [`DEFAULT_LIMIT`], clamped to [`MAX_LIMIT`].
    pub limit: Option<u32>,
}

impl AutocompleteQuery {
    pub fn new(collection_id: CollectionId, text: impl Into<String>) -> Self {
        Self {
            collection_id,
            text: text.into(),
            limit: None,
        }
    }

    /// Effective limit in `1..=MAX_LIMIT`.
    pub fn applied_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// One labelled autocomplete hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutocompleteHit {
    pub id: Uuid,
    pub kind: EntityKind,
    pub label: String,
    pub hint: Option<String>,
}

/// Searches lore entities of one collection by substring.
pub fn autocomplete(
    conn: &Connection,
    query: &AutocompleteQuery,
) -> SearchResult<Vec<AutocompleteHit>> {
    let text = query.text.trim();
    if text.chars().count() < MIN_QUERY_CHARS {
        return Ok(Vec::new());
    }
    ensure_collection(conn, query.collection_id)?;

    let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
    let limit = query.applied_limit();
    let mut hits = Vec::new();
    for kind in EntityKind::ALL {
        hits.extend(search_kind(conn, kind, query.collection_id, &pattern, limit)?);
    }

    hits.sort_by(|left, right| {
        left.label
            .to_lowercase()
            .cmp(&right.label.to_lowercase())
            .then(left.kind.cmp(&right.kind))
            .then(left.id.cmp(&right.id))
    });
    hits.truncate(limit as usize);
    Ok(hits)
}

fn ensure_collection(conn: &Connection, collection_id: CollectionId) -> SearchResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM collections WHERE id = ?1;",
            [collection_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(SearchError::CollectionNotFound(collection_id)),
    }
}

fn search_kind(
    conn: &Connection,
    kind: EntityKind,
    collection_id: CollectionId,
    pattern: &str,
    limit: u32,
) -> SearchResult<Vec<AutocompleteHit>> {
    let sql = match kind {
        EntityKind::Character => {
            "SELECT id, firstname, lastname
             FROM characters
             WHERE collection_id = ?1
               AND (unicode_lower(firstname) LIKE ?2 ESCAPE '\\'
                    OR unicode_lower(lastname) LIKE ?2 ESCAPE '\\')
             ORDER BY lastname ASC, firstname ASC
             LIMIT ?3;"
        }
        EntityKind::Place => {
            "SELECT id, name, location
             FROM places
             WHERE collection_id = ?1
               AND (unicode_lower(name) LIKE ?2 ESCAPE '\\'
                    OR unicode_lower(location) LIKE ?2 ESCAPE '\\')
             ORDER BY name ASC
             LIMIT ?3;"
        }
        EntityKind::Item => {
            "SELECT id, name, category
             FROM items
             WHERE collection_id = ?1
               AND (unicode_lower(name) LIKE ?2 ESCAPE '\\'
                    OR unicode_lower(category) LIKE ?2 ESCAPE '\\')
             ORDER BY name ASC
             LIMIT ?3;"
        }
        EntityKind::Event => {
            "SELECT id, name, start_date, end_date
             FROM events
             WHERE collection_id = ?1
               AND (unicode_lower(name) LIKE ?2 ESCAPE '\\'
                    OR unicode_lower(description) LIKE ?2 ESCAPE '\\')
             ORDER BY start_date ASC, name ASC
             LIMIT ?3;"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![collection_id.to_string(), pattern, i64::from(limit)])?;
    let mut hits = Vec::new();
    while let Some(row) = rows.next()? {
        hits.push(parse_hit(row, kind)?);
    }
    Ok(hits)
}

fn parse_hit(row: &Row<'_>, kind: EntityKind) -> SearchResult<AutocompleteHit> {
    let id_text: String = row.get(0)?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| SearchError::InvalidData(format!("invalid uuid `{id_text}`")))?;

    let (label, hint) = match kind {
        EntityKind::Character => {
            let firstname: String = row.get(1)?;
            let lastname: String = row.get(2)?;
            (format!("{firstname} {lastname}").trim().to_string(), None)
        }
        EntityKind::Place | EntityKind::Item => {
            let name: String = row.get(1)?;
            let hint: Option<String> = row.get(2)?;
            (name, hint.filter(|value| !value.trim().is_empty()))
        }
        EntityKind::Event => {
            let name: String = row.get(1)?;
            let start: String = row.get(2)?;
            let end: Option<String> = row.get(3)?;
            (name, Some(date_hint(&start, end.as_deref())?))
        }
    };

    Ok(AutocompleteHit {
        id,
        kind,
        label,
        hint,
    })
}

fn date_hint(start: &str, end: Option<&str>) -> SearchResult<String> {
    let parse = |value: &str| {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|_| SearchError::InvalidData(format!("invalid event date `{value}`")))
    };
    let start = parse(start)?;
    Ok(match end.map(parse).transpose()? {
        Some(end) => format!("{start} → {end}"),
        None => start.to_string(),
    })
}

/// Escapes `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{date_hint, escape_like, AutocompleteQuery, MAX_LIMIT};
    use uuid::Uuid;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn limit_defaults_and_clamps() {
        let mut query = AutocompleteQuery::new(Uuid::new_v4(), "abc");
        assert_eq!(query.applied_limit(), 10);
        query.limit = Some(500);
        assert_eq!(query.applied_limit(), MAX_LIMIT);
        query.limit = Some(0);
        assert_eq!(query.applied_limit(), 1);
    }

    #[test]
    fn event_hint_shows_range_when_end_present() {
        assert_eq!(
            date_hint("1204-04-13", Some("1204-04-15")).unwrap(),
            "1204-04-13 → 1204-04-15"
        );
        assert_eq!(date_hint("1204-04-13", None).unwrap(), "1204-04-13");
    }
}
