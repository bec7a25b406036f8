//! Scalar SQL functions registered on every opened connection.
//!
//! # Invariants
//! - `unicode_lower(text)` lowers with Rust's full Unicode mapping, so SQL
//!   matching agrees with [`crate::model::text::contains_ignore_case`].
//! - `NULL` input yields `NULL`.

use super::DbResult;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

const UNICODE_LOWER: &str = "unicode_lower";

pub(crate) fn register_functions(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|value| value.to_lowercase()))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::register_functions;
    use rusqlite::Connection;

    #[test]
    fn unicode_lower_handles_accents_and_null() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let lowered: String = conn
            .query_row("SELECT unicode_lower('ÉLODIE ØRSTED');", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lowered, "élodie ørsted");

        let null: Option<String> = conn
            .query_row("SELECT unicode_lower(NULL);", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }
}
