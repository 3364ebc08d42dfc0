use crate::error::Result;

/// Version recorded alongside every stored book so readers can detect rows
/// written by an older block layout.
pub const SCHEMA_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// DDL for the reference book store. Every statement is `IF NOT EXISTS`.
pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS reference_books (
    id              TEXT    NOT NULL PRIMARY KEY,
    book_id         TEXT    NOT NULL UNIQUE,
    schema_version  TEXT    NOT NULL,
    block_count     INTEGER NOT NULL DEFAULT 0,
    blocks          TEXT    NOT NULL DEFAULT '[]',
    saved_at        TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reference_books_book_id
    ON reference_books (book_id);
";

// ---------------------------------------------------------------------------
// Migration runner
// ---------------------------------------------------------------------------

/// Initialise the database schema. Safe to call repeatedly.
pub fn run_migrations(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("first migration");
        run_migrations(&conn).expect("second migration");
    }

    #[test]
    fn reference_books_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='reference_books'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
