use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

use crate::block::Block;
use crate::error::{RaError, Result};
use crate::schema::{run_migrations, SCHEMA_VERSION};

// ---------------------------------------------------------------------------
// Pool type alias
// ---------------------------------------------------------------------------

pub type DbPool = Pool<SqliteConnectionManager>;

// ---------------------------------------------------------------------------
// Pool constructors
// ---------------------------------------------------------------------------

/// Open a connection pool backed by a file-based SQLite database.
pub fn create_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(8)
        .build(manager)
        .map_err(|e| RaError::Internal(e.to_string()))?;

    let conn = pool.get().map_err(|e| RaError::Internal(e.to_string()))?;
    run_migrations(&conn)?;

    Ok(pool)
}

/// Open a pool over a single in-memory SQLite database.
///
/// Every in-memory connection is its own database, so the pool holds exactly
/// one connection.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| RaError::Internal(e.to_string()))?;

    let conn = pool.get().map_err(|e| RaError::Internal(e.to_string()))?;
    run_migrations(&conn)?;

    Ok(pool)
}

// ---------------------------------------------------------------------------
// BookStore trait
// ---------------------------------------------------------------------------

/// Persistence interface for the blocks of reference books, keyed by book id.
pub trait BookStore: Send + Sync {
    /// The stored blocks of `book_id`, or `None` if the book was never saved.
    fn load_book(&self, book_id: &str) -> Result<Option<Vec<Block>>>;
    fn save_book(&self, book_id: &str, blocks: &[Block]) -> Result<()>;
    fn delete_book(&self, book_id: &str) -> Result<()>;
    /// Ids of every stored book, sorted.
    fn book_ids(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// SqliteBookStore
// ---------------------------------------------------------------------------

pub struct SqliteBookStore {
    pool: DbPool,
}

impl SqliteBookStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Convenience constructor over a fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(create_memory_pool()?))
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RaError::Internal(e.to_string()))
    }
}

impl BookStore for SqliteBookStore {
    fn load_book(&self, book_id: &str) -> Result<Option<Vec<Block>>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT blocks FROM reference_books WHERE book_id = ?1",
            params![book_id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
            Ok(json) => {
                let blocks: Vec<Block> = serde_json::from_str(&json)?;
                debug!(book_id, blocks = blocks.len(), "loaded reference book");
                Ok(Some(blocks))
            }
        }
    }

    fn save_book(&self, book_id: &str, blocks: &[Block]) -> Result<()> {
        let conn = self.conn()?;
        let blocks_json = serde_json::to_string(blocks)?;

        conn.execute(
            "INSERT INTO reference_books (id, book_id, schema_version, block_count, blocks, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(book_id) DO UPDATE
                SET schema_version = excluded.schema_version,
                    block_count    = excluded.block_count,
                    blocks         = excluded.blocks,
                    saved_at       = excluded.saved_at",
            params![
                Uuid::new_v4().to_string(),
                book_id,
                SCHEMA_VERSION,
                blocks.len() as i64,
                blocks_json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(book_id, blocks = blocks.len(), "saved reference book");
        Ok(())
    }

    fn delete_book(&self, book_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM reference_books WHERE book_id = ?1",
            params![book_id],
        )?;
        if affected == 0 {
            return Err(RaError::NotFound(format!("reference book {book_id}")));
        }
        Ok(())
    }

    fn book_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT book_id FROM reference_books ORDER BY book_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;

    fn make_store() -> SqliteBookStore {
        SqliteBookStore::in_memory().expect("memory store")
    }

    fn make_blocks() -> Vec<Block> {
        let mut quote = Block::new("p", 1, 2, 2)
            .with_verse(2)
            .with_text("Follow me.")
            .with_character(Character::known("Jesus"));
        quote.set_matched_reference_block(
            Block::new("p", 1, 2, 2).with_verse(2).with_text("Suivez-moi."),
        );
        vec![
            Block::chapter_announcement(1, "Chapter 1"),
            Block::new("p", 1, 1, 1).with_verse(1).with_text("In the beginning."),
            quote,
        ]
    }

    #[test]
    fn missing_book_loads_as_none() {
        let store = make_store();
        assert!(store.load_book("MAT").unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = make_store();
        let blocks = make_blocks();
        store.save_book("MAT", &blocks).expect("save");
        let loaded = store.load_book("MAT").unwrap().expect("stored");
        assert_eq!(loaded, blocks);
    }

    #[test]
    fn save_overwrites_existing_book() {
        let store = make_store();
        store.save_book("MAT", &make_blocks()).unwrap();
        let shorter = make_blocks()[..1].to_vec();
        store.save_book("MAT", &shorter).unwrap();
        assert_eq!(store.load_book("MAT").unwrap().unwrap().len(), 1);
        assert_eq!(store.book_ids().unwrap(), vec!["MAT".to_string()]);
    }

    #[test]
    fn delete_missing_book_is_not_found() {
        let store = make_store();
        store.save_book("MRK", &make_blocks()).unwrap();
        store.save_book("LUK", &make_blocks()).unwrap();
        assert_eq!(store.book_ids().unwrap(), vec!["LUK".to_string(), "MRK".to_string()]);
        store.delete_book("MRK").unwrap();
        assert!(matches!(store.delete_book("MRK"), Err(RaError::NotFound(_))));
    }

    #[test]
    fn file_backed_store_persists_between_pools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reference.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteBookStore::new(create_pool(path).unwrap());
            store.save_book("JHN", &make_blocks()).unwrap();
        }
        let store = SqliteBookStore::new(create_pool(path).unwrap());
        assert_eq!(store.load_book("JHN").unwrap().unwrap().len(), 3);
    }
}
