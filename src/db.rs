use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

use crate::error::StoreError;

const MIGRATIONS: [(&str, &str); 2] = [
    (
        "0000_catalog_schema",
        include_str!("../migrations/0000_catalog_schema.sql"),
    ),
    (
        "0001_relation_indexes",
        include_str!("../migrations/0001_relation_indexes.sql"),
    ),
];

/// Name of the SQL function that lowercases text with Unicode rules. SQLite's
/// own `lower()` and `LIKE` only fold ASCII.
const FOLD_FUNCTION: &str = "fold";

/// Opens the catalog read-write, creating the schema when it is missing.
pub fn open_db(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.display().to_string(),
        source,
    })?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id TEXT PRIMARY KEY NOT NULL,
            applied_at INTEGER NOT NULL
        );",
    )?;

    for (id, sql) in MIGRATIONS {
        if apply_migration(&conn, id, sql)? {
            log::info!("applied catalog migration {}", id);
        }
    }
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    register_functions(&conn)?;
    Ok(conn)
}

/// Opens the catalog for a single request. Never writes.
pub fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.display().to_string(),
        source,
    })?;
    register_functions(&conn)?;
    Ok(conn)
}

/// Installs `fold(text)` on the connection. NULL folds to NULL.
fn register_functions(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Runs `sql` and records `id` in one transaction. Returns false when `id` was
/// already recorded; a failing batch leaves neither schema nor record behind.
fn apply_migration(conn: &Connection, id: &str, sql: &str) -> Result<bool, StoreError> {
    let recorded: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if recorded {
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (id, applied_at) VALUES (?1, ?2)",
        params![id, chrono::Utc::now().timestamp_millis()],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Small catalog shared by the unit tests.
///
/// | id | gutenberg | downloads | languages | notes |
/// |----|-----------|-----------|-----------|-------|
/// | 1  | 1342      | 50000     | en        | Austen, two subjects, two shelves |
/// | 2  | 84        | 40000     | en        | Shelley, nested subject delimiters |
/// | 3  | 11        | 30000     | en, fr    | Carroll, "Children" subjects |
/// | 4  | 17989     | 20000     | fr        | Dumas, no bookshelves |
/// | 5  | 158       | 30000     | en        | Austen, no subjects |
#[cfg(test)]
pub(crate) fn seed_fixture(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "INSERT INTO books_book (id, title, gutenberg_id, download_count, media_type) VALUES
            (1, 'Pride and Prejudice', 1342, 50000, 'Text'),
            (2, 'Frankenstein; Or, The Modern Prometheus', 84, 40000, 'Text'),
            (3, 'Alice''s Adventures in Wonderland', 11, 30000, 'Text'),
            (4, 'Le comte de Monte-Cristo, Tome I', 17989, 20000, 'Text'),
            (5, 'Emma', 158, 30000, 'Text');

        INSERT INTO books_author (id, name, birth_year, death_year) VALUES
            (1, 'Austen, Jane', 1775, 1817),
            (2, 'Shelley, Mary Wollstonecraft', 1797, 1851),
            (3, 'Carroll, Lewis', 1832, 1898),
            (4, 'Dumas, Alexandre', 1802, 1870);

        INSERT INTO books_book_authors (book_id, author_id) VALUES
            (1, 1), (2, 2), (3, 3), (4, 4), (5, 1);

        INSERT INTO books_language (id, code) VALUES (1, 'en'), (2, 'fr');
        INSERT INTO books_book_languages (book_id, language_id) VALUES
            (1, 1), (2, 1), (3, 1), (3, 2), (4, 2), (5, 1);

        INSERT INTO books_subject (id, name) VALUES
            (1, 'Courtship -- Fiction'),
            (2, 'England -- Fiction'),
            (3, 'Frankenstein''s monster (Fictitious character) -- Fiction'),
            (4, 'Science fiction -- History -- Gothic'),
            (5, 'Fantasy fiction'),
            (6, 'Children''s stories'),
            (7, 'Historical fiction');

        INSERT INTO books_book_subjects (book_id, subject_id) VALUES
            (1, 1), (1, 2), (2, 3), (2, 4), (3, 5), (3, 6), (4, 7);

        INSERT INTO books_bookshelf (id, name) VALUES
            (1, 'Best Books Ever Listings'),
            (2, 'Harvard Classics'),
            (3, 'Gothic Fiction'),
            (4, 'Children''s Literature');

        INSERT INTO books_book_bookshelves (book_id, bookshelf_id) VALUES
            (1, 1), (1, 2), (2, 3), (3, 1), (3, 4), (5, 1);

        INSERT INTO books_format (book_id, mime_type, url) VALUES
            (1, 'text/html', 'https://www.gutenberg.org/ebooks/1342.html.images'),
            (1, 'application/epub+zip', 'https://www.gutenberg.org/ebooks/1342.epub3.images'),
            (2, 'text/plain; charset=us-ascii', 'https://www.gutenberg.org/ebooks/84.txt.utf-8'),
            (3, 'text/html', 'https://www.gutenberg.org/ebooks/11.html.images');",
    )?;
    Ok(())
}
