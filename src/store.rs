//! Read access to the catalog.
//!
//! [`BookSource`] is the seam between the request pipeline and the data store:
//! it runs a compiled [`Predicate`] and resolves each relation of a book
//! through its own lookup, so a failing relation can be reported on its own.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::filter::Predicate;
use crate::models::{Author, Book, Bookshelf, Format, Language, Subject};

/// Default ordering: most downloaded first, ties by primary key.
const BOOK_ORDER: &str = "books_book.download_count DESC, books_book.id ASC";

/// A `LIMIT`/`OFFSET` window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

pub trait BookSource {
    fn count_books(&self, predicate: &Predicate) -> Result<usize, StoreError>;

    /// Distinct books matching `predicate`, in default order.
    fn find_books(
        &self,
        predicate: &Predicate,
        window: Option<Window>,
    ) -> Result<Vec<Book>, StoreError>;

    fn book_by_id(&self, predicate: &Predicate, id: i64) -> Result<Option<Book>, StoreError>;

    fn authors_of(&self, book_id: i64) -> Result<Vec<Author>, StoreError>;
    fn formats_of(&self, book_id: i64) -> Result<Vec<Format>, StoreError>;
    fn languages_of(&self, book_id: i64) -> Result<Vec<Language>, StoreError>;
    fn subjects_of(&self, book_id: i64) -> Result<Vec<Subject>, StoreError>;
    fn bookshelves_of(&self, book_id: i64) -> Result<Vec<Bookshelf>, StoreError>;
}

/// SQLite-backed [`BookSource`] borrowing a request-scoped connection.
pub struct SqliteCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn parse_book_row(row: &Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            gutenberg_id: row.get(2)?,
            download_count: row.get(3)?,
            media_type: row.get(4)?,
        })
    }

    fn names_of(&self, sql: &str, book_id: i64) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![book_id], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

impl BookSource for SqliteCatalog<'_> {
    fn count_books(&self, predicate: &Predicate) -> Result<usize, StoreError> {
        let filter = predicate.to_sql();
        let sql = format!(
            "SELECT COUNT(DISTINCT books_book.id) FROM books_book WHERE {}",
            filter.where_clause
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn find_books(
        &self,
        predicate: &Predicate,
        window: Option<Window>,
    ) -> Result<Vec<Book>, StoreError> {
        let filter = predicate.to_sql();
        let mut sql = format!(
            "SELECT DISTINCT books_book.id, books_book.title, books_book.gutenberg_id, \
             books_book.download_count, books_book.media_type \
             FROM books_book WHERE {} ORDER BY {}",
            filter.where_clause, BOOK_ORDER
        );
        let mut values = filter.params;
        if let Some(window) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(rusqlite::types::Value::Integer(window.limit as i64));
            values.push(rusqlite::types::Value::Integer(window.offset as i64));
        }
        log::debug!("find_books: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::parse_book_row)?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    fn book_by_id(&self, predicate: &Predicate, id: i64) -> Result<Option<Book>, StoreError> {
        let filter = predicate.to_sql();
        let sql = format!(
            "SELECT books_book.id, books_book.title, books_book.gutenberg_id, \
             books_book.download_count, books_book.media_type \
             FROM books_book WHERE books_book.id = ? AND ({})",
            filter.where_clause
        );
        let mut values = vec![rusqlite::types::Value::Integer(id)];
        values.extend(filter.params);

        let book = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), Self::parse_book_row)
            .optional()?;
        Ok(book)
    }

    fn authors_of(&self, book_id: i64) -> Result<Vec<Author>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT books_author.id, books_author.name, books_author.birth_year, books_author.death_year \
             FROM books_book_authors \
             JOIN books_author ON books_author.id = books_book_authors.author_id \
             WHERE books_book_authors.book_id = ?1 \
             ORDER BY books_book_authors.id",
        )?;
        let rows = stmt.query_map(params![book_id], |row| {
            Ok(Author {
                id: row.get(0)?,
                name: row.get(1)?,
                birth_year: row.get(2)?,
                death_year: row.get(3)?,
            })
        })?;

        let mut authors = Vec::new();
        for row in rows {
            authors.push(row?);
        }
        Ok(authors)
    }

    fn formats_of(&self, book_id: i64) -> Result<Vec<Format>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT mime_type, url FROM books_format WHERE book_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![book_id], |row| {
            Ok(Format {
                mime_type: row.get(0)?,
                url: row.get(1)?,
            })
        })?;

        let mut formats = Vec::new();
        for row in rows {
            formats.push(row?);
        }
        Ok(formats)
    }

    fn languages_of(&self, book_id: i64) -> Result<Vec<Language>, StoreError> {
        let codes = self.names_of(
            "SELECT books_language.code FROM books_book_languages \
             JOIN books_language ON books_language.id = books_book_languages.language_id \
             WHERE books_book_languages.book_id = ?1 \
             ORDER BY books_book_languages.id",
            book_id,
        )?;
        Ok(codes.into_iter().map(|code| Language { code }).collect())
    }

    fn subjects_of(&self, book_id: i64) -> Result<Vec<Subject>, StoreError> {
        let names = self.names_of(
            "SELECT books_subject.name FROM books_book_subjects \
             JOIN books_subject ON books_subject.id = books_book_subjects.subject_id \
             WHERE books_book_subjects.book_id = ?1 \
             ORDER BY books_book_subjects.id",
            book_id,
        )?;
        Ok(names.into_iter().map(|name| Subject { name }).collect())
    }

    fn bookshelves_of(&self, book_id: i64) -> Result<Vec<Bookshelf>, StoreError> {
        let names = self.names_of(
            "SELECT books_bookshelf.name FROM books_book_bookshelves \
             JOIN books_bookshelf ON books_bookshelf.id = books_book_bookshelves.bookshelf_id \
             WHERE books_book_bookshelves.book_id = ?1 \
             ORDER BY books_book_bookshelves.id",
            book_id,
        )?;
        Ok(names.into_iter().map(|name| Bookshelf { name }).collect())
    }
}
