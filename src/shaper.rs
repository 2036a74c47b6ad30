//! Result shaper: book projections and the response envelope.

use serde::Serialize;

use crate::error::{ProjectionError, Relation, StoreError};
use crate::models::{Author, Book, Format, Subject};
use crate::store::BookSource;

const GENRE_DELIMITER: &str = " -- ";

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BookProjection {
    pub title: Option<String>,
    pub gutenberg_id: i64,
    pub download_count: Option<i64>,
    pub media_type: String,
    pub authors: Vec<Author>,
    pub book_formats: Vec<Format>,
    pub languages: Vec<String>,
    pub subjects: Vec<String>,
    pub bookshelves: Vec<String>,
    pub genres: Vec<String>,
}

/// The genre of a subject is whatever follows its last `" -- "`.
pub fn genre_of(subject: &str) -> &str {
    match subject.rfind(GENRE_DELIMITER) {
        Some(idx) => &subject[idx + GENRE_DELIMITER.len()..],
        None => subject,
    }
}

/// Unique genres of the given subjects, in first-seen order.
pub fn genres_of(subjects: &[Subject]) -> Vec<String> {
    let mut genres: Vec<String> = Vec::new();
    for subject in subjects {
        let genre = genre_of(&subject.name);
        if !genres.iter().any(|seen| seen == genre) {
            genres.push(genre.to_string());
        }
    }
    genres
}

/// Resolves every relation of `book`. Each lookup runs on its own and a
/// failure names the relation it came from.
pub fn project_book<S: BookSource + ?Sized>(
    source: &S,
    book: Book,
) -> Result<BookProjection, ProjectionError> {
    let relation_err = |relation: Relation| move |err: StoreError| ProjectionError::new(relation, err);

    let authors = source
        .authors_of(book.id)
        .map_err(relation_err(Relation::Authors))?;
    let book_formats = source
        .formats_of(book.id)
        .map_err(relation_err(Relation::Formats))?;
    let languages = source
        .languages_of(book.id)
        .map_err(relation_err(Relation::Languages))?
        .into_iter()
        .map(|language| language.code)
        .collect();
    let subjects = source
        .subjects_of(book.id)
        .map_err(relation_err(Relation::Subjects))?;
    let bookshelves = source
        .bookshelves_of(book.id)
        .map_err(relation_err(Relation::Bookshelves))?
        .into_iter()
        .map(|shelf| shelf.name)
        .collect();
    // Genres re-read the subjects so their failure is attributed separately.
    let genres = source
        .subjects_of(book.id)
        .map(|subjects| genres_of(&subjects))
        .map_err(relation_err(Relation::Genres))?;

    Ok(BookProjection {
        title: book.title,
        gutenberg_id: book.gutenberg_id,
        download_count: book.download_count,
        media_type: book.media_type,
        authors,
        book_formats,
        languages,
        subjects: subjects.into_iter().map(|subject| subject.name).collect(),
        bookshelves,
        genres,
    })
}

pub fn project_books<S: BookSource + ?Sized>(
    source: &S,
    books: Vec<Book>,
) -> Result<Vec<BookProjection>, ProjectionError> {
    books
        .into_iter()
        .map(|book| project_book(source, book))
        .collect()
}

pub const SUCCESS_MESSAGE: &str = "success";

/// `{data, status, message, error}` wrapper around every listing response.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
    pub status: u16,
    pub message: String,
    pub error: bool,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Envelope {
            data,
            status: 200,
            message: SUCCESS_MESSAGE.to_string(),
            error: false,
        }
    }
}

impl Envelope<serde_json::Map<String, serde_json::Value>> {
    /// The only failure shape: empty object data and status 500.
    pub fn failure(detail: impl std::fmt::Display) -> Self {
        Envelope {
            data: serde_json::Map::new(),
            status: 500,
            message: format!("Error occurred: {}", detail),
            error: true,
        }
    }
}
