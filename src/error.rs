//! Error kinds raised while filtering, shaping and paginating the catalog.

use std::fmt;

use thiserror::Error;

/// Failure talking to the SQLite catalog.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to open catalog at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Failure while building or executing the filter predicate.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Field 'gutenberg_id' expected a number but got '{0}'.")]
    InvalidGutenbergId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Relations resolved for each book projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Authors,
    Formats,
    Languages,
    Subjects,
    Bookshelves,
    Genres,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Authors => "authors",
            Relation::Formats => "book_formats",
            Relation::Languages => "languages",
            Relation::Subjects => "subjects",
            Relation::Bookshelves => "bookshelves",
            Relation::Genres => "genres",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relation of a single book could not be resolved.
#[derive(Debug, Error)]
#[error("Error retrieving {relation}: {source}")]
pub struct ProjectionError {
    pub relation: Relation,
    #[source]
    pub source: StoreError,
}

impl ProjectionError {
    pub fn new(relation: Relation, source: StoreError) -> Self {
        Self { relation, source }
    }
}

/// Everything a catalog request can fail with.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Error applying filters: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Not found.")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Startup failures of the HTTP server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
