//! Request pipeline: compile filters, query the source, paginate and shape.

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult, FilterError};
use crate::filter::{query_value, BookQuery};
use crate::pagination::{Page, PageLinks, PageSettings, PaginatedBody, PAGE_PARAM, PAGE_SIZE_PARAM};
use crate::shaper::{project_book, project_books, BookProjection, Envelope};
use crate::store::BookSource;

/// Decoded listing request plus what is needed to build page links.
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    pub pairs: &'a [(String, String)],
    pub base_url: &'a str,
    pub path: &'a str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Listing {
    Paginated(PaginatedBody<Vec<BookProjection>>),
    Unpaginated(Envelope<Vec<BookProjection>>),
}

pub fn list_books<S: BookSource + ?Sized>(
    source: &S,
    settings: &PageSettings,
    request: &ListRequest<'_>,
) -> CatalogResult<Listing> {
    let predicate = BookQuery::from_pairs(request.pairs).compile()?;
    log::debug!("listing books where {}", predicate.to_sql().where_clause);

    let page_size = settings.page_size(query_value(request.pairs, PAGE_SIZE_PARAM).as_deref());
    let Some(page_size) = page_size else {
        let books = source
            .find_books(&predicate, None)
            .map_err(FilterError::from)?;
        let data = project_books(source, books)?;
        return Ok(Listing::Unpaginated(Envelope::success(data)));
    };

    let count = source.count_books(&predicate).map_err(FilterError::from)?;
    let page = Page::resolve(
        query_value(request.pairs, PAGE_PARAM).as_deref(),
        count,
        page_size,
    )?;
    let books = source
        .find_books(&predicate, Some(page.window()))
        .map_err(FilterError::from)?;
    let data = project_books(source, books)?;

    let links = PageLinks::new(request.base_url, request.path, request.pairs);
    Ok(Listing::Paginated(PaginatedBody {
        count,
        next: links.next(&page),
        previous: links.previous(&page),
        results: Envelope::success(data),
    }))
}

/// Single book by primary key, looked up inside the filtered collection.
pub fn retrieve_book<S: BookSource + ?Sized>(
    source: &S,
    pairs: &[(String, String)],
    id: i64,
) -> CatalogResult<BookProjection> {
    let predicate = BookQuery::from_pairs(pairs).compile()?;
    let book = source
        .book_by_id(&predicate, id)
        .map_err(FilterError::from)?
        .ok_or(CatalogError::NotFound)?;
    Ok(project_book(source, book)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{Relation, StoreError};
    use crate::filter::Predicate;
    use crate::models::{Author, Book, Bookshelf, Format, Language, Subject};
    use crate::store::tests::fixture_db;
    use crate::store::{SqliteCatalog, Window};
    use std::cell::Cell;
    use std::collections::HashSet;

    /// Delegates to the fixture catalog but fails one relation lookup.
    ///
    /// A projection reads subjects twice per book: once for `subjects`, then
    /// again for `genres`. Odd reads are therefore attributed to genres.
    pub(crate) struct FailingSource<'a> {
        inner: SqliteCatalog<'a>,
        failing: Relation,
        subject_reads: Cell<usize>,
    }

    impl<'a> FailingSource<'a> {
        pub(crate) fn new(inner: SqliteCatalog<'a>, failing: Relation) -> Self {
            FailingSource {
                inner,
                failing,
                subject_reads: Cell::new(0),
            }
        }

        fn fail<T>(&self, relation: Relation, ok: Result<T, StoreError>) -> Result<T, StoreError> {
            if self.failing == relation {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidColumnName(
                    "name".to_string(),
                )));
            }
            ok
        }
    }

    impl BookSource for FailingSource<'_> {
        fn count_books(&self, predicate: &Predicate) -> Result<usize, StoreError> {
            self.inner.count_books(predicate)
        }

        fn find_books(
            &self,
            predicate: &Predicate,
            window: Option<Window>,
        ) -> Result<Vec<Book>, StoreError> {
            self.inner.find_books(predicate, window)
        }

        fn book_by_id(&self, predicate: &Predicate, id: i64) -> Result<Option<Book>, StoreError> {
            self.inner.book_by_id(predicate, id)
        }

        fn authors_of(&self, book_id: i64) -> Result<Vec<Author>, StoreError> {
            self.fail(Relation::Authors, self.inner.authors_of(book_id))
        }

        fn formats_of(&self, book_id: i64) -> Result<Vec<Format>, StoreError> {
            self.fail(Relation::Formats, self.inner.formats_of(book_id))
        }

        fn languages_of(&self, book_id: i64) -> Result<Vec<Language>, StoreError> {
            self.fail(Relation::Languages, self.inner.languages_of(book_id))
        }

        fn subjects_of(&self, book_id: i64) -> Result<Vec<Subject>, StoreError> {
            let read = self.subject_reads.get();
            self.subject_reads.set(read + 1);
            let relation = if read % 2 == 0 {
                Relation::Subjects
            } else {
                Relation::Genres
            };
            self.fail(relation, self.inner.subjects_of(book_id))
        }

        fn bookshelves_of(&self, book_id: i64) -> Result<Vec<Bookshelf>, StoreError> {
            self.fail(Relation::Bookshelves, self.inner.bookshelves_of(book_id))
        }
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn request(pairs: &[(String, String)]) -> ListRequest<'_> {
        ListRequest {
            pairs,
            base_url: "http://testserver",
            path: "/books/",
        }
    }

    fn paginated(listing: Listing) -> PaginatedBody<Vec<BookProjection>> {
        match listing {
            Listing::Paginated(body) => body,
            Listing::Unpaginated(_) => panic!("expected a paginated listing"),
        }
    }

    #[test]
    fn default_listing_is_one_page_ordered_by_downloads() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let query = pairs(&[]);

        let body = paginated(
            list_books(&catalog, &PageSettings::default(), &request(&query)).expect("listing"),
        );
        assert_eq!(body.count, 5);
        assert_eq!(body.next, None);
        assert_eq!(body.previous, None);
        assert_eq!(body.results.status, 200);

        let downloads: Vec<_> = body
            .results
            .data
            .iter()
            .map(|book| book.download_count.unwrap_or_default())
            .collect();
        let mut sorted = downloads.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(downloads, sorted);
    }

    #[test]
    fn page_size_splits_pages_and_links_them() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let query = pairs(&[("page_size", "2"), ("page", "2")]);

        let body = paginated(
            list_books(&catalog, &PageSettings::default(), &request(&query)).expect("listing"),
        );
        let ids: Vec<_> = body.results.data.iter().map(|book| book.gutenberg_id).collect();
        assert_eq!(ids, vec![11, 158]);
        assert_eq!(
            body.next.as_deref(),
            Some("http://testserver/books/?page=3&page_size=2")
        );
        assert_eq!(
            body.previous.as_deref(),
            Some("http://testserver/books/?page_size=2")
        );
    }

    #[test]
    fn pages_never_repeat_a_book() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let mut seen = HashSet::new();

        for number in 1..=3 {
            let number = number.to_string();
            let query = pairs(&[("page_size", "2"), ("page", number.as_str())]);
            let body = paginated(
                list_books(&catalog, &PageSettings::default(), &request(&query))
                    .expect("listing"),
            );
            for book in body.results.data {
                assert!(seen.insert(book.gutenberg_id));
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let query = pairs(&[("page", "9")]);

        let err = list_books(&catalog, &PageSettings::default(), &request(&query))
            .expect_err("invalid page");
        assert_eq!(err.to_string(), "Invalid page.");
    }

    #[test]
    fn disabled_pagination_returns_a_bare_envelope() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let settings = PageSettings {
            default_size: None,
            max_size: None,
        };
        let query = pairs(&[("language", "fr")]);

        match list_books(&catalog, &settings, &request(&query)).expect("listing") {
            Listing::Unpaginated(envelope) => {
                assert_eq!(envelope.data.len(), 2);
                assert!(!envelope.error);
            }
            Listing::Paginated(_) => panic!("expected an unpaginated listing"),
        }
    }

    #[test]
    fn filter_failures_are_reported_as_filter_errors() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);
        let query = pairs(&[("gutenberg_id", "12,x")]);

        let err = list_books(&catalog, &PageSettings::default(), &request(&query))
            .expect_err("bad id");
        assert!(matches!(err, CatalogError::Filter(_)));
        assert_eq!(
            err.to_string(),
            "Error applying filters: Field 'gutenberg_id' expected a number but got 'x'."
        );
    }

    #[test]
    fn relation_failures_name_the_relation() {
        let (_dir, conn) = fixture_db();
        let query = pairs(&[]);

        for (relation, expected) in [
            (Relation::Authors, "Error retrieving authors: "),
            (Relation::Formats, "Error retrieving book_formats: "),
            (Relation::Languages, "Error retrieving languages: "),
            (Relation::Subjects, "Error retrieving subjects: "),
            (Relation::Bookshelves, "Error retrieving bookshelves: "),
            (Relation::Genres, "Error retrieving genres: "),
        ] {
            let source = FailingSource::new(SqliteCatalog::new(&conn), relation);
            let err = list_books(&source, &PageSettings::default(), &request(&query))
                .expect_err("relation failure");
            assert!(err.to_string().starts_with(expected), "{}", err);
        }
    }

    #[test]
    fn retrieve_applies_filters() {
        let (_dir, conn) = fixture_db();
        let catalog = SqliteCatalog::new(&conn);

        let book = retrieve_book(&catalog, &pairs(&[]), 1).expect("book 1");
        assert_eq!(book.title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(book.genres, vec!["Fiction"]);

        let err = retrieve_book(&catalog, &pairs(&[("language", "fr")]), 1)
            .expect_err("filtered out");
        assert!(matches!(err, CatalogError::NotFound));
    }
}
