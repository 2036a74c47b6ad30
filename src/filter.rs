//! Filter compiler.
//!
//! Query parameters are turned into a [`Predicate`]: a conjunction of
//! [`Clause`]s where every clause is a disjunction of [`Condition`]s. Each
//! present parameter contributes exactly one clause; absent parameters
//! contribute nothing. Relation conditions compile to `EXISTS` sub-selects so a
//! book matching through several subjects or authors is still returned once.

use rusqlite::types::Value;

use crate::error::FilterError;

pub const LANGUAGE_PARAM: &str = "language";
pub const TOPIC_PARAM: &str = "topic";
pub const AUTHOR_PARAM: &str = "author";
pub const TITLE_PARAM: &str = "title";
pub const GENRE_PARAM: &str = "genre";
pub const GUTENBERG_ID_PARAM: &str = "gutenberg_id";
pub const SEARCH_PARAM: &str = "search";

/// Raw filter parameters as received from the client.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BookQuery {
    pub language: Option<String>,
    pub topic: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub gutenberg_id: Option<String>,
    pub search: Option<String>,
}

impl BookQuery {
    /// Reads the filter parameters out of decoded query pairs. When a key is
    /// repeated the last value wins; empty values count as absent.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        BookQuery {
            language: query_value(pairs, LANGUAGE_PARAM),
            topic: query_value(pairs, TOPIC_PARAM),
            author: query_value(pairs, AUTHOR_PARAM),
            title: query_value(pairs, TITLE_PARAM),
            genre: query_value(pairs, GENRE_PARAM),
            gutenberg_id: query_value(pairs, GUTENBERG_ID_PARAM),
            search: query_value(pairs, SEARCH_PARAM),
        }
    }

    pub fn compile(&self) -> Result<Predicate, FilterError> {
        let mut predicate = Predicate::default();

        if let Some(language) = &self.language {
            let codes = split_tokens(language).map(str::to_string).collect();
            predicate.push(Clause::single(Condition::LanguageIn(codes)));
        }

        if let Some(topic) = &self.topic {
            predicate.push(subject_or_bookshelf(topic));
        }

        if let Some(author) = &self.author {
            predicate.push(Clause::single(Condition::AuthorContains(author.clone())));
        }

        if let Some(title) = &self.title {
            predicate.push(Clause::single(Condition::TitleContains(title.clone())));
        }

        if let Some(genre) = &self.genre {
            predicate.push(subject_or_bookshelf(genre));
        }

        if let Some(gutenberg_id) = &self.gutenberg_id {
            let ids = split_tokens(gutenberg_id)
                .map(parse_gutenberg_id)
                .collect::<Result<Vec<_>, _>>()?;
            predicate.push(Clause::single(Condition::GutenbergIdIn(ids)));
        }

        if let Some(search) = &self.search {
            for term in search_terms(search) {
                predicate.push(Clause::any_of(vec![
                    Condition::TitleContains(term.to_string()),
                    Condition::AuthorContains(term.to_string()),
                    Condition::SubjectContains(term.to_string()),
                    Condition::BookshelfContains(term.to_string()),
                ]));
            }
        }

        Ok(predicate)
    }
}

pub(crate) fn query_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .rev()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_empty())
}

/// Comma separated tokens, taken verbatim.
fn split_tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',')
}

fn search_terms(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|term| !term.is_empty())
}

fn parse_gutenberg_id(token: &str) -> Result<i64, FilterError> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| FilterError::InvalidGutenbergId(token.to_string()))
}

/// `topic` and `genre` share one rule: every token is looked up in both
/// subject and bookshelf names.
fn subject_or_bookshelf(raw: &str) -> Clause {
    let conditions = split_tokens(raw)
        .flat_map(|token| {
            [
                Condition::SubjectContains(token.to_string()),
                Condition::BookshelfContains(token.to_string()),
            ]
        })
        .collect();
    Clause::any_of(conditions)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact, case-sensitive match on a linked language code.
    LanguageIn(Vec<String>),
    GutenbergIdIn(Vec<i64>),
    TitleContains(String),
    AuthorContains(String),
    SubjectContains(String),
    BookshelfContains(String),
}

impl Condition {
    fn write_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Condition::LanguageIn(codes) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM books_book_languages \
                     JOIN books_language ON books_language.id = books_book_languages.language_id \
                     WHERE books_book_languages.book_id = books_book.id \
                     AND books_language.code IN (",
                );
                push_placeholders(sql, codes.len());
                sql.push_str("))");
                params.extend(codes.iter().cloned().map(Value::Text));
            }
            Condition::GutenbergIdIn(ids) => {
                sql.push_str("books_book.gutenberg_id IN (");
                push_placeholders(sql, ids.len());
                sql.push(')');
                params.extend(ids.iter().copied().map(Value::Integer));
            }
            Condition::TitleContains(needle) => {
                sql.push_str("fold(books_book.title) LIKE ? ESCAPE '\\'");
                params.push(Value::Text(contains_pattern(needle)));
            }
            Condition::AuthorContains(needle) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM books_book_authors \
                     JOIN books_author ON books_author.id = books_book_authors.author_id \
                     WHERE books_book_authors.book_id = books_book.id \
                     AND fold(books_author.name) LIKE ? ESCAPE '\\')",
                );
                params.push(Value::Text(contains_pattern(needle)));
            }
            Condition::SubjectContains(needle) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM books_book_subjects \
                     JOIN books_subject ON books_subject.id = books_book_subjects.subject_id \
                     WHERE books_book_subjects.book_id = books_book.id \
                     AND fold(books_subject.name) LIKE ? ESCAPE '\\')",
                );
                params.push(Value::Text(contains_pattern(needle)));
            }
            Condition::BookshelfContains(needle) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM books_book_bookshelves \
                     JOIN books_bookshelf ON books_bookshelf.id = books_book_bookshelves.bookshelf_id \
                     WHERE books_book_bookshelves.book_id = books_book.id \
                     AND fold(books_bookshelf.name) LIKE ? ESCAPE '\\')",
                );
                params.push(Value::Text(contains_pattern(needle)));
            }
        }
    }
}

/// A disjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    any_of: Vec<Condition>,
}

impl Clause {
    pub fn single(condition: Condition) -> Self {
        Clause {
            any_of: vec![condition],
        }
    }

    pub fn any_of(conditions: Vec<Condition>) -> Self {
        Clause { any_of: conditions }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.any_of
    }
}

/// A conjunction of clauses. The empty predicate matches every book.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Renders the predicate as a `WHERE` body over `books_book` together with
    /// its positional parameters.
    pub fn to_sql(&self) -> SqlFilter {
        let mut sql = String::new();
        let mut params = Vec::new();

        if self.clauses.is_empty() {
            sql.push_str("1 = 1");
        }
        for (clause_idx, clause) in self.clauses.iter().enumerate() {
            if clause_idx > 0 {
                sql.push_str(" AND ");
            }
            sql.push('(');
            for (condition_idx, condition) in clause.any_of.iter().enumerate() {
                if condition_idx > 0 {
                    sql.push_str(" OR ");
                }
                condition.write_sql(&mut sql, &mut params);
            }
            sql.push(')');
        }

        SqlFilter {
            where_clause: sql,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub where_clause: String,
    pub params: Vec<Value>,
}

fn push_placeholders(sql: &mut String, count: usize) {
    for idx in 0..count {
        if idx > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
    }
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped. The
/// needle is lowercased to compare against `fold(column)`.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn absent_parameters_add_no_clause() {
        let predicate = BookQuery::default().compile().expect("compile");
        assert!(predicate.is_empty());
        assert_eq!(predicate.to_sql().where_clause, "1 = 1");
        assert!(predicate.to_sql().params.is_empty());
    }

    #[test]
    fn empty_values_are_treated_as_absent() {
        let query = BookQuery::from_pairs(&pairs(&[("language", ""), ("title", "emma")]));
        assert_eq!(query.language, None);
        assert_eq!(query.title.as_deref(), Some("emma"));
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let query = BookQuery::from_pairs(&pairs(&[("author", "austen"), ("author", "dumas")]));
        assert_eq!(query.author.as_deref(), Some("dumas"));
    }

    #[test]
    fn each_parameter_is_one_clause() {
        let query = BookQuery {
            language: Some("en,fr".to_string()),
            topic: Some("child,infant".to_string()),
            author: Some("austen".to_string()),
            title: Some("pride".to_string()),
            genre: Some("fiction".to_string()),
            gutenberg_id: Some("1342,12345".to_string()),
            search: None,
        };
        let predicate = query.compile().expect("compile");
        let clauses = predicate.clauses();

        assert_eq!(clauses.len(), 6);
        assert_eq!(
            clauses[0].conditions(),
            &[Condition::LanguageIn(vec!["en".to_string(), "fr".to_string()])]
        );
        assert_eq!(
            clauses[1].conditions(),
            &[
                Condition::SubjectContains("child".to_string()),
                Condition::BookshelfContains("child".to_string()),
                Condition::SubjectContains("infant".to_string()),
                Condition::BookshelfContains("infant".to_string()),
            ]
        );
        assert_eq!(
            clauses[5].conditions(),
            &[Condition::GutenbergIdIn(vec![1342, 12345])]
        );
    }

    #[test]
    fn topic_and_genre_compile_to_the_same_clause() {
        let topic = BookQuery {
            topic: Some("child".to_string()),
            ..BookQuery::default()
        };
        let genre = BookQuery {
            genre: Some("child".to_string()),
            ..BookQuery::default()
        };
        assert_eq!(topic.compile().unwrap(), genre.compile().unwrap());
    }

    #[test]
    fn author_and_title_are_not_split() {
        let query = BookQuery {
            author: Some("austen, jane".to_string()),
            ..BookQuery::default()
        };
        let predicate = query.compile().expect("compile");
        assert_eq!(
            predicate.clauses()[0].conditions(),
            &[Condition::AuthorContains("austen, jane".to_string())]
        );
    }

    #[test]
    fn non_numeric_gutenberg_id_is_rejected() {
        let query = BookQuery {
            gutenberg_id: Some("1342,abc".to_string()),
            ..BookQuery::default()
        };
        let err = query.compile().expect_err("invalid id");
        assert_eq!(
            err.to_string(),
            "Field 'gutenberg_id' expected a number but got 'abc'."
        );
    }

    #[test]
    fn search_terms_become_separate_clauses() {
        let query = BookQuery {
            search: Some("austen,  pride".to_string()),
            ..BookQuery::default()
        };
        let predicate = query.compile().expect("compile");
        assert_eq!(predicate.clauses().len(), 2);
        assert_eq!(predicate.clauses()[1].conditions().len(), 4);
    }

    #[test]
    fn sql_joins_clauses_with_and_and_conditions_with_or() {
        let query = BookQuery {
            title: Some("Pride".to_string()),
            genre: Some("a,b".to_string()),
            ..BookQuery::default()
        };
        let filter = query.compile().expect("compile").to_sql();

        assert!(filter.where_clause.starts_with("(fold(books_book.title) LIKE ?"));
        assert_eq!(filter.where_clause.matches(" AND (").count(), 1);
        assert_eq!(filter.where_clause.matches(" OR ").count(), 3);
        assert_eq!(filter.params.len(), 5);
        assert_eq!(filter.params[0], Value::Text("%pride%".to_string()));
    }

    #[test]
    fn like_wildcards_in_input_are_escaped() {
        assert_eq!(contains_pattern("100%_done\\"), "%100\\%\\_done\\\\%");
    }

    #[test]
    fn needles_are_lowercased_beyond_ascii() {
        assert_eq!(contains_pattern("ÉMILE Œuvres"), "%émile œuvres%");
    }
}
