use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: Option<String>,
    pub gutenberg_id: i64,
    pub download_count: Option<i64>,
    pub media_type: String, // "Text", "Sound", ...
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub birth_year: Option<i64>,
    pub death_year: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Format {
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Subject {
    pub name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Bookshelf {
    pub name: String,
}
