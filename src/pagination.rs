//! Page-number pagination for book listings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::shaper::Envelope;
use crate::store::Window;

pub const PAGE_PARAM: &str = "page";
pub const PAGE_SIZE_PARAM: &str = "page_size";
pub const LAST_PAGE: &str = "last";
pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    /// `None` leaves listings unpaginated unless the client asks for a size.
    pub default_size: Option<usize>,
    pub max_size: Option<usize>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            default_size: Some(DEFAULT_PAGE_SIZE),
            max_size: None,
        }
    }
}

impl PageSettings {
    /// Effective page size. A missing or unusable client value falls back to
    /// the configured default.
    pub fn page_size(&self, requested: Option<&str>) -> Option<usize> {
        let requested = requested
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size as usize);
        let size = requested.or(self.default_size)?;
        Some(match self.max_size {
            Some(max) => size.min(max),
            None => size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub size: usize,
}

impl Page {
    /// Picks the requested page out of `count` items. An empty result still
    /// has a first page.
    pub fn resolve(requested: Option<&str>, count: usize, size: usize) -> CatalogResult<Page> {
        let size = size.max(1);
        let num_pages = if count == 0 { 1 } else { count.div_ceil(size) };

        let number = match requested.map(str::trim) {
            None | Some("") => 1,
            Some(LAST_PAGE) => num_pages,
            Some(raw) => raw.parse::<usize>().map_err(|_| CatalogError::InvalidPage)?,
        };
        if number < 1 || number > num_pages {
            return Err(CatalogError::InvalidPage);
        }

        Ok(Page {
            number,
            num_pages,
            count,
            size,
        })
    }

    pub fn window(&self) -> Window {
        Window {
            offset: (self.number - 1) * self.size,
            limit: self.size,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Builds absolute next/previous links that keep every other query parameter.
#[derive(Debug, Clone)]
pub struct PageLinks<'a> {
    base_url: &'a str,
    path: &'a str,
    pairs: &'a [(String, String)],
}

impl<'a> PageLinks<'a> {
    pub fn new(base_url: &'a str, path: &'a str, pairs: &'a [(String, String)]) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/'),
            path,
            pairs,
        }
    }

    pub fn next(&self, page: &Page) -> Option<String> {
        if !page.has_next() {
            return None;
        }
        Some(self.page_url(Some(page.number + 1)))
    }

    pub fn previous(&self, page: &Page) -> Option<String> {
        if !page.has_previous() {
            return None;
        }
        let number = page.number - 1;
        // The first page is linked without a page parameter.
        Some(self.page_url(if number == 1 { None } else { Some(number) }))
    }

    fn page_url(&self, number: Option<usize>) -> String {
        let mut query: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (key, value) in self.pairs {
            query.entry(key.as_str()).or_default().push(value.clone());
        }
        match number {
            Some(number) => {
                query.insert(PAGE_PARAM, vec![number.to_string()]);
            }
            None => {
                query.remove(PAGE_PARAM);
            }
        }

        let encoded: Vec<String> = query
            .iter()
            .flat_map(|(key, values)| {
                values.iter().map(move |value| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
            })
            .collect();

        if encoded.is_empty() {
            format!("{}{}", self.base_url, self.path)
        } else {
            format!("{}{}?{}", self.base_url, self.path, encoded.join("&"))
        }
    }
}

/// Paginated listing body: page metadata around the success envelope.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaginatedBody<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Envelope<T>,
}
