use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::pagination::{PageSettings, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Parser)]
#[command(name = "books-api", version, about = "Read-only books catalog search API")]
pub struct Config {
    /// SQLite catalog to serve.
    #[arg(long, env = "BOOKS_API_DATABASE", default_value = "books.db")]
    pub database: PathBuf,

    #[arg(long, env = "BOOKS_API_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "BOOKS_API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Default page size. `0` returns listings unpaginated.
    #[arg(long, env = "BOOKS_API_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Upper bound for the client `page_size` parameter.
    #[arg(long, env = "BOOKS_API_MAX_PAGE_SIZE")]
    pub max_page_size: Option<usize>,

    /// Base URL used in next/previous links, e.g. `https://books.example.org`.
    /// Defaults to `http://` plus the request `Host` header.
    #[arg(long, env = "BOOKS_API_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Open the catalog read-only and skip schema migrations.
    #[arg(long, env = "BOOKS_API_READ_ONLY")]
    pub read_only: bool,
}

impl Config {
    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            default_size: (self.page_size > 0).then_some(self.page_size),
            max_size: self.max_page_size.filter(|max| *max > 0),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}
