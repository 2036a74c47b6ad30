use std::sync::Arc;

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod pagination;
pub mod shaper;
pub mod store;

use crate::config::Config;
use crate::error::{ServeError, StoreError};

/// Prepares the catalog and serves the HTTP API until the process is stopped.
pub async fn run(config: Config) -> Result<(), ServeError> {
  let addr = config.listen_addr()?;
  let books = prepare_catalog(&config)?;
  log::info!(
    "serving {} books from {}",
    books,
    config.database.display()
  );

  let state = Arc::new(api::AppState {
    database: config.database.clone(),
    pages: config.page_settings(),
    public_url: config.public_url.clone(),
  });
  let app = api::router(state);

  let listener = tokio::net::TcpListener::bind(addr).await?;
  log::info!("listening on http://{}", addr);
  axum::serve(listener, app).await?;
  Ok(())
}

/// Applies migrations unless running read-only, then checks the catalog can be
/// read. Returns the number of books.
fn prepare_catalog(config: &Config) -> Result<i64, StoreError> {
  let conn = if config.read_only {
    db::open_read_only(&config.database)?
  } else {
    db::open_db(&config.database)?
  };
  let books: i64 = conn.query_row("SELECT COUNT(*) FROM books_book", [], |row| row.get(0))?;
  Ok(books)
}
