//! HTTP surface of the catalog.
//!
//! - `GET /books/` — filtered, paginated listing wrapped in the status envelope
//! - `GET /books/{id}/` — single book projection
//! - `GET /health` — server status

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::{self, ListRequest, Listing};
use crate::db;
use crate::error::{CatalogError, CatalogResult};
use crate::pagination::PageSettings;
use crate::shaper::Envelope;
use crate::store::SqliteCatalog;

// ── Server state ──────────────────────────────────────────────────────────

/// Read-only settings shared by all requests. Every request opens its own
/// catalog connection.
#[derive(Debug, Clone)]
pub struct AppState {
    pub database: PathBuf,
    pub pages: PageSettings,
    pub public_url: Option<String>,
}

impl AppState {
    fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{}", host)
    }
}

/// Runs `f` against a fresh read-only connection on the blocking pool.
async fn with_catalog<T, F>(state: &AppState, f: F) -> CatalogResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteCatalog<'_>) -> CatalogResult<T> + Send + 'static,
{
    let database = state.database.clone();
    tokio::task::spawn_blocking(move || {
        let conn =
            db::open_read_only(&database).map_err(|err| CatalogError::Internal(err.to_string()))?;
        f(&SqliteCatalog::new(&conn))
    })
    .await
    .map_err(|err| CatalogError::Internal(err.to_string()))?
}

// ── Response types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct DetailResponse {
    detail: String,
}

fn detail(status: StatusCode, err: &CatalogError) -> Response {
    (
        status,
        Json(DetailResponse {
            detail: err.to_string(),
        }),
    )
        .into_response()
}

/// Listing failures of any kind become the 500 envelope; nothing partial is
/// ever sent.
fn listing_response(listing: CatalogResult<Listing>) -> Response {
    match listing {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(err) => {
            log::warn!("book listing failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::failure(&err)),
            )
                .into_response()
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_books(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let base_url = state.base_url(&headers);
    let path = uri.path().to_string();
    let pages = state.pages;

    let listing = with_catalog(&state, move |source| {
        let request = ListRequest {
            pairs: &pairs,
            base_url: &base_url,
            path: &path,
        };
        catalog::list_books(source, &pages, &request)
    })
    .await;
    listing_response(listing)
}

async fn retrieve_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let Ok(id) = id.parse::<i64>() else {
        return detail(StatusCode::NOT_FOUND, &CatalogError::NotFound);
    };

    let book = with_catalog(&state, move |source| catalog::retrieve_book(source, &pairs, id)).await;
    match book {
        Ok(book) => (StatusCode::OK, Json(book)).into_response(),
        Err(err @ CatalogError::NotFound) => detail(StatusCode::NOT_FOUND, &err),
        Err(err @ (CatalogError::Filter(_) | CatalogError::Projection(_))) => {
            detail(StatusCode::BAD_REQUEST, &err)
        }
        Err(err) => {
            log::error!("book {} lookup failed: {}", id, err);
            detail(StatusCode::INTERNAL_SERVER_ERROR, &err)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/books", get(list_books))
        .route("/books/", get(list_books))
        .route("/books/{id}", get(retrieve_book))
        .route("/books/{id}/", get(retrieve_book))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
