//! HTTP routes over a catalog

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;

/// `GET /meta`, `GET /filesmeta` and `GET /files/{path}`
pub fn router(catalog: Arc<Catalog>) -> Router {
    let files = ServeDir::new(catalog.root());
    Router::new()
        .route("/meta", get(meta))
        .route("/filesmeta", get(files_meta))
        .nest_service("/files", files)
        .layer(TraceLayer::new_for_http())
        .with_state(catalog)
}

async fn meta(State(catalog): State<Arc<Catalog>>) -> Response {
    json_or_unavailable(catalog.summary_json(), "Meta data not available")
}

async fn files_meta(State(catalog): State<Arc<Catalog>>) -> Response {
    json_or_unavailable(catalog.listing_json(), "Files meta data not available")
}

fn json_or_unavailable(body: Option<Bytes>, missing: &'static str) -> Response {
    match body {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, missing).into_response(),
    }
}
