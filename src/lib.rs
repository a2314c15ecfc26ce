use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod view;

use crate::db::Database;
use crate::handler::{AppState, create_book, delete_author, delete_book, healthcheck, index};

/// Builds the full router over a constructed database handle. `main` and the
/// integration tests both mount the service through here.
pub fn app(db: Arc<Database>) -> Router {
    Router::new()
        .route("/", get(index).post(create_book))
        .route("/delete_book/:book_id", get(delete_book))
        .route("/delete_author/:author_id", get(delete_author))
        .route("/healthz", get(healthcheck))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { db })
}
