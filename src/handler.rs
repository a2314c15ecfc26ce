use std::sync::Arc;

use axum::{
    Json,
    extract::{Form, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::db::{self, Database};
use crate::error::CatalogError;
use crate::view;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

#[derive(Debug, Deserialize)]
pub struct NoticeParams {
    pub notice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookForm {
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub book_name: String,
}

fn redirect_home() -> Response {
    Redirect::to("/").into_response()
}

// Flash-style messaging: the notice rides the redirect as a query parameter
// and the listing page renders it once.
fn redirect_with_notice(err: &CatalogError) -> Response {
    let msg = err.to_string();
    Redirect::to(&format!("/?notice={}", urlencoding::encode(&msg))).into_response()
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn index(State(state): State<AppState>, Query(params): Query<NoticeParams>) -> Response {
    match state.db.list_authors_with_books().await {
        Ok(listing) => Html(view::render_catalogue(&listing, params.notice.as_deref())).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list catalogue");
            let notice = CatalogError::Storage(e).to_string();
            Html(view::render_catalogue(&[], Some(&notice))).into_response()
        }
    }
}

pub async fn create_book(State(state): State<AppState>, Form(form): Form<CreateBookForm>) -> Response {
    match try_create_book(&state.db, &form).await {
        Ok(()) => redirect_home(),
        Err(e) => {
            if let CatalogError::Storage(source) = &e {
                tracing::error!(error = %source, book_name = %form.book_name, "create book failed");
            }
            redirect_with_notice(&e)
        }
    }
}

async fn try_create_book(db: &Database, form: &CreateBookForm) -> Result<(), CatalogError> {
    let author_name = form.author_name.trim();
    let book_name = form.book_name.trim();

    if author_name.is_empty() || book_name.is_empty() {
        return Err(CatalogError::MissingFields);
    }

    if db.find_book_by_name(book_name).await?.is_some() {
        return Err(CatalogError::DuplicateBook);
    }

    let written = match db.find_author_by_name(author_name).await? {
        Some(author) => db.insert_book_for_author(book_name, author.id).await.map(|_| ()),
        None => db.insert_author_with_book(author_name, book_name).await.map(|_| ()),
    };

    written.map_err(|e| {
        // Two requests can pass the pre-check with the same name; the UNIQUE
        // constraint catches the loser at commit time.
        if db::is_unique_violation(&e) {
            CatalogError::DuplicateBook
        } else {
            CatalogError::Storage(e)
        }
    })
}

pub async fn delete_book(State(state): State<AppState>, Path(book_id): Path<i32>) -> Response {
    match state.db.delete_book_by_id(book_id).await {
        Ok(true) => info!(book_id, "book deleted"),
        Ok(false) => tracing::warn!(book_id, "delete requested for unknown book"),
        Err(e) => {
            tracing::error!(error = %e, book_id, "failed to delete book");
            return redirect_with_notice(&CatalogError::Storage(e));
        }
    }

    redirect_home()
}

pub async fn delete_author(State(state): State<AppState>, Path(author_id): Path<i32>) -> Response {
    match state.db.delete_author_by_id(author_id).await {
        Ok(true) => info!(author_id, "author deleted with their books"),
        Ok(false) => tracing::warn!(author_id, "delete requested for unknown author"),
        Err(e) => {
            tracing::error!(error = %e, author_id, "failed to delete author");
            return redirect_with_notice(&CatalogError::Storage(e));
        }
    }

    redirect_home()
}
