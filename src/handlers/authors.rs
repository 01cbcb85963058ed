use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::AuthorDeletion;
use crate::error::AppError;
use crate::handlers::payload::FormOrJson;
use crate::router::AppState;
use crate::views::ViewLocals;

/// Books shown on an author's page.
const BOOKS_PER_AUTHOR: i64 = 6;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/new", get(new_form))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/edit", get(edit_form))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorSearch {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorForm {
    #[serde(default)]
    pub name: String,
}

/// GET /authors -> all authors, optionally filtered by `?name=`.
pub async fn list(
    State(state): State<AppState>,
    locals: ViewLocals,
    Query(search): Query<AuthorSearch>,
) -> Result<Html<String>, AppError> {
    let authors = state
        .db
        .storage()?
        .list_authors(search.name.as_deref())
        .await?;
    state.views.render_page(
        "authors/index",
        &locals,
        json!({ "authors": authors, "searchOptions": { "name": search.name } }),
    )
}

/// GET /authors/new
pub async fn new_form(
    State(state): State<AppState>,
    locals: ViewLocals,
) -> Result<Html<String>, AppError> {
    state
        .views
        .render_page("authors/new", &locals, json!({ "author": { "name": "" } }))
}

/// POST /authors
pub async fn create(
    State(state): State<AppState>,
    locals: ViewLocals,
    FormOrJson(form): FormOrJson<AuthorForm>,
) -> Result<Response, AppError> {
    let storage = state.db.storage()?;
    let name = form.name.trim();
    if name.is_empty() {
        let page = state.views.render_page(
            "authors/new",
            &locals,
            json!({ "author": { "name": form.name }, "errorMessage": "Error creating Author" }),
        )?;
        return Ok(page.into_response());
    }

    let id = storage.insert_author(name).await?;
    info!(id, "author created");
    Ok(Redirect::to(&format!("/authors/{id}")).into_response())
}

/// GET /authors/{id}
pub async fn show(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let storage = state.db.storage()?;
    let author = storage.get_author(id).await?;
    let books = storage.books_by_author(id, BOOKS_PER_AUTHOR).await?;
    state.views.render_page(
        "authors/show",
        &locals,
        json!({ "author": author, "booksByAuthor": books }),
    )
}

/// GET /authors/{id}/edit
pub async fn edit_form(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let author = state.db.storage()?.get_author(id).await?;
    state
        .views
        .render_page("authors/edit", &locals, json!({ "author": author }))
}

/// PUT /authors/{id}
pub async fn update(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
    FormOrJson(form): FormOrJson<AuthorForm>,
) -> Result<Response, AppError> {
    let storage = state.db.storage()?;
    let name = form.name.trim();
    if name.is_empty() {
        let page = state.views.render_page(
            "authors/edit",
            &locals,
            json!({
                "author": { "id": id, "name": form.name },
                "errorMessage": "Error updating Author"
            }),
        )?;
        return Ok(page.into_response());
    }

    storage.update_author(id, name).await?;
    info!(id, "author updated");
    Ok(Redirect::to(&format!("/authors/{id}")).into_response())
}

/// DELETE /authors/{id} -> authors that still have books are kept.
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    match state.db.storage()?.delete_author(id).await? {
        AuthorDeletion::Deleted => {
            info!(id, "author deleted");
            Ok(Redirect::to("/authors"))
        }
        AuthorDeletion::HasBooks => {
            info!(id, "author still has books; not deleted");
            Ok(Redirect::to(&format!("/authors/{id}")))
        }
    }
}
