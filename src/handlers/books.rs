use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::db::{Author, BookFilter, LibraryStorage, NewBook};
use crate::error::AppError;
use crate::handlers::payload::{FormOrJson, text_or_number};
use crate::router::AppState;
use crate::views::ViewLocals;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/new", get(new_form))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/edit", get(edit_form))
}

#[derive(Debug, Default, Deserialize)]
pub struct BookSearch {
    pub title: Option<String>,
    #[serde(rename = "publishedBefore")]
    pub published_before: Option<String>,
    #[serde(rename = "publishedAfter")]
    pub published_after: Option<String>,
}

impl BookSearch {
    /// Unparseable dates are ignored rather than rejected.
    fn to_filter(&self) -> BookFilter {
        BookFilter {
            title: self.title.clone().filter(|t| !t.trim().is_empty()),
            published_before: parse_date(self.published_before.as_deref()),
            published_after: parse_date(self.published_after.as_deref()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BookForm {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub author: String,
    #[serde(default, rename = "publishDate")]
    pub publish_date: String,
    #[serde(default, rename = "pageCount", deserialize_with = "text_or_number")]
    pub page_count: String,
    #[serde(default)]
    pub description: String,
}

impl BookForm {
    pub fn validate(&self) -> Result<NewBook, &'static str> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title is required");
        }
        let author_id = self
            .author
            .trim()
            .parse::<i64>()
            .map_err(|_| "Author is required")?;
        let publish_date =
            parse_date(Some(&self.publish_date)).ok_or("Publish date must be YYYY-MM-DD")?;
        let page_count = self
            .page_count
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or("Page count must be a positive number")?;
        let description = Some(self.description.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(NewBook {
            title: title.to_string(),
            description,
            publish_date,
            page_count,
            author_id,
        })
    }

    /// Values echoed back into the form when it is re-rendered.
    fn to_view(&self, id: Option<i64>) -> Value {
        json!({
            "id": id,
            "title": self.title,
            "publishDate": self.publish_date,
            "pageCount": self.page_count,
            "description": self.description,
        })
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// Author options for the form's select box.
fn author_options(authors: &[Author], selected: Option<i64>) -> Value {
    authors
        .iter()
        .map(|a| json!({ "id": a.id, "name": a.name, "selected": Some(a.id) == selected }))
        .collect()
}

async fn render_form(
    state: &AppState,
    storage: &LibraryStorage,
    locals: &ViewLocals,
    view: &str,
    book: Value,
    selected_author: Option<i64>,
    error: Option<&str>,
) -> Result<Html<String>, AppError> {
    let authors = storage.list_authors(None).await?;
    state.views.render_page(
        view,
        locals,
        json!({
            "book": book,
            "authors": author_options(&authors, selected_author),
            "errorMessage": error,
        }),
    )
}

/// GET /books -> search by title and publish date range.
pub async fn list(
    State(state): State<AppState>,
    locals: ViewLocals,
    Query(search): Query<BookSearch>,
) -> Result<Html<String>, AppError> {
    let books = state.db.storage()?.list_books(&search.to_filter()).await?;
    state.views.render_page(
        "books/index",
        &locals,
        json!({
            "books": books,
            "searchOptions": {
                "title": search.title,
                "publishedBefore": search.published_before,
                "publishedAfter": search.published_after,
            }
        }),
    )
}

/// GET /books/new
pub async fn new_form(
    State(state): State<AppState>,
    locals: ViewLocals,
) -> Result<Html<String>, AppError> {
    let storage = state.db.storage()?;
    let blank = BookForm::default().to_view(None);
    render_form(&state, storage, &locals, "books/new", blank, None, None).await
}

/// POST /books
pub async fn create(
    State(state): State<AppState>,
    locals: ViewLocals,
    FormOrJson(form): FormOrJson<BookForm>,
) -> Result<Response, AppError> {
    let storage = state.db.storage()?;
    let book = match validated(storage, &form).await? {
        Ok(book) => book,
        Err(message) => {
            let selected = form.author.trim().parse().ok();
            let page = render_form(
                &state,
                storage,
                &locals,
                "books/new",
                form.to_view(None),
                selected,
                Some(message),
            )
            .await?;
            return Ok(page.into_response());
        }
    };

    let id = storage.insert_book(&book).await?;
    info!(id, author_id = book.author_id, "book created");
    Ok(Redirect::to(&format!("/books/{id}")).into_response())
}

/// GET /books/{id}
pub async fn show(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let book = state.db.storage()?.get_book(id).await?;
    state
        .views
        .render_page("books/show", &locals, json!({ "book": book }))
}

/// GET /books/{id}/edit
pub async fn edit_form(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let storage = state.db.storage()?;
    let book = storage.get_book(id).await?;
    let view = json!({
        "id": book.id,
        "title": book.title,
        "publishDate": book.publish_date.format(DATE_FORMAT).to_string(),
        "pageCount": book.page_count,
        "description": book.description,
    });
    render_form(
        &state,
        storage,
        &locals,
        "books/edit",
        view,
        Some(book.author_id),
        None,
    )
    .await
}

/// PUT /books/{id}
pub async fn update(
    State(state): State<AppState>,
    locals: ViewLocals,
    Path(id): Path<i64>,
    FormOrJson(form): FormOrJson<BookForm>,
) -> Result<Response, AppError> {
    let storage = state.db.storage()?;
    // 404 before validation so a missing book is never re-rendered as a form.
    storage.get_book(id).await?;

    let book = match validated(storage, &form).await? {
        Ok(book) => book,
        Err(message) => {
            let selected = form.author.trim().parse().ok();
            let page = render_form(
                &state,
                storage,
                &locals,
                "books/edit",
                form.to_view(Some(id)),
                selected,
                Some(message),
            )
            .await?;
            return Ok(page.into_response());
        }
    };

    storage.update_book(id, &book).await?;
    info!(id, "book updated");
    Ok(Redirect::to(&format!("/books/{id}")).into_response())
}

/// DELETE /books/{id}
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    state.db.storage()?.delete_book(id).await?;
    info!(id, "book deleted");
    Ok(Redirect::to("/books"))
}

/// Form validation plus the author existence check. The outer error is a
/// storage failure; the inner one a message for the form.
async fn validated(
    storage: &LibraryStorage,
    form: &BookForm,
) -> Result<Result<NewBook, &'static str>, AppError> {
    let book = match form.validate() {
        Ok(book) => book,
        Err(message) => return Ok(Err(message)),
    };
    match storage.get_author(book.author_id).await {
        Ok(_) => Ok(Ok(book)),
        Err(AppError::NotFound) => Ok(Err("Author does not exist")),
        Err(e) => Err(e),
    }
}
