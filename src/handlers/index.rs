use axum::{Router, extract::State, response::Html, routing::get};
use serde_json::json;

use crate::error::AppError;
use crate::router::AppState;
use crate::views::ViewLocals;

const RECENT_BOOKS: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// GET / -> the most recently added books.
pub async fn index(
    State(state): State<AppState>,
    locals: ViewLocals,
) -> Result<Html<String>, AppError> {
    let books = state.db.storage()?.recent_books(RECENT_BOOKS).await?;
    state
        .views
        .render_page("index", &locals, json!({ "books": books }))
}
