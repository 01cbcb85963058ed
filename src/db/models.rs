use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Book row joined with its author's name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub publish_date: NaiveDate,
    pub page_count: i64,
    pub author_id: i64,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

/// Validated book fields for insert and update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub description: Option<String>,
    pub publish_date: NaiveDate,
    pub page_count: i64,
    pub author_id: i64,
}

/// Search criteria for the books listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub published_before: Option<NaiveDate>,
    pub published_after: Option<NaiveDate>,
}
