//! SQL DDL for initializing the library storage.

/// SQLite schema with:
/// - `authors` and `books`, ids from INTEGER PRIMARY KEY AUTOINCREMENT
/// - timestamps stored as RFC3339 text, `publish_date` as `YYYY-MM-DD`
/// - `books.author_id` referencing `authors(id)` (enforced with `foreign_keys`)
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NULL,
    publish_date TEXT NOT NULL,
    page_count INTEGER NOT NULL,
    author_id INTEGER NOT NULL REFERENCES authors(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_author_id ON books(author_id);
CREATE INDEX IF NOT EXISTS idx_books_created_at ON books(created_at);
"#;
