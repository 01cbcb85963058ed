//! Database module: connection handle, models and schema for persistent storage.
//!
//! Layout:
//! - `handle.rs`: process-wide connection handle, opened once in the background
//! - `models.rs`: Rust structs mirroring DB rows and form payloads
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: queries for authors and books

pub mod handle;
pub mod models;
pub mod schema;
pub mod sqlite;

pub use handle::Database;
pub use models::{Author, Book, BookFilter, NewBook};
pub use schema::SQLITE_INIT;
pub use sqlite::{AuthorDeletion, LibraryStorage, SqlitePool};
