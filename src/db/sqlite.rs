use crate::db::models::{Author, Book, BookFilter, NewBook};
use crate::db::schema::SQLITE_INIT;
use crate::error::AppError;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

pub type SqlitePool = Pool<Sqlite>;

const BOOK_COLUMNS: &str = r#"
    SELECT b.id, b.title, b.description, b.publish_date, b.page_count,
           b.author_id, a.name AS author_name, b.created_at
    FROM books b
    JOIN authors a ON a.id = b.author_id
"#;

/// Result of trying to delete an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorDeletion {
    Deleted,
    /// Authors that still have books are kept.
    HasBooks,
}

#[derive(Clone)]
pub struct LibraryStorage {
    pool: SqlitePool,
}

impl LibraryStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), AppError> {
        // sqlx::query runs a single statement, so split the script.
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Authors ordered by name, optionally filtered by a case-insensitive substring.
    pub async fn list_authors(&self, name: Option<&str>) -> Result<Vec<Author>, AppError> {
        let pattern = format!("%{}%", name.unwrap_or("").trim());
        let rows = sqlx::query_as::<_, Author>(
            "SELECT id, name, created_at FROM authors WHERE name LIKE ? ORDER BY name, id",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_author(&self, id: i64) -> Result<Author, AppError> {
        sqlx::query_as::<_, Author>("SELECT id, name, created_at FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Insert an author. Returns the row id.
    pub async fn insert_author(&self, name: &str) -> Result<i64, AppError> {
        let res = sqlx::query("INSERT INTO authors (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn update_author(&self, id: i64, name: &str) -> Result<(), AppError> {
        let res = sqlx::query("UPDATE authors SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_author(&self, id: i64) -> Result<AuthorDeletion, AppError> {
        let mut tx = self.pool.begin().await?;

        let (book_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books WHERE author_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if book_count > 0 {
            return Ok(AuthorDeletion::HasBooks);
        }

        let res = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        tx.commit().await?;
        Ok(AuthorDeletion::Deleted)
    }

    /// Most recently added books first.
    pub async fn recent_books(&self, limit: i64) -> Result<Vec<Book>, AppError> {
        let sql = format!("{BOOK_COLUMNS} ORDER BY b.created_at DESC, b.id DESC LIMIT ?");
        let rows = sqlx::query_as::<_, Book>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn books_by_author(&self, author_id: i64, limit: i64) -> Result<Vec<Book>, AppError> {
        let sql = format!(
            "{BOOK_COLUMNS} WHERE b.author_id = ? ORDER BY b.created_at DESC, b.id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, Book>(&sql)
            .bind(author_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Books matching the filter; date bounds are inclusive.
    pub async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>, AppError> {
        let sql = format!(
            r#"{BOOK_COLUMNS}
            WHERE b.title LIKE ?
              AND (? IS NULL OR b.publish_date <= ?)
              AND (? IS NULL OR b.publish_date >= ?)
            ORDER BY b.title, b.id"#
        );
        let pattern = format!("%{}%", filter.title.as_deref().unwrap_or("").trim());
        let rows = sqlx::query_as::<_, Book>(&sql)
            .bind(pattern)
            .bind(filter.published_before)
            .bind(filter.published_before)
            .bind(filter.published_after)
            .bind(filter.published_after)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_book(&self, id: i64) -> Result<Book, AppError> {
        let sql = format!("{BOOK_COLUMNS} WHERE b.id = ?");
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Insert a book. Returns the row id.
    pub async fn insert_book(&self, book: &NewBook) -> Result<i64, AppError> {
        let res = sqlx::query(
            r#"
            INSERT INTO books (title, description, publish_date, page_count, author_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.title)
        .bind(&book.description)
        .bind(book.publish_date)
        .bind(book.page_count)
        .bind(book.author_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn update_book(&self, id: i64, book: &NewBook) -> Result<(), AppError> {
        let res = sqlx::query(
            r#"UPDATE books SET
                title = ?,
                description = ?,
                publish_date = ?,
                page_count = ?,
                author_id = ?
              WHERE id = ?"#,
        )
        .bind(&book.title)
        .bind(&book.description)
        .bind(book.publish_date)
        .bind(book.page_count)
        .bind(book.author_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_book(&self, id: i64) -> Result<(), AppError> {
        let res = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::NaiveDate;

    async fn storage(dir: &tempfile::TempDir) -> LibraryStorage {
        let url = format!("sqlite:{}", dir.path().join("library.sqlite").display());
        let db = Database::disconnected();
        db.connect(&url).await.expect("connect");
        db.storage().expect("connected").clone()
    }

    fn book(title: &str, author_id: i64, date: (i32, u32, u32)) -> NewBook {
        NewBook {
            title: title.to_string(),
            description: None,
            publish_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("date"),
            page_count: 100,
            author_id,
        }
    }

    #[tokio::test]
    async fn authors_are_searchable_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage(&dir).await;
        store.insert_author("Ursula K. Le Guin").await.unwrap();
        store.insert_author("Terry Pratchett").await.unwrap();

        let all = store.list_authors(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Terry Pratchett");

        let hits = store.list_authors(Some("guin")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Ursula K. Le Guin");
    }

    #[tokio::test]
    async fn author_with_books_is_not_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage(&dir).await;
        let author = store.insert_author("Iain M. Banks").await.unwrap();
        let book_id = store
            .insert_book(&book("Excession", author, (1996, 1, 1)))
            .await
            .unwrap();

        assert_eq!(
            store.delete_author(author).await.unwrap(),
            AuthorDeletion::HasBooks
        );
        store.delete_book(book_id).await.unwrap();
        assert_eq!(
            store.delete_author(author).await.unwrap(),
            AuthorDeletion::Deleted
        );
        assert!(matches!(
            store.get_author(author).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn book_filter_bounds_are_inclusive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage(&dir).await;
        let author = store.insert_author("Octavia E. Butler").await.unwrap();
        store
            .insert_book(&book("Kindred", author, (1979, 6, 1)))
            .await
            .unwrap();
        store
            .insert_book(&book("Parable of the Sower", author, (1993, 10, 1)))
            .await
            .unwrap();

        let filter = BookFilter {
            published_after: NaiveDate::from_ymd_opt(1979, 6, 1),
            published_before: NaiveDate::from_ymd_opt(1980, 1, 1),
            ..BookFilter::default()
        };
        let books = store.list_books(&filter).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Kindred");
        assert_eq!(books[0].author_name, "Octavia E. Butler");

        let filter = BookFilter {
            title: Some("sower".to_string()),
            ..BookFilter::default()
        };
        assert_eq!(store.list_books(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_books_are_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage(&dir).await;
        let author = store.insert_author("N. K. Jemisin").await.unwrap();
        for title in ["The Fifth Season", "The Obelisk Gate", "The Stone Sky"] {
            store
                .insert_book(&book(title, author, (2015, 8, 4)))
                .await
                .unwrap();
        }

        let recent = store.recent_books(2).await.unwrap();
        let titles: Vec<&str> = recent.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["The Stone Sky", "The Obelisk Gate"]);
    }

    #[tokio::test]
    async fn updating_missing_rows_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage(&dir).await;
        assert!(matches!(
            store.update_author(99, "Nobody").await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            store.update_book(99, &book("Missing", 1, (2000, 1, 1))).await,
            Err(AppError::NotFound)
        ));
    }
}
