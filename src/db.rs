use crate::config::Config;
use crate::model::{Book, BookChanges, DeleteAck, NewBook, WriteAck};
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use std::time::Duration;

const SYSTEM_MIGRATIONS: &[(&str, &str)] = &[(
    "system/000_migrations_table.sql",
    include_str!("migrations/system/000_migrations_table.sql"),
)];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

const BOOK_COLUMNS: &str = "id, title, author, genre, publication_year, available, created_at, updated_at";

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    turso_url: Option<String>,
    turso_auth_token: Option<String>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_replica(turso_url: &Option<String>, turso_auth_token: &Option<String>) -> bool {
        turso_url.is_some() && turso_auth_token.is_some()
    }

    /// Flushes local writes to the remote replica. No-op when running on a
    /// plain local database.
    pub async fn sync(&self) -> Result<()> {
        if Self::is_replica(&self.turso_url, &self.turso_auth_token) {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        match conn.execute(query, libsql::params![name]).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let turso_url = cfg.app.turso_url.clone();
        let turso_auth_token = cfg.app.turso_auth_token.clone();

        let db = match (&turso_url, &turso_auth_token) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                Builder::new_synced_database(&path, url.clone(), token.clone())
                    .sync_interval(sync_interval)
                    .build()
                    .await?
            }
            _ => Builder::new_local(&path).build().await?,
        };

        Self::setup(db, turso_url, turso_auth_token).await
    }

    /// Throwaway database for tests.
    pub async fn new_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::setup(db, None, None).await
    }

    async fn setup(
        db: LibsqlDatabase,
        turso_url: Option<String>,
        turso_auth_token: Option<String>,
    ) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            db,
            conn,
            turso_url,
            turso_auth_token,
        })
    }

    pub async fn create_book(&self, input: &NewBook) -> Result<Book> {
        let query = format!(
            r#"
            INSERT INTO books (title, author, genre, publication_year, available)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {BOOK_COLUMNS}
            "#
        );

        let mut rows = self
            .conn
            .query(
                &query,
                libsql::params![
                    input.title.as_str(),
                    input.author.as_str(),
                    input.genre.as_str(),
                    input.publication_year,
                    input.available as i64
                ],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Self::row_to_book(&row)?)
        } else {
            anyhow::bail!("failed to create book")
        }
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id");
        let mut rows = self.conn.query(&query, ()).await?;
        let mut books = Vec::new();

        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }

        Ok(books)
    }

    pub async fn find_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE genre = ? ORDER BY id");
        let mut rows = self.conn.query(&query, libsql::params![genre]).await?;
        let mut books = Vec::new();

        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }

        Ok(books)
    }

    pub async fn find_by_title(&self, title: &str) -> Result<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE title = ? LIMIT 1");
        let mut rows = self.conn.query(&query, libsql::params![title]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_book(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?");
        let mut rows = self.conn.query(&query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_book(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn find_before_year(&self, year: i64) -> Result<Vec<Book>> {
        let query =
            format!("SELECT {BOOK_COLUMNS} FROM books WHERE publication_year < ? ORDER BY id");
        let mut rows = self.conn.query(&query, libsql::params![year]).await?;
        let mut books = Vec::new();

        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }

        Ok(books)
    }

    /// Applies the given changes to one record. The caller decides which
    /// fields survive the merge; an empty change set matches without
    /// modifying anything.
    pub async fn update_book(&self, id: i64, changes: &BookChanges) -> Result<WriteAck> {
        if self.get_book(id).await?.is_none() {
            return Ok(WriteAck {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
            });
        }

        if changes.is_empty() {
            return Ok(WriteAck {
                acknowledged: true,
                matched_count: 1,
                modified_count: 0,
            });
        }

        let mut updates = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(title) = &changes.title {
            updates.push("title = ?");
            params.push(title.clone().into());
        }
        if let Some(author) = &changes.author {
            updates.push("author = ?");
            params.push(author.clone().into());
        }
        if let Some(genre) = &changes.genre {
            updates.push("genre = ?");
            params.push(genre.clone().into());
        }
        if let Some(year) = changes.publication_year {
            updates.push("publication_year = ?");
            params.push(year.into());
        }
        if let Some(available) = changes.available {
            updates.push("available = ?");
            params.push((available as i64).into());
        }

        updates.push("updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')");
        params.push(id.into());

        let query = format!("UPDATE books SET {} WHERE id = ?", updates.join(", "));

        let modified = self.conn.execute(&query, params).await?;
        Ok(WriteAck {
            acknowledged: true,
            matched_count: 1,
            modified_count: modified,
        })
    }

    pub async fn delete_book(&self, id: i64) -> Result<DeleteAck> {
        let deleted = self
            .conn
            .execute("DELETE FROM books WHERE id = ?", libsql::params![id])
            .await?;

        Ok(DeleteAck {
            acknowledged: true,
            deleted_count: deleted,
        })
    }

    /// Repairs rows that predate the `available` column. Idempotent: once
    /// every row carries a value the update matches nothing.
    pub async fn backfill_available(&self) -> Result<WriteAck> {
        let modified = self
            .conn
            .execute(
                r#"
                UPDATE books
                SET available = 1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE available IS NULL
                "#,
                (),
            )
            .await?;

        Ok(WriteAck {
            acknowledged: true,
            matched_count: modified,
            modified_count: modified,
        })
    }

    fn row_to_book(row: &libsql::Row) -> Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            genre: row.get(3)?,
            publication_year: row.get(4)?,
            available: row.get::<Option<i64>>(5)?.map(|v| v != 0),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_book(title: &str, genre: &str, year: i64) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Test Author".to_string(),
            genre: genre.to_string(),
            publication_year: year,
            available: true,
        }
    }

    /// Inserts a row the way a legacy import would have: no `available`.
    async fn insert_legacy_row(db: &Database, title: &str) {
        db.connection()
            .execute(
                "INSERT INTO books (title, author, genre, publication_year) VALUES (?, 'Old Author', 'Classics', 1900)",
                libsql::params![title],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_returns_generated_id_and_timestamps() {
        let db = Database::new_in_memory().await.unwrap();

        let book = db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();
        assert!(book.id > 0);
        assert_eq!(book.publication_year, 1965);
        assert_eq!(book.available, Some(true));
        assert!(!book.created_at.is_empty());
        assert_eq!(book.created_at, book.updated_at);
    }

    #[tokio::test]
    async fn find_by_title_returns_first_match_only() {
        let db = Database::new_in_memory().await.unwrap();

        let first = db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();
        db.create_book(&new_book("Dune", "Sci-Fi", 1984)).await.unwrap();

        let found = db.find_by_title("Dune").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        assert!(db.find_by_title("dune").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_applies_only_given_changes() {
        let db = Database::new_in_memory().await.unwrap();
        let book = db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();

        let changes = BookChanges {
            genre: Some("Space Opera".to_string()),
            ..BookChanges::default()
        };
        let ack = db.update_book(book.id, &changes).await.unwrap();
        assert_eq!(ack.matched_count, 1);
        assert_eq!(ack.modified_count, 1);

        let updated = db.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(updated.genre, "Space Opera");
        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.publication_year, 1965);
        assert_eq!(updated.available, Some(true));
    }

    #[tokio::test]
    async fn update_available_false_is_applied() {
        let db = Database::new_in_memory().await.unwrap();
        let book = db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();

        let changes = BookChanges {
            available: Some(false),
            ..BookChanges::default()
        };
        db.update_book(book.id, &changes).await.unwrap();

        let updated = db.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(updated.available, Some(false));
    }

    #[tokio::test]
    async fn update_nonexistent_id_matches_zero() {
        let db = Database::new_in_memory().await.unwrap();

        let changes = BookChanges {
            genre: Some("Horror".to_string()),
            ..BookChanges::default()
        };
        let ack = db.update_book(9999, &changes).await.unwrap();
        assert!(ack.acknowledged);
        assert_eq!(ack.matched_count, 0);
        assert_eq!(ack.modified_count, 0);
    }

    #[tokio::test]
    async fn empty_change_set_matches_without_modifying() {
        let db = Database::new_in_memory().await.unwrap();
        let book = db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();

        let ack = db.update_book(book.id, &BookChanges::default()).await.unwrap();
        assert_eq!(ack.matched_count, 1);
        assert_eq!(ack.modified_count, 0);
    }

    #[tokio::test]
    async fn delete_nonexistent_id_returns_zero_count() {
        let db = Database::new_in_memory().await.unwrap();

        let ack = db.delete_book(9999).await.unwrap();
        assert!(ack.acknowledged);
        assert_eq!(ack.deleted_count, 0);
    }

    #[tokio::test]
    async fn backfill_repairs_only_legacy_rows_and_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();

        db.create_book(&new_book("Modern", "Sci-Fi", 2001)).await.unwrap();
        insert_legacy_row(&db, "Legacy One").await;
        insert_legacy_row(&db, "Legacy Two").await;

        let first = db.backfill_available().await.unwrap();
        assert_eq!(first.matched_count, 2);
        assert_eq!(first.modified_count, 2);

        let second = db.backfill_available().await.unwrap();
        assert_eq!(second.matched_count, 0);

        for book in db.list_books().await.unwrap() {
            assert_eq!(book.available, Some(true));
        }
    }

    #[tokio::test]
    async fn before_year_is_strictly_less_than() {
        let db = Database::new_in_memory().await.unwrap();

        db.create_book(&new_book("Nineteen Eighty-Four", "Dystopia", 1949))
            .await
            .unwrap();
        db.create_book(&new_book("Hyperion", "Sci-Fi", 1989)).await.unwrap();

        let found = db.find_before_year(1989).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Nineteen Eighty-Four");
    }

    #[tokio::test]
    async fn migrations_are_reentrant() {
        let db = Database::new_in_memory().await.unwrap();

        for (name, sql) in MIGRATIONS {
            Database::run_migration(db.connection(), name, sql).await.unwrap();
        }

        db.create_book(&new_book("Dune", "Sci-Fi", 1965)).await.unwrap();
        assert_eq!(db.list_books().await.unwrap().len(), 1);
    }
}
