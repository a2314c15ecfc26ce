use crate::config::Config;
use crate::model::{Author, AuthorWithBooks, Book};
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use tokio::sync::Mutex;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

// Demo fixtures applied by `reset_demo_data`. Books reference their author by
// name so the pairing stays readable.
const DEMO_AUTHORS: &[&str] = &["老王", "老尹", "老刘"];
const DEMO_BOOKS: &[(&str, &str)] = &[
    ("老王回忆录", "老王"),
    ("我读书少，你别骗我", "老王"),
    ("如何才能让自己更骚", "老尹"),
    ("怎样征服美丽少女", "老刘"),
    ("如何征服英俊少男", "老刘"),
];

/// libsql surfaces constraint failures as plain SQLite error strings. A
/// create that slips past the application-level pre-check still lands here at
/// commit time, and the caller maps it onto the duplicate path.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.to_string().contains("UNIQUE constraint failed"))
}

pub struct Database {
    conn: Connection,
    tx_lock: Mutex<()>,
    // Keeps the underlying database handle alive for `conn`.
    _db: LibsqlDatabase,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let db = Builder::new_local(&path).build().await?;
        Self::setup(db).await
    }

    /// In-memory database with the schema applied. The test suites run
    /// against this.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::setup(db).await
    }

    async fn setup(db: LibsqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            conn,
            tx_lock: Mutex::new(()),
            _db: db,
        })
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
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
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

    /// Every author with their books resolved, in storage order.
    pub async fn list_authors_with_books(&self) -> Result<Vec<AuthorWithBooks>> {
        let query = r#"
SELECT
    authors.id,
    authors.name,
    books.id,
    books.name
FROM authors
LEFT JOIN books ON books.author_id = authors.id
ORDER BY authors.id, books.id
"#;

        let mut rows = self.conn.query(query, ()).await?;
        let mut listing: Vec<AuthorWithBooks> = vec![];

        while let Some(row) = rows.next().await? {
            let author_id: i32 = row.get(0)?;
            let author_name: String = row.get(1)?;
            let book_id: Option<i32> = row.get(2)?;
            let book_name: Option<String> = row.get(3)?;

            if listing.last().map(|entry| entry.author.id) != Some(author_id) {
                listing.push(AuthorWithBooks {
                    author: Author {
                        id: author_id,
                        name: author_name,
                    },
                    books: vec![],
                });
            }

            if let (Some(id), Some(name), Some(entry)) = (book_id, book_name, listing.last_mut()) {
                entry.books.push(Book { id, name, author_id });
            }
        }

        Ok(listing)
    }

    pub async fn find_author_by_name(&self, name: &str) -> Result<Option<Author>> {
        let mut rows = self
            .conn
            .query("SELECT id, name FROM authors WHERE name = ?", libsql::params![name])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Author {
                id: row.get(0)?,
                name: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn find_book_by_name(&self, name: &str) -> Result<Option<Book>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, author_id FROM books WHERE name = ?",
                libsql::params![name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Book {
                id: row.get(0)?,
                name: row.get(1)?,
                author_id: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Insert a book owned by an existing author, as one unit of work.
    pub async fn insert_book_for_author(&self, book_name: &str, author_id: i32) -> Result<Book> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = self.insert_book(book_name, author_id).await;

        match result {
            Ok(book) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(book)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Create an author and their first book together. The unit of work rolls
    /// back completely on failure, so no partial author/book pair survives.
    pub async fn insert_author_with_book(
        &self,
        author_name: &str,
        book_name: &str,
    ) -> Result<(Author, Book)> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            let author = self.insert_author(author_name).await?;
            let book = self.insert_book(book_name, author.id).await?;
            Ok::<_, anyhow::Error>((author, book))
        }
        .await;

        match result {
            Ok(pair) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(pair)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn insert_author(&self, name: &str) -> Result<Author> {
        let mut rows = self
            .conn
            .query(
                "INSERT INTO authors (name) VALUES (?) RETURNING id, name",
                libsql::params![name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Author {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        } else {
            anyhow::bail!("insert into authors returned no row")
        }
    }

    async fn insert_book(&self, name: &str, author_id: i32) -> Result<Book> {
        let mut rows = self
            .conn
            .query(
                "INSERT INTO books (name, author_id) VALUES (?, ?) RETURNING id, name, author_id",
                libsql::params![name, author_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Book {
                id: row.get(0)?,
                name: row.get(1)?,
                author_id: row.get(2)?,
            })
        } else {
            anyhow::bail!("insert into books returned no row")
        }
    }

    /// Delete one book. Reports whether a row actually went away, so callers
    /// can treat unknown ids as not-found instead of an error.
    pub async fn delete_book_by_id(&self, book_id: i32) -> Result<bool> {
        let result = self
            .conn
            .execute("DELETE FROM books WHERE id = ?", libsql::params![book_id])
            .await?;
        Ok(result > 0)
    }

    /// Delete an author and every book they own, children before parent, as
    /// one unit of work.
    pub async fn delete_author_by_id(&self, author_id: i32) -> Result<bool> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            self.conn
                .execute("DELETE FROM books WHERE author_id = ?", libsql::params![author_id])
                .await?;
            let deleted = self
                .conn
                .execute("DELETE FROM authors WHERE id = ?", libsql::params![author_id])
                .await?;
            Ok::<u64, anyhow::Error>(deleted)
        }
        .await;

        match result {
            Ok(deleted) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(deleted > 0)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Development bootstrap: drop both tables, re-run the schema, insert the
    /// demo fixtures. This is seed data, not a migration path.
    pub async fn reset_demo_data(&self) -> Result<()> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("DROP TABLE IF EXISTS books", ()).await?;
        self.conn.execute("DROP TABLE IF EXISTS authors", ()).await?;
        for (_, sql) in MIGRATIONS {
            self.conn.execute_batch(sql).await?;
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            for name in DEMO_AUTHORS {
                self.insert_author(name).await?;
            }
            for (book_name, author_name) in DEMO_BOOKS {
                let author = self
                    .find_author_by_name(author_name)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("demo author {author_name} missing"))?;
                self.insert_book(book_name, author.id).await?;
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_author_and_book_together() {
        let db = Database::in_memory().await.unwrap();

        let (author, book) = db.insert_author_with_book("老王", "老王回忆录").await.unwrap();
        assert_eq!(book.author_id, author.id);

        let listing = db.list_authors_with_books().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].author.name, "老王");
        assert_eq!(listing[0].books.len(), 1);
        assert_eq!(listing[0].books[0].name, "老王回忆录");
    }

    #[tokio::test]
    async fn duplicate_book_name_hits_unique_constraint() {
        let db = Database::in_memory().await.unwrap();

        let (author, _) = db.insert_author_with_book("老王", "老王回忆录").await.unwrap();
        let err = db.insert_book_for_author("老王回忆录", author.id).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let listing = db.list_authors_with_books().await.unwrap();
        assert_eq!(listing[0].books.len(), 1);
    }

    #[tokio::test]
    async fn failed_pair_insert_rolls_back_completely() {
        let db = Database::in_memory().await.unwrap();

        db.insert_author_with_book("老王", "老王回忆录").await.unwrap();

        // The author insert succeeds, the book insert trips UNIQUE; the whole
        // unit of work must roll back.
        let err = db.insert_author_with_book("老尹", "老王回忆录").await.unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(db.find_author_by_name("老尹").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_author_removes_their_books_only() {
        let db = Database::in_memory().await.unwrap();
        db.reset_demo_data().await.unwrap();

        let author = db.find_author_by_name("老王").await.unwrap().unwrap();
        assert!(db.delete_author_by_id(author.id).await.unwrap());

        assert!(db.find_book_by_name("老王回忆录").await.unwrap().is_none());
        assert!(db.find_book_by_name("我读书少，你别骗我").await.unwrap().is_none());

        let listing = db.list_authors_with_books().await.unwrap();
        assert_eq!(listing.len(), 2);
        let remaining: usize = listing.iter().map(|entry| entry.books.len()).sum();
        assert_eq!(remaining, 3);
    }

    #[tokio::test]
    async fn deleting_book_leaves_author_and_siblings() {
        let db = Database::in_memory().await.unwrap();
        db.reset_demo_data().await.unwrap();

        let book = db.find_book_by_name("老王回忆录").await.unwrap().unwrap();
        assert!(db.delete_book_by_id(book.id).await.unwrap());

        assert!(db.find_author_by_name("老王").await.unwrap().is_some());
        assert!(db.find_book_by_name("我读书少，你别骗我").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deletes_report_unknown_ids() {
        let db = Database::in_memory().await.unwrap();

        assert!(!db.delete_book_by_id(9999).await.unwrap());
        assert!(!db.delete_author_by_id(9999).await.unwrap());
    }

    #[tokio::test]
    async fn no_orphan_books_after_mixed_operations() {
        let db = Database::in_memory().await.unwrap();
        db.reset_demo_data().await.unwrap();

        let author = db.find_author_by_name("老尹").await.unwrap().unwrap();
        db.insert_book_for_author("新书A", author.id).await.unwrap();
        db.delete_author_by_id(author.id).await.unwrap();
        db.insert_author_with_book("老马", "马语").await.unwrap();

        let mut rows = db
            .connection()
            .query(
                "SELECT COUNT(*) FROM books WHERE author_id NOT IN (SELECT id FROM authors)",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let orphans: i32 = row.get(0).unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn demo_seed_is_repeatable() {
        let db = Database::in_memory().await.unwrap();
        db.reset_demo_data().await.unwrap();
        db.reset_demo_data().await.unwrap();

        let listing = db.list_authors_with_books().await.unwrap();
        assert_eq!(listing.len(), 3);
        let books: usize = listing.iter().map(|entry| entry.books.len()).sum();
        assert_eq!(books, 5);
    }
}
