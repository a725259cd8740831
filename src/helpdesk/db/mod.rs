//! SQLite repository for the helpdesk.
//!
//! `HelpdeskDb` owns the connection; the per-entity methods live in the
//! submodules as further `impl HelpdeskDb` blocks. Async code reaches the
//! database only through `DbHandle::call`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::dialect::SqlDialect;
use super::models::Role;
use crate::errors::HelpdeskError;

mod attachments;
mod comments;
mod counts;
mod grid;
mod lookups;
mod tags;
mod tickets;

pub use comments::NewComment;
pub use counts::UpcomingTicket;
pub use grid::{GridPage, GridQuery, GridRow, OrderBy, SortDir, TicketScope};
pub use lookups::NewUser;
pub use tickets::{TicketWrite, WriteOutcome};

/// Async-safe handle to the helpdesk database.
///
/// Wraps `HelpdeskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<HelpdeskDb>>,
}

impl DbHandle {
    pub fn new(db: HelpdeskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&HelpdeskDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| HelpdeskError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup seeding and
    /// tests only; never call from a request path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, HelpdeskDb>> {
        self.inner
            .lock()
            .map_err(|_| HelpdeskError::LockPoisoned.into())
    }
}

pub struct HelpdeskDb {
    conn: Connection,
    dialect: SqlDialect,
}

impl HelpdeskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self {
            conn,
            dialect: SqlDialect::Sqlite,
        };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self {
            conn,
            dialect: SqlDialect::Sqlite,
        };
        db.init()?;
        Ok(db)
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS departments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    department TEXT NOT NULL,
                    sub1 TEXT
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'user',
                    department_id INTEGER REFERENCES departments(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL DEFAULT '#000000'
                );

                CREATE TABLE IF NOT EXISTS category_agents (
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    PRIMARY KEY (category_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS statuses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL DEFAULT '#000000'
                );

                CREATE TABLE IF NOT EXISTS priorities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL DEFAULT '#000000',
                    magnitude INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS closing_reasons (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    text TEXT NOT NULL,
                    status_id INTEGER NOT NULL REFERENCES statuses(id),
                    ordering INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    bg_color TEXT NOT NULL DEFAULT '#0c5ea8',
                    text_color TEXT NOT NULL DEFAULT '#ffffff'
                );

                CREATE TABLE IF NOT EXISTS category_tags (
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    PRIMARY KEY (category_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject TEXT NOT NULL,
                    content TEXT NOT NULL DEFAULT '',
                    html TEXT NOT NULL DEFAULT '',
                    intervention TEXT NOT NULL DEFAULT '',
                    intervention_html TEXT NOT NULL DEFAULT '',
                    status_id INTEGER NOT NULL REFERENCES statuses(id),
                    priority_id INTEGER NOT NULL REFERENCES priorities(id),
                    category_id INTEGER NOT NULL REFERENCES categories(id),
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    creator_id INTEGER NOT NULL REFERENCES users(id),
                    agent_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    start_date TEXT NOT NULL,
                    limit_date TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ticket_tags (
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    PRIMARY KEY (ticket_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    type TEXT NOT NULL DEFAULT 'reply',
                    content TEXT NOT NULL DEFAULT '',
                    html TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS attachments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    uploaded_by_id INTEGER NOT NULL REFERENCES users(id),
                    original_filename TEXT NOT NULL,
                    new_filename TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    file_path TEXT NOT NULL,
                    mimetype TEXT NOT NULL,
                    bytes INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tickets_user ON tickets(user_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_agent ON tickets(agent_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_category ON tickets(category_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_completed ON tickets(completed_at);
                CREATE INDEX IF NOT EXISTS idx_tickets_limit ON tickets(limit_date);
                CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_attachments_ticket ON attachments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_ticket_tags_tag ON ticket_tags(tag_id);
                ",
            )
            .context("Failed to create tables")?;

        Ok(())
    }

    /// Seed the lookup tables a fresh install needs: three statuses (new,
    /// pending, solved), three priorities, a general category and an admin.
    /// Does nothing when statuses already exist.
    pub fn seed_defaults(&self, admin_email: &str) -> Result<bool> {
        let existing: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM statuses", [], |row| row.get(0))
            .context("Failed to count statuses")?;
        if existing > 0 {
            return Ok(false);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin seed transaction")?;
        for (name, color) in [("New", "#e69900"), ("Pending", "#e6e600"), ("Solved", "#15a000")] {
            self.create_status(name, color)?;
        }
        for (name, color, magnitude) in [
            ("Low", "#069900", 1),
            ("Normal", "#e1d200", 2),
            ("Critical", "#e10000", 3),
        ] {
            self.create_priority(name, color, magnitude)?;
        }
        let general = self.create_category("General", "#0014f4")?;
        let admin = self.create_user(&NewUser::new("Administrator", admin_email, Role::Admin))?;
        self.add_category_agent(general.id, admin.id)?;
        tx.commit().context("Failed to commit seed data")?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared setup for repository and workflow tests.

    use super::*;
    use crate::helpdesk::models::*;
    use chrono::NaiveDateTime;

    pub struct Fixture {
        pub db: HelpdeskDb,
        pub admin: User,
        pub agent: User,
        pub owner: User,
        pub other: User,
        pub category: Category,
        pub second_category: Category,
    }

    pub fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    /// Statuses 1 New / 2 Pending / 3 Solved, priorities 1..3, two
    /// categories, one agent assigned to the first.
    pub fn fixture() -> Fixture {
        let db = HelpdeskDb::new_in_memory().unwrap();
        db.seed_defaults("admin@example.com").unwrap();
        let admin = db.get_user(1).unwrap().unwrap();
        let agent = db
            .create_user(&NewUser::new("Ann Agent", "ann@example.com", Role::Agent))
            .unwrap();
        let owner = db
            .create_user(&NewUser::new("Olga Owner", "olga@example.com", Role::User))
            .unwrap();
        let other = db
            .create_user(&NewUser::new("Otto Other", "otto@example.com", Role::User))
            .unwrap();
        let category = db.get_category(1).unwrap().unwrap();
        db.add_category_agent(category.id, agent.id).unwrap();
        let second_category = db.create_category("Hardware", "#333333").unwrap();
        Fixture {
            db,
            admin,
            agent,
            owner,
            other,
            category,
            second_category,
        }
    }

    pub fn draft(owner: &User, category_id: i64, subject: &str) -> TicketDraft {
        TicketDraft {
            subject: subject.to_string(),
            content: "Something is broken".to_string(),
            html: "<p>Something is broken</p>".to_string(),
            intervention: String::new(),
            intervention_html: String::new(),
            status_id: 1,
            priority_id: 1,
            category_id,
            user_id: owner.id,
            creator_id: owner.id,
            agent_id: None,
            start_date: dt("2024-05-01 08:00:00"),
            limit_date: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = HelpdeskDb::new_in_memory()?;

        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
             ('tickets', 'comments', 'attachments', 'tags', 'ticket_tags', 'category_tags')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 6, "Expected 6 tables to exist");

        Ok(())
    }

    #[test]
    fn test_seed_defaults_is_idempotent() -> Result<()> {
        let db = HelpdeskDb::new_in_memory()?;
        assert!(db.seed_defaults("admin@example.com")?);
        assert!(!db.seed_defaults("admin@example.com")?);
        assert_eq!(db.list_statuses()?.len(), 3);
        assert_eq!(db.list_priorities()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_open_on_disk_twice() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("helpdesk.db");
        HelpdeskDb::new(&path)?.seed_defaults("admin@example.com")?;
        let reopened = HelpdeskDb::new(&path)?;
        assert_eq!(reopened.list_categories()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call() -> Result<()> {
        let handle = DbHandle::new(HelpdeskDb::new_in_memory()?);
        let seeded = handle.call(|db| db.seed_defaults("a@example.com")).await?;
        assert!(seeded);
        let statuses = handle.call(|db| db.list_statuses()).await?;
        assert_eq!(statuses[0].name, "New");
        Ok(())
    }
}
