use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS github_repositories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        author TEXT NOT NULL,
        name TEXT NOT NULL,
        avatar TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        language TEXT NOT NULL DEFAULT '',
        language_color TEXT NOT NULL DEFAULT '',
        stars INTEGER NOT NULL DEFAULT 0,
        forks INTEGER NOT NULL DEFAULT 0,
        current_period_stars INTEGER NOT NULL DEFAULT 0,
        built_by TEXT,
        fetched_at INTEGER NOT NULL,
        UNIQUE(author, name)
    );
    CREATE INDEX IF NOT EXISTS idx_github_repositories_fetched_at
        ON github_repositories(fetched_at);

    CREATE TABLE IF NOT EXISTS hackernews_stories (
        id INTEGER PRIMARY KEY,
        by TEXT NOT NULL DEFAULT '',
        descendants INTEGER NOT NULL DEFAULT 0,
        score INTEGER NOT NULL DEFAULT 0,
        time INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL DEFAULT '',
        type TEXT NOT NULL DEFAULT '',
        url TEXT,
        fetched_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_hackernews_stories_fetched_at
        ON hackernews_stories(fetched_at);

    CREATE TABLE IF NOT EXISTS rss_news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        title TEXT NOT NULL,
        link TEXT NOT NULL UNIQUE,
        fetched_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rss_news_fetched_at
        ON rss_news(fetched_at);
"#;

/// Shared handle to the SQLite cache database.
///
/// The connection is synchronous, so every statement runs on the blocking
/// pool through [`Database::call`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        tracing::info!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set database busy timeout")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database tables")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("Database connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("Database task failed")?
    }
}
