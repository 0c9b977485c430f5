//! Connection pooling, per-connection pragmas and schema setup.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{LifecycleError, Result};

/// Pool of SQLite connections
pub type DbPool = Pool<SqliteConnectionManager>;
/// A connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "2026-01-05-000000_create_tables",
        include_str!("../migrations/2026-01-05-000000_create_tables/up.sql"),
    ),
    (
        "2026-02-10-000000_add_contacts_and_settings",
        include_str!("../migrations/2026-02-10-000000_add_contacts_and_settings/up.sql"),
    ),
];

/// Database manager for handling connections and schema setup.
///
/// Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl Database {
    /// Open (or create) a file database with default pool settings
    pub fn open(database_url: &str) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
    }

    /// Open (or create) a file database using the given settings
    pub fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = strip_sqlite_scheme(&config.url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| configure_connection(conn, busy_timeout, true));
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        let database = Self { pool };
        database.run_migrations()?;
        info!(path, max_connections = config.max_connections, "Database opened");
        Ok(database)
    }

    /// A private in-memory database backed by a single pooled connection
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| configure_connection(conn, Duration::from_secs(5), false));
        // An in-memory database lives exactly as long as its connection.
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let database = Self { pool };
        database.run_migrations()?;
        Ok(database)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        for (name, sql) in MIGRATIONS {
            conn.execute_batch(sql)?;
            debug!(migration = name, "Migration applied");
        }
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Current pool size, for metrics
    #[must_use]
    pub fn pool_size(&self) -> u32 {
        self.pool.state().connections
    }
}

fn configure_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    wal: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if wal {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    Ok(())
}

fn strip_sqlite_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Run a blocking storage call on the blocking thread pool.
///
/// `target` is anything shared behind an `Arc`: the database itself or a store
/// trait object.
pub async fn call_blocking<S, T, F>(target: Arc<S>, f: F) -> Result<T>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(target.as_ref()))
        .await
        .map_err(LifecycleError::from)?
}
