// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use visitq_core::error::{AppError, Result};

/// How long a writer waits for the database lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 10;

/// `sqlite://` URL for a database file
pub fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Create SQLite connection pool with WAL mode and foreign keys on
///
/// In-memory databases exist per connection, so they get a single
/// connection that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("Invalid database URL {}: {}", database_url, e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .create_if_missing(true);

    let pool_options = if is_memory_url(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_pool() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        assert!(pool.acquire().await.is_ok());
        assert_eq!(pool.options().get_max_connections(), 1);
    }

    #[tokio::test]
    async fn test_create_file_pool() {
        let dir = tempfile::tempdir().unwrap();
        let url = database_url(&dir.path().join("visitq.db"));

        let pool = create_pool(&url).await.unwrap();
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
        assert!(dir.path().join("visitq.db").exists());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = create_pool("postgres://nope").await;
        assert!(result.is_err());
    }
}
