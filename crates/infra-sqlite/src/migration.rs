// Migration Runner

use crate::error::map_sqlx_error;
use sqlx::SqlitePool;
use tracing::info;
use visitq_core::error::Result;

/// Ordered migrations; the version is the 1-based index
const MIGRATIONS: &[(&str, &str)] = &[(
    "Initial schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Apply pending migrations; safe to call on every start
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    let current_version = current_version(pool).await?;
    info!(current_version = current_version, "Current schema version");

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate() {
        let version = index as i64 + 1;
        if version <= current_version {
            continue;
        }
        info!(version = version, name = %name, "Applying migration");
        apply_migration(pool, sql).await?;
    }

    info!("All migrations applied successfully");
    Ok(())
}

/// Highest applied migration (0 on a fresh database)
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Apply a single migration SQL file in one transaction
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    // Split by semicolon and execute each statement
    for statement in sql.split(';') {
        let clean_statement = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let clean_statement = clean_statement.trim();

        if !clean_statement.is_empty() {
            sqlx::query(clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
    }

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}
