// sqlx::Error -> AppError
//
// Orphan rules forbid `impl From<sqlx::Error> for AppError` here, so every
// query maps its error through `map_sqlx_error`.

use visitq_core::error::AppError;

// SQLite result codes: https://www.sqlite.org/rescode.html
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_RECOVERY: &str = "261";
const SQLITE_LOCKED_SHAREDCACHE: &str = "262";
const SQLITE_BUSY_SNAPSHOT: &str = "517";
const SQLITE_FULL: &str = "13";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

/// Column list SQLite reports when `idx_tickets_one_serving` rejects a write
const SERVING_INDEX_COLUMNS: &str = "tickets.queue_id";

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            let Some(code) = db_err.code() else {
                return AppError::Internal(format!("Database error: {}", message));
            };

            match code.as_ref() {
                SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_RECOVERY | SQLITE_LOCKED_SHAREDCACHE
                | SQLITE_BUSY_SNAPSHOT => {
                    AppError::Conflict(format!("Database busy ({}): {}", code, message))
                }
                SQLITE_CONSTRAINT_UNIQUE if message.contains(SERVING_INDEX_COLUMNS) => {
                    AppError::AlreadyServing(format!(
                        "Another ticket is already serving: {}",
                        message
                    ))
                }
                SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
                    AppError::Conflict(format!("Already exists: {}", message))
                }
                SQLITE_CONSTRAINT_FOREIGNKEY => {
                    AppError::NotFound(format!("Referenced row missing: {}", message))
                }
                SQLITE_FULL => AppError::Unavailable(format!("Database full: {}", message)),
                other => AppError::Internal(format!("Database error [{}]: {}", other, message)),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => {
            AppError::Unavailable(format!("Database unavailable: {}", err))
        }
        _ => AppError::Internal(format!("Database error: {}", err)),
    }
}
