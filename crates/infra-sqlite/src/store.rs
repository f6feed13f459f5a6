// SQLite-backed visit store
//
// One pool serves the snapshot-read repositories and the queue-scoped
// transactions, see `queue_repository`, `ticket_repository` and
// `transaction` for the trait impls.

use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SqliteVisitStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteVisitStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
