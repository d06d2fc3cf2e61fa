use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(db_path: &Path) -> Result<DbPool, r2d2::Error> {
    if let Some(parent) = db_path.parent() {
        // Pool creation reports the real error if this fails.
        let _ = std::fs::create_dir_all(parent);
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )
    });

    Pool::builder().max_size(4).build(manager)
}
