//! Database models and queries

pub mod access;
pub mod extra_specs;
pub mod flavors;
pub mod init;
pub mod models;

pub use access::*;
pub use extra_specs::*;
pub use flavors::*;
pub use init::*;
pub use models::*;

/// Extract the offending columns from a SQLite uniqueness violation.
///
/// SQLite reports `UNIQUE constraint failed: <table>.<col>, ...`; the
/// column list drives the duplicate-key -> domain error mapping.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(columns) = db_err.message().strip_prefix("UNIQUE constraint failed: ") {
            return Some(columns.to_string());
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// In-memory store with the real schema. A single connection keeps
    /// every query on the same in-memory database.
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .expect("enable foreign keys");
        super::init::create_schema(&pool).await.expect("schema");
        pool
    }
}
