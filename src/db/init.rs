//! Database initialization
//!
//! Both the API store and the cell store use the same logical schema;
//! `init_database` is called once per store with its own path.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize a flavor store connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new flavor database: {}", db_path.display());
    } else {
        info!("Opened existing flavor database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create the flavor tables (idempotent - safe to call multiple times)
///
/// Soft delete stores the row's own id in `deleted`, so the composite
/// unique constraints only bind live rows (`deleted = 0`) and a
/// destroyed key can be recreated any number of times.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flavors (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            memory_mb INTEGER NOT NULL,
            vcpus INTEGER NOT NULL,
            root_gb INTEGER NOT NULL DEFAULT 0,
            ephemeral_gb INTEGER NOT NULL DEFAULT 0,
            flavorid TEXT NOT NULL,
            swap INTEGER NOT NULL DEFAULT 0,
            rxtx_factor REAL NOT NULL DEFAULT 1.0,
            vcpu_weight INTEGER,
            disabled INTEGER NOT NULL DEFAULT 0,
            is_public INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TIMESTAMP,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE (flavorid, deleted),
            UNIQUE (name, deleted),
            CHECK (memory_mb > 0),
            CHECK (vcpus > 0),
            CHECK (root_gb >= 0),
            CHECK (ephemeral_gb >= 0),
            CHECK (swap >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flavors_flavorid ON flavors(flavorid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flavors_name ON flavors(name)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flavor_extra_specs (
            id INTEGER PRIMARY KEY,
            flavor_id INTEGER NOT NULL REFERENCES flavors(id),
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TIMESTAMP,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE (flavor_id, key, deleted)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_flavor_extra_specs_flavor_id_key \
         ON flavor_extra_specs(flavor_id, key)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flavor_projects (
            id INTEGER PRIMARY KEY,
            flavor_id INTEGER NOT NULL REFERENCES flavors(id),
            project_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TIMESTAMP,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE (flavor_id, project_id, deleted)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_flavor_projects_flavor_id \
         ON flavor_projects(flavor_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
