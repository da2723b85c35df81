//! Tests for database initialization and config-driven store setup

use cirrus_flavors::db::{flavor_get_by_flavor_id, init_database, FlavorCreate, ReadDeleted};
use cirrus_flavors::{MergedFlavorStore, RequestContext, StoreConfig};
use std::collections::HashMap;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("nested").join("flavors.db");
    assert!(!db_path.exists());

    let pool = init_database(&db_path).await.expect("init database");
    assert!(db_path.exists(), "Database file was not created");

    for table in ["flavors", "flavor_extra_specs", "flavor_projects"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "Table '{}' not created", table);
    }

    let fk_enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(fk_enabled, 1, "Foreign keys should be enabled");
}

#[tokio::test]
async fn test_idempotent_initialization() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("flavors.db");

    let pool1 = init_database(&db_path).await.expect("first init");
    drop(pool1);
    let pool2 = init_database(&db_path).await.expect("second init");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flavors")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_store_from_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig {
        api_database: dir.path().join("api.db"),
        cell_database: dir.path().join("cell.db"),
        extra_spec_retries: 3,
    };

    let store = MergedFlavorStore::from_config(&config).await.expect("open stores");
    let ctx = RequestContext::admin();

    let values = FlavorCreate {
        name: "m1.small".to_string(),
        flavorid: "42".to_string(),
        memory_mb: 512,
        vcpus: 1,
        root_gb: 10,
        ..FlavorCreate::default()
    };
    store
        .create(&ctx, &values, &HashMap::new(), &[])
        .await
        .expect("create flavor");

    // The record landed in the API database, not the cell database
    assert!(
        flavor_get_by_flavor_id(store.api_pool(), &ctx, "42", ReadDeleted::No)
            .await
            .is_ok()
    );
    assert!(
        flavor_get_by_flavor_id(store.cell_pool(), &ctx, "42", ReadDeleted::No)
            .await
            .is_err()
    );
}
