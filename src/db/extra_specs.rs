//! Extra-spec key/value metadata per flavor

use crate::db::flavors::flavor_id_by_flavorid;
use crate::db::unique_violation;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::warn;

/// Default retry budget for the optimistic upsert
pub const DEFAULT_EXTRA_SPEC_RETRIES: u32 = 10;

/// Live extra specs for a flavor internal id
pub(crate) async fn load_extra_specs(
    pool: &SqlitePool,
    flavor_id: i64,
) -> Result<HashMap<String, String>> {
    let rows = sqlx::query(
        "SELECT key, value FROM flavor_extra_specs WHERE deleted = 0 AND flavor_id = ?",
    )
    .bind(flavor_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect())
}

/// All live key/value pairs for a flavor business key.
///
/// Joins against live flavor rows, so a destroyed or unknown key
/// yields an empty map rather than an error.
pub async fn extra_specs_get(pool: &SqlitePool, flavorid: &str) -> Result<HashMap<String, String>> {
    let rows = sqlx::query(
        "SELECT s.key, s.value FROM flavor_extra_specs s \
         JOIN flavors f ON f.id = s.flavor_id AND f.deleted = 0 \
         WHERE s.deleted = 0 AND f.flavorid = ?",
    )
    .bind(flavorid)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect())
}

/// Update or insert extra specs, one transaction per attempt.
///
/// The exists-check (the UPDATE) and the INSERT are not atomic across
/// concurrent writers; a raced insert surfaces as a uniqueness
/// violation, which rolls the attempt back and retries. The budget is
/// `max_retries` whole-transaction attempts.
pub async fn extra_specs_update_or_create(
    pool: &SqlitePool,
    flavorid: &str,
    specs: &HashMap<String, String>,
    max_retries: u32,
) -> Result<()> {
    for attempt in 1..=max_retries {
        let flavor_id = flavor_id_by_flavorid(pool, flavorid).await?;
        match upsert_attempt(pool, flavor_id, specs).await {
            Ok(()) => return Ok(()),
            Err(Error::Database(err)) if unique_violation(&err).is_some() => {
                warn!(
                    "Extra spec upsert for flavor {} lost a race (attempt {}/{})",
                    flavorid, attempt, max_retries
                );
            }
            Err(err) => return Err(err),
        }
    }
    Err(Error::ExtraSpecUpdateFailed {
        flavor_id: flavorid.to_string(),
        attempts: max_retries,
    })
}

async fn upsert_attempt(
    pool: &SqlitePool,
    flavor_id: i64,
    specs: &HashMap<String, String>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for (key, value) in specs {
        let updated = sqlx::query(
            "UPDATE flavor_extra_specs SET value = ?, updated_at = ? \
             WHERE deleted = 0 AND flavor_id = ? AND key = ?",
        )
        .bind(value)
        .bind(now)
        .bind(flavor_id)
        .bind(key)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO flavor_extra_specs (flavor_id, key, value, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(flavor_id)
            .bind(key)
            .bind(value)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Soft-delete one extra spec by key
pub async fn extra_specs_delete(pool: &SqlitePool, flavorid: &str, key: &str) -> Result<()> {
    let flavor_id = flavor_id_by_flavorid(pool, flavorid).await?;
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE flavor_extra_specs SET deleted = id, deleted_at = ?, updated_at = ? \
         WHERE deleted = 0 AND flavor_id = ? AND key = ?",
    )
    .bind(now)
    .bind(now)
    .bind(flavor_id)
    .bind(key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ExtraSpecNotFound {
            flavor_id: flavorid.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::flavors::flavor_create;
    use crate::db::models::FlavorCreate;
    use crate::db::testing::memory_pool;

    async fn create_flavor(pool: &SqlitePool, specs: &HashMap<String, String>) {
        let values = FlavorCreate {
            name: "m1.small".to_string(),
            flavorid: "f1".to_string(),
            memory_mb: 512,
            vcpus: 1,
            root_gb: 10,
            ..FlavorCreate::default()
        };
        flavor_create(pool, &values, specs, &[]).await.expect("create flavor");
    }

    fn specs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_extra_specs_roundtrip() {
        let pool = memory_pool().await;
        create_flavor(&pool, &specs(&[("a", "a"), ("b", "b")])).await;

        extra_specs_update_or_create(
            &pool,
            "f1",
            &specs(&[("b", "b1"), ("c", "c1")]),
            DEFAULT_EXTRA_SPEC_RETRIES,
        )
        .await
        .unwrap();

        let loaded = extra_specs_get(&pool, "f1").await.unwrap();
        assert_eq!(loaded, specs(&[("a", "a"), ("b", "b1"), ("c", "c1")]));
    }

    #[tokio::test]
    async fn test_extra_specs_update_or_create_flavor_not_found() {
        let pool = memory_pool().await;
        let err = extra_specs_update_or_create(
            &pool,
            "nonexists",
            &specs(&[("a", "a")]),
            DEFAULT_EXTRA_SPEC_RETRIES,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::FlavorNotFound { .. }));
    }

    #[tokio::test]
    async fn test_extra_specs_delete() {
        let pool = memory_pool().await;
        create_flavor(&pool, &specs(&[("a", "a"), ("b", "b")])).await;

        extra_specs_delete(&pool, "f1", "a").await.unwrap();
        let loaded = extra_specs_get(&pool, "f1").await.unwrap();
        assert_eq!(loaded, specs(&[("b", "b")]));

        // Deleting an absent key fails; the soft-deleted key counts as absent
        let err = extra_specs_delete(&pool, "f1", "a").await.unwrap_err();
        assert!(matches!(err, Error::ExtraSpecNotFound { key, .. } if key == "a"));
        let err = extra_specs_delete(&pool, "f1", "dummy").await.unwrap_err();
        assert!(matches!(err, Error::ExtraSpecNotFound { .. }));
    }

    #[tokio::test]
    async fn test_extra_specs_upsert_retries_exhausted() {
        let pool = memory_pool().await;
        create_flavor(&pool, &HashMap::new()).await;

        // Stand-in for a concurrent writer: every insert of this key
        // reports the same uniqueness violation a raced insert would.
        sqlx::query(
            r#"
            CREATE TRIGGER extra_specs_raced_insert
            BEFORE INSERT ON flavor_extra_specs
            WHEN NEW.key = 'racer'
            BEGIN
                SELECT RAISE(ABORT,
                    'UNIQUE constraint failed: flavor_extra_specs.flavor_id, flavor_extra_specs.key, flavor_extra_specs.deleted');
            END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = extra_specs_update_or_create(&pool, "f1", &specs(&[("racer", "v")]), 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ExtraSpecUpdateFailed { attempts: 5, .. }
        ));

        // Nothing was committed by the failed attempts
        assert!(extra_specs_get(&pool, "f1").await.unwrap().is_empty());
    }
}
