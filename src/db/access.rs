//! Project access grants for non-public flavors

use crate::db::flavors::flavor_id_by_flavorid;
use crate::db::models::AccessGrant;
use crate::db::unique_violation;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Live access grants for a flavor business key, ordered by grant id.
///
/// Joins against live flavor rows, so a destroyed or unknown key
/// yields an empty list.
pub async fn flavor_access_get_by_flavor_id(
    pool: &SqlitePool,
    flavorid: &str,
) -> Result<Vec<AccessGrant>> {
    let rows = sqlx::query(
        "SELECT a.id, a.flavor_id, a.project_id FROM flavor_projects a \
         JOIN flavors f ON f.id = a.flavor_id AND f.deleted = 0 \
         WHERE a.deleted = 0 AND f.flavorid = ? \
         ORDER BY a.id",
    )
    .bind(flavorid)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| AccessGrant {
            id: row.get("id"),
            flavor_id: row.get("flavor_id"),
            project_id: row.get("project_id"),
        })
        .collect())
}

/// Grant a project access to a flavor
pub async fn flavor_access_add(
    pool: &SqlitePool,
    flavorid: &str,
    project_id: &str,
) -> Result<AccessGrant> {
    let flavor_id = flavor_id_by_flavorid(pool, flavorid).await?;
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO flavor_projects (flavor_id, project_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(flavor_id)
    .bind(project_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    let result = match result {
        Ok(result) => result,
        Err(err) if unique_violation(&err).is_some() => {
            return Err(Error::AccessExists {
                flavor_id: flavorid.to_string(),
                project_id: project_id.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    info!("Granted project '{}' access to flavor {}", project_id, flavorid);

    Ok(AccessGrant {
        id: result.last_insert_rowid(),
        flavor_id,
        project_id: project_id.to_string(),
    })
}

/// Revoke a project's access to a flavor
pub async fn flavor_access_remove(
    pool: &SqlitePool,
    flavorid: &str,
    project_id: &str,
) -> Result<()> {
    let flavor_id = flavor_id_by_flavorid(pool, flavorid).await?;
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE flavor_projects SET deleted = id, deleted_at = ?, updated_at = ? \
         WHERE deleted = 0 AND flavor_id = ? AND project_id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(flavor_id)
    .bind(project_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AccessNotFound {
            flavor_id: flavorid.to_string(),
            project_id: project_id.to_string(),
        });
    }

    info!("Revoked project '{}' access to flavor {}", project_id, flavorid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::flavors::flavor_create;
    use crate::db::models::FlavorCreate;
    use crate::db::testing::memory_pool;
    use std::collections::HashMap;

    async fn create_flavor(pool: &SqlitePool, name: &str, flavorid: &str) {
        let values = FlavorCreate {
            name: name.to_string(),
            flavorid: flavorid.to_string(),
            memory_mb: 512,
            vcpus: 1,
            root_gb: 10,
            ..FlavorCreate::default()
        };
        flavor_create(pool, &values, &HashMap::new(), &[]).await.expect("create flavor");
    }

    fn project_ids(grants: &[AccessGrant]) -> Vec<&str> {
        grants.iter().map(|g| g.project_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_access_add_and_get() {
        let pool = memory_pool().await;
        create_flavor(&pool, "n1", "f1").await;
        create_flavor(&pool, "n2", "f2").await;

        flavor_access_add(&pool, "f1", "pr1").await.unwrap();
        flavor_access_add(&pool, "f1", "pr2").await.unwrap();
        flavor_access_add(&pool, "f2", "pr1").await.unwrap();

        let grants = flavor_access_get_by_flavor_id(&pool, "f1").await.unwrap();
        assert_eq!(project_ids(&grants), ["pr1", "pr2"]);
        let grants = flavor_access_get_by_flavor_id(&pool, "f2").await.unwrap();
        assert_eq!(project_ids(&grants), ["pr1"]);
    }

    #[tokio::test]
    async fn test_access_add_to_missing_flavor() {
        let pool = memory_pool().await;
        let err = flavor_access_add(&pool, "nonexists", "pr1").await.unwrap_err();
        assert!(matches!(err, Error::FlavorNotFound { .. }));
    }

    #[tokio::test]
    async fn test_access_add_duplicate() {
        let pool = memory_pool().await;
        create_flavor(&pool, "n1", "f1").await;

        flavor_access_add(&pool, "f1", "pr1").await.unwrap();
        let err = flavor_access_add(&pool, "f1", "pr1").await.unwrap_err();
        assert!(matches!(err, Error::AccessExists { .. }));
    }

    #[tokio::test]
    async fn test_access_remove() {
        let pool = memory_pool().await;
        create_flavor(&pool, "n1", "f1").await;
        flavor_access_add(&pool, "f1", "pr1").await.unwrap();
        flavor_access_add(&pool, "f1", "pr2").await.unwrap();

        flavor_access_remove(&pool, "f1", "pr2").await.unwrap();
        let grants = flavor_access_get_by_flavor_id(&pool, "f1").await.unwrap();
        assert_eq!(project_ids(&grants), ["pr1"]);

        // Re-granting a revoked pair is allowed
        flavor_access_add(&pool, "f1", "pr2").await.unwrap();
    }

    #[tokio::test]
    async fn test_access_remove_not_found() {
        let pool = memory_pool().await;
        create_flavor(&pool, "n1", "f1").await;
        flavor_access_add(&pool, "f1", "pr1").await.unwrap();

        let err = flavor_access_remove(&pool, "f1", "pr2").await.unwrap_err();
        assert!(matches!(err, Error::AccessNotFound { .. }));
        let err = flavor_access_remove(&pool, "nonexists", "pr1").await.unwrap_err();
        assert!(matches!(err, Error::FlavorNotFound { .. }));
    }
}
