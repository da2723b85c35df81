//! Flavor CRUD against a single store
//!
//! All operations take the target store's pool explicitly; the same
//! functions serve the API store and the cell store, which share one
//! logical schema.

use crate::context::RequestContext;
use crate::db::extra_specs::load_extra_specs;
use crate::db::models::{
    sort_column, Flavor, FlavorCreate, FlavorFilters, ReadDeleted, SortDir,
};
use crate::db::unique_violation;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::info;

const FLAVOR_COLUMNS: &str = "id, name, memory_mb, vcpus, root_gb, ephemeral_gb, flavorid, \
     swap, rxtx_factor, vcpu_weight, disabled, is_public, created_at, updated_at, \
     deleted_at, deleted";

fn flavor_from_row(row: &SqliteRow) -> Flavor {
    Flavor {
        id: row.get("id"),
        name: row.get("name"),
        memory_mb: row.get("memory_mb"),
        vcpus: row.get("vcpus"),
        root_gb: row.get("root_gb"),
        ephemeral_gb: row.get("ephemeral_gb"),
        flavorid: row.get("flavorid"),
        swap: row.get("swap"),
        rxtx_factor: row.get("rxtx_factor"),
        vcpu_weight: row.get("vcpu_weight"),
        disabled: row.get("disabled"),
        is_public: row.get("is_public"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        deleted: row.get("deleted"),
        extra_specs: HashMap::new(),
    }
}

/// Restrict a flavor query to rows the caller may see.
///
/// Non-admin callers see public flavors plus flavors with a live access
/// grant for their project.
fn push_visibility<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ctx: &RequestContext) {
    if ctx.is_admin {
        return;
    }
    qb.push(" AND (is_public = 1");
    if let Some(project_id) = &ctx.project_id {
        qb.push(
            " OR id IN (SELECT flavor_id FROM flavor_projects \
             WHERE deleted = 0 AND project_id = ",
        )
        .push_bind(project_id.clone())
        .push(")");
    }
    qb.push(")");
}

/// Resolve a business key to the live row's internal id
pub(crate) async fn flavor_id_by_flavorid(pool: &SqlitePool, flavorid: &str) -> Result<i64> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM flavors WHERE deleted = 0 AND flavorid = ?")
            .bind(flavorid)
            .fetch_optional(pool)
            .await?;
    id.ok_or_else(|| Error::FlavorNotFound {
        flavor_id: flavorid.to_string(),
    })
}

/// Load a visible live flavor by internal id, extra specs included
pub async fn flavor_get(pool: &SqlitePool, ctx: &RequestContext, id: i64) -> Result<Flavor> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {FLAVOR_COLUMNS} FROM flavors WHERE deleted = 0 AND id = "
    ));
    qb.push_bind(id);
    push_visibility(&mut qb, ctx);
    let row = qb.build().fetch_optional(pool).await?;
    let Some(row) = row else {
        return Err(Error::FlavorNotFound {
            flavor_id: id.to_string(),
        });
    };
    let mut flavor = flavor_from_row(&row);
    flavor.extra_specs = load_extra_specs(pool, flavor.id).await?;
    Ok(flavor)
}

/// Load a visible live flavor by name, extra specs included
pub async fn flavor_get_by_name(
    pool: &SqlitePool,
    ctx: &RequestContext,
    name: &str,
) -> Result<Flavor> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {FLAVOR_COLUMNS} FROM flavors WHERE deleted = 0 AND name = "
    ));
    qb.push_bind(name.to_string());
    push_visibility(&mut qb, ctx);
    let row = qb.build().fetch_optional(pool).await?;
    let Some(row) = row else {
        return Err(Error::FlavorNotFoundByName {
            name: name.to_string(),
        });
    };
    let mut flavor = flavor_from_row(&row);
    flavor.extra_specs = load_extra_specs(pool, flavor.id).await?;
    Ok(flavor)
}

/// Load a visible flavor by business key, extra specs included.
///
/// A destroyed key may have several generations; `(deleted, id)` order
/// resolves the live row first, then the oldest deleted one.
pub async fn flavor_get_by_flavor_id(
    pool: &SqlitePool,
    ctx: &RequestContext,
    flavorid: &str,
    read_deleted: ReadDeleted,
) -> Result<Flavor> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {FLAVOR_COLUMNS} FROM flavors WHERE {} AND flavorid = ",
        read_deleted.sql_clause()
    ));
    qb.push_bind(flavorid.to_string());
    push_visibility(&mut qb, ctx);
    qb.push(" ORDER BY deleted ASC, id ASC LIMIT 1");
    let row = qb.build().fetch_optional(pool).await?;
    let Some(row) = row else {
        return Err(Error::FlavorNotFound {
            flavor_id: flavorid.to_string(),
        });
    };
    let mut flavor = flavor_from_row(&row);
    flavor.extra_specs = load_extra_specs(pool, flavor.id).await?;
    Ok(flavor)
}

/// Create a flavor with its extra specs and access grants in one transaction.
///
/// The unique constraints are the authoritative duplicate guard; a
/// violation at insert time is mapped to a domain error by offending
/// column.
pub async fn flavor_create(
    pool: &SqlitePool,
    values: &FlavorCreate,
    extra_specs: &HashMap<String, String>,
    projects: &[String],
) -> Result<Flavor> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO flavors (
            name, memory_mb, vcpus, root_gb, ephemeral_gb, flavorid,
            swap, rxtx_factor, vcpu_weight, disabled, is_public,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&values.name)
    .bind(values.memory_mb)
    .bind(values.vcpus)
    .bind(values.root_gb)
    .bind(values.ephemeral_gb)
    .bind(&values.flavorid)
    .bind(values.swap)
    .bind(values.rxtx_factor)
    .bind(values.vcpu_weight)
    .bind(values.disabled)
    .bind(values.is_public)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            return Err(match unique_violation(&err) {
                Some(columns) if columns.contains("flavors.flavorid") => Error::FlavorIdExists {
                    flavor_id: values.flavorid.clone(),
                },
                Some(columns) if columns.contains("flavors.name") => Error::FlavorExists {
                    name: values.name.clone(),
                },
                _ => Error::Database(err),
            });
        }
    };
    let id = result.last_insert_rowid();

    for (key, value) in extra_specs {
        sqlx::query(
            "INSERT INTO flavor_extra_specs (flavor_id, key, value, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let mut seen = HashSet::new();
    for project_id in projects {
        if !seen.insert(project_id.as_str()) {
            continue;
        }
        sqlx::query(
            "INSERT INTO flavor_projects (flavor_id, project_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(project_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("Created flavor '{}' ({})", values.name, values.flavorid);

    Ok(Flavor {
        id,
        name: values.name.clone(),
        memory_mb: values.memory_mb,
        vcpus: values.vcpus,
        root_gb: values.root_gb,
        ephemeral_gb: values.ephemeral_gb,
        flavorid: values.flavorid.clone(),
        swap: values.swap,
        rxtx_factor: values.rxtx_factor,
        vcpu_weight: values.vcpu_weight,
        disabled: values.disabled,
        is_public: values.is_public,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        deleted: 0,
        extra_specs: extra_specs.clone(),
    })
}

/// List visible live flavors with filters, sorting, and keyset pagination.
///
/// Filters are conjunctive. Pagination is by `(sort_key, id)` from the
/// marker row; `MarkerNotFound` when the marker key has no live row in
/// this store.
pub async fn flavor_get_all(
    pool: &SqlitePool,
    ctx: &RequestContext,
    filters: &FlavorFilters,
    sort_key: &str,
    sort_dir: SortDir,
    limit: Option<i64>,
    marker: Option<&str>,
) -> Result<Vec<Flavor>> {
    let sort_col = sort_column(sort_key)?;

    let marker_id = match marker {
        Some(marker) => Some(marker_row_id(pool, ctx, marker).await?),
        None => None,
    };

    let mut qb = QueryBuilder::new(format!(
        "SELECT {FLAVOR_COLUMNS} FROM flavors WHERE deleted = 0"
    ));
    push_visibility(&mut qb, ctx);

    if let Some(min_memory_mb) = filters.min_memory_mb {
        qb.push(" AND memory_mb >= ").push_bind(min_memory_mb);
    }
    if let Some(min_root_gb) = filters.min_root_gb {
        qb.push(" AND root_gb >= ").push_bind(min_root_gb);
    }
    if let Some(disabled) = filters.disabled {
        qb.push(" AND disabled = ").push_bind(disabled);
    }
    if let Some(is_public) = filters.is_public {
        match &ctx.project_id {
            Some(project_id) if is_public => {
                qb.push(
                    " AND (is_public = 1 OR id IN (SELECT flavor_id FROM flavor_projects \
                     WHERE deleted = 0 AND project_id = ",
                )
                .push_bind(project_id.clone())
                .push("))");
            }
            _ => {
                qb.push(" AND is_public = ").push_bind(is_public);
            }
        }
    }

    if let Some(marker_id) = marker_id {
        let op = match sort_dir {
            SortDir::Asc => ">",
            SortDir::Desc => "<",
        };
        qb.push(format!(
            " AND ({sort_col}, id) {op} (SELECT {sort_col}, id FROM flavors WHERE id = "
        ))
        .push_bind(marker_id)
        .push(")");
    }

    let dir = sort_dir.as_sql();
    qb.push(format!(" ORDER BY {sort_col} {dir}, id {dir}"));
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let rows = qb.build().fetch_all(pool).await?;
    let mut flavors: Vec<Flavor> = rows.iter().map(flavor_from_row).collect();
    for flavor in &mut flavors {
        flavor.extra_specs = load_extra_specs(pool, flavor.id).await?;
    }
    Ok(flavors)
}

async fn marker_row_id(pool: &SqlitePool, ctx: &RequestContext, marker: &str) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT id FROM flavors WHERE deleted = 0 AND flavorid = ");
    qb.push_bind(marker.to_string());
    push_visibility(&mut qb, ctx);
    qb.push(" ORDER BY id LIMIT 1");
    let row = qb.build().fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(row.get(0)),
        None => Err(Error::MarkerNotFound {
            marker: marker.to_string(),
        }),
    }
}

/// Soft-delete a live flavor by name, cascading to its extra specs and
/// access grants in the same transaction.
pub async fn flavor_destroy(pool: &SqlitePool, name: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM flavors WHERE deleted = 0 AND name = ?")
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(id) = id else {
        return Err(Error::FlavorNotFoundByName {
            name: name.to_string(),
        });
    };

    sqlx::query("UPDATE flavors SET deleted = id, deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE flavor_extra_specs SET deleted = id, deleted_at = ?, updated_at = ? \
         WHERE flavor_id = ? AND deleted = 0",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE flavor_projects SET deleted = id, deleted_at = ?, updated_at = ? \
         WHERE flavor_id = ? AND deleted = 0",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("Destroyed flavor '{}' (id {})", name, id);
    Ok(())
}
