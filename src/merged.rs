//! Dual-source flavor store
//!
//! Flavor data is being migrated from the per-cell database to the
//! shared API database. Until the migration completes, both stores may
//! hold records, and the same business key may appear in both. This
//! module presents the two stores as one: list reads union both
//! sources (the API store wins conflicts), and business-key reads that
//! miss the API store are served from the cell store and copied
//! forward.

use crate::config::StoreConfig;
use crate::context::RequestContext;
use crate::db::access::flavor_access_get_by_flavor_id;
use crate::db::extra_specs::DEFAULT_EXTRA_SPEC_RETRIES;
use crate::db::flavors::{
    flavor_create, flavor_destroy, flavor_get, flavor_get_all, flavor_get_by_flavor_id,
    flavor_get_by_name,
};
use crate::db::init::init_database;
use crate::db::models::{
    compare_flavors, sort_column, Flavor, FlavorCreate, FlavorFilters, ReadDeleted, SortDir,
};
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Which store produced a merged record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSource {
    Api,
    Cell,
}

/// A flavor tagged with its producing store
#[derive(Debug, Clone)]
pub struct SourcedFlavor {
    pub flavor: Flavor,
    pub source: StoreSource,
}

/// Merged view over the API store and the cell store
#[derive(Debug, Clone)]
pub struct MergedFlavorStore {
    api: SqlitePool,
    cell: SqlitePool,
    pub(crate) extra_spec_retries: u32,
}

impl MergedFlavorStore {
    pub fn new(api: SqlitePool, cell: SqlitePool) -> Self {
        Self {
            api,
            cell,
            extra_spec_retries: DEFAULT_EXTRA_SPEC_RETRIES,
        }
    }

    /// Open (and create if needed) both stores from configuration
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let api = init_database(&config.api_database).await?;
        let cell = init_database(&config.cell_database).await?;
        Ok(Self {
            api,
            cell,
            extra_spec_retries: config.extra_spec_retries,
        })
    }

    /// The API store pool; the write side of every facade operation
    pub fn api_pool(&self) -> &SqlitePool {
        &self.api
    }

    /// The cell store pool (read-mostly, superseded after migration)
    pub fn cell_pool(&self) -> &SqlitePool {
        &self.cell
    }

    /// List visible flavors across both stores.
    ///
    /// The API store is queried with native filters (and a native limit
    /// when no marker is involved); the cell store is fetched in full
    /// for the same filters. The union keeps the API record whenever
    /// both stores hold a business key, then the merged list is sorted,
    /// sliced after the marker, and truncated to the limit.
    pub async fn get_all(
        &self,
        ctx: &RequestContext,
        filters: &FlavorFilters,
        sort_key: &str,
        sort_dir: SortDir,
        limit: Option<i64>,
        marker: Option<&str>,
    ) -> Result<Vec<SourcedFlavor>> {
        let sort_col = sort_column(sort_key)?;

        // A merged-level marker slice must see the full API result
        let native_limit = if marker.is_none() { limit } else { None };
        let api_flavors = flavor_get_all(
            &self.api, ctx, filters, sort_key, sort_dir, native_limit, None,
        )
        .await?;
        let cell_flavors =
            flavor_get_all(&self.cell, ctx, filters, sort_key, sort_dir, None, None).await?;

        let mut merged: Vec<SourcedFlavor> = api_flavors
            .into_iter()
            .map(|flavor| SourcedFlavor {
                flavor,
                source: StoreSource::Api,
            })
            .collect();
        for flavor in cell_flavors {
            if merged.iter().any(|s| s.flavor.flavorid == flavor.flavorid) {
                continue;
            }
            merged.push(SourcedFlavor {
                flavor,
                source: StoreSource::Cell,
            });
        }

        merged.sort_by(|a, b| {
            let ord = compare_flavors(&a.flavor, &b.flavor, sort_col);
            match sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        if let Some(marker) = marker {
            let position = merged
                .iter()
                .position(|s| s.flavor.flavorid == marker)
                .ok_or_else(|| Error::MarkerNotFound {
                    marker: marker.to_string(),
                })?;
            merged.drain(..=position);
        }

        if let Some(limit) = limit {
            merged.truncate(limit.max(0) as usize);
        }

        Ok(merged)
    }

    /// Read by internal id, falling back to the cell store
    pub async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> Result<SourcedFlavor> {
        match flavor_get(&self.api, ctx, id).await {
            Ok(flavor) => Ok(SourcedFlavor {
                flavor,
                source: StoreSource::Api,
            }),
            Err(Error::FlavorNotFound { .. }) => {
                let flavor = flavor_get(&self.cell, ctx, id).await?;
                debug!("Flavor id {} served from the cell store", id);
                Ok(SourcedFlavor {
                    flavor,
                    source: StoreSource::Cell,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Read by name, falling back to the cell store
    pub async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<SourcedFlavor> {
        match flavor_get_by_name(&self.api, ctx, name).await {
            Ok(flavor) => Ok(SourcedFlavor {
                flavor,
                source: StoreSource::Api,
            }),
            Err(Error::FlavorNotFoundByName { .. }) => {
                let flavor = flavor_get_by_name(&self.cell, ctx, name).await?;
                debug!("Flavor '{}' served from the cell store", name);
                Ok(SourcedFlavor {
                    flavor,
                    source: StoreSource::Cell,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Read by business key, migrating a cell-store hit into the API
    /// store as a side effect.
    pub async fn get_by_flavor_id(
        &self,
        ctx: &RequestContext,
        flavorid: &str,
        read_deleted: ReadDeleted,
    ) -> Result<SourcedFlavor> {
        match flavor_get_by_flavor_id(&self.api, ctx, flavorid, read_deleted).await {
            Ok(flavor) => Ok(SourcedFlavor {
                flavor,
                source: StoreSource::Api,
            }),
            Err(Error::FlavorNotFound { .. }) => {
                let legacy = flavor_get_by_flavor_id(&self.cell, ctx, flavorid, read_deleted).await?;
                let flavor = if legacy.deleted == 0 {
                    self.migrate_flavor(ctx, &legacy).await?
                } else {
                    // A soft-deleted generation is only readable, never copied
                    legacy
                };
                Ok(SourcedFlavor {
                    flavor,
                    source: StoreSource::Cell,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Copy a cell-store record (field values, extra specs, and access
    /// grants, but not the store-local id) into the API store.
    ///
    /// Two concurrent cache-miss reads can both attempt the copy; the
    /// loser sees a duplicate-key failure and resolves it by re-reading
    /// the API store, so the copy is idempotent for callers.
    async fn migrate_flavor(&self, ctx: &RequestContext, legacy: &Flavor) -> Result<Flavor> {
        let projects: Vec<String> = flavor_access_get_by_flavor_id(&self.cell, &legacy.flavorid)
            .await?
            .into_iter()
            .map(|grant| grant.project_id)
            .collect();
        let values = FlavorCreate::from_flavor(legacy);

        match flavor_create(&self.api, &values, &legacy.extra_specs, &projects).await {
            Ok(flavor) => {
                info!(
                    "Migrated flavor '{}' ({}) from the cell store to the API store",
                    legacy.name, legacy.flavorid
                );
                Ok(flavor)
            }
            Err(Error::FlavorIdExists { .. }) | Err(Error::FlavorExists { .. }) => {
                debug!(
                    "Flavor {} was migrated by a concurrent reader",
                    legacy.flavorid
                );
                flavor_get_by_flavor_id(&self.api, ctx, &legacy.flavorid, ReadDeleted::No).await
            }
            Err(err) => Err(err),
        }
    }

    /// Create a flavor in the API store.
    ///
    /// The cell store is pre-checked so a record still living only
    /// there is not shadowed; the API store's unique constraints remain
    /// the authoritative guard for API-side races.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        values: &FlavorCreate,
        extra_specs: &HashMap<String, String>,
        projects: &[String],
    ) -> Result<Flavor> {
        match flavor_get_by_flavor_id(&self.cell, ctx, &values.flavorid, ReadDeleted::No).await {
            Ok(_) => {
                return Err(Error::FlavorIdExists {
                    flavor_id: values.flavorid.clone(),
                })
            }
            Err(Error::FlavorNotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        match flavor_get_by_name(&self.cell, ctx, &values.name).await {
            Ok(_) => {
                return Err(Error::FlavorExists {
                    name: values.name.clone(),
                })
            }
            Err(Error::FlavorNotFoundByName { .. }) => {}
            Err(err) => return Err(err),
        }

        flavor_create(&self.api, values, extra_specs, projects).await
    }

    /// Destroy by name across both stores.
    ///
    /// Succeeds when either store held a live row. After a successful
    /// API-store delete, the cell-store cleanup is best-effort: an
    /// already-gone legacy record is not an error.
    pub async fn destroy(&self, name: &str) -> Result<()> {
        match flavor_destroy(&self.api, name).await {
            Ok(()) => match flavor_destroy(&self.cell, name).await {
                Ok(()) => Ok(()),
                Err(Error::FlavorNotFoundByName { .. }) => {
                    debug!("No cell-store copy of flavor '{}' to clean up", name);
                    Ok(())
                }
                Err(err) => {
                    warn!("Cell-store cleanup for flavor '{}' failed: {}", name, err);
                    Err(err)
                }
            },
            Err(Error::FlavorNotFoundByName { .. }) => flavor_destroy(&self.cell, name).await,
            Err(err) => Err(err),
        }
    }
}
