//! Loaded-flavor handle
//!
//! A `FlavorHandle` is a flavor loaded through the merged store plus
//! snapshots of its mutable collections. Saving diffs the collections
//! against the snapshots and delegates the changes; scalar fields are
//! read-only once loaded.

use crate::context::RequestContext;
use crate::db::access::{
    flavor_access_add, flavor_access_get_by_flavor_id, flavor_access_remove,
};
use crate::db::extra_specs::{extra_specs_delete, extra_specs_update_or_create};
use crate::db::flavors::flavor_id_by_flavorid;
use crate::db::models::{Flavor, FlavorCreate, ReadDeleted};
use crate::merged::{MergedFlavorStore, SourcedFlavor, StoreSource};
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct FlavorHandle {
    store: MergedFlavorStore,
    ctx: RequestContext,
    /// The loaded record; `record.extra_specs` is the editable spec map
    pub record: Flavor,
    pub source: StoreSource,
    /// Projects granted access; editable, persisted by `save`
    pub projects: Vec<String>,
    orig: Flavor,
    orig_projects: Vec<String>,
}

/// Grants live in the API store once the record does; a record still
/// only in the cell store reads its grants from there.
async fn grant_pool<'a>(store: &'a MergedFlavorStore, flavorid: &str) -> Result<&'a SqlitePool> {
    match flavor_id_by_flavorid(store.api_pool(), flavorid).await {
        Ok(_) => Ok(store.api_pool()),
        Err(Error::FlavorNotFound { .. }) => Ok(store.cell_pool()),
        Err(err) => Err(err),
    }
}

impl FlavorHandle {
    async fn from_sourced(
        store: &MergedFlavorStore,
        ctx: &RequestContext,
        sourced: SourcedFlavor,
    ) -> Result<Self> {
        let pool = grant_pool(store, &sourced.flavor.flavorid).await?;
        let projects: Vec<String> = flavor_access_get_by_flavor_id(pool, &sourced.flavor.flavorid)
            .await?
            .into_iter()
            .map(|grant| grant.project_id)
            .collect();
        Ok(Self {
            store: store.clone(),
            ctx: ctx.clone(),
            orig: sourced.flavor.clone(),
            record: sourced.flavor,
            source: sourced.source,
            orig_projects: projects.clone(),
            projects,
        })
    }

    /// Create a flavor and return a handle to it
    pub async fn create(
        store: &MergedFlavorStore,
        ctx: &RequestContext,
        values: &FlavorCreate,
        extra_specs: &HashMap<String, String>,
        projects: &[String],
    ) -> Result<Self> {
        let flavor = store.create(ctx, values, extra_specs, projects).await?;
        Self::from_sourced(
            store,
            ctx,
            SourcedFlavor {
                flavor,
                source: StoreSource::Api,
            },
        )
        .await
    }

    pub async fn get_by_id(store: &MergedFlavorStore, ctx: &RequestContext, id: i64) -> Result<Self> {
        let sourced = store.get_by_id(ctx, id).await?;
        Self::from_sourced(store, ctx, sourced).await
    }

    pub async fn get_by_name(
        store: &MergedFlavorStore,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Self> {
        let sourced = store.get_by_name(ctx, name).await?;
        Self::from_sourced(store, ctx, sourced).await
    }

    pub async fn get_by_flavor_id(
        store: &MergedFlavorStore,
        ctx: &RequestContext,
        flavorid: &str,
        read_deleted: ReadDeleted,
    ) -> Result<Self> {
        let sourced = store.get_by_flavor_id(ctx, flavorid, read_deleted).await?;
        Self::from_sourced(store, ctx, sourced).await
    }

    fn scalar_fields_changed(&self) -> bool {
        let a = &self.record;
        let b = &self.orig;
        a.id != b.id
            || a.name != b.name
            || a.memory_mb != b.memory_mb
            || a.vcpus != b.vcpus
            || a.root_gb != b.root_gb
            || a.ephemeral_gb != b.ephemeral_gb
            || a.flavorid != b.flavorid
            || a.swap != b.swap
            || a.rxtx_factor != b.rxtx_factor
            || a.vcpu_weight != b.vcpu_weight
            || a.disabled != b.disabled
            || a.is_public != b.is_public
            || a.deleted != b.deleted
    }

    /// Persist local changes to extra specs and projects.
    ///
    /// Only those two collections may change; any scalar field delta
    /// is rejected. Changed or added spec keys are upserted, removed
    /// keys soft-deleted; project grants are added and revoked to match
    /// the local list. Snapshots are refreshed on success.
    pub async fn save(&mut self) -> Result<()> {
        if self.scalar_fields_changed() {
            return Err(Error::ActionError {
                action: "save",
                reason: "read-only fields were changed".to_string(),
            });
        }

        let pool = self.store.api_pool();
        let flavorid = self.record.flavorid.clone();

        let added_specs: HashMap<String, String> = self
            .record
            .extra_specs
            .iter()
            .filter(|(key, value)| self.orig.extra_specs.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removed_keys: Vec<String> = self
            .orig
            .extra_specs
            .keys()
            .filter(|key| !self.record.extra_specs.contains_key(*key))
            .cloned()
            .collect();

        if !added_specs.is_empty() {
            extra_specs_update_or_create(
                pool,
                &flavorid,
                &added_specs,
                self.store.extra_spec_retries,
            )
            .await?;
        }
        for key in &removed_keys {
            extra_specs_delete(pool, &flavorid, key).await?;
        }

        let current: HashSet<&String> = self.projects.iter().collect();
        let original: HashSet<&String> = self.orig_projects.iter().collect();
        let added_projects: Vec<String> =
            current.difference(&original).map(|p| (*p).clone()).collect();
        let removed_projects: Vec<String> =
            original.difference(&current).map(|p| (*p).clone()).collect();

        for project_id in &added_projects {
            flavor_access_add(pool, &flavorid, project_id).await?;
        }
        for project_id in &removed_projects {
            flavor_access_remove(pool, &flavorid, project_id).await?;
        }

        self.orig = self.record.clone();
        self.orig_projects = self.projects.clone();
        Ok(())
    }

    /// Grant a project access and reload the project list.
    ///
    /// Rejected while `projects` has unsaved local changes.
    pub async fn add_access(&mut self, project_id: &str) -> Result<()> {
        if self.projects != self.orig_projects {
            return Err(Error::ActionError {
                action: "add_access",
                reason: "projects modified".to_string(),
            });
        }
        flavor_access_add(self.store.api_pool(), &self.record.flavorid, project_id).await?;
        self.reload_projects().await
    }

    /// Revoke a project's access and reload the project list
    pub async fn remove_access(&mut self, project_id: &str) -> Result<()> {
        if self.projects != self.orig_projects {
            return Err(Error::ActionError {
                action: "remove_access",
                reason: "projects modified".to_string(),
            });
        }
        flavor_access_remove(self.store.api_pool(), &self.record.flavorid, project_id).await?;
        self.reload_projects().await
    }

    async fn reload_projects(&mut self) -> Result<()> {
        let pool = grant_pool(&self.store, &self.record.flavorid).await?;
        self.projects = flavor_access_get_by_flavor_id(pool, &self.record.flavorid)
            .await?
            .into_iter()
            .map(|grant| grant.project_id)
            .collect();
        self.orig_projects = self.projects.clone();
        Ok(())
    }

    /// Reload the editable spec map from the store
    pub async fn refresh(&mut self) -> Result<()> {
        let sourced = self
            .store
            .get_by_flavor_id(&self.ctx, &self.record.flavorid, ReadDeleted::No)
            .await?;
        self.record = sourced.flavor;
        self.source = sourced.source;
        self.orig = self.record.clone();
        self.reload_projects().await
    }

    /// Destroy this flavor in both stores
    pub async fn destroy(self) -> Result<()> {
        self.store.destroy(&self.record.name).await
    }
}
