//! Flavor record types and list-query value types

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Flavor record (instance type)
///
/// `id` is store-local; `flavorid` is the business key, stable across
/// the API and cell stores. `deleted` holds 0 for live rows and the
/// row's own id once soft-deleted, so the `UNIQUE(flavorid, deleted)`
/// and `UNIQUE(name, deleted)` constraints only bind live rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Flavor {
    pub id: i64,
    pub name: String,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub root_gb: i64,
    pub ephemeral_gb: i64,
    pub flavorid: String,
    pub swap: i64,
    pub rxtx_factor: f64,
    pub vcpu_weight: Option<i64>,
    pub disabled: bool,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted: i64,
    pub extra_specs: HashMap<String, String>,
}

/// Field values for creating a flavor
#[derive(Debug, Clone)]
pub struct FlavorCreate {
    pub name: String,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub root_gb: i64,
    pub ephemeral_gb: i64,
    pub flavorid: String,
    pub swap: i64,
    pub rxtx_factor: f64,
    pub vcpu_weight: Option<i64>,
    pub disabled: bool,
    pub is_public: bool,
}

impl Default for FlavorCreate {
    fn default() -> Self {
        Self {
            name: String::new(),
            memory_mb: 0,
            vcpus: 1,
            root_gb: 0,
            ephemeral_gb: 0,
            flavorid: String::new(),
            swap: 0,
            rxtx_factor: 1.0,
            vcpu_weight: None,
            disabled: false,
            is_public: true,
        }
    }
}

impl FlavorCreate {
    /// Field values of an existing record, for copying it into another store
    pub fn from_flavor(flavor: &Flavor) -> Self {
        Self {
            name: flavor.name.clone(),
            memory_mb: flavor.memory_mb,
            vcpus: flavor.vcpus,
            root_gb: flavor.root_gb,
            ephemeral_gb: flavor.ephemeral_gb,
            flavorid: flavor.flavorid.clone(),
            swap: flavor.swap,
            rxtx_factor: flavor.rxtx_factor,
            vcpu_weight: flavor.vcpu_weight,
            disabled: flavor.disabled,
            is_public: flavor.is_public,
        }
    }
}

/// Project access grant for a non-public flavor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub id: i64,
    pub flavor_id: i64,
    pub project_id: String,
}

/// List filters; all present filters are conjunctive
#[derive(Debug, Clone, Default)]
pub struct FlavorFilters {
    pub min_memory_mb: Option<i64>,
    pub min_root_gb: Option<i64>,
    pub disabled: Option<bool>,
    pub is_public: Option<bool>,
}

/// Soft-delete visibility for business-key lookups.
///
/// `No` sees live rows only, `Yes` sees soft-deleted rows only, `All`
/// sees every generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadDeleted {
    No,
    Yes,
    #[default]
    All,
}

impl ReadDeleted {
    pub(crate) fn sql_clause(self) -> &'static str {
        match self {
            ReadDeleted::No => "deleted = 0",
            ReadDeleted::Yes => "deleted != 0",
            ReadDeleted::All => "1 = 1",
        }
    }
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Validate a sort key against the flavor columns, returning the
/// canonical column name usable in SQL.
pub fn sort_column(key: &str) -> Result<&'static str> {
    Ok(match key {
        "id" => "id",
        "name" => "name",
        "memory_mb" => "memory_mb",
        "vcpus" => "vcpus",
        "root_gb" => "root_gb",
        "ephemeral_gb" => "ephemeral_gb",
        "flavorid" => "flavorid",
        "swap" => "swap",
        "rxtx_factor" => "rxtx_factor",
        "vcpu_weight" => "vcpu_weight",
        "disabled" => "disabled",
        "is_public" => "is_public",
        "created_at" => "created_at",
        "updated_at" => "updated_at",
        "deleted_at" => "deleted_at",
        "deleted" => "deleted",
        _ => {
            return Err(Error::InvalidSortKey {
                key: key.to_string(),
            })
        }
    })
}

/// Compare two flavors on an already-validated sort column.
///
/// `Option` fields order `None` first, matching SQLite's NULLs-first
/// ascending order, so merged-list sorting agrees with native ORDER BY.
pub(crate) fn compare_flavors(a: &Flavor, b: &Flavor, column: &str) -> Ordering {
    match column {
        "id" => a.id.cmp(&b.id),
        "name" => a.name.cmp(&b.name),
        "memory_mb" => a.memory_mb.cmp(&b.memory_mb),
        "vcpus" => a.vcpus.cmp(&b.vcpus),
        "root_gb" => a.root_gb.cmp(&b.root_gb),
        "ephemeral_gb" => a.ephemeral_gb.cmp(&b.ephemeral_gb),
        "flavorid" => a.flavorid.cmp(&b.flavorid),
        "swap" => a.swap.cmp(&b.swap),
        "rxtx_factor" => a.rxtx_factor.total_cmp(&b.rxtx_factor),
        "vcpu_weight" => a.vcpu_weight.cmp(&b.vcpu_weight),
        "disabled" => a.disabled.cmp(&b.disabled),
        "is_public" => a.is_public.cmp(&b.is_public),
        "created_at" => a.created_at.cmp(&b.created_at),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        "deleted_at" => a.deleted_at.cmp(&b.deleted_at),
        "deleted" => a.deleted.cmp(&b.deleted),
        _ => Ordering::Equal,
    }
}
