//! # Cirrus flavor store
//!
//! Data-access layer for flavor (instance type) records:
//! - CRUD against the shared API database
//! - project-scoped access control and extra-spec metadata
//! - a dual-source merge over the API database and the legacy per-cell
//!   database while flavor data is migrated between them

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod facade;
pub mod merged;

pub use config::StoreConfig;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use facade::FlavorHandle;
pub use merged::{MergedFlavorStore, SourcedFlavor, StoreSource};
