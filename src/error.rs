//! Common error types for the flavor store

use thiserror::Error;

/// Common result type for flavor store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the flavor data-access layer
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No visible flavor with this internal id or business key
    #[error("Flavor {flavor_id} could not be found")]
    FlavorNotFound { flavor_id: String },

    /// No visible flavor with this name
    #[error("Flavor with name {name} could not be found")]
    FlavorNotFoundByName { name: String },

    /// A live flavor with this business key already exists
    #[error("Flavor with ID {flavor_id} already exists")]
    FlavorIdExists { flavor_id: String },

    /// A live flavor with this name already exists
    #[error("Flavor with name {name} already exists")]
    FlavorExists { name: String },

    /// The (flavor, project) access pair is already granted
    #[error("Flavor access already exists for flavor {flavor_id} and project {project_id}")]
    AccessExists {
        flavor_id: String,
        project_id: String,
    },

    /// No live access grant for the (flavor, project) pair
    #[error("Flavor access not found for flavor {flavor_id} and project {project_id}")]
    AccessNotFound {
        flavor_id: String,
        project_id: String,
    },

    /// No live extra spec with this key on the flavor
    #[error("Extra spec {key} not found for flavor {flavor_id}")]
    ExtraSpecNotFound { flavor_id: String, key: String },

    /// Extra spec upsert lost the race on every attempt
    #[error("Updating extra specs for flavor {flavor_id} failed after {attempts} attempts")]
    ExtraSpecUpdateFailed { flavor_id: String, attempts: u32 },

    /// Pagination marker absent from both stores
    #[error("Marker {marker} could not be found")]
    MarkerNotFound { marker: String },

    /// Sort key is not a flavor column
    #[error("Invalid sort key: {key}")]
    InvalidSortKey { key: String },

    /// Invalid state transition on a loaded flavor
    #[error("Action '{action}' cannot be performed: {reason}")]
    ActionError {
        action: &'static str,
        reason: String,
    },
}
