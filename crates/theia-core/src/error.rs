//! Error types for theia-rs.

use thiserror::Error;

/// The main error type for theia-rs operations.
#[derive(Error, Debug)]
pub enum TheiaError {
    /// The volume decoder could not produce a grid.
    #[error("failed to decode volume '{source_name}': {reason}")]
    Decode { source_name: String, reason: String },

    /// Grid sample count does not match its dimensions.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Grid geometry is unusable (too small, bad spacing).
    #[error("invalid volume grid: {0}")]
    InvalidGrid(String),

    /// A configuration value was rejected at a mutator or loader boundary.
    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// An object with the given name is already attached.
    #[error("object '{0}' already exists")]
    ObjectExists(String),

    /// No object with the given name is attached.
    #[error("object '{0}' not found")]
    ObjectNotFound(String),

    /// The object has no label with the given id.
    #[error("label {label} not found on object '{object}'")]
    LabelNotFound { object: String, label: u32 },

    /// The label has no data in the volume and cannot be edited.
    #[error("label {label} on object '{object}' has no data in the volume")]
    LabelAbsent { object: String, label: u32 },

    /// A mesh handed to a pipeline stage violates its invariants.
    #[error("malformed mesh: {0}")]
    MalformedMesh(String),

    /// A geometry rebuild failed; the label kept its previous surface.
    #[error("rebuild of label {label} failed: {source}")]
    RebuildFailed {
        label: u32,
        #[source]
        source: Box<TheiaError>,
    },

    /// A long-running operation was abandoned before it finished.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TheiaError {
    /// Shorthand for an [`TheiaError::InvalidConfig`] error.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for theia-rs operations.
pub type Result<T> = std::result::Result<T, TheiaError>;
