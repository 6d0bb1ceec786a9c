//! Error types for the collection-and-analysis engine

use thiserror::Error;

/// Sample source failures
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source (or its usage backend) could not be reached
    #[error("Sample source unavailable: {0}")]
    Unavailable(String),

    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Payload could not be interpreted
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// History store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Per-entity failures raised while reconciling or analyzing
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No usage snapshots inside the evaluation window
    #[error("No usage data in the analysis window")]
    NoData,
}

impl EngineError {
    /// Short label used in entity failure logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Store(_) => "store_error",
            EngineError::NoData => "no_data",
        }
    }
}
