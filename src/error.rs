//! Internal error taxonomy.
//!
//! [`Error`] is what Rust code returns via `?` throughout this crate. It is
//! distinct from the wire-facing [`crate::envelope::ErrorCode`]: the
//! boundary between the two is [`crate::envelope::map_exception`].

use std::time::Duration;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal fault taxonomy.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A tool name was not present in the registry.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed schema validation.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A registered handler returned an error while executing.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    /// A dependency probe or tool call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Graph-store driver error, covering both query failures and an
    /// unreachable or refused connection.
    #[error("graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Unclassified internal fault. Always a bug or an environment defect.
    #[error("internal error: {0}")]
    Internal(String),
}
