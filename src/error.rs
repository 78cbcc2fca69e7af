//! Error types for the Xiphos library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`XiphosError`] enum. Shard-level failures that the coordinator can route
//! around (an unreachable or slow shard) are distinguished from errors that
//! must reach the caller via [`XiphosError::is_shard_unavailability`].
//!
//! # Examples
//!
//! ```
//! use xiphos::error::{Result, XiphosError};
//!
//! fn check_k(k: usize) -> Result<()> {
//!     if k == 0 {
//!         return Err(XiphosError::invalid_argument("k must be at least 1"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_k(0).is_err());
//! assert!(check_k(3).is_ok());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Xiphos operations.
#[derive(Error, Debug)]
pub enum XiphosError {
    /// Vector shape does not match the configured space.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid argument (k = 0, negative radius, non-finite coordinates, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An identifier is already stored with different coordinates.
    #[error("Duplicate vector id: {0}")]
    DuplicateId(String),

    /// No shard could be consulted for a coordinated operation.
    #[error("No shards available")]
    NoShardsAvailable,

    /// A shard could not be reached.
    #[error("Shard '{node_id}' unavailable: {reason}")]
    ShardUnavailable { node_id: String, reason: String },

    /// An operation did not complete in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Index-internal invariant violation. Never recoverable.
    #[error("Index error: {0}")]
    Index(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The node is not a ring member.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// I/O errors (config files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Error wrapped with context by the command line front end
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with XiphosError.
pub type Result<T> = std::result::Result<T, XiphosError>;

impl XiphosError {
    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        XiphosError::DimensionMismatch { expected, actual }
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        XiphosError::InvalidArgument(msg.into())
    }

    /// Create a new index (invariant violation) error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        XiphosError::Index(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        XiphosError::Config(msg.into())
    }

    /// Create a new shard unavailable error.
    pub fn shard_unavailable<N: Into<String>, R: Into<String>>(node_id: N, reason: R) -> Self {
        XiphosError::ShardUnavailable {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        XiphosError::Timeout(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        XiphosError::Other(msg.into())
    }

    /// Whether a shard answering with this error can be excluded from a
    /// coordinated query instead of failing the whole query.
    pub fn is_shard_unavailability(&self) -> bool {
        matches!(
            self,
            XiphosError::ShardUnavailable { .. } | XiphosError::Timeout(_) | XiphosError::Io(_)
        )
    }
}
