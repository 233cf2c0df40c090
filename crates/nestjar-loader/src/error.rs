//! Error types for loader operations

use nestjar_cache::CacheError;
use nestjar_formats::Location;
use thiserror::Error;

/// Errors that can occur while resolving classes and resources
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The primary root could not be opened
    #[error("Failed to open primary root {location}: {source}")]
    PrimaryRoot {
        /// Primary root location
        location: Location,
        /// Underlying failure
        #[source]
        source: CacheError,
    },

    /// No root provides the class
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Malformed binary class name
    #[error("Invalid class name: {0:?}")]
    InvalidClassName(String),

    /// Invalid loader configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A blocking task failed to complete
    #[error("Task failed: {0}")]
    Task(String),

    /// Cache failure after a resource was confirmed present
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl LoaderError {
    /// Whether this reports a missing class
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ClassNotFound(_) => true,
            Self::Cache(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;
