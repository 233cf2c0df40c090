//! Error types for archive store operations

use nestjar_formats::{Location, LocationError, ZipError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while opening, parsing or reading nested archives
#[derive(Debug, Error)]
pub enum CacheError {
    /// Malformed or invalid location
    #[error("Invalid location: {0}")]
    Address(#[from] LocationError),

    /// Corrupt or truncated archive bytes
    ///
    /// Always carries the location of the archive whose bytes are at fault.
    #[error("Failed to parse archive {location}: {source}")]
    ArchiveParse {
        /// Offending archive
        location: Location,
        /// Structural fault
        #[source]
        source: ZipError,
    },

    /// Resource absent
    ///
    /// A normal negative outcome when probing; not an error condition for
    /// callers that only ask whether something exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No opener is registered for the root's scheme
    #[error("No opener registered for root: {0}")]
    UnsupportedRoot(String),

    /// Archives nested deeper than the configured limit
    #[error("Nesting depth {depth} exceeds limit {limit} at {location}")]
    NestingTooDeep {
        /// Archive that would exceed the limit
        location: Location,
        /// Depth it would have
        depth: usize,
        /// Configured limit
        limit: usize,
    },

    /// Permission check failed
    #[error("Permission denied: {permission}")]
    PermissionDenied {
        /// Description of the permission that was not granted
        permission: String,
    },

    /// Invalid store configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error while opening a root
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Earlier failure, replayed instead of retrying the work
    ///
    /// Failed root loads stay recorded in their cache context until the
    /// root is unloaded; corrupt entries and nested archives stay recorded
    /// on their entry.
    #[error(transparent)]
    Recorded(Arc<CacheError>),
}

impl CacheError {
    /// Whether this is the structural "absent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self.cause(), Self::NotFound(_))
    }

    /// Whether this reports corrupt archive bytes
    pub fn is_parse_error(&self) -> bool {
        matches!(self.cause(), Self::ArchiveParse { .. })
    }

    /// The original failure behind a replayed one
    pub fn cause(&self) -> &Self {
        match self {
            Self::Recorded(inner) => inner.cause(),
            other => other,
        }
    }

    /// Share this failure so it can be replayed
    pub(crate) fn into_shared(self) -> Arc<Self> {
        match self {
            Self::Recorded(inner) => inner,
            other => Arc::new(other),
        }
    }

    pub(crate) fn parse(location: &Location, source: ZipError) -> Self {
        Self::ArchiveParse {
            location: location.clone(),
            source,
        }
    }
}

/// Result type alias for archive store operations
pub type CacheResult<T> = Result<T, CacheError>;
