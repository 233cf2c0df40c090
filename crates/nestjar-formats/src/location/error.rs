//! Error types for location parsing and composition

use thiserror::Error;

/// Location operation result type
pub type LocationResult<T> = Result<T, LocationError>;

/// Malformed or invalid nested locations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Text does not start with the `nested:` scheme
    #[error("Not a nested location: {0}")]
    MissingScheme(String),

    /// A delimiter appears before any root segment
    #[error("Location has no root segment: {0}")]
    MissingRoot(String),

    /// An interior segment is empty
    #[error("Empty segment at position {position} in {text}")]
    EmptySegment {
        /// Zero-based segment index
        position: usize,
        /// Offending text
        text: String,
    },

    /// A single hop carries a fully-qualified nested address
    #[error("Segment is itself a nested address: {0}")]
    SelfNesting(String),

    /// A segment contains the reserved delimiter
    #[error("Segment contains reserved delimiter: {0}")]
    ReservedDelimiter(String),

    /// The root locator could not be interpreted
    #[error("Invalid root locator: {0}")]
    InvalidRoot(String),
}
