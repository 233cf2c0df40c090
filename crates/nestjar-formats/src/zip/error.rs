//! Error types for zip operations

use thiserror::Error;

/// Zip operation result type
pub type ZipResult<T> = Result<T, ZipError>;

/// Structural faults in zip/jar archive bytes
#[derive(Debug, Error)]
pub enum ZipError {
    /// No end-of-central-directory record in the trailing search window
    #[error("End of central directory record not found")]
    MissingEndOfDirectory,

    /// Archive spans multiple disks
    #[error("Multi-disk archives are not supported")]
    MultiDisk,

    /// Zip64 sentinel encountered
    #[error("Zip64 archives are not supported")]
    Zip64Unsupported,

    /// Central directory lies outside the archive
    #[error("Central directory out of bounds: offset {offset}, size {size}, archive {archive_len}")]
    DirectoryOutOfBounds {
        /// Declared directory offset
        offset: u64,
        /// Declared directory size
        size: u64,
        /// Archive length
        archive_len: u64,
    },

    /// Entry payload lies outside the archive
    #[error("Entry {name} out of bounds")]
    EntryOutOfBounds {
        /// Entry name
        name: String,
    },

    /// Unknown compression method
    #[error("Entry {name} uses unsupported compression method {method}")]
    UnsupportedMethod {
        /// Entry name
        name: String,
        /// Method id from the header
        method: u16,
    },

    /// Entry is encrypted
    #[error("Entry {0} is encrypted")]
    Encrypted(String),

    /// Inflated size differs from the declared size
    #[error("Entry {name} inflated to {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Entry name
        name: String,
        /// Declared uncompressed size
        expected: u64,
        /// Bytes produced
        actual: u64,
    },

    /// CRC-32 of the content does not match the directory
    #[error("Entry {name} checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Entry name
        name: String,
        /// CRC from the central directory
        expected: u32,
        /// CRC of the content
        actual: u32,
    },

    /// Entry exceeds the configured inflate limit
    #[error("Entry {name} declares {size} bytes, limit is {limit}")]
    EntryTooLarge {
        /// Entry name
        name: String,
        /// Declared size
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Two entries share a name in the builder
    #[error("Duplicate entry name: {0}")]
    DuplicateEntry(String),

    /// Binary read/write error
    #[error("Binary format error: {0}")]
    BinRead(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZipError {
    /// Whether the fault concerns a single entry rather than the whole archive
    pub fn is_entry_error(&self) -> bool {
        matches!(
            self,
            Self::EntryOutOfBounds { .. }
                | Self::UnsupportedMethod { .. }
                | Self::Encrypted(_)
                | Self::SizeMismatch { .. }
                | Self::ChecksumMismatch { .. }
                | Self::EntryTooLarge { .. }
        )
    }
}
