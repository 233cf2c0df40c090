//! Zip record layouts
//!
//! All multi-byte fields are little-endian. Variable-length tails (name,
//! extra field, comment) follow the fixed part and are sized by its length
//! fields.

use binrw::{BinRead, BinWrite};

/// Fixed length of the end-of-central-directory record
pub const EOCD_LEN: usize = 22;

/// Maximum distance of the EOCD record from the end (64 KiB comment + record)
pub const EOCD_SEARCH_MAX: usize = 0xFFFF + EOCD_LEN;

/// Fixed length of a central directory header
pub const CDFH_LEN: usize = 46;

/// Fixed length of a local file header
pub const LFH_LEN: usize = 30;

/// EOCD signature bytes (`PK\x05\x06`)
pub const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: sizes follow the payload in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: name is UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// End of central directory record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"PK\x05\x06")]
pub struct EndOfCentralDirectory {
    /// Number of this disk
    pub disk_number: u16,
    /// Disk where the central directory starts
    pub directory_disk: u16,
    /// Directory records on this disk
    pub entries_on_disk: u16,
    /// Directory records in total
    pub total_entries: u16,
    /// Size of the central directory in bytes
    pub directory_size: u32,
    /// Offset of the central directory from the archive start
    pub directory_offset: u32,
    /// Archive comment length
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    /// Whether any field carries a Zip64 sentinel
    pub fn is_zip64(&self) -> bool {
        self.total_entries == 0xFFFF
            || self.entries_on_disk == 0xFFFF
            || self.directory_size == 0xFFFF_FFFF
            || self.directory_offset == 0xFFFF_FFFF
    }
}

/// Central directory file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"PK\x01\x02")]
pub struct CentralDirectoryHeader {
    /// Creator version
    pub version_made_by: u16,
    /// Minimum version to extract
    pub version_needed: u16,
    /// General purpose flags
    pub flags: u16,
    /// Compression method
    pub method: u16,
    /// DOS modification time
    pub mod_time: u16,
    /// DOS modification date
    pub mod_date: u16,
    /// CRC-32 of the uncompressed content
    pub crc32: u32,
    /// Compressed payload size
    pub compressed_size: u32,
    /// Uncompressed content size
    pub uncompressed_size: u32,
    /// Name length
    pub name_len: u16,
    /// Extra field length
    pub extra_len: u16,
    /// Comment length
    pub comment_len: u16,
    /// Disk where the entry starts
    pub disk_start: u16,
    /// Internal attributes
    pub internal_attrs: u16,
    /// External attributes
    pub external_attrs: u32,
    /// Offset of the local header
    pub local_header_offset: u32,
    /// Raw name bytes
    #[br(count = name_len)]
    pub name: Vec<u8>,
    /// Raw extra field
    #[br(count = extra_len)]
    pub extra: Vec<u8>,
    /// Raw comment
    #[br(count = comment_len)]
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Total record length including the variable tail
    pub fn record_len(&self) -> usize {
        CDFH_LEN + self.name.len() + self.extra.len() + self.comment.len()
    }

    /// Whether any size or offset field carries a Zip64 sentinel
    pub fn is_zip64(&self) -> bool {
        self.compressed_size == 0xFFFF_FFFF
            || self.uncompressed_size == 0xFFFF_FFFF
            || self.local_header_offset == 0xFFFF_FFFF
    }
}

/// Local file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"PK\x03\x04")]
pub struct LocalFileHeader {
    /// Minimum version to extract
    pub version_needed: u16,
    /// General purpose flags
    pub flags: u16,
    /// Compression method
    pub method: u16,
    /// DOS modification time
    pub mod_time: u16,
    /// DOS modification date
    pub mod_date: u16,
    /// CRC-32 (zero when a data descriptor is used)
    pub crc32: u32,
    /// Compressed size (zero when a data descriptor is used)
    pub compressed_size: u32,
    /// Uncompressed size (zero when a data descriptor is used)
    pub uncompressed_size: u32,
    /// Name length
    pub name_len: u16,
    /// Extra field length
    pub extra_len: u16,
}
