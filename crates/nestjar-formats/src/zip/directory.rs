//! Central directory parsing and entry payload access

use super::error::{ZipError, ZipResult};
use super::header::{
    CentralDirectoryHeader, EOCD_LEN, EOCD_SEARCH_MAX, EOCD_SIGNATURE, EndOfCentralDirectory,
    FLAG_ENCRYPTED, LFH_LEN, LocalFileHeader,
};
use super::time::DosDateTime;
use binrw::BinRead;
use bytes::Bytes;
use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};
use std::time::SystemTime;

/// Compression method of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Method 0
    Stored,
    /// Method 8
    Deflated,
    /// Anything else; listed but unreadable
    Unsupported(u16),
}

impl CompressionMethod {
    /// Map a header method id
    pub fn from_id(id: u16) -> Self {
        match id {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Unsupported(other),
        }
    }

    /// Header method id
    pub fn id(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Unsupported(id) => id,
        }
    }
}

/// One central directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry name as stored, `/`-separated
    pub name: String,
    /// Compression method
    pub method: CompressionMethod,
    /// General purpose flags
    pub flags: u16,
    /// CRC-32 of the uncompressed content
    pub crc32: u32,
    /// Compressed payload size
    pub compressed_size: u64,
    /// Uncompressed content size
    pub size: u64,
    /// Offset of the local header
    pub local_header_offset: u64,
    /// Packed DOS modification timestamp
    pub modified: DosDateTime,
}

impl ZipEntry {
    fn from_header(header: &CentralDirectoryHeader) -> Self {
        // Names without FLAG_UTF8 are CP437; the ASCII range decodes identically
        let name = String::from_utf8_lossy(&header.name).into_owned();

        Self {
            name,
            method: CompressionMethod::from_id(header.method),
            flags: header.flags,
            crc32: header.crc32,
            compressed_size: u64::from(header.compressed_size),
            size: u64::from(header.uncompressed_size),
            local_header_offset: u64::from(header.local_header_offset),
            modified: DosDateTime::new(header.mod_date, header.mod_time),
        }
    }

    /// Whether this entry names a directory
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Whether this entry is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Last path component, without any trailing `/`
    pub fn tail_name(&self) -> &str {
        let trimmed = self.name.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Modification time, if the DOS timestamp is valid
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified.to_system_time()
    }

    /// Range of the compressed payload inside `archive`
    pub fn payload_range(&self, archive: &[u8]) -> ZipResult<std::ops::Range<usize>> {
        let out_of_bounds = || ZipError::EntryOutOfBounds {
            name: self.name.clone(),
        };

        let header_start = usize::try_from(self.local_header_offset).map_err(|_| out_of_bounds())?;
        if header_start.saturating_add(LFH_LEN) > archive.len() {
            return Err(out_of_bounds());
        }

        let local = LocalFileHeader::read(&mut Cursor::new(&archive[header_start..]))?;
        let data_start = header_start
            .saturating_add(LFH_LEN)
            .saturating_add(usize::from(local.name_len))
            .saturating_add(usize::from(local.extra_len));
        let compressed = usize::try_from(self.compressed_size).map_err(|_| out_of_bounds())?;
        let data_end = data_start.saturating_add(compressed);
        if data_end > archive.len() {
            return Err(out_of_bounds());
        }
        Ok(data_start..data_end)
    }

    /// Read the uncompressed content
    ///
    /// Stored entries are returned as a slice of `archive` without copying.
    /// `size_limit` bounds the declared uncompressed size; `verify` enables the
    /// CRC-32 check.
    pub fn read(&self, archive: &Bytes, size_limit: u64, verify: bool) -> ZipResult<Bytes> {
        if self.is_encrypted() {
            return Err(ZipError::Encrypted(self.name.clone()));
        }
        if self.size > size_limit {
            return Err(ZipError::EntryTooLarge {
                name: self.name.clone(),
                size: self.size,
                limit: size_limit,
            });
        }

        let range = self.payload_range(archive)?;
        let content = match self.method {
            CompressionMethod::Stored => {
                if range.len() as u64 != self.size {
                    return Err(ZipError::SizeMismatch {
                        name: self.name.clone(),
                        expected: self.size,
                        actual: range.len() as u64,
                    });
                }
                archive.slice(range)
            }
            CompressionMethod::Deflated => {
                let capacity = usize::try_from(self.size).unwrap_or(0);
                let mut out = Vec::with_capacity(capacity);
                DeflateDecoder::new(&archive[range])
                    .take(self.size.saturating_add(1))
                    .read_to_end(&mut out)?;
                if out.len() as u64 != self.size {
                    return Err(ZipError::SizeMismatch {
                        name: self.name.clone(),
                        expected: self.size,
                        actual: out.len() as u64,
                    });
                }
                Bytes::from(out)
            }
            CompressionMethod::Unsupported(method) => {
                return Err(ZipError::UnsupportedMethod {
                    name: self.name.clone(),
                    method,
                });
            }
        };

        if verify {
            let mut crc = Crc::new();
            crc.update(&content);
            if crc.sum() != self.crc32 {
                return Err(ZipError::ChecksumMismatch {
                    name: self.name.clone(),
                    expected: self.crc32,
                    actual: crc.sum(),
                });
            }
        }

        Ok(content)
    }
}

/// Parsed table of contents of one archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipDirectory {
    /// Entries in central directory order
    pub entries: Vec<ZipEntry>,
    /// Archive comment
    pub comment: Vec<u8>,
}

impl ZipDirectory {
    /// Parse the central directory of `archive`
    pub fn parse(archive: &[u8]) -> ZipResult<Self> {
        let eocd_pos = find_end_of_directory(archive)?;
        let eocd = EndOfCentralDirectory::read(&mut Cursor::new(&archive[eocd_pos..]))?;

        if eocd.disk_number != 0
            || eocd.directory_disk != 0
            || eocd.entries_on_disk != eocd.total_entries
        {
            return Err(ZipError::MultiDisk);
        }
        if eocd.is_zip64() {
            return Err(ZipError::Zip64Unsupported);
        }

        let offset = u64::from(eocd.directory_offset);
        let size = u64::from(eocd.directory_size);
        let archive_len = archive.len() as u64;
        if offset.saturating_add(size) > eocd_pos as u64 {
            return Err(ZipError::DirectoryOutOfBounds {
                offset,
                size,
                archive_len,
            });
        }

        let start = offset as usize;
        let end = start + size as usize;
        let mut cursor = Cursor::new(&archive[start..end]);
        let mut entries = Vec::with_capacity(usize::from(eocd.total_entries));
        for _ in 0..eocd.total_entries {
            let header = CentralDirectoryHeader::read(&mut cursor)?;
            if header.is_zip64() {
                return Err(ZipError::Zip64Unsupported);
            }
            entries.push(ZipEntry::from_header(&header));
        }

        let comment_start = eocd_pos + EOCD_LEN;
        let comment_end = (comment_start + usize::from(eocd.comment_len)).min(archive.len());
        Ok(Self {
            entries,
            comment: archive[comment_start..comment_end].to_vec(),
        })
    }

    /// Find an entry by exact name
    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locate the EOCD record, scanning backwards through the comment window
fn find_end_of_directory(archive: &[u8]) -> ZipResult<usize> {
    if archive.len() < EOCD_LEN {
        return Err(ZipError::MissingEndOfDirectory);
    }

    let last = archive.len() - EOCD_LEN;
    let first = archive.len().saturating_sub(EOCD_SEARCH_MAX);
    for pos in (first..=last).rev() {
        if archive[pos..pos + 4] != EOCD_SIGNATURE {
            continue;
        }
        let comment_len = usize::from(u16::from_le_bytes([archive[pos + 20], archive[pos + 21]]));
        // A false-positive signature inside the comment would overrun the buffer
        if pos + EOCD_LEN + comment_len <= archive.len() {
            return Ok(pos);
        }
    }
    Err(ZipError::MissingEndOfDirectory)
}
