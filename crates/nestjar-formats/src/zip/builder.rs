//! Zip archive building
//!
//! Produces plain Zip32 archives with stored or deflated entries. Nested
//! archives are built by adding the output of one builder as an entry of
//! another.

use super::directory::CompressionMethod;
use super::error::{ZipError, ZipResult};
use super::header::{
    CentralDirectoryHeader, EndOfCentralDirectory, FLAG_UTF8, LocalFileHeader,
};
use super::time::{DOS_EPOCH_DATE, DosDateTime};
use binrw::BinWrite;
use flate2::Crc;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::io::{Cursor, Write};

const VERSION_NEEDED: u16 = 20;

/// Builder for zip archives
#[derive(Debug)]
pub struct ZipBuilder {
    out: Cursor<Vec<u8>>,
    directory: Vec<CentralDirectoryHeader>,
    names: HashSet<String>,
    timestamp: DosDateTime,
    comment: Vec<u8>,
}

impl Default for ZipBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipBuilder {
    /// Create an empty builder; entries are stamped 1980-01-01 00:00
    pub fn new() -> Self {
        Self {
            out: Cursor::new(Vec::new()),
            directory: Vec::new(),
            names: HashSet::new(),
            timestamp: DosDateTime::new(DOS_EPOCH_DATE, 0),
            comment: Vec::new(),
        }
    }

    /// Timestamp applied to entries added afterwards
    pub fn with_timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the archive comment
    pub fn set_comment(&mut self, comment: &[u8]) {
        self.comment = comment.to_vec();
    }

    /// Add an uncompressed entry
    pub fn add_stored(&mut self, name: &str, content: &[u8]) -> ZipResult<()> {
        self.add_entry(name, content, CompressionMethod::Stored)
    }

    /// Add a deflate-compressed entry
    pub fn add_deflated(&mut self, name: &str, content: &[u8]) -> ZipResult<()> {
        self.add_entry(name, content, CompressionMethod::Deflated)
    }

    /// Add a directory entry; a trailing `/` is appended when missing
    pub fn add_directory(&mut self, name: &str) -> ZipResult<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.add_entry(&name, &[], CompressionMethod::Stored)
    }

    /// Add an entry with an explicit method
    pub fn add_entry(
        &mut self,
        name: &str,
        content: &[u8],
        method: CompressionMethod,
    ) -> ZipResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(ZipError::DuplicateEntry(name.to_string()));
        }

        let mut crc = Crc::new();
        crc.update(content);

        let payload = match method {
            CompressionMethod::Stored => content.to_vec(),
            CompressionMethod::Deflated => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(content)?;
                encoder.finish()?
            }
            CompressionMethod::Unsupported(method) => {
                return Err(ZipError::UnsupportedMethod {
                    name: name.to_string(),
                    method,
                });
            }
        };

        let offset = self.out.position();
        let local_header_offset = u32::try_from(offset).map_err(|_| ZipError::Zip64Unsupported)?;
        let compressed_size =
            u32::try_from(payload.len()).map_err(|_| ZipError::Zip64Unsupported)?;
        let uncompressed_size =
            u32::try_from(content.len()).map_err(|_| ZipError::Zip64Unsupported)?;
        let name_bytes = name.as_bytes().to_vec();
        let name_len = u16::try_from(name_bytes.len()).map_err(|_| ZipError::Zip64Unsupported)?;
        let flags = if name.is_ascii() { 0 } else { FLAG_UTF8 };

        LocalFileHeader {
            version_needed: VERSION_NEEDED,
            flags,
            method: method.id(),
            mod_time: self.timestamp.time,
            mod_date: self.timestamp.date,
            crc32: crc.sum(),
            compressed_size,
            uncompressed_size,
            name_len,
            extra_len: 0,
        }
        .write(&mut self.out)?;
        self.out.write_all(&name_bytes)?;
        self.out.write_all(&payload)?;

        self.directory.push(CentralDirectoryHeader {
            version_made_by: VERSION_NEEDED,
            version_needed: VERSION_NEEDED,
            flags,
            method: method.id(),
            mod_time: self.timestamp.time,
            mod_date: self.timestamp.date,
            crc32: crc.sum(),
            compressed_size,
            uncompressed_size,
            name_len,
            extra_len: 0,
            comment_len: 0,
            disk_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            local_header_offset,
            name: name_bytes,
            extra: Vec::new(),
            comment: Vec::new(),
        });
        Ok(())
    }

    /// Write the central directory and return the archive bytes
    pub fn finish(mut self) -> ZipResult<Vec<u8>> {
        let directory_offset =
            u32::try_from(self.out.position()).map_err(|_| ZipError::Zip64Unsupported)?;
        for header in &self.directory {
            header.write(&mut self.out)?;
        }
        let directory_size = u32::try_from(self.out.position())
            .map_err(|_| ZipError::Zip64Unsupported)?
            - directory_offset;
        let total_entries =
            u16::try_from(self.directory.len()).map_err(|_| ZipError::Zip64Unsupported)?;
        let comment_len =
            u16::try_from(self.comment.len()).map_err(|_| ZipError::Zip64Unsupported)?;

        EndOfCentralDirectory {
            disk_number: 0,
            directory_disk: 0,
            entries_on_disk: total_entries,
            total_entries,
            directory_size,
            directory_offset,
            comment_len,
        }
        .write(&mut self.out)?;
        self.out.write_all(&self.comment)?;

        Ok(self.out.into_inner())
    }
}
