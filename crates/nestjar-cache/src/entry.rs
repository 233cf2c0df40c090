//! Content entries
//!
//! A [`ContentEntry`] is the resolved state of one named entry of an archive
//! record. It starts unresolved, becomes loaded the first time its bytes are
//! requested, and never goes back. Entries that do not exist are represented
//! by a permanent not-found sentinel rather than an error, so probing stays
//! cheap. Corrupt content is reported once and then replayed: neither the
//! payload nor a nested archive is parsed again after a parse failure.

use crate::config::StoreConfig;
use crate::error::{CacheError, CacheResult};
use crate::opener::FileSystemOpener;
use crate::record::ArchiveRecord;
use crate::stats::LoadStats;
use bytes::Bytes;
use nestjar_formats::{CompressionMethod, Location, ZipEntry};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Settings shared by every record and entry loaded by one store
#[derive(Debug, Default)]
pub(crate) struct LoadSettings {
    pub config: StoreConfig,
    pub stats: Arc<LoadStats>,
}

#[derive(Debug)]
enum EntrySource {
    /// Entry of a packaged archive, read from the archive buffer
    Packed { meta: ZipEntry, archive: Bytes },
    /// File or directory below a directory-style root
    Path { path: PathBuf, is_dir: bool },
    /// Not-found sentinel
    Missing,
}

/// Metadata of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Uncompressed size
    pub size: u64,
    /// Stored size, for packed entries
    pub compressed_size: Option<u64>,
    /// CRC-32 recorded in the central directory
    pub crc32: Option<u32>,
    /// Compression method, for packed entries
    pub method: Option<CompressionMethod>,
    /// Modification time
    pub last_modified: Option<SystemTime>,
    /// Whether the entry names a directory
    pub is_dir: bool,
}

/// Resolved state of one named entry
pub struct ContentEntry {
    name: String,
    /// Archive that owns this entry
    archive: Location,
    depth: usize,
    settings: Arc<LoadSettings>,
    source: EntrySource,
    data: OnceLock<Bytes>,
    sub_archive: OnceLock<Arc<ArchiveRecord>>,
    load_failure: OnceLock<Arc<CacheError>>,
    nest_failure: OnceLock<Arc<CacheError>>,
    loaded: AtomicBool,
    load_lock: Mutex<()>,
    nest_lock: Mutex<()>,
}

impl ContentEntry {
    fn with_source(
        name: impl Into<String>,
        archive: &Location,
        depth: usize,
        settings: &Arc<LoadSettings>,
        source: EntrySource,
    ) -> Self {
        Self {
            name: name.into(),
            archive: archive.as_archive(),
            depth,
            settings: Arc::clone(settings),
            source,
            data: OnceLock::new(),
            sub_archive: OnceLock::new(),
            load_failure: OnceLock::new(),
            nest_failure: OnceLock::new(),
            loaded: AtomicBool::new(false),
            load_lock: Mutex::new(()),
            nest_lock: Mutex::new(()),
        }
    }

    pub(crate) fn packed(
        meta: ZipEntry,
        archive_data: Bytes,
        archive: &Location,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> Self {
        let name = meta.name.clone();
        Self::with_source(
            name,
            archive,
            depth,
            settings,
            EntrySource::Packed {
                meta,
                archive: archive_data,
            },
        )
    }

    pub(crate) fn path(
        name: impl Into<String>,
        path: PathBuf,
        is_dir: bool,
        archive: &Location,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> Self {
        Self::with_source(
            name,
            archive,
            depth,
            settings,
            EntrySource::Path { path, is_dir },
        )
    }

    pub(crate) fn missing(
        name: impl Into<String>,
        archive: &Location,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> Self {
        Self::with_source(name, archive, depth, settings, EntrySource::Missing)
    }

    /// Entry name relative to its archive
    ///
    /// For deduplicated aliases this is the first path the content was seen
    /// at.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the entry
    pub fn location(&self) -> CacheResult<Location> {
        Ok(self.archive.join(&self.name)?)
    }

    /// Whether this is the not-found sentinel
    pub fn is_missing(&self) -> bool {
        matches!(self.source, EntrySource::Missing)
    }

    /// Whether the entry exists
    pub fn exists(&self) -> bool {
        !self.is_missing()
    }

    /// Whether the entry names a directory
    pub fn is_dir(&self) -> bool {
        match &self.source {
            EntrySource::Packed { meta, .. } => meta.is_dir(),
            EntrySource::Path { is_dir, .. } => *is_dir,
            EntrySource::Missing => false,
        }
    }

    /// Whether the bytes have been loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Central directory key used to recognize identical content
    pub(crate) fn dedup_key(&self) -> Option<(String, u64, u32)> {
        match &self.source {
            EntrySource::Packed { meta, .. } if !meta.is_dir() => {
                Some((meta.tail_name().to_string(), meta.size, meta.crc32))
            }
            _ => None,
        }
    }

    /// Entry metadata, without loading the content
    pub fn metadata(&self) -> CacheResult<EntryMetadata> {
        match &self.source {
            EntrySource::Packed { meta, .. } => Ok(EntryMetadata {
                size: meta.size,
                compressed_size: Some(meta.compressed_size),
                crc32: Some(meta.crc32),
                method: Some(meta.method),
                last_modified: meta.last_modified(),
                is_dir: meta.is_dir(),
            }),
            EntrySource::Path { path, is_dir } => {
                let fs_meta = std::fs::metadata(path)?;
                Ok(EntryMetadata {
                    size: if *is_dir { 0 } else { fs_meta.len() },
                    compressed_size: None,
                    crc32: None,
                    method: None,
                    last_modified: fs_meta.modified().ok(),
                    is_dir: *is_dir,
                })
            }
            EntrySource::Missing => Err(self.not_found()),
        }
    }

    /// Entry content
    ///
    /// Loaded at most once; concurrent callers block on the single load and
    /// then share its result. Directory entries have empty content.
    pub fn bytes(&self) -> CacheResult<Bytes> {
        if let Some(data) = self.data.get() {
            return Ok(data.clone());
        }
        if self.is_missing() {
            return Err(self.not_found());
        }

        let _guard = self.load_lock.lock();
        if let Some(data) = self.data.get() {
            return Ok(data.clone());
        }
        replay(&self.load_failure)?;

        let data = self.load().map_err(|e| remember(&self.load_failure, e))?;
        let data = self.data.get_or_init(|| data).clone();
        self.loaded.store(true, Ordering::Release);
        Ok(data)
    }

    fn load(&self) -> CacheResult<Bytes> {
        let data = match &self.source {
            EntrySource::Packed { meta, .. } if meta.is_dir() => return Ok(Bytes::new()),
            EntrySource::Path { is_dir: true, .. } => return Ok(Bytes::new()),
            EntrySource::Packed { meta, archive } => meta
                .read(
                    archive,
                    self.settings.config.max_entry_size,
                    self.settings.config.verify_checksums,
                )
                .map_err(|e| CacheError::parse(&self.archive, e))?,
            EntrySource::Path { path, .. } => Bytes::from(std::fs::read(path)?),
            EntrySource::Missing => return Err(self.not_found()),
        };

        self.settings.stats.record_entry_loaded(data.len());
        trace!("Loaded {} ({} bytes) from {}", self.name, data.len(), self.archive);
        Ok(data)
    }

    /// The entry's content parsed as a nested archive
    ///
    /// Parsed at most once. Stored nested archives are read directly from
    /// the parent buffer.
    pub fn sub_archive(&self) -> CacheResult<Arc<ArchiveRecord>> {
        if let Some(record) = self.sub_archive.get() {
            return Ok(Arc::clone(record));
        }
        if self.is_missing() {
            return Err(self.not_found());
        }

        let location = self.location()?.as_archive();
        let depth = self.depth + 1;
        let limit = self.settings.config.max_nesting_depth;
        if depth > limit {
            return Err(CacheError::NestingTooDeep {
                location,
                depth,
                limit,
            });
        }

        let _guard = self.nest_lock.lock();
        if let Some(record) = self.sub_archive.get() {
            return Ok(Arc::clone(record));
        }
        replay(&self.nest_failure)?;

        let record = self
            .open_sub_archive(location, depth)
            .map_err(|e| remember(&self.nest_failure, e))?;
        debug!("Opened nested archive {}", record.location());

        Ok(Arc::clone(self.sub_archive.get_or_init(|| record)))
    }

    fn open_sub_archive(&self, location: Location, depth: usize) -> CacheResult<Arc<ArchiveRecord>> {
        match &self.source {
            EntrySource::Path { path, .. } => {
                let content = FileSystemOpener::open_path(path)?;
                ArchiveRecord::from_content(location, content, depth, &self.settings)
            }
            _ => {
                let data = self.bytes()?;
                let modified = self.metadata().ok().and_then(|m| m.last_modified);
                ArchiveRecord::packed(location, data, modified, depth, &self.settings)
            }
        }
    }

    /// Nested archive, if it has already been opened
    pub fn opened_sub_archive(&self) -> Option<Arc<ArchiveRecord>> {
        self.sub_archive.get().cloned()
    }

    fn not_found(&self) -> CacheError {
        CacheError::NotFound(format!("{}^/{}", self.archive.canonical_key(), self.name))
    }
}

/// Fail with the recorded failure, if any
fn replay(slot: &OnceLock<Arc<CacheError>>) -> CacheResult<()> {
    match slot.get() {
        Some(failure) => Err(CacheError::Recorded(Arc::clone(failure))),
        None => Ok(()),
    }
}

/// Record parse failures so they are not retried; other failures pass through
fn remember(slot: &OnceLock<Arc<CacheError>>, error: CacheError) -> CacheError {
    if !error.is_parse_error() {
        return error;
    }
    let failure = Arc::clone(slot.get_or_init(|| error.into_shared()));
    CacheError::Recorded(failure)
}

impl std::fmt::Debug for ContentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEntry")
            .field("name", &self.name)
            .field("archive", &self.archive)
            .field("missing", &self.is_missing())
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nestjar_formats::{ZipBuilder, ZipDirectory};

    fn settings() -> Arc<LoadSettings> {
        Arc::new(LoadSettings::default())
    }

    fn packed_entry(data: &[u8], name: &str, settings: &Arc<LoadSettings>) -> ContentEntry {
        let data = Bytes::copy_from_slice(data);
        let directory = ZipDirectory::parse(&data).unwrap();
        let meta = directory.find(name).unwrap().clone();
        let archive = Location::new_root("mem:test.zip").unwrap().as_archive();
        ContentEntry::packed(meta, data, &archive, 0, settings)
    }

    #[test]
    fn test_bytes_load_once() {
        let mut builder = ZipBuilder::new();
        builder.add_deflated("a.txt", b"hello hello hello").unwrap();
        let zip = builder.finish().unwrap();

        let settings = settings();
        let entry = packed_entry(&zip, "a.txt", &settings);
        assert!(!entry.is_loaded());

        let first = entry.bytes().unwrap();
        let second = entry.bytes().unwrap();
        assert_eq!(&first[..], b"hello hello hello");
        assert_eq!(first.as_ptr(), second.as_ptr());
        assert!(entry.is_loaded());
        assert_eq!(settings.stats.snapshot().entries_loaded, 1);
    }

    #[test]
    fn test_missing_sentinel() {
        let settings = settings();
        let archive = Location::new_root("/srv/app.jar").unwrap();
        let entry = ContentEntry::missing("nope.txt", &archive, 0, &settings);

        assert!(entry.is_missing());
        assert!(entry.bytes().unwrap_err().is_not_found());
        assert!(entry.metadata().unwrap_err().is_not_found());
        assert!(entry.sub_archive().unwrap_err().is_not_found());
    }

    #[test]
    fn test_directory_entry_is_empty() {
        let mut builder = ZipBuilder::new();
        builder.add_directory("pkg/").unwrap();
        let zip = builder.finish().unwrap();

        let entry = packed_entry(&zip, "pkg/", &settings());
        assert!(entry.is_dir());
        assert!(entry.bytes().unwrap().is_empty());
        assert!(entry.dedup_key().is_none());
    }

    #[test]
    fn test_corrupt_nested_archive_is_parsed_once() {
        let mut outer = ZipBuilder::new();
        outer.add_stored("broken.jar", b"definitely not a zip").unwrap();
        let zip = outer.finish().unwrap();

        let settings = settings();
        let entry = packed_entry(&zip, "broken.jar", &settings);
        let first = entry.sub_archive().unwrap_err();
        match first.cause() {
            CacheError::ArchiveParse { location, .. } => {
                assert_eq!(location.to_string(), "nested:mem:test.zip^/broken.jar^/");
            }
            other => panic!("unexpected error: {other}"),
        }

        let first = first.into_shared();
        for _ in 0..3 {
            let again = entry.sub_archive().unwrap_err();
            assert!(again.is_parse_error());
            assert!(Arc::ptr_eq(&again.into_shared(), &first));
        }
        assert!(entry.opened_sub_archive().is_none());
        // The payload itself is fine and was read once
        assert_eq!(settings.stats.snapshot().entries_loaded, 1);
    }

    #[test]
    fn test_nesting_limit() {
        let mut inner = ZipBuilder::new();
        inner.add_stored("x.txt", b"x").unwrap();
        let mut outer = ZipBuilder::new();
        outer.add_stored("inner.zip", &inner.finish().unwrap()).unwrap();
        let zip = outer.finish().unwrap();

        let settings = Arc::new(LoadSettings {
            config: StoreConfig::new().with_max_nesting_depth(1),
            stats: Arc::default(),
        });
        let data = Bytes::from(zip);
        let directory = ZipDirectory::parse(&data).unwrap();
        let meta = directory.find("inner.zip").unwrap().clone();
        let archive = Location::new_root("mem:outer.zip").unwrap();

        let shallow = ContentEntry::packed(meta.clone(), data.clone(), &archive, 0, &settings);
        assert!(shallow.sub_archive().is_ok());

        let deep = ContentEntry::packed(meta, data, &archive, 1, &settings);
        assert!(matches!(
            deep.sub_archive(),
            Err(CacheError::NestingTooDeep { depth: 2, limit: 1, .. })
        ));
    }
}
