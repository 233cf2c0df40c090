//! Archive records
//!
//! An [`ArchiveRecord`] is the parsed state of one archive: the outermost root
//! or any archive nested inside it. Packaged archives have their central
//! directory scanned once, up front; entry bytes are read lazily. Directory
//! roots are probed on demand, or listed in full with the eager strategy.
//!
//! Within one packaged archive, entries with the same tail name, size and
//! CRC-32 are aliases of a single [`ContentEntry`], so identical nested
//! copies share one byte buffer and one set of nested children.

use crate::config::DirectoryStrategy;
use crate::entry::{ContentEntry, LoadSettings};
use crate::error::{CacheError, CacheResult};
use crate::opener::RootContent;
use bytes::Bytes;
use dashmap::DashMap;
use nestjar_formats::{Location, ZipDirectory};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Dedup key: tail name, uncompressed size, CRC-32
pub type DedupKey = (String, u64, u32);

enum RecordIndex {
    Packed {
        data: Bytes,
        /// Entry names in central directory order
        names: Vec<String>,
        entries: HashMap<String, Arc<ContentEntry>>,
        dedup: HashMap<DedupKey, String>,
    },
    Directory {
        root: PathBuf,
        entries: DashMap<String, Arc<ContentEntry>>,
    },
}

/// Parsed state of one archive or directory root
pub struct ArchiveRecord {
    location: Location,
    depth: usize,
    modified: Option<SystemTime>,
    settings: Arc<LoadSettings>,
    index: RecordIndex,
}

impl ArchiveRecord {
    pub(crate) fn from_content(
        location: Location,
        content: RootContent,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> CacheResult<Arc<Self>> {
        match content {
            RootContent::Archive { data, modified } => {
                Self::packed(location, data, modified, depth, settings)
            }
            RootContent::Directory { path, modified } => {
                Ok(Self::directory(location, path, modified, depth, settings))
            }
        }
    }

    pub(crate) fn packed(
        location: Location,
        data: Bytes,
        modified: Option<SystemTime>,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> CacheResult<Arc<Self>> {
        let location = location.as_archive();
        let directory = ZipDirectory::parse(&data).map_err(|e| CacheError::parse(&location, e))?;
        settings.stats.record_archive_parsed();

        let mut names = Vec::with_capacity(directory.len());
        let mut entries: HashMap<String, Arc<ContentEntry>> =
            HashMap::with_capacity(directory.len());
        let mut dedup: HashMap<DedupKey, String> = HashMap::new();
        let mut aliases = 0usize;

        for meta in directory.entries {
            if entries.contains_key(&meta.name) {
                // Later duplicates of a name are unreachable
                trace!("Ignoring duplicate entry {} in {}", meta.name, location);
                continue;
            }

            let name = meta.name.clone();
            let entry = ContentEntry::packed(meta, data.clone(), &location, depth, settings);
            let entry = match entry.dedup_key() {
                Some(key) => match dedup.get(&key).and_then(|canonical| entries.get(canonical)) {
                    Some(existing) => {
                        aliases += 1;
                        settings.stats.record_alias();
                        Arc::clone(existing)
                    }
                    None => {
                        dedup.insert(key, name.clone());
                        Arc::new(entry)
                    }
                },
                None => Arc::new(entry),
            };

            names.push(name.clone());
            entries.insert(name, entry);
        }

        debug!(
            "Parsed {} ({} entries, {} aliases, {} bytes)",
            location,
            names.len(),
            aliases,
            data.len()
        );

        Ok(Arc::new(Self {
            location,
            depth,
            modified,
            settings: Arc::clone(settings),
            index: RecordIndex::Packed {
                data,
                names,
                entries,
                dedup,
            },
        }))
    }

    pub(crate) fn directory(
        location: Location,
        root: PathBuf,
        modified: Option<SystemTime>,
        depth: usize,
        settings: &Arc<LoadSettings>,
    ) -> Arc<Self> {
        let location = location.as_archive();
        let entries = DashMap::new();

        if settings.config.directory_strategy == DirectoryStrategy::Eager {
            for item in WalkDir::new(&root).min_depth(1).into_iter().flatten() {
                let Ok(relative) = item.path().strip_prefix(&root) else {
                    continue;
                };
                let Some(name) = relative_name(relative) else {
                    continue;
                };
                let is_dir = item.file_type().is_dir();
                let entry = ContentEntry::path(
                    name.clone(),
                    item.path().to_path_buf(),
                    is_dir,
                    &location,
                    depth,
                    settings,
                );
                entries.insert(name, Arc::new(entry));
            }
            debug!("Indexed directory {} ({} entries)", location, entries.len());
        }

        Arc::new(Self {
            location,
            depth,
            modified,
            settings: Arc::clone(settings),
            index: RecordIndex::Directory { root, entries },
        })
    }

    /// Location of this archive
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Number of archive hops between this record and its root
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this is a directory-style root
    pub fn is_directory(&self) -> bool {
        matches!(self.index, RecordIndex::Directory { .. })
    }

    /// Modification time of the archive
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Raw archive bytes; empty for directory roots
    pub fn data(&self) -> Bytes {
        match &self.index {
            RecordIndex::Packed { data, .. } => data.clone(),
            RecordIndex::Directory { .. } => Bytes::new(),
        }
    }

    /// Filesystem path of a directory root
    pub fn directory_path(&self) -> Option<&Path> {
        match &self.index {
            RecordIndex::Directory { root, .. } => Some(root),
            RecordIndex::Packed { .. } => None,
        }
    }

    /// Canonical entry name for a dedup key
    pub fn canonical_name(&self, key: &DedupKey) -> Option<&str> {
        match &self.index {
            RecordIndex::Packed { dedup, .. } => dedup.get(key).map(String::as_str),
            RecordIndex::Directory { .. } => None,
        }
    }

    /// Look up one entry by path relative to this archive
    ///
    /// Never fails for absence: a missing path yields the not-found
    /// sentinel.
    pub fn entry(&self, path: &str) -> Arc<ContentEntry> {
        let path = path.trim_start_matches('/');
        match &self.index {
            RecordIndex::Packed { entries, .. } => entries
                .get(path)
                .or_else(|| {
                    (!path.ends_with('/'))
                        .then(|| entries.get(&format!("{path}/")))
                        .flatten()
                })
                .cloned()
                .unwrap_or_else(|| self.missing(path)),
            RecordIndex::Directory { root, entries } => self.probe(root, entries, path),
        }
    }

    fn probe(
        &self,
        root: &Path,
        entries: &DashMap<String, Arc<ContentEntry>>,
        path: &str,
    ) -> Arc<ContentEntry> {
        let Some(name) = relative_name(Path::new(path)) else {
            trace!("Rejected probe {path} outside {}", self.location);
            return self.missing(path);
        };
        if let Some(entry) = entries.get(&name) {
            return Arc::clone(&entry);
        }
        if self.settings.config.directory_strategy == DirectoryStrategy::Eager {
            self.settings.stats.record_negative_probe();
            return self.missing(&name);
        }

        let full = root.join(&name);
        let entry = match std::fs::metadata(&full) {
            Ok(meta) => Arc::new(ContentEntry::path(
                name.clone(),
                full,
                meta.is_dir(),
                &self.location,
                self.depth,
                &self.settings,
            )),
            Err(_) => {
                trace!("No {} in {}", name, self.location);
                self.settings.stats.record_negative_probe();
                self.missing(&name)
            }
        };
        if entry.is_missing() && !self.settings.config.cache_negative_probes {
            return entry;
        }

        // A racing probe may have inserted first; keep the winner
        Arc::clone(&entries.entry(name).or_insert(entry))
    }

    fn missing(&self, path: &str) -> Arc<ContentEntry> {
        Arc::new(ContentEntry::missing(
            path,
            &self.location,
            self.depth,
            &self.settings,
        ))
    }

    /// Resolve a multi-hop path by repeated single-hop lookups
    ///
    /// Each hop except the last must name a nested archive. An absent
    /// intermediate hop yields the not-found sentinel for the full path.
    pub fn resolve(self: &Arc<Self>, hops: &[String]) -> CacheResult<Arc<ContentEntry>> {
        let Some((last, intermediate)) = hops.split_last() else {
            return Err(CacheError::NotFound(self.location.to_string()));
        };

        let mut record = Arc::clone(self);
        for hop in intermediate {
            let entry = record.entry(hop);
            if entry.is_missing() {
                return Ok(record.missing(&hops.join("^/")));
            }
            record = entry.sub_archive()?;
        }
        Ok(record.entry(last))
    }

    /// Names of the known entries starting with `prefix`
    ///
    /// Packaged archives list in central directory order. On-demand
    /// directory roots only know the paths probed so far.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        match &self.index {
            RecordIndex::Packed { names, .. } => names
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect(),
            RecordIndex::Directory { entries, .. } => {
                let mut names: Vec<String> = entries
                    .iter()
                    .filter(|entry| entry.value().exists() && entry.key().starts_with(prefix))
                    .map(|entry| entry.key().clone())
                    .collect();
                names.sort();
                names
            }
        }
    }

    /// Number of known entries, aliases included
    pub fn len(&self) -> usize {
        match &self.index {
            RecordIndex::Packed { names, .. } => names.len(),
            RecordIndex::Directory { entries, .. } => {
                entries.iter().filter(|entry| entry.value().exists()).count()
            }
        }
    }

    /// Whether no entries are known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a relative path into a `/`-separated entry name
///
/// Rejects absolute paths and paths that climb out of the root.
fn relative_name(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

impl std::fmt::Debug for ArchiveRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRecord")
            .field("location", &self.location)
            .field("depth", &self.depth)
            .field("directory", &self.is_directory())
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use nestjar_formats::ZipBuilder;
    use pretty_assertions::assert_eq;

    fn settings(config: StoreConfig) -> Arc<LoadSettings> {
        Arc::new(LoadSettings {
            config,
            stats: Arc::default(),
        })
    }

    fn zip(entries: &[(&str, &[u8])]) -> Bytes {
        let mut builder = ZipBuilder::new();
        for (name, content) in entries {
            builder.add_deflated(name, content).unwrap();
        }
        Bytes::from(builder.finish().unwrap())
    }

    fn root() -> Location {
        Location::new_root("mem:app.jar").unwrap()
    }

    #[test]
    fn test_packed_lookup_and_missing() {
        let settings = settings(StoreConfig::default());
        let data = zip(&[("a/b.txt", b"one"), ("c.txt", b"two")]);
        let record = ArchiveRecord::packed(root(), data, None, 0, &settings).unwrap();

        assert_eq!(record.list(""), vec!["a/b.txt", "c.txt"]);
        assert_eq!(&record.entry("a/b.txt").bytes().unwrap()[..], b"one");
        assert_eq!(&record.entry("/c.txt").bytes().unwrap()[..], b"two");
        assert!(record.entry("zzz").is_missing());
        assert_eq!(settings.stats.snapshot().archives_parsed, 1);
    }

    #[test]
    fn test_dedup_aliases_share_entry() {
        let settings = settings(StoreConfig::default());
        let data = zip(&[
            ("lib/one/util.jar", b"same bytes"),
            ("lib/two/util.jar", b"same bytes"),
            ("lib/three/util.jar", b"other bytes"),
        ]);
        let record = ArchiveRecord::packed(root(), data, None, 0, &settings).unwrap();

        let one = record.entry("lib/one/util.jar");
        let two = record.entry("lib/two/util.jar");
        let three = record.entry("lib/three/util.jar");
        assert!(Arc::ptr_eq(&one, &two));
        assert!(!Arc::ptr_eq(&one, &three));
        assert_eq!(two.name(), "lib/one/util.jar");
        assert_eq!(
            record.canonical_name(&one.dedup_key().unwrap()),
            Some("lib/one/util.jar")
        );
        assert_eq!(settings.stats.snapshot().dedup_aliases, 1);
    }

    #[test]
    fn test_corrupt_archive_carries_location() {
        let settings = settings(StoreConfig::default());
        let err = ArchiveRecord::packed(
            root(),
            Bytes::from_static(b"not a zip"),
            None,
            0,
            &settings,
        )
        .unwrap_err();
        match err {
            CacheError::ArchiveParse { location, .. } => assert_eq!(location, root().as_archive()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_through_nested_archive() {
        let settings = settings(StoreConfig::default());
        let inner = zip(&[("pkg/Foo.class", b"\xCA\xFE\xBA\xBE")]);
        let mut outer = ZipBuilder::new();
        outer.add_stored("inner.zip", &inner).unwrap();
        let data = Bytes::from(outer.finish().unwrap());

        let record = ArchiveRecord::packed(root(), data, None, 0, &settings).unwrap();
        let hops = vec!["inner.zip".to_string(), "pkg/Foo.class".to_string()];
        let entry = record.resolve(&hops).unwrap();
        assert_eq!(&entry.bytes().unwrap()[..], b"\xCA\xFE\xBA\xBE");

        let missing = vec!["absent.zip".to_string(), "pkg/Foo.class".to_string()];
        assert!(record.resolve(&missing).unwrap().is_missing());
    }

    #[test]
    fn test_directory_probe_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/Foo.class"), b"foo").unwrap();

        let settings = settings(StoreConfig::default());
        let record = ArchiveRecord::directory(
            Location::new_root(dir.path().to_string_lossy()).unwrap(),
            dir.path().to_path_buf(),
            None,
            0,
            &settings,
        );

        assert!(record.entry("META-INF/MANIFEST.MF").is_missing());
        assert!(record.entry("../escape.txt").is_missing());
        assert_eq!(&record.entry("pkg/Foo.class").bytes().unwrap()[..], b"foo");
        assert!(record.entry("pkg").is_dir());
        assert_eq!(record.list("pkg"), vec!["pkg", "pkg/Foo.class"]);
        assert_eq!(settings.stats.snapshot().negative_probes, 1);
    }

    #[test]
    fn test_directory_eager_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/x.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("y.txt"), b"y").unwrap();

        let settings = settings(StoreConfig::new().with_directory_strategy(DirectoryStrategy::Eager));
        let record = ArchiveRecord::directory(
            Location::new_root(dir.path().to_string_lossy()).unwrap(),
            dir.path().to_path_buf(),
            None,
            0,
            &settings,
        );

        assert_eq!(record.list(""), vec!["a", "a/x.txt", "y.txt"]);
        assert!(record.entry("z.txt").is_missing());
    }
}
