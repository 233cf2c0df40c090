//! Root openers
//!
//! An opener turns the first segment of a location into content: either the
//! bytes of an outermost archive or a directory on disk. Openers are selected
//! by the scheme of the root locator.

use crate::error::{CacheError, CacheResult};
use bytes::Bytes;
use dashmap::DashMap;
use memmap2::MmapOptions;
use nestjar_formats::RootLocator;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Opened content of a root locator
#[derive(Debug, Clone)]
pub enum RootContent {
    /// Bytes of a packaged archive
    Archive {
        /// Whole archive
        data: Bytes,
        /// Modification time of the backing object
        modified: Option<SystemTime>,
    },
    /// Directory-style root
    Directory {
        /// Directory path
        path: PathBuf,
        /// Modification time of the directory
        modified: Option<SystemTime>,
    },
}

/// Source of root content for one scheme
pub trait RootOpener: Send + Sync {
    /// Open the root; absence must be reported as [`CacheError::NotFound`]
    fn open(&self, root: &RootLocator) -> CacheResult<RootContent>;
}

/// Opens filesystem paths, memory-mapping archive files
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemOpener;

impl FileSystemOpener {
    pub(crate) fn open_path(path: &Path) -> CacheResult<RootContent> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified().ok();

        if metadata.is_dir() {
            return Ok(RootContent::Directory {
                path: path.to_path_buf(),
                modified,
            });
        }

        // Empty files cannot be mapped
        if metadata.len() == 0 {
            return Ok(RootContent::Archive {
                data: Bytes::new(),
                modified,
            });
        }

        let file = File::open(path)?;
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        debug!("Mapped archive {} ({} bytes)", path.display(), mmap.len());

        Ok(RootContent::Archive {
            data: Bytes::from_owner(mmap),
            modified,
        })
    }
}

impl RootOpener for FileSystemOpener {
    fn open(&self, root: &RootLocator) -> CacheResult<RootContent> {
        match root {
            RootLocator::File(path) => Self::open_path(path),
            other => Err(CacheError::UnsupportedRoot(format!("{other:?}"))),
        }
    }
}

/// Registry of named in-memory archives, addressed as `mem:<name>`
#[derive(Debug, Default, Clone)]
pub struct MemoryOpener {
    archives: Arc<DashMap<String, (Bytes, SystemTime)>>,
}

impl MemoryOpener {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an archive
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.archives
            .insert(name.into(), (data.into(), SystemTime::now()));
    }

    /// Remove an archive
    pub fn remove(&self, name: &str) -> bool {
        self.archives.remove(name).is_some()
    }
}

impl RootOpener for MemoryOpener {
    fn open(&self, root: &RootLocator) -> CacheResult<RootContent> {
        let RootLocator::Memory(name) = root else {
            return Err(CacheError::UnsupportedRoot(format!("{root:?}")));
        };
        self.archives
            .get(name)
            .map(|entry| RootContent::Archive {
                data: entry.0.clone(),
                modified: Some(entry.1),
            })
            .ok_or_else(|| CacheError::NotFound(format!("mem:{name}")))
    }
}

/// Scheme-to-opener table
///
/// `file` is served by [`FileSystemOpener`] unless replaced.
pub struct OpenerRegistry {
    openers: RwLock<HashMap<String, Arc<dyn RootOpener>>>,
}

impl Default for OpenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenerRegistry {
    /// Create a registry with the filesystem opener installed
    pub fn new() -> Self {
        let mut openers: HashMap<String, Arc<dyn RootOpener>> = HashMap::new();
        openers.insert("file".to_string(), Arc::new(FileSystemOpener));
        Self {
            openers: RwLock::new(openers),
        }
    }

    /// Install an opener for a scheme, replacing any previous one
    pub fn register(&self, scheme: impl Into<String>, opener: Arc<dyn RootOpener>) {
        self.openers
            .write()
            .insert(scheme.into().to_ascii_lowercase(), opener);
    }

    /// Open a root with the opener for its scheme
    pub fn open(&self, root: &RootLocator) -> CacheResult<RootContent> {
        let opener = self
            .openers
            .read()
            .get(root.scheme())
            .cloned()
            .ok_or_else(|| CacheError::UnsupportedRoot(root.scheme().to_string()))?;
        opener.open(root)
    }
}

impl std::fmt::Debug for OpenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<String> = self.openers.read().keys().cloned().collect();
        schemes.sort();
        f.debug_struct("OpenerRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_opener_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.jar");
        std::fs::write(&file, b"PK-ish bytes").unwrap();

        match FileSystemOpener.open(&RootLocator::File(file)).unwrap() {
            RootContent::Archive { data, modified } => {
                assert_eq!(&data[..], b"PK-ish bytes");
                assert!(modified.is_some());
            }
            RootContent::Directory { .. } => panic!("expected archive"),
        }

        assert!(matches!(
            FileSystemOpener
                .open(&RootLocator::File(dir.path().to_path_buf()))
                .unwrap(),
            RootContent::Directory { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = FileSystemOpener
            .open(&RootLocator::File(PathBuf::from("/definitely/not/here.jar")))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = OpenerRegistry::new();
        let memory = MemoryOpener::new();
        memory.insert("a.zip", Bytes::from_static(b"data"));

        let root = RootLocator::Memory("a.zip".to_string());
        assert!(matches!(
            registry.open(&root),
            Err(CacheError::UnsupportedRoot(_))
        ));

        registry.register("mem", Arc::new(memory.clone()));
        assert!(registry.open(&root).is_ok());

        memory.remove("a.zip");
        assert!(registry.open(&root).unwrap_err().is_not_found());
    }
}
