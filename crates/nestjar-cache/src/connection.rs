//! Archive store and connections
//!
//! [`NestedArchiveStore`] is the entry point of the crate: it opens roots
//! through the registered openers, caches their records in the active cache
//! context, and resolves locations to [`Connection`]s.

use crate::config::StoreConfig;
use crate::context::CacheContexts;
use crate::entry::{ContentEntry, LoadSettings};
use crate::error::{CacheError, CacheResult};
use crate::opener::{OpenerRegistry, RootOpener};
use crate::permission::{Permission, PermissionDescriptor};
use crate::record::ArchiveRecord;
use crate::stats::{LoadStats, LoadStatsSnapshot};
use bytes::Bytes;
use nestjar_formats::Location;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Content type of anything not recognized by name
pub const UNKNOWN_CONTENT_TYPE: &str = "content/unknown";

/// Content type guessed from an entry name
pub fn content_type_for(name: &str) -> &'static str {
    let name = name.trim_end_matches('/');
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "class" => "application/java-vm",
        "jar" => "application/java-archive",
        "zip" => "application/zip",
        "xml" => "application/xml",
        "txt" | "mf" => "text/plain",
        "properties" => "text/x-java-properties",
        _ => UNKNOWN_CONTENT_TYPE,
    }
}

/// Metadata reported by a [`Connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Content type guessed from the name
    pub content_type: &'static str,
    /// Content length in bytes
    pub length: u64,
    /// Modification time, when known
    pub last_modified: Option<SystemTime>,
}

/// Store of nested archive records
pub struct NestedArchiveStore {
    settings: Arc<LoadSettings>,
    openers: OpenerRegistry,
    contexts: Arc<CacheContexts>,
}

impl NestedArchiveStore {
    /// Create a store with its own context manager
    pub fn new(config: StoreConfig) -> CacheResult<Self> {
        Self::with_contexts(config, Arc::new(CacheContexts::new()))
    }

    /// Create a store whose records live in the process-wide context manager
    pub fn shared(config: StoreConfig) -> CacheResult<Self> {
        Self::with_contexts(config, CacheContexts::global())
    }

    /// Create a store on an existing context manager
    pub fn with_contexts(config: StoreConfig, contexts: Arc<CacheContexts>) -> CacheResult<Self> {
        config.validate().map_err(CacheError::InvalidConfiguration)?;
        Ok(Self {
            settings: Arc::new(LoadSettings {
                config,
                stats: Arc::new(LoadStats::new()),
            }),
            openers: OpenerRegistry::new(),
            contexts,
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.settings.config
    }

    /// Install an opener for a root scheme
    pub fn register_opener(&self, scheme: impl Into<String>, opener: Arc<dyn RootOpener>) {
        self.openers.register(scheme, opener);
    }

    /// Context manager holding this store's records
    pub fn contexts(&self) -> &Arc<CacheContexts> {
        &self.contexts
    }

    /// Load counters
    pub fn stats(&self) -> LoadStatsSnapshot {
        self.settings.stats.snapshot()
    }

    /// Record of the root of `location`, loading it into the active context
    /// when absent
    pub fn load_root(&self, location: &Location) -> CacheResult<Arc<ArchiveRecord>> {
        let root = location.root();
        let key = root.canonical_key();
        let context = self.contexts.current();

        let (record, hit) = context.get_or_load(&key, || {
            let locator = root.parse_root_locator()?;
            let content = self.openers.open(&locator)?;
            debug!("Opened root {} in context {}", root, context.id());
            ArchiveRecord::from_content(root.clone(), content, 0, &self.settings)
        })?;
        self.settings.stats.record_context_lookup(hit);
        Ok(record)
    }

    /// Open a connection to `location`
    ///
    /// Absent resources still produce a connection; reading from it fails
    /// with [`CacheError::NotFound`].
    pub fn open(&self, location: &Location) -> CacheResult<Connection> {
        let root = self.load_root(location)?;
        let entry = if location.is_root() {
            None
        } else {
            Some(root.resolve(location.hops())?)
        };
        Ok(Connection {
            location: location.clone(),
            root,
            entry,
        })
    }

    /// Evict the root of `location` from the active context
    pub fn unload(&self, location: &Location) -> bool {
        self.contexts.unload(location)
    }
}

impl std::fmt::Debug for NestedArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedArchiveStore")
            .field("config", &self.settings.config)
            .field("openers", &self.openers)
            .finish_non_exhaustive()
    }
}

/// Read-only view of one addressed resource or archive
#[derive(Debug, Clone)]
pub struct Connection {
    location: Location,
    root: Arc<ArchiveRecord>,
    /// Resolved entry; `None` when the location is a bare root
    entry: Option<Arc<ContentEntry>>,
}

impl Connection {
    /// Location this connection was opened for
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Record of the outermost enclosing archive
    pub fn root(&self) -> &Arc<ArchiveRecord> {
        &self.root
    }

    /// Resolved entry, absent for a bare root
    pub fn entry(&self) -> Option<&Arc<ContentEntry>> {
        self.entry.as_ref()
    }

    /// Whether the addressed resource exists
    pub fn exists(&self) -> bool {
        self.entry.as_ref().is_none_or(|entry| entry.exists())
    }

    /// Content type, length and modification time
    pub fn metadata(&self) -> CacheResult<ResourceMetadata> {
        let name = self
            .location
            .segments()
            .last()
            .map_or("", String::as_str);
        let content_type = content_type_for(name);

        match &self.entry {
            None => Ok(ResourceMetadata {
                content_type,
                length: self.root.data().len() as u64,
                last_modified: self.root.last_modified(),
            }),
            Some(entry) => {
                let meta = entry.metadata()?;
                Ok(ResourceMetadata {
                    content_type: if meta.is_dir {
                        UNKNOWN_CONTENT_TYPE
                    } else {
                        content_type
                    },
                    length: meta.size,
                    last_modified: meta.last_modified,
                })
            }
        }
    }

    /// Content of the addressed resource
    ///
    /// For archive locations this is the archive's own bytes.
    pub fn bytes(&self) -> CacheResult<Bytes> {
        match &self.entry {
            None => Ok(self.root.data()),
            Some(entry) => entry.bytes(),
        }
    }

    /// The addressed archive, opened as a record
    pub fn archive(&self) -> CacheResult<Arc<ArchiveRecord>> {
        match &self.entry {
            None => Ok(Arc::clone(&self.root)),
            Some(entry) => entry.sub_archive(),
        }
    }

    /// Permission of the outermost enclosing location
    pub fn permission_hint(&self) -> CacheResult<PermissionDescriptor> {
        let origin = self.location.root();
        let permission = Permission::for_root(&origin, self.root.is_directory())?;
        Ok(PermissionDescriptor { origin, permission })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::opener::MemoryOpener;
    use nestjar_formats::ZipBuilder;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("pkg/Foo.class"), "application/java-vm");
        assert_eq!(content_type_for("lib/a.JAR"), "application/java-archive");
        assert_eq!(content_type_for("META-INF/MANIFEST.MF"), "text/plain");
        assert_eq!(content_type_for("README"), UNKNOWN_CONTENT_TYPE);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = NestedArchiveStore::new(StoreConfig::new().with_max_nesting_depth(0)).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_open_memory_root() {
        let mut builder = ZipBuilder::new();
        builder.add_deflated("conf/app.properties", b"a=1\n").unwrap();
        let memory = MemoryOpener::new();
        memory.insert("app.jar", builder.finish().unwrap());

        let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
        store.register_opener("mem", Arc::new(memory));

        let root = Location::new_root("mem:app.jar").unwrap();
        let conn = store.open(&root.join("conf/app.properties").unwrap()).unwrap();
        assert_eq!(&conn.bytes().unwrap()[..], b"a=1\n");
        let meta = conn.metadata().unwrap();
        assert_eq!(meta.content_type, "text/x-java-properties");
        assert_eq!(meta.length, 4);
        assert_eq!(conn.permission_hint().unwrap().permission, None);

        let missing = store.open(&root.join("nope").unwrap()).unwrap();
        assert!(!missing.exists());
        assert!(missing.bytes().unwrap_err().is_not_found());

        let whole = store.open(&root).unwrap();
        assert!(whole.exists());
        assert_eq!(whole.metadata().unwrap().content_type, "application/java-archive");
    }

    #[test]
    fn test_unsupported_root_scheme() {
        let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
        let location = Location::new_root("ftp://example.com/app.jar").unwrap();
        let err = store.open(&location).unwrap_err();
        assert!(matches!(err.cause(), CacheError::UnsupportedRoot(_)));
    }
}
