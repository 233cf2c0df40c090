//! Class units
//!
//! A [`ClassUnit`] resolves resource and class names across an ordered list
//! of roots and their companions. Each class name is defined at most once
//! per unit; later requests return the same [`DefinedUnit`].

use crate::config::LoaderConfig;
use crate::descriptor::RootDescriptor;
use crate::error::{LoaderError, LoaderResult};
use crate::probe::{ProbedRoot, RootProbe};
use bytes::Bytes;
use dashmap::DashMap;
use nestjar_cache::{CacheError, NestedArchiveStore, PermissionCollection};
use nestjar_formats::Location;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Map a binary class name to its resource path
///
/// `com.example.Foo$Inner` becomes `com/example/Foo$Inner.class`.
pub fn class_resource_name(name: &str, suffix: &str) -> LoaderResult<String> {
    let invalid = || LoaderError::InvalidClassName(name.to_string());
    if name.is_empty()
        || name.contains('/')
        || name.starts_with('.')
        || name.ends_with('.')
        || name.contains("..")
    {
        return Err(invalid());
    }
    Ok(format!("{}{suffix}", name.replace('.', "/")))
}

/// A class resolved from bytes, ready for the embedding runtime to define
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedUnit {
    /// Binary class name
    pub name: String,
    /// Class file bytes
    pub bytes: Bytes,
    /// Location the bytes were read from
    pub resource: Location,
    /// Root that provided the class
    pub origin: Location,
    /// Signer names of the providing root
    pub signers: Arc<[String]>,
    /// Permissions of the providing root's outermost origin
    pub permissions: PermissionCollection,
}

type DefinitionSlot = Arc<Mutex<Option<Arc<DefinedUnit>>>>;

/// Loading unit over an ordered list of roots
pub struct ClassUnit {
    store: Arc<NestedArchiveStore>,
    roots: Vec<Location>,
    config: LoaderConfig,
    descriptors: DashMap<String, Arc<RootDescriptor>>,
    defined: DashMap<String, DefinitionSlot>,
}

impl ClassUnit {
    /// Create a unit over `roots`, in probe order
    ///
    /// The first root is the primary root and is opened immediately; failing
    /// to open it is fatal. An empty root list yields a unit that finds
    /// nothing.
    pub fn new(
        store: Arc<NestedArchiveStore>,
        roots: Vec<Location>,
        config: LoaderConfig,
    ) -> LoaderResult<Self> {
        config.validate().map_err(LoaderError::InvalidConfiguration)?;
        let roots: Vec<Location> = roots.iter().map(Location::as_archive).collect();
        let unit = Self {
            store,
            roots,
            config,
            descriptors: DashMap::new(),
            defined: DashMap::new(),
        };

        if let Some(primary) = unit.roots.first() {
            let descriptor = unit.descriptor(primary);
            descriptor
                .open(&unit.store)
                .map_err(|source| LoaderError::PrimaryRoot {
                    location: primary.clone(),
                    source,
                })?;
            debug!("Opened primary root {}", primary);
        }
        Ok(unit)
    }

    /// Declared roots, as archive locations
    pub fn roots(&self) -> &[Location] {
        &self.roots
    }

    /// Loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Underlying archive store
    pub fn store(&self) -> &Arc<NestedArchiveStore> {
        &self.store
    }

    /// Descriptor for a root, shared by every spelling of its location
    pub fn descriptor(&self, location: &Location) -> Arc<RootDescriptor> {
        let key = location.canonical_key();
        if let Some(descriptor) = self.descriptors.get(&key) {
            return Arc::clone(&descriptor);
        }
        Arc::clone(
            &self
                .descriptors
                .entry(key)
                .or_insert_with(|| Arc::new(RootDescriptor::new(location))),
        )
    }

    pub(crate) fn is_primary(&self, descriptor: &RootDescriptor) -> bool {
        self.roots
            .first()
            .is_some_and(|primary| primary.canonical_key() == descriptor.key())
    }

    /// Opened roots in probe order
    pub fn probe(&self) -> RootProbe<'_> {
        RootProbe::new(self)
    }

    fn find_entry(&self, path: &str) -> LoaderResult<Option<(ProbedRoot, Location)>> {
        for probed in self.probe() {
            let probed = probed?;
            let entry = probed.record.entry(path);
            if entry.exists() {
                let location = probed.descriptor.location().join(path).map_err(CacheError::from)?;
                return Ok(Some((probed, location)));
            }
        }
        trace!("{} not found in any root", path);
        Ok(None)
    }

    /// Bytes of the first resource named `name`, in probe order
    pub fn resolve_resource(&self, name: &str) -> LoaderResult<Option<Bytes>> {
        match self.find_entry(name)? {
            Some((probed, _)) => Ok(Some(probed.record.entry(name).bytes()?)),
            None => Ok(None),
        }
    }

    /// Location of the first resource named `name`, in probe order
    pub fn find_resource(&self, name: &str) -> LoaderResult<Option<Location>> {
        Ok(self.find_entry(name)?.map(|(_, location)| location))
    }

    /// Every location providing `name`, in probe order
    pub fn find_all_resources<'a>(&'a self, name: &str) -> Resources<'a> {
        Resources {
            unit: self,
            name: name.trim_start_matches('/').to_string(),
        }
    }

    /// Resolve and define a class, at most once per name
    ///
    /// Failed lookups leave nothing behind; the next call searches again.
    pub fn resolve_class(&self, name: &str) -> LoaderResult<Arc<DefinedUnit>> {
        let path = class_resource_name(name, &self.config.class_suffix)?;

        loop {
            let cell: DefinitionSlot = Arc::clone(&self.defined.entry(name.to_string()).or_default());
            let mut slot = cell.lock();
            if let Some(defined) = slot.as_ref() {
                return Ok(Arc::clone(defined));
            }
            // A failed lookup may have dropped this cell while we waited
            if !self.owns_slot(name, &cell) {
                continue;
            }

            return match self.define(name, &path) {
                Ok(defined) => {
                    *slot = Some(Arc::clone(&defined));
                    Ok(defined)
                }
                Err(e) => {
                    self.defined
                        .remove_if(name, |_, current| Arc::ptr_eq(current, &cell));
                    Err(e)
                }
            };
        }
    }

    fn define(&self, name: &str, path: &str) -> LoaderResult<Arc<DefinedUnit>> {
        let Some((probed, resource)) = self.find_entry(path)? else {
            return Err(LoaderError::ClassNotFound(name.to_string()));
        };
        let bytes = probed.record.entry(path).bytes()?;
        let defined = Arc::new(DefinedUnit {
            name: name.to_string(),
            bytes,
            resource,
            origin: probed.descriptor.location().clone(),
            signers: probed.descriptor.signers(&probed.record),
            permissions: probed.descriptor.permissions(&self.store)?,
        });
        debug!("Defined {} from {}", name, defined.origin);
        Ok(defined)
    }

    fn owns_slot(&self, name: &str, cell: &DefinitionSlot) -> bool {
        self.defined
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(&current, cell))
    }

    /// Bytes of a class
    pub fn load_class(&self, name: &str) -> LoaderResult<Bytes> {
        Ok(self.resolve_class(name)?.bytes.clone())
    }

    /// Whether a class has already been defined
    pub fn is_defined(&self, name: &str) -> bool {
        let cell = self.defined.get(name).map(|slot| Arc::clone(&slot));
        cell.is_some_and(|slot| slot.lock().is_some())
    }

    /// Number of classes defined so far
    pub fn defined_count(&self) -> usize {
        let cells: Vec<DefinitionSlot> = self.defined.iter().map(|slot| Arc::clone(&slot)).collect();
        cells.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Permissions granted to content of `root`
    ///
    /// Only the outermost enclosing location contributes; nested hops add
    /// nothing.
    pub fn permissions_for(&self, root: &Location) -> LoaderResult<PermissionCollection> {
        Ok(self.descriptor(root).permissions(&self.store)?)
    }

    /// [`load_class`](Self::load_class) on the blocking pool, inside the
    /// caller's cache context
    pub async fn load_class_async(self: &Arc<Self>, name: &str) -> LoaderResult<Bytes> {
        let unit = Arc::clone(self);
        let name = name.to_string();
        self.run_blocking(move || unit.load_class(&name)).await
    }

    /// [`find_resource`](Self::find_resource) on the blocking pool, inside
    /// the caller's cache context
    pub async fn find_resource_async(self: &Arc<Self>, name: &str) -> LoaderResult<Option<Location>> {
        let unit = Arc::clone(self);
        let name = name.to_string();
        self.run_blocking(move || unit.find_resource(&name)).await
    }

    async fn run_blocking<T, F>(&self, f: F) -> LoaderResult<T>
    where
        F: FnOnce() -> LoaderResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let carrier = self.store.contexts().carrier();
        tokio::task::spawn_blocking(move || {
            let _guard = carrier.install();
            f()
        })
        .await
        .map_err(|e| LoaderError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for ClassUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassUnit")
            .field("roots", &self.roots)
            .field("config", &self.config)
            .field("defined", &self.defined.len())
            .finish_non_exhaustive()
    }
}

/// Restartable sequence of the locations providing one resource name
///
/// Every call to [`iter`](Self::iter) probes the roots again; records come
/// from the active cache context, so repeated iteration stays warm.
#[derive(Debug, Clone)]
pub struct Resources<'a> {
    unit: &'a ClassUnit,
    name: String,
}

impl<'a> Resources<'a> {
    /// Resource name being looked up
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lazily probe the roots
    pub fn iter(&self) -> impl Iterator<Item = LoaderResult<Location>> + 'a {
        let name = self.name.clone();
        self.unit.probe().filter_map(move |probed| match probed {
            Ok(probed) => {
                if !probed.record.entry(&name).exists() {
                    return None;
                }
                Some(
                    probed
                        .descriptor
                        .location()
                        .join(&name)
                        .map_err(|e| LoaderError::Cache(e.into())),
                )
            }
            Err(e) => Some(Err(e)),
        })
    }

    /// Collect every location, failing on the first error
    pub fn collect_all(&self) -> LoaderResult<Vec<Location>> {
        self.iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_class_resource_name() {
        assert_eq!(
            class_resource_name("com.example.Foo", ".class").unwrap(),
            "com/example/Foo.class"
        );
        assert_eq!(
            class_resource_name("com.example.Foo$Inner", ".class").unwrap(),
            "com/example/Foo$Inner.class"
        );
        assert_eq!(class_resource_name("Foo", ".class").unwrap(), "Foo.class");

        for bad in ["", "com/example/Foo", "com.example.", ".Foo", "a..b"] {
            assert!(matches!(
                class_resource_name(bad, ".class"),
                Err(LoaderError::InvalidClassName(_))
            ));
        }
    }
}
