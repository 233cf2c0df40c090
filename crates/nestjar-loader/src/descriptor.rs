//! Root descriptors
//!
//! Per-root facts that never change once discovered: the declared
//! companions, signer names and permissions. Descriptors do not hold archive
//! records; those always come from the active cache context.

use crate::companion::resolve_reference;
use crate::config::LoaderConfig;
use nestjar_cache::{
    ArchiveRecord, CacheError, CacheResult, NestedArchiveStore, Permission, PermissionCollection,
};
use nestjar_formats::{Location, Manifest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

const SIGNATURE_DIR: &str = "META-INF/";
const SIGNATURE_SUFFIX: &str = ".SF";

/// Loader-side state of one root
#[derive(Debug)]
pub struct RootDescriptor {
    location: Location,
    key: String,
    companions: OnceLock<Arc<[Location]>>,
    signers: OnceLock<Arc<[String]>>,
    permissions: OnceLock<PermissionCollection>,
    failed: AtomicBool,
}

impl RootDescriptor {
    pub(crate) fn new(location: &Location) -> Self {
        let location = location.as_archive();
        Self {
            key: location.canonical_key(),
            location,
            companions: OnceLock::new(),
            signers: OnceLock::new(),
            permissions: OnceLock::new(),
            failed: AtomicBool::new(false),
        }
    }

    /// Archive location of the root
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Key shared by every spelling of this root
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether companions have been read
    pub fn companions_probed(&self) -> bool {
        self.companions.get().is_some()
    }

    /// Open the root's record in the active cache context
    pub(crate) fn open(&self, store: &NestedArchiveStore) -> CacheResult<Arc<ArchiveRecord>> {
        store.open(&self.location)?.archive()
    }

    /// Log a failure to open this root, once per descriptor
    pub(crate) fn report_failure(&self, error: &CacheError) {
        if self.failed.swap(true, Ordering::Relaxed) {
            trace!("Skipping root {}: {}", self.location, error);
        } else {
            warn!("Skipping root {}: {}", self.location, error);
        }
    }

    /// Companions declared by the root, read once
    ///
    /// A missing or unreadable declaration means no companions.
    pub(crate) fn companions(
        &self,
        record: &ArchiveRecord,
        config: &LoaderConfig,
    ) -> Arc<[Location]> {
        Arc::clone(self.companions.get_or_init(|| {
            let entry = record.entry(&config.manifest_entry);
            if !entry.exists() {
                trace!("No companion declaration in {}", self.location);
                return Arc::from(Vec::new());
            }
            let data = match entry.bytes() {
                Ok(data) => data,
                Err(e) => {
                    warn!("Unreadable companion declaration in {}: {}", self.location, e);
                    return Arc::from(Vec::new());
                }
            };

            let is_directory = self.location.is_root() && record.is_directory();
            let mut companions = Vec::new();
            for reference in Manifest::parse(&data).class_path() {
                match resolve_reference(&self.location, is_directory, &reference) {
                    Some(companion) => companions.push(companion),
                    None => debug!(
                        "Ignoring companion reference {:?} of {}",
                        reference, self.location
                    ),
                }
            }
            debug!("{} declares {} companions", self.location, companions.len());
            companions.into()
        }))
    }

    /// Signer names: stems of `META-INF/*.SF` entries, sorted
    pub(crate) fn signers(&self, record: &ArchiveRecord) -> Arc<[String]> {
        Arc::clone(self.signers.get_or_init(|| {
            let names: Vec<String> = match record.directory_path() {
                Some(dir) => std::fs::read_dir(dir.join(SIGNATURE_DIR))
                    .map(|items| {
                        items
                            .flatten()
                            .map(|item| item.file_name().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default(),
                None => record
                    .list(SIGNATURE_DIR)
                    .into_iter()
                    .map(|name| name[SIGNATURE_DIR.len()..].to_string())
                    .collect(),
            };

            let mut signers: Vec<String> = names
                .iter()
                .filter(|name| !name.contains('/'))
                .filter_map(|name| {
                    let split = name.len().checked_sub(SIGNATURE_SUFFIX.len())?;
                    let (stem, suffix) = name.split_at_checked(split)?;
                    (suffix.eq_ignore_ascii_case(SIGNATURE_SUFFIX) && !stem.is_empty())
                        .then(|| stem.to_string())
                })
                .collect();
            signers.sort();
            signers.dedup();
            signers.into()
        }))
    }

    /// Permissions granted to content of this root
    ///
    /// Derived from the outermost enclosing location only.
    pub(crate) fn permissions(
        &self,
        store: &NestedArchiveStore,
    ) -> CacheResult<PermissionCollection> {
        if let Some(permissions) = self.permissions.get() {
            return Ok(permissions.clone());
        }

        let outermost = store.load_root(&self.location)?;
        let permissions: PermissionCollection =
            Permission::for_root(&self.location, outermost.is_directory())?
                .into_iter()
                .collect();
        Ok(self.permissions.get_or_init(|| permissions).clone())
    }
}
