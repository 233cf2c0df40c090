//! Permissions implied by archive origins
//!
//! Nested content never earns permissions of its own: everything inside an
//! archive is evaluated under the permission of the outermost root it was
//! reached through.

use crate::error::{CacheError, CacheResult};
use nestjar_formats::{Location, RootLocator};
use std::fmt;
use std::path::MAIN_SEPARATOR;

/// Action granted on file permissions
pub const READ_ACTION: &str = "read";

/// Suffix that extends a directory grant to everything below it
pub const RECURSIVE_SUFFIX: &str = "-";

/// One grant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Filesystem access; a path ending in `/-` covers the whole tree below it
    File {
        /// Path, possibly with the recursive suffix
        path: String,
        /// Comma-separated actions
        actions: String,
    },
    /// Network access to one host
    Connect {
        /// Host name, lowercase
        host: String,
        /// Port, or any port when absent
        port: Option<u16>,
    },
}

impl Permission {
    /// Read access to a single file
    pub fn read_file(path: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            actions: READ_ACTION.to_string(),
        }
    }

    /// Recursive read access to a directory tree
    pub fn read_tree(dir: &str) -> Self {
        let dir = dir.trim_end_matches(['/', MAIN_SEPARATOR]);
        Self::read_file(format!("{dir}{MAIN_SEPARATOR}{RECURSIVE_SUFFIX}"))
    }

    /// Connect access to a host
    pub fn connect(host: &str, port: Option<u16>) -> Self {
        Self::Connect {
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Permission implied by the root of `location`
    ///
    /// In-memory roots imply nothing. Relative file roots are granted by
    /// their absolute path.
    pub fn for_root(location: &Location, is_directory: bool) -> CacheResult<Option<Self>> {
        let permission = match location.parse_root_locator()? {
            RootLocator::File(path) => {
                let path = std::path::absolute(&path)?;
                let path = path.to_string_lossy();
                Some(if is_directory {
                    Self::read_tree(&path)
                } else {
                    Self::read_file(path)
                })
            }
            RootLocator::Remote { host, port, .. } => Some(Self::connect(&host, port)),
            RootLocator::Memory(_) => None,
        };
        Ok(permission)
    }

    /// Whether holding `self` grants `other`
    pub fn implies(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::File { path, actions },
                Self::File {
                    path: other_path,
                    actions: other_actions,
                },
            ) => actions_cover(actions, other_actions) && path_covers(path, other_path),
            (
                Self::Connect { host, port },
                Self::Connect {
                    host: other_host,
                    port: other_port,
                },
            ) => host.eq_ignore_ascii_case(other_host) && (port.is_none() || port == other_port),
            _ => false,
        }
    }
}

fn actions_cover(granted: &str, requested: &str) -> bool {
    requested
        .split(',')
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .all(|action| granted.split(',').any(|g| g.trim() == action))
}

fn path_covers(granted: &str, requested: &str) -> bool {
    if granted == requested {
        return true;
    }
    let Some(dir) = granted.strip_suffix(RECURSIVE_SUFFIX) else {
        return false;
    };
    if !dir.ends_with(['/', MAIN_SEPARATOR]) {
        return false;
    }
    // The directory itself is covered as well as everything below it
    requested.starts_with(dir) || requested == dir.trim_end_matches(['/', MAIN_SEPARATOR])
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, actions } => write!(f, "file \"{path}\" {actions}"),
            Self::Connect {
                host,
                port: Some(port),
            } => write!(f, "connect {host}:{port}"),
            Self::Connect { host, port: None } => write!(f, "connect {host}"),
        }
    }
}

/// Set of grants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCollection {
    permissions: Vec<Permission>,
}

impl PermissionCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant; duplicates are ignored
    pub fn add(&mut self, permission: Permission) {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
    }

    /// Whether any grant implies `permission`
    pub fn implies(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p.implies(permission))
    }

    /// Fail with [`CacheError::PermissionDenied`] unless `permission` is implied
    pub fn check(&self, permission: &Permission) -> CacheResult<()> {
        if self.implies(permission) {
            Ok(())
        } else {
            Err(CacheError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    /// Grants in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    /// Number of grants
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

impl FromIterator<Permission> for PermissionCollection {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut collection = Self::new();
        for permission in iter {
            collection.add(permission);
        }
        collection
    }
}

/// Permission of the outermost origin of a nested resource
///
/// A security layer evaluates nested content under the policy granted to
/// `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDescriptor {
    /// Outermost enclosing location
    pub origin: Location,
    /// Implied permission, if the origin implies any
    pub permission: Option<Permission>,
}

impl PermissionDescriptor {
    /// Check the descriptor against a granted collection
    pub fn check(&self, granted: &PermissionCollection) -> CacheResult<()> {
        match &self.permission {
            Some(permission) => granted.check(permission),
            None => Ok(()),
        }
    }
}
