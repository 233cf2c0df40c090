//! Store configuration
//!
//! Tunables for archive parsing and directory probing, with sensible
//! defaults and validation.

use serde::{Deserialize, Serialize};

/// How directory-style roots are indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryStrategy {
    /// Only probed paths are looked up on disk
    #[default]
    OnDemand,
    /// The whole tree is listed when the root is loaded
    Eager,
}

/// Archive store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Verify CRC-32 of every inflated entry
    pub verify_checksums: bool,
    /// Refuse to read entries that declare more bytes than this
    pub max_entry_size: u64,
    /// Maximum number of archive hops below a root
    pub max_nesting_depth: usize,
    /// Indexing strategy for directory roots
    pub directory_strategy: DirectoryStrategy,
    /// Remember paths that were probed and found absent
    pub cache_negative_probes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            max_entry_size: 256 * 1024 * 1024, // 256 MiB
            max_nesting_depth: 16,
            directory_strategy: DirectoryStrategy::OnDemand,
            cache_negative_probes: true,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable CRC-32 verification
    #[must_use]
    pub const fn with_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the per-entry size limit
    #[must_use]
    pub const fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    /// Set the nesting depth limit
    #[must_use]
    pub const fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set the directory indexing strategy
    #[must_use]
    pub const fn with_directory_strategy(mut self, strategy: DirectoryStrategy) -> Self {
        self.directory_strategy = strategy;
        self
    }

    /// Enable or disable caching of negative probes
    #[must_use]
    pub const fn with_negative_probe_cache(mut self, enable: bool) -> Self {
        self.cache_negative_probes = enable;
        self
    }

    /// Read a configuration from JSON; missing fields take defaults
    pub fn from_json(text: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entry_size == 0 {
            return Err("max_entry_size must be greater than 0".to_string());
        }
        if self.max_nesting_depth == 0 {
            return Err("max_nesting_depth must be greater than 0".to_string());
        }
        Ok(())
    }
}
