//! Loader configuration

use nestjar_formats::manifest::MANIFEST_PATH;
use serde::{Deserialize, Serialize};

/// Class unit configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Follow companion references declared by roots
    pub follow_companions: bool,
    /// Entry holding the companion declaration
    pub manifest_entry: String,
    /// Suffix appended to class resource names
    pub class_suffix: String,
    /// Maximum companion generations below a declared root
    pub max_companion_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            follow_companions: true,
            manifest_entry: MANIFEST_PATH.to_string(),
            class_suffix: ".class".to_string(),
            max_companion_depth: 32,
        }
    }
}

impl LoaderConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable companion discovery
    #[must_use]
    pub const fn with_companions(mut self, follow: bool) -> Self {
        self.follow_companions = follow;
        self
    }

    /// Set the companion declaration entry
    #[must_use]
    pub fn with_manifest_entry(mut self, entry: impl Into<String>) -> Self {
        self.manifest_entry = entry.into();
        self
    }

    /// Set the class resource suffix
    #[must_use]
    pub fn with_class_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.class_suffix = suffix.into();
        self
    }

    /// Set the companion depth limit
    #[must_use]
    pub const fn with_max_companion_depth(mut self, depth: usize) -> Self {
        self.max_companion_depth = depth;
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
        if self.manifest_entry.is_empty() {
            return Err("manifest_entry must not be empty".to_string());
        }
        if self.class_suffix.contains('/') {
            return Err("class_suffix must not contain '/'".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.follow_companions);
        assert_eq!(config.manifest_entry, "META-INF/MANIFEST.MF");
        assert_eq!(config.max_companion_depth, 32);
    }

    #[test]
    fn test_from_json() {
        let config = LoaderConfig::from_json(r#"{"follow_companions": false}"#).unwrap();
        assert!(!config.follow_companions);
        assert_eq!(config.class_suffix, ".class");

        assert!(LoaderConfig::from_json(r#"{"manifest_entry": ""}"#).is_err());
    }
}
