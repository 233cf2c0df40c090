//! Root locator interpretation

use super::error::{LocationError, LocationResult};
use std::path::{Path, PathBuf};
use url::Url;

/// Interpreted form of a location's first segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootLocator {
    /// Filesystem path, from a plain path or a `file:` URL
    File(PathBuf),
    /// Named in-memory archive (`mem:<name>`)
    Memory(String),
    /// Network address (`<scheme>://host[:port]/path`)
    Remote {
        /// URL scheme, lowercase
        scheme: String,
        /// Host name or address
        host: String,
        /// Explicit or scheme-default port
        port: Option<u16>,
        /// Full URL text
        url: String,
    },
}

impl RootLocator {
    /// Interpret root locator text
    pub fn parse(text: &str) -> LocationResult<Self> {
        if text.is_empty() {
            return Err(LocationError::InvalidRoot(text.to_string()));
        }

        // Plain paths have no scheme; single-letter schemes are drive letters
        let url = match Url::parse(text) {
            Ok(url) if url.scheme().len() > 1 => url,
            _ => return Ok(Self::File(PathBuf::from(text))),
        };

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|()| LocationError::InvalidRoot(text.to_string())),
            "mem" => {
                let name = url.path();
                if name.is_empty() {
                    Err(LocationError::InvalidRoot(text.to_string()))
                } else {
                    Ok(Self::Memory(name.to_string()))
                }
            }
            scheme => {
                let host = url
                    .host_str()
                    .ok_or_else(|| LocationError::InvalidRoot(text.to_string()))?;
                Ok(Self::Remote {
                    scheme: scheme.to_string(),
                    host: host.to_string(),
                    port: url.port_or_known_default(),
                    url: url.to_string(),
                })
            }
        }
    }

    /// Scheme used to select an opener
    pub fn scheme(&self) -> &str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "mem",
            Self::Remote { scheme, .. } => scheme,
        }
    }

    /// Filesystem path for file roots
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }

    /// Whether the root is reached over the network
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}
