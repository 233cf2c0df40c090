//! Nested archive addressing
//!
//! A [`Location`] is an ordered, non-empty list of segments. Segment 0 is a
//! root locator (a filesystem path, a `file:` URL, an in-memory name or a
//! network address); every later segment is a path relative to the archive
//! named by the prefix before it.
//!
//! Locations are immutable values. Composing never mutates the base.

mod error;
mod root;

pub use error::{LocationError, LocationResult};
pub use root::RootLocator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Scheme prefix of the external form
pub const SCHEME: &str = "nested";

/// Segment delimiter of the external form.
///
/// Distinct from the `!/` separator used by single-level jar URLs, so a jar
/// URL can appear verbatim as a root locator.
pub const SEGMENT_DELIMITER: &str = "^/";

const SCHEME_PREFIX: &str = "nested:";

/// Address of a resource or archive at any nesting depth
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    segments: Arc<[String]>,
    /// Last segment is absent: the location denotes the archive itself
    archive: bool,
}

impl Location {
    /// Create a location that names an outermost archive
    pub fn new_root(locator: impl Into<String>) -> LocationResult<Self> {
        let locator = locator.into();
        validate_segment(&locator)?;
        Ok(Self {
            segments: Arc::from(vec![locator]),
            archive: false,
        })
    }

    /// Append a segment, or mark the location as an archive when `segment` is `None`
    pub fn compose(&self, segment: Option<&str>) -> LocationResult<Self> {
        let Some(segment) = segment else {
            return Ok(Self {
                segments: Arc::clone(&self.segments),
                archive: true,
            });
        };

        validate_segment(segment)?;
        let mut segments = self.segments.to_vec();
        segments.push(segment.to_string());
        Ok(Self {
            segments: segments.into(),
            archive: false,
        })
    }

    /// Append a resource path segment
    pub fn join(&self, segment: &str) -> LocationResult<Self> {
        self.compose(Some(segment))
    }

    /// The same location, addressing the archive itself
    pub fn as_archive(&self) -> Self {
        Self {
            segments: Arc::clone(&self.segments),
            archive: true,
        }
    }

    /// Parse the external form
    pub fn parse(text: &str) -> LocationResult<Self> {
        let body = text
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| LocationError::MissingScheme(text.to_string()))?;

        let mut parts: Vec<&str> = body.split(SEGMENT_DELIMITER).collect();
        if parts.first().is_none_or(|root| root.is_empty()) {
            return Err(LocationError::MissingRoot(text.to_string()));
        }

        let archive = parts.len() > 1 && parts.last().is_some_and(|last| last.is_empty());
        if archive {
            parts.pop();
        }

        let mut segments = Vec::with_capacity(parts.len());
        for (position, part) in parts.into_iter().enumerate() {
            if part.is_empty() {
                return Err(LocationError::EmptySegment {
                    position,
                    text: text.to_string(),
                });
            }
            validate_segment(part)?;
            segments.push(part.to_string());
        }

        Ok(Self {
            segments: segments.into(),
            archive,
        })
    }

    /// First-segment-only location naming the outermost enclosing archive
    pub fn root(&self) -> Self {
        Self {
            segments: Arc::from(vec![self.segments[0].clone()]),
            archive: false,
        }
    }

    /// Canonical, round-trippable string form
    pub fn external_form(&self) -> String {
        let mut out = String::with_capacity(
            SCHEME_PREFIX.len() + self.segments.iter().map(|s| s.len() + 2).sum::<usize>(),
        );
        out.push_str(SCHEME_PREFIX);
        out.push_str(&self.segments.join(SEGMENT_DELIMITER));
        if self.archive {
            out.push_str(SEGMENT_DELIMITER);
        }
        out
    }

    /// Key shared by every spelling of the same addressed archive or resource
    ///
    /// Ignores the archive marker, so `nested:a.jar` and `nested:a.jar^/`
    /// produce the same key.
    pub fn canonical_key(&self) -> String {
        format!("{SCHEME_PREFIX}{}", self.segments.join(SEGMENT_DELIMITER))
    }

    /// Root locator text (segment 0)
    pub fn root_locator(&self) -> &str {
        &self.segments[0]
    }

    /// Parsed root locator
    pub fn parse_root_locator(&self) -> LocationResult<RootLocator> {
        RootLocator::parse(&self.segments[0])
    }

    /// Segments after the root, outermost first
    pub fn hops(&self) -> &[String] {
        &self.segments[1..]
    }

    /// All segments including the root
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of archive hops below the root
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// Whether the location denotes an archive rather than a resource inside one
    pub fn is_archive(&self) -> bool {
        self.archive
    }

    /// Whether this is a bare root locator
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Last segment, absent when the location denotes an archive
    pub fn last_segment(&self) -> Option<&str> {
        if self.archive {
            None
        } else {
            self.segments.last().map(String::as_str)
        }
    }

    /// Location with the last hop removed, as an archive
    ///
    /// Returns `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let segments = &self.segments[..self.segments.len() - 1];
        Some(Self {
            segments: segments.to_vec().into(),
            archive: true,
        })
    }
}

fn validate_segment(segment: &str) -> LocationResult<()> {
    if segment.is_empty() {
        return Err(LocationError::EmptySegment {
            position: 0,
            text: String::new(),
        });
    }
    if segment.starts_with(SCHEME_PREFIX) {
        return Err(LocationError::SelfNesting(segment.to_string()));
    }
    if segment.contains(SEGMENT_DELIMITER) {
        return Err(LocationError::ReservedDelimiter(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external_form())
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", self.external_form())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compose_and_external_form() {
        let root = Location::new_root("/data/outer.zip").unwrap();
        let inner = root.join("inner.zip").unwrap();
        let class = inner.join("pkg/Foo.class").unwrap();

        assert_eq!(
            class.external_form(),
            "nested:/data/outer.zip^/inner.zip^/pkg/Foo.class"
        );
        assert_eq!(class.depth(), 2);
        assert_eq!(class.last_segment(), Some("pkg/Foo.class"));
        assert_eq!(class.root(), root);

        // Composing never mutates the base
        assert_eq!(root.external_form(), "nested:/data/outer.zip");
    }

    #[test]
    fn test_archive_form() {
        let inner = Location::new_root("outer.zip")
            .unwrap()
            .join("inner.zip")
            .unwrap()
            .compose(None)
            .unwrap();

        assert!(inner.is_archive());
        assert_eq!(inner.last_segment(), None);
        assert_eq!(inner.external_form(), "nested:outer.zip^/inner.zip^/");
        assert_eq!(Location::parse("nested:outer.zip^/inner.zip^/").unwrap(), inner);
        assert_eq!(
            inner.canonical_key(),
            Location::parse("nested:outer.zip^/inner.zip")
                .unwrap()
                .canonical_key()
        );
    }

    #[test]
    fn test_join_after_archive_form_appends_hop() {
        let archive = Location::parse("nested:a.zip^/b.jar^/").unwrap();
        let resource = archive.join("x/y.txt").unwrap();
        assert_eq!(resource.external_form(), "nested:a.zip^/b.jar^/x/y.txt");
        assert!(!resource.is_archive());
    }

    #[test]
    fn test_compose_rejects_self_nesting() {
        let root = Location::new_root("a.zip").unwrap();
        assert!(matches!(
            root.join("nested:b.zip"),
            Err(LocationError::SelfNesting(_))
        ));
        assert!(matches!(
            root.join("b.zip^/c.txt"),
            Err(LocationError::ReservedDelimiter(_))
        ));
        assert!(root.join("").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_root() {
        assert!(matches!(
            Location::parse("nested:^/a.txt"),
            Err(LocationError::MissingRoot(_))
        ));
        assert!(matches!(
            Location::parse("nested:"),
            Err(LocationError::MissingRoot(_))
        ));
        assert!(matches!(
            Location::parse("jar:file:/a.jar!/b"),
            Err(LocationError::MissingScheme(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_interior_segment() {
        assert!(matches!(
            Location::parse("nested:a.zip^/^/b.txt"),
            Err(LocationError::EmptySegment { position: 1, .. })
        ));
    }

    #[test]
    fn test_jar_url_root_is_preserved() {
        let loc = Location::parse("nested:jar:file:/a.jar!/lib/b.jar^/c.txt").unwrap();
        assert_eq!(loc.root_locator(), "jar:file:/a.jar!/lib/b.jar");
        assert_eq!(loc.hops(), ["c.txt".to_string()]);
    }

    #[test]
    fn test_parent() {
        let loc = Location::parse("nested:a.zip^/b.jar^/c.txt").unwrap();
        let parent = loc.parent().unwrap();
        assert_eq!(parent.external_form(), "nested:a.zip^/b.jar^/");
        assert_eq!(
            parent.parent().unwrap().external_form(),
            "nested:a.zip^/"
        );
        assert!(loc.root().parent().is_none());
    }
}
