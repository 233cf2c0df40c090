//! Companion reference resolution
//!
//! A root declares companions as whitespace-separated references in the
//! `Class-Path` attribute of its manifest. Relative references resolve
//! against the declaring root:
//!
//! - a directory root resolves them inside the directory itself
//! - an outermost archive resolves them next to the archive file
//! - a nested archive resolves them next to its entry inside the container
//!
//! Absolute paths, URLs and full `nested:` locations are taken as they are.

use nestjar_formats::Location;
use url::Url;

const NESTED_PREFIX: &str = "nested:";

/// Resolve one reference declared by the archive at `declaring`
///
/// Returns the companion as an archive location, or `None` when the
/// reference cannot be expressed (for example when `..` climbs above the
/// container).
pub fn resolve_reference(
    declaring: &Location,
    declaring_is_directory: bool,
    reference: &str,
) -> Option<Location> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if reference.starts_with(NESTED_PREFIX) {
        return Location::parse(reference).ok().map(|l| l.as_archive());
    }
    if is_absolute(reference) {
        return Location::new_root(reference).ok().map(|l| l.as_archive());
    }

    if declaring.is_root() {
        resolve_against_root(declaring.root_locator(), declaring_is_directory, reference)
    } else {
        let parent = declaring.parent()?;
        let hop = declaring.hops().last()?;
        let path = join_relative(parent_dir(hop), reference, false)?;
        parent.join(&path).ok().map(|l| l.as_archive())
    }
}

fn resolve_against_root(root: &str, is_directory: bool, reference: &str) -> Option<Location> {
    // Hierarchical URLs resolve with URL rules
    if let Ok(url) = Url::parse(root) {
        if url.scheme().len() > 1 && !url.cannot_be_a_base() {
            let mut base = url;
            if is_directory && !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            let joined = base.join(reference).ok()?;
            return Location::new_root(joined.as_str()).ok().map(|l| l.as_archive());
        }
        // Opaque roots such as `mem:<name>` resolve against the name
        if url.scheme().len() > 1 {
            let scheme_len = url.scheme().len() + 1;
            let name = &root[scheme_len..];
            let base = if is_directory { name } else { parent_dir(name) };
            let path = join_relative(base, reference, false)?;
            return Location::new_root(format!("{}:{path}", url.scheme()))
                .ok()
                .map(|l| l.as_archive());
        }
    }

    let base = if is_directory {
        root.trim_end_matches('/')
    } else {
        parent_dir(root)
    };
    let path = join_relative(base, reference, base.starts_with('/'))?;
    Location::new_root(path).ok().map(|l| l.as_archive())
}

/// Whether a reference names an absolute path or a URL
fn is_absolute(reference: &str) -> bool {
    if reference.starts_with('/') || std::path::Path::new(reference).is_absolute() {
        return true;
    }
    Url::parse(reference).is_ok_and(|url| url.scheme().len() > 1)
}

/// Directory part of a `/`-separated path, empty for a bare name
fn parent_dir(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map_or("", |(dir, _)| if dir.is_empty() { "/" } else { dir })
}

/// Join `reference` onto `base`, normalizing `.` and `..`
///
/// Climbing above the base's first component fails for relative bases and
/// stops at `/` for absolute ones.
fn join_relative(base: &str, reference: &str, absolute: bool) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && !absolute {
                    return None;
                }
            }
            part => parts.push(part),
        }
    }
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("/");
    Some(if absolute { format!("/{joined}") } else { joined })
}
