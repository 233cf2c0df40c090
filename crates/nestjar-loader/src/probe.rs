//! Root probing order
//!
//! Roots are visited depth-first by declaration: a root, then its companions
//! (recursively, in the order declared), then the next declared root. A
//! root's companions are only read once the caller asks for the root after
//! it, so a name found in the first root never touches any manifest.

use crate::descriptor::RootDescriptor;
use crate::error::{LoaderError, LoaderResult};
use crate::unit::ClassUnit;
use nestjar_cache::ArchiveRecord;
use nestjar_formats::Location;
use std::collections::HashSet;
use std::sync::Arc;

/// One opened root, as yielded by [`RootProbe`]
#[derive(Debug, Clone)]
pub struct ProbedRoot {
    /// Loader-side state of the root
    pub descriptor: Arc<RootDescriptor>,
    /// The root's record in the active cache context
    pub record: Arc<ArchiveRecord>,
}

/// Lazy iterator over the opened roots of a class unit, in probe order
///
/// Roots that fail to open are skipped, except the primary root, whose
/// failure is yielded once and ends the iteration.
pub struct RootProbe<'a> {
    unit: &'a ClassUnit,
    stack: Vec<(Location, usize)>,
    seen: HashSet<String>,
    expand: Option<(ProbedRoot, usize)>,
    finished: bool,
}

impl<'a> RootProbe<'a> {
    pub(crate) fn new(unit: &'a ClassUnit) -> Self {
        let stack = unit.roots().iter().rev().map(|root| (root.clone(), 0)).collect();
        Self {
            unit,
            stack,
            seen: HashSet::new(),
            expand: None,
            finished: false,
        }
    }

    fn push_companions(&mut self) {
        let Some((probed, depth)) = self.expand.take() else {
            return;
        };
        let config = self.unit.config();
        if !config.follow_companions || depth >= config.max_companion_depth {
            return;
        }
        let companions = probed.descriptor.companions(&probed.record, config);
        for companion in companions.iter().rev() {
            self.stack.push((companion.clone(), depth + 1));
        }
    }
}

impl Iterator for RootProbe<'_> {
    type Item = LoaderResult<ProbedRoot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.push_companions();

        while let Some((location, depth)) = self.stack.pop() {
            let descriptor = self.unit.descriptor(&location);
            // Cycles and repeated references end here
            if !self.seen.insert(descriptor.key().to_string()) {
                continue;
            }

            match descriptor.open(self.unit.store()) {
                Ok(record) => {
                    let probed = ProbedRoot { descriptor, record };
                    self.expand = Some((probed.clone(), depth));
                    return Some(Ok(probed));
                }
                Err(source) if self.unit.is_primary(&descriptor) => {
                    self.finished = true;
                    return Some(Err(LoaderError::PrimaryRoot {
                        location: descriptor.location().clone(),
                        source,
                    }));
                }
                Err(e) => descriptor.report_failure(&e),
            }
        }

        self.finished = true;
        None
    }
}
