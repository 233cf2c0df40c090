//! Load statistics
//!
//! Counters are updated with relaxed atomics; a [`LoadStatsSnapshot`] is a
//! point-in-time copy for reporting and tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for archive loading activity
#[derive(Debug, Default)]
pub struct LoadStats {
    archives_parsed: AtomicU64,
    entries_loaded: AtomicU64,
    bytes_loaded: AtomicU64,
    dedup_aliases: AtomicU64,
    negative_probes: AtomicU64,
    context_hits: AtomicU64,
    context_misses: AtomicU64,
}

/// Point-in-time copy of [`LoadStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatsSnapshot {
    /// Central directories parsed (roots and nested archives)
    pub archives_parsed: u64,
    /// Entry payloads read or inflated
    pub entries_loaded: u64,
    /// Total bytes produced by entry loads
    pub bytes_loaded: u64,
    /// Entries registered as aliases of identical content
    pub dedup_aliases: u64,
    /// Probes that found nothing
    pub negative_probes: u64,
    /// Root lookups answered by a cache context
    pub context_hits: u64,
    /// Root lookups that had to open the root
    pub context_misses: u64,
}

impl LoadStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_archive_parsed(&self) {
        self.archives_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_loaded(&self, bytes: usize) {
        self.entries_loaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_loaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_alias(&self) {
        self.dedup_aliases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_negative_probe(&self) {
        self.negative_probes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_context_lookup(&self, hit: bool) {
        if hit {
            self.context_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.context_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> LoadStatsSnapshot {
        LoadStatsSnapshot {
            archives_parsed: self.archives_parsed.load(Ordering::Relaxed),
            entries_loaded: self.entries_loaded.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            dedup_aliases: self.dedup_aliases.load(Ordering::Relaxed),
            negative_probes: self.negative_probes.load(Ordering::Relaxed),
            context_hits: self.context_hits.load(Ordering::Relaxed),
            context_misses: self.context_misses.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in [
            &self.archives_parsed,
            &self.entries_loaded,
            &self.bytes_loaded,
            &self.dedup_aliases,
            &self.negative_probes,
            &self.context_hits,
            &self.context_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl LoadStatsSnapshot {
    /// Counter deltas since an earlier snapshot
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            archives_parsed: self.archives_parsed.saturating_sub(earlier.archives_parsed),
            entries_loaded: self.entries_loaded.saturating_sub(earlier.entries_loaded),
            bytes_loaded: self.bytes_loaded.saturating_sub(earlier.bytes_loaded),
            dedup_aliases: self.dedup_aliases.saturating_sub(earlier.dedup_aliases),
            negative_probes: self.negative_probes.saturating_sub(earlier.negative_probes),
            context_hits: self.context_hits.saturating_sub(earlier.context_hits),
            context_misses: self.context_misses.saturating_sub(earlier.context_misses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = LoadStats::new();
        stats.record_archive_parsed();
        stats.record_entry_loaded(10);
        stats.record_entry_loaded(5);
        stats.record_context_lookup(true);
        stats.record_context_lookup(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.archives_parsed, 1);
        assert_eq!(snapshot.entries_loaded, 2);
        assert_eq!(snapshot.bytes_loaded, 15);
        assert_eq!(snapshot.context_hits, 1);
        assert_eq!(snapshot.context_misses, 1);

        stats.record_alias();
        assert_eq!(stats.snapshot().since(&snapshot).dedup_aliases, 1);

        stats.reset();
        assert_eq!(stats.snapshot(), LoadStatsSnapshot::default());
    }
}
