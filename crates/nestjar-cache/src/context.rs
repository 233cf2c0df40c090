//! Cache contexts
//!
//! A [`CacheContext`] maps root keys to parsed [`ArchiveRecord`]s. Contexts
//! form a chain: a context entered while another is active reads through to
//! it (copy-on-read), falling back to the process-wide shared context at the
//! bottom. Each thread has its own active context per [`CacheContexts`]
//! manager; a context entered on one thread is never observed by siblings or
//! by the parent.
//!
//! ```text
//!  shared (id 0)
//!     └── ctx 1        entered by thread A
//!           ├── ctx 2  entered by thread A   (private to A)
//!           └── ctx 3  entered by thread B, spawned from A while ctx 1 was active
//! ```
//!
//! Active contexts are tracked in a thread-local stack per manager. Work
//! handed to other threads carries its context explicitly through a
//! [`ContextCarrier`].
//!
//! A root that fails to load is recorded in the context where it failed and
//! the failure is replayed on later lookups there, until the root is
//! unloaded.

use crate::error::{CacheError, CacheResult};
use crate::record::ArchiveRecord;
use dashmap::{DashMap, DashSet};
use nestjar_formats::Location;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};

/// Identifier of the shared context
pub const SHARED_CONTEXT_ID: u64 = 0;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GUARD_TOKEN: AtomicU64 = AtomicU64::new(1);

/// One installed guard; `None` installs the shared context
struct Frame {
    token: u64,
    context: Option<Arc<CacheContext>>,
}

thread_local! {
    static ACTIVE: RefCell<HashMap<u64, Vec<Frame>>> = RefCell::new(HashMap::new());
}

/// Context installed by the innermost live guard of a manager on this thread
fn active_context(manager_id: u64) -> Option<Arc<CacheContext>> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .get(&manager_id)
            .and_then(|frames| frames.last())
            .and_then(|frame| frame.context.clone())
    })
}

/// One scoped cache of archive records
pub struct CacheContext {
    id: u64,
    parent_id: Option<u64>,
    inherited: Option<Arc<CacheContext>>,
    records: DashMap<String, Arc<ArchiveRecord>>,
    active: DashSet<String>,
    /// Keys unloaded here that must not be read through from `inherited`
    evicted: DashSet<String>,
    /// Root loads that failed here
    failed: DashMap<String, Arc<CacheError>>,
    loading: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheContext {
    fn new(id: u64, parent_id: Option<u64>, inherited: Option<Arc<Self>>) -> Self {
        Self {
            id,
            parent_id,
            inherited,
            records: DashMap::new(),
            active: DashSet::new(),
            evicted: DashSet::new(),
            failed: DashMap::new(),
            loading: DashMap::new(),
        }
    }

    /// Context identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of the context that was active when this one was entered
    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// Whether this is the process-wide shared context
    pub fn is_shared(&self) -> bool {
        self.id == SHARED_CONTEXT_ID
    }

    /// Look up a record, reading through to inherited contexts
    ///
    /// Records found in an inherited context are copied into this one and
    /// marked active.
    pub fn lookup(&self, key: &str) -> Option<Arc<ArchiveRecord>> {
        if let Some(record) = self.records.get(key) {
            self.active.insert(key.to_string());
            return Some(Arc::clone(&record));
        }
        if self.evicted.contains(key) {
            return None;
        }

        let record = self.inherited.as_ref()?.peek(key)?;
        let record = Arc::clone(
            &self
                .records
                .entry(key.to_string())
                .or_insert(record),
        );
        self.active.insert(key.to_string());
        Some(record)
    }

    /// Look up without copying or marking anything
    fn peek(&self, key: &str) -> Option<Arc<ArchiveRecord>> {
        if let Some(record) = self.records.get(key) {
            return Some(Arc::clone(&record));
        }
        if self.evicted.contains(key) {
            return None;
        }
        self.inherited.as_ref()?.peek(key)
    }

    /// Failure recorded for a key in this context
    pub fn failure(&self, key: &str) -> Option<Arc<CacheError>> {
        self.failed.get(key).map(|failure| Arc::clone(&failure))
    }

    fn cached(&self, key: &str) -> Option<CacheResult<(Arc<ArchiveRecord>, bool)>> {
        if let Some(record) = self.lookup(key) {
            return Some(Ok((record, true)));
        }
        self.failure(key)
            .map(|failure| Err(CacheError::Recorded(failure)))
    }

    /// Look up a record, loading it under a per-key lock when absent
    ///
    /// Concurrent callers for the same key run `load` once; the rest wait
    /// and observe its result. A failed load is recorded and replayed to
    /// later callers without running `load` again. Returns whether the
    /// record was already cached.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> CacheResult<(Arc<ArchiveRecord>, bool)>
    where
        F: FnOnce() -> CacheResult<Arc<ArchiveRecord>>,
    {
        if let Some(cached) = self.cached(key) {
            return cached;
        }

        let lock = Arc::clone(&self.loading.entry(key.to_string()).or_default());
        let _guard = lock.lock();
        if let Some(cached) = self.cached(key) {
            return cached;
        }

        let result = match load() {
            Ok(record) => {
                self.records.insert(key.to_string(), Arc::clone(&record));
                self.active.insert(key.to_string());
                self.evicted.remove(key);
                Ok((record, false))
            }
            Err(e) => {
                let failure = e.into_shared();
                trace!("Recording failed load of {key} in context {}", self.id);
                self.failed.insert(key.to_string(), Arc::clone(&failure));
                Err(CacheError::Recorded(failure))
            }
        };
        self.loading.remove(key);
        result
    }

    /// Evict a record, or a recorded failure, from this context only
    ///
    /// Inherited contexts keep their copy; this context stops reading
    /// through to it. Returns whether the record was visible here.
    pub fn unload(&self, key: &str) -> bool {
        let visible = self.peek(key).is_some();
        self.records.remove(key);
        self.failed.remove(key);
        self.active.remove(key);
        if self.inherited.is_some() {
            self.evicted.insert(key.to_string());
        }
        visible
    }

    /// Whether a record is visible from this context
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    fn visible_records(&self) -> HashMap<String, Arc<ArchiveRecord>> {
        let mut records = match &self.inherited {
            Some(inherited) => inherited.visible_records(),
            None => HashMap::new(),
        };
        for key in self.evicted.iter() {
            records.remove(key.key());
        }
        for entry in &self.records {
            records.insert(entry.key().clone(), Arc::clone(entry.value()));
        }
        records
    }

    /// Immutable view of the records visible here
    ///
    /// With `active_only`, only records touched through this context are
    /// included.
    pub fn snapshot(&self, active_only: bool) -> ContextSnapshot {
        let records = if active_only {
            self.records
                .iter()
                .filter(|entry| self.active.contains(entry.key()))
                .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                .collect()
        } else {
            self.visible_records()
        };
        ContextSnapshot {
            records: Arc::new(records),
        }
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("records", &self.records.len())
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

/// Immutable set of records captured from a context
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    records: Arc<HashMap<String, Arc<ArchiveRecord>>>,
}

impl ContextSnapshot {
    /// Record for a root key
    pub fn get(&self, key: &str) -> Option<&Arc<ArchiveRecord>> {
        self.records.get(key)
    }

    /// Whether the snapshot holds the root of `location`
    pub fn contains(&self, location: &Location) -> bool {
        self.records.contains_key(&location.root().canonical_key())
    }

    /// Captured root keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.records.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Manager of the context chains of one store
///
/// Holds the shared context and each thread's active context.
#[derive(Debug)]
pub struct CacheContexts {
    manager_id: u64,
    shared: Arc<CacheContext>,
    next_id: AtomicU64,
}

impl Default for CacheContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheContexts {
    /// Create a manager with an empty shared context
    pub fn new() -> Self {
        Self {
            manager_id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            shared: Arc::new(CacheContext::new(SHARED_CONTEXT_ID, None, None)),
            next_id: AtomicU64::new(SHARED_CONTEXT_ID + 1),
        }
    }

    /// Process-wide default manager, created on first use
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<CacheContexts>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// The process-wide shared context
    pub fn shared(&self) -> &Arc<CacheContext> {
        &self.shared
    }

    /// Context active on the calling thread
    pub fn current(&self) -> Arc<CacheContext> {
        active_context(self.manager_id).unwrap_or_else(|| Arc::clone(&self.shared))
    }

    /// Enter a new context on the calling thread
    ///
    /// With a seed the new context starts from exactly the seeded records;
    /// otherwise it reads through to the currently active context. The
    /// previous context is restored when the guard is dropped.
    pub fn enter(&self, seed: Option<ContextSnapshot>) -> ContextGuard {
        let parent = self.current();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let context = match seed {
            Some(seed) => {
                let context = CacheContext::new(id, Some(parent.id), None);
                for (key, record) in seed.records.iter() {
                    context.records.insert(key.clone(), Arc::clone(record));
                }
                context
            }
            None => CacheContext::new(id, Some(parent.id), Some(parent)),
        };
        trace!("Entering cache context {id}");
        ContextGuard::install(self.manager_id, Some(Arc::new(context)))
    }

    /// Leave a context entered with [`enter`](Self::enter)
    ///
    /// Guards may be exited in any order; the thread keeps the innermost
    /// context that is still entered.
    pub fn exit(&self, guard: ContextGuard) {
        drop(guard);
    }

    /// Run `f` inside a fresh context, restoring the previous one afterwards
    /// even if `f` panics
    pub fn scope<R>(&self, seed: Option<ContextSnapshot>, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(seed);
        f()
    }

    /// Snapshot of the active context
    pub fn capture(&self, active_only: bool) -> ContextSnapshot {
        self.current().snapshot(active_only)
    }

    /// Capture the active context for installation on another thread
    pub fn carrier(&self) -> ContextCarrier {
        ContextCarrier {
            manager_id: self.manager_id,
            context: active_context(self.manager_id),
        }
    }

    /// Spawn a thread that inherits the calling thread's active context
    pub fn spawn<F, T>(&self, f: F) -> std::thread::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let carrier = self.carrier();
        std::thread::spawn(move || {
            let _guard = carrier.install();
            f()
        })
    }

    /// Evict the root of `location` from the active context only
    pub fn unload(&self, location: &Location) -> bool {
        self.current().unload(&location.root().canonical_key())
    }
}

/// Handle of an entered context
///
/// Dropping it leaves the context on every exit path. Guards are bound to
/// the thread that created them.
#[must_use = "dropping the guard immediately leaves the context"]
pub struct ContextGuard {
    manager_id: u64,
    token: u64,
    context: Option<Arc<CacheContext>>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Make `context` active, or the shared context when `None`
    fn install(manager_id: u64, context: Option<Arc<CacheContext>>) -> Self {
        let token = NEXT_GUARD_TOKEN.fetch_add(1, Ordering::Relaxed);
        ACTIVE.with(|active| {
            active.borrow_mut().entry(manager_id).or_default().push(Frame {
                token,
                context: context.clone(),
            });
        });
        Self {
            manager_id,
            token,
            context,
            _not_send: PhantomData,
        }
    }

    /// The entered context, absent when the shared context was installed
    pub fn context(&self) -> Option<&Arc<CacheContext>> {
        self.context.as_ref()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(context) = &self.context {
            trace!("Leaving cache context {}", context.id);
        }
        // try_with: the thread-local may already be gone during thread teardown
        let _ = ACTIVE.try_with(|active| {
            let mut active = active.borrow_mut();
            let Some(frames) = active.get_mut(&self.manager_id) else {
                return;
            };
            if let Some(position) = frames.iter().rposition(|frame| frame.token == self.token) {
                if position + 1 != frames.len() {
                    warn!(
                        "Cache context {} exited before contexts entered after it",
                        self.context.as_ref().map_or(SHARED_CONTEXT_ID, |c| c.id)
                    );
                }
                frames.remove(position);
            }
            if frames.is_empty() {
                active.remove(&self.manager_id);
            }
        });
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("context", &self.context.as_ref().map(|c| c.id))
            .finish_non_exhaustive()
    }
}

/// Active context captured for use on another thread or task
#[derive(Debug, Clone)]
pub struct ContextCarrier {
    manager_id: u64,
    context: Option<Arc<CacheContext>>,
}

impl ContextCarrier {
    /// Make the carried context active on the calling thread
    pub fn install(&self) -> ContextGuard {
        ContextGuard::install(self.manager_id, self.context.clone())
    }

    /// Identifier of the carried context
    pub fn context_id(&self) -> u64 {
        self.context.as_ref().map_or(SHARED_CONTEXT_ID, |c| c.id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entry::LoadSettings;
    use bytes::Bytes;
    use nestjar_formats::ZipBuilder;

    fn record(name: &str) -> Arc<ArchiveRecord> {
        let mut builder = ZipBuilder::new();
        builder.add_stored("a.txt", name.as_bytes()).unwrap();
        let data = Bytes::from(builder.finish().unwrap());
        ArchiveRecord::packed(
            Location::new_root(format!("mem:{name}")).unwrap(),
            data,
            None,
            0,
            &Arc::new(LoadSettings::default()),
        )
        .unwrap()
    }

    fn insert(contexts: &CacheContexts, key: &str) {
        contexts
            .current()
            .get_or_load(key, || Ok(record(key)))
            .unwrap();
    }

    #[test]
    fn test_enter_exit_restores_previous() {
        let contexts = CacheContexts::new();
        assert!(contexts.current().is_shared());

        let outer = contexts.enter(None);
        let outer_id = contexts.current().id();
        assert_eq!(contexts.current().parent_id(), Some(SHARED_CONTEXT_ID));

        let inner = contexts.enter(None);
        assert_eq!(contexts.current().parent_id(), Some(outer_id));
        contexts.exit(inner);

        assert_eq!(contexts.current().id(), outer_id);
        contexts.exit(outer);
        assert!(contexts.current().is_shared());
    }

    #[test]
    fn test_out_of_order_exit_keeps_live_context() {
        let contexts = CacheContexts::new();
        let outer = contexts.enter(None);
        let inner = contexts.enter(None);
        let inner_id = contexts.current().id();

        contexts.exit(outer);
        assert_eq!(contexts.current().id(), inner_id);

        contexts.exit(inner);
        assert!(contexts.current().is_shared());
    }

    #[test]
    fn test_failed_load_is_replayed_until_unload() {
        let contexts = CacheContexts::new();
        let calls = AtomicU64::new(0);
        let failing = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::NotFound("mem:gone.jar".to_string()))
        };

        let context = contexts.current();
        for _ in 0..3 {
            let err = context.get_or_load("gone.jar", failing).unwrap_err();
            assert!(matches!(err, CacheError::Recorded(_)));
            assert!(err.is_not_found());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(context.failure("gone.jar").is_some());

        // Recorded failures stay in the context that saw them
        contexts.scope(None, || {
            assert!(contexts.current().get_or_load("gone.jar", failing).is_err());
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(!context.unload("gone.jar"));
        assert!(context.failure("gone.jar").is_none());
        context.get_or_load("gone.jar", || Ok(record("gone.jar"))).unwrap();
    }

    #[test]
    fn test_child_reads_through_parent_not_vice_versa() {
        let contexts = CacheContexts::new();
        insert(&contexts, "shared.jar");

        let guard = contexts.enter(None);
        assert!(contexts.current().contains("shared.jar"));
        insert(&contexts, "private.jar");
        contexts.exit(guard);

        assert!(!contexts.current().contains("private.jar"));
        assert!(contexts.current().contains("shared.jar"));
    }

    #[test]
    fn test_seeded_context_is_exact() {
        let contexts = CacheContexts::new();
        insert(&contexts, "a.jar");
        insert(&contexts, "b.jar");

        let seed = contexts.scope(None, || {
            contexts.current().lookup("a.jar").unwrap();
            contexts.capture(true)
        });
        assert_eq!(seed.keys(), vec!["a.jar"]);

        contexts.scope(Some(seed), || {
            assert!(contexts.current().contains("a.jar"));
            assert!(!contexts.current().contains("b.jar"));
        });
    }

    #[test]
    fn test_unload_is_local() {
        let contexts = CacheContexts::new();
        insert(&contexts, "a.jar");

        contexts.scope(None, || {
            assert!(contexts.current().unload("a.jar"));
            assert!(!contexts.current().contains("a.jar"));
        });
        assert!(contexts.current().contains("a.jar"));
    }

    #[test]
    fn test_scope_restores_after_panic() {
        let contexts = CacheContexts::new();
        let before = contexts.current().id();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            contexts.scope(None, || panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(contexts.current().id(), before);
    }

    #[test]
    fn test_spawn_inherits_and_siblings_are_isolated() {
        let contexts = Arc::new(CacheContexts::new());
        let guard = contexts.enter(None);
        insert(&contexts, "parent.jar");

        let handle = contexts.spawn({
            let contexts = Arc::clone(&contexts);
            move || {
                assert!(contexts.current().contains("parent.jar"));
                contexts.scope(None, || insert(&contexts, "child.jar"));
                contexts.current().contains("child.jar")
            }
        });
        let child = handle.join().unwrap();
        assert!(!child);
        assert!(!contexts.current().contains("child.jar"));
        drop(guard);
    }

    #[test]
    fn test_get_or_load_once() {
        let contexts = Arc::new(CacheContexts::new());
        let calls = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let contexts = Arc::clone(&contexts);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    contexts
                        .current()
                        .get_or_load("x.jar", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(record("x.jar"))
                        })
                        .unwrap()
                        .0
                })
            })
            .collect();

        let records: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(records.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
