//! End-to-end behavior of the archive store and cache contexts
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use nestjar_cache::{
    CacheError, CacheResult, MemoryOpener, NestedArchiveStore, Permission, RootContent,
    RootOpener, StoreConfig,
};
use nestjar_formats::{Location, RootLocator, ZipBuilder};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

const FOO_CLASS: &[u8] = b"\xCA\xFE\xBA\xBE\x00\x00\x00\x41 Foo class body, repeated repeated repeated";

fn inner_zip() -> Vec<u8> {
    let mut builder = ZipBuilder::new();
    builder.add_directory("pkg/").unwrap();
    builder.add_deflated("pkg/Foo.class", FOO_CLASS).unwrap();
    builder.finish().unwrap()
}

fn outer_zip() -> Vec<u8> {
    let mut builder = ZipBuilder::new();
    builder.add_stored("inner.zip", &inner_zip()).unwrap();
    builder.add_deflated("README.txt", b"outer").unwrap();
    builder.finish().unwrap()
}

fn memory_store(archives: &[(&str, Vec<u8>)]) -> Arc<NestedArchiveStore> {
    let memory = MemoryOpener::new();
    for (name, data) in archives {
        memory.insert(*name, data.clone());
    }
    let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
    store.register_opener("mem", Arc::new(memory));
    Arc::new(store)
}

fn location(text: &str) -> Location {
    Location::parse(text).unwrap()
}

#[test]
fn nested_class_resolves_and_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let outer = dir.path().join("outer.zip");
    std::fs::write(&outer, outer_zip()).unwrap();

    let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
    let class = Location::new_root(outer.to_string_lossy())
        .unwrap()
        .join("inner.zip")
        .unwrap()
        .join("pkg/Foo.class")
        .unwrap();

    let first = store.open(&class).unwrap().bytes().unwrap();
    let second = store.open(&class).unwrap().bytes().unwrap();
    assert_eq!(&first[..], FOO_CLASS);
    assert_eq!(first.as_ptr(), second.as_ptr());

    let stats = store.stats();
    assert_eq!(stats.archives_parsed, 2);
    assert_eq!(stats.context_misses, 1);
    assert_eq!(stats.context_hits, 1);

    let meta = store.open(&class).unwrap().metadata().unwrap();
    assert_eq!(meta.content_type, "application/java-vm");
    assert_eq!(meta.length, FOO_CLASS.len() as u64);
}

#[test]
fn identical_nested_copies_share_one_buffer() {
    let inner = inner_zip();
    let mut builder = ZipBuilder::new();
    builder.add_stored("lib/a/shared.zip", &inner).unwrap();
    builder.add_stored("lib/b/shared.zip", &inner).unwrap();
    let store = memory_store(&[("app.zip", builder.finish().unwrap())]);

    let a = store
        .open(&location("nested:mem:app.zip^/lib/a/shared.zip^/pkg/Foo.class"))
        .unwrap();
    let b = store
        .open(&location("nested:mem:app.zip^/lib/b/shared.zip^/pkg/Foo.class"))
        .unwrap();

    assert!(Arc::ptr_eq(a.entry().unwrap(), b.entry().unwrap()));
    assert_eq!(a.bytes().unwrap().as_ptr(), b.bytes().unwrap().as_ptr());

    let stats = store.stats();
    assert_eq!(stats.dedup_aliases, 1);
    // app.zip and one shared.zip
    assert_eq!(stats.archives_parsed, 2);
    // shared.zip once, Foo.class once
    assert_eq!(stats.entries_loaded, 2);
}

#[test]
fn concurrent_first_reads_load_once() {
    const THREADS: usize = 16;
    let store = memory_store(&[("outer.zip", outer_zip())]);
    let class = location("nested:mem:outer.zip^/inner.zip^/pkg/Foo.class");
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    store.open(&class).unwrap().bytes().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|bytes| &bytes[..] == FOO_CLASS));
    assert!(results.windows(2).all(|w| w[0].as_ptr() == w[1].as_ptr()));

    let stats = store.stats();
    assert_eq!(stats.archives_parsed, 2);
    assert_eq!(stats.entries_loaded, 2);
    assert_eq!(stats.context_misses, 1);
}

#[test]
fn sibling_contexts_are_isolated() {
    let store = memory_store(&[("outer.zip", outer_zip())]);
    let root = location("nested:mem:outer.zip");
    let key = root.canonical_key();
    let barrier = Arc::new(Barrier::new(2));

    let loader = {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let root = root.clone();
        let key = key.clone();
        std::thread::spawn(move || {
            store.contexts().scope(None, || {
                store.load_root(&root).unwrap();
                barrier.wait();
                barrier.wait();
                store.contexts().current().contains(&key)
            })
        })
    };

    let observer = {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
            store.contexts().scope(None, || {
                barrier.wait();
                let visible = store.contexts().current().contains(&key);
                barrier.wait();
                visible
            })
        })
    };

    assert!(loader.join().unwrap());
    assert!(!observer.join().unwrap());
    assert!(!store.contexts().current().contains(&root.canonical_key()));
}

#[test]
fn spawned_threads_inherit_the_active_context() {
    let store = memory_store(&[("outer.zip", outer_zip())]);
    let root = location("nested:mem:outer.zip");

    let guard = store.contexts().enter(None);
    store.load_root(&root).unwrap();

    let handle = store.contexts().spawn({
        let store = Arc::clone(&store);
        let root = root.clone();
        move || {
            store.load_root(&root).unwrap();
            store.contexts().scope(None, || {
                store
                    .load_root(&location("nested:mem:outer.zip^/inner.zip"))
                    .unwrap();
            });
        }
    });
    handle.join().unwrap();
    store.contexts().exit(guard);

    let stats = store.stats();
    assert_eq!(stats.archives_parsed, 1);
    assert_eq!(stats.context_hits, 2);
    assert!(!store.contexts().current().contains(&root.canonical_key()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_tasks_carry_the_context() {
    let store = memory_store(&[("outer.zip", outer_zip())]);
    let root = location("nested:mem:outer.zip");

    let carrier = {
        let guard = store.contexts().enter(None);
        store.load_root(&root).unwrap();
        let carrier = store.contexts().carrier();
        store.contexts().exit(guard);
        carrier
    };

    let visible = tokio::task::spawn_blocking({
        let store = Arc::clone(&store);
        let key = root.canonical_key();
        move || {
            let _guard = carrier.install();
            store.contexts().current().contains(&key)
        }
    })
    .await
    .unwrap();

    assert!(visible);
    assert!(!store.contexts().current().contains(&root.canonical_key()));
}

#[test]
fn scope_exit_restores_context_after_error() {
    let store = memory_store(&[("outer.zip", outer_zip()), ("bad.zip", b"garbage".to_vec())]);
    let before = store.contexts().current().id();

    let result: CacheResult<()> = store.contexts().scope(None, || {
        store.load_root(&location("nested:mem:outer.zip"))?;
        store.open(&location("nested:mem:bad.zip^/x.class"))?;
        Ok(())
    });

    match result.as_ref().map_err(CacheError::cause) {
        Err(CacheError::ArchiveParse { location, .. }) => {
            assert_eq!(location.to_string(), "nested:mem:bad.zip^/");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(store.contexts().current().id(), before);
    assert!(!store.contexts().current().contains("nested:mem:outer.zip"));

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = store.contexts().enter(None);
        panic!("enclosed work failed");
    }));
    assert!(panicked.is_err());
    assert_eq!(store.contexts().current().id(), before);
}

#[test]
fn directory_probes_are_silent() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
    std::fs::write(dir.path().join("pkg/Foo.class"), FOO_CLASS).unwrap();

    let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
    let root = Location::new_root(dir.path().to_string_lossy()).unwrap();

    let manifest = store.open(&root.join("META-INF/MANIFEST.MF").unwrap()).unwrap();
    assert!(!manifest.exists());
    assert!(manifest.bytes().unwrap_err().is_not_found());

    let class = store.open(&root.join("pkg/Foo.class").unwrap()).unwrap();
    assert_eq!(&class.bytes().unwrap()[..], FOO_CLASS);
    assert_eq!(store.stats().negative_probes, 1);

    let hint = class.permission_hint().unwrap();
    assert_eq!(hint.origin, root);
    let permission = hint.permission.unwrap();
    assert!(permission.implies(&Permission::read_file(
        dir.path().join("pkg/Foo.class").to_string_lossy()
    )));
}

#[test]
fn unload_evicts_from_the_active_context_only() {
    let store = memory_store(&[("outer.zip", outer_zip())]);
    let root = location("nested:mem:outer.zip");
    store.load_root(&root).unwrap();

    store.contexts().scope(None, || {
        assert!(store.unload(&root));
        store.load_root(&root).unwrap();
    });

    assert!(store.contexts().current().contains(&root.canonical_key()));
    assert_eq!(store.stats().archives_parsed, 2);
}

/// Memory opener that counts how often roots are opened
struct CountingOpener {
    inner: MemoryOpener,
    opens: AtomicUsize,
}

impl RootOpener for CountingOpener {
    fn open(&self, root: &RootLocator) -> CacheResult<RootContent> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(root)
    }
}

#[test]
fn failed_roots_are_opened_once_per_context() {
    let inner = MemoryOpener::new();
    inner.insert("bad.zip", b"definitely not a zip".to_vec());
    let opener = Arc::new(CountingOpener {
        inner,
        opens: AtomicUsize::new(0),
    });
    let store = NestedArchiveStore::new(StoreConfig::default()).unwrap();
    store.register_opener("mem", Arc::clone(&opener) as Arc<dyn RootOpener>);

    let class = location("nested:mem:bad.zip^/x.class");
    for _ in 0..5 {
        let err = store.open(&class).unwrap_err();
        assert!(err.is_parse_error());
    }
    for _ in 0..3 {
        let err = store.open(&location("nested:mem:absent.zip^/x.class")).unwrap_err();
        assert!(err.is_not_found());
    }
    assert_eq!(opener.opens.load(Ordering::SeqCst), 2);

    // A fresh context tries again, once
    store.contexts().scope(None, || {
        assert!(store.open(&class).is_err());
        assert!(store.open(&class).is_err());
    });
    assert_eq!(opener.opens.load(Ordering::SeqCst), 3);

    // Unloading clears the recorded failure
    assert!(!store.unload(&class));
    assert!(store.open(&class).is_err());
    assert_eq!(opener.opens.load(Ordering::SeqCst), 4);
}

#[test]
fn corrupt_nested_archive_is_parsed_once() {
    let mut builder = ZipBuilder::new();
    builder.add_stored("lib/broken.jar", b"definitely not a zip").unwrap();
    let store = memory_store(&[("app.zip", builder.finish().unwrap())]);
    let class = location("nested:mem:app.zip^/lib/broken.jar^/x.class");

    for _ in 0..4 {
        let err = store.open(&class).unwrap_err();
        match err.cause() {
            CacheError::ArchiveParse { location, .. } => {
                assert_eq!(location.to_string(), "nested:mem:app.zip^/lib/broken.jar^/");
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    let stats = store.stats();
    assert_eq!(stats.archives_parsed, 1);
    assert_eq!(stats.entries_loaded, 1);
}
