//! Scoped, concurrency-safe caching of nested archive contents
//!
#![allow(clippy::cast_possible_truncation)] // Sizes are bounded by the archive buffer
#![allow(clippy::doc_markdown)] // Archive-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Error types document their own variants
#![allow(clippy::must_use_candidate)]
//! This crate turns [`Location`](nestjar_formats::Location)s into bytes. It
//! provides:
//!
//! - **Archive records**: each archive's central directory is parsed once and
//!   entry bytes are read lazily, exactly once, even under contention
//! - **Deduplication**: identical entries inside one archive (same tail name,
//!   size and CRC-32) share a single buffer and a single set of nested children
//! - **Cache contexts**: scoped, inheritable caches of records with a
//!   process-wide shared context at the bottom
//! - **Connections**: a read-only view of one addressed resource with metadata
//!   and the permission of its outermost origin
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │          NestedArchiveStore          │
//! │   open(location) -> Connection       │
//! └──────────────────────────────────────┘
//!          │                    │
//! ┌──────────────────┐ ┌──────────────────┐
//! │  CacheContexts   │ │  OpenerRegistry  │
//! │ (active context) │ │ file / mem / ... │
//! └──────────────────┘ └──────────────────┘
//!          │
//! ┌──────────────────────────────────────┐
//! │ ArchiveRecord ── ContentEntry ──┐    │
//! │      ▲                          │    │
//! │      └──── sub_archive ─────────┘    │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use nestjar_cache::{MemoryOpener, NestedArchiveStore, StoreConfig};
//! use nestjar_formats::{Location, ZipBuilder};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut inner = ZipBuilder::new();
//! inner.add_deflated("pkg/Foo.class", b"\xCA\xFE\xBA\xBE")?;
//! let mut outer = ZipBuilder::new();
//! outer.add_stored("inner.zip", &inner.finish()?)?;
//!
//! let memory = MemoryOpener::new();
//! memory.insert("outer.zip", outer.finish()?);
//!
//! let store = NestedArchiveStore::new(StoreConfig::default())?;
//! store.register_opener("mem", Arc::new(memory));
//!
//! let location: Location = "nested:mem:outer.zip^/inner.zip^/pkg/Foo.class".parse()?;
//! let connection = store.open(&location)?;
//! assert_eq!(&connection.bytes()?[..], b"\xCA\xFE\xBA\xBE");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod context;
pub mod entry;
pub mod error;
pub mod opener;
pub mod permission;
pub mod record;
pub mod stats;

pub use config::{DirectoryStrategy, StoreConfig};
pub use connection::{Connection, NestedArchiveStore, ResourceMetadata, content_type_for};
pub use context::{CacheContext, CacheContexts, ContextCarrier, ContextGuard, ContextSnapshot};
pub use entry::{ContentEntry, EntryMetadata};
pub use error::{CacheError, CacheResult};
pub use opener::{FileSystemOpener, MemoryOpener, OpenerRegistry, RootContent, RootOpener};
pub use permission::{Permission, PermissionCollection, PermissionDescriptor};
pub use record::ArchiveRecord;
pub use stats::{LoadStats, LoadStatsSnapshot};
