//! Multi-root class and resource loading across nested archives
//!
#![allow(clippy::doc_markdown)] // Archive-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Error types document their own variants
#![allow(clippy::must_use_candidate)]
//! A [`ClassUnit`] is built from an ordered list of root
//! [`Location`](nestjar_formats::Location)s. Names are resolved by probing
//! the roots in order; each root may declare companions in its manifest,
//! which are probed right after it and before the next declared root.
//!
//! ```text
//! roots: [A, B]        A declares C, C declares A (cycle)
//!
//! probe order:  A → C → B
//!               └─ A again is skipped: already seen
//! ```
//!
//! - The primary root (the first one) must open; other roots that fail to
//!   open are logged and skipped
//! - Each class name is defined at most once per unit, with the signer names
//!   and permissions of the root that provided it
//! - All archive reads go through the active cache context of the store;
//!   the async methods carry the caller's context into the blocking pool
//!
//! # Example
//!
//! ```rust
//! use nestjar_cache::{MemoryOpener, NestedArchiveStore, StoreConfig};
//! use nestjar_formats::{Location, ZipBuilder};
//! use nestjar_loader::{ClassUnit, LoaderConfig};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut app = ZipBuilder::new();
//! app.add_deflated("META-INF/MANIFEST.MF", b"Class-Path: util.jar\n")?;
//! let mut util = ZipBuilder::new();
//! util.add_deflated("com/example/Util.class", b"\xCA\xFE\xBA\xBE")?;
//!
//! let memory = MemoryOpener::new();
//! memory.insert("app.jar", app.finish()?);
//! memory.insert("util.jar", util.finish()?);
//! let store = NestedArchiveStore::new(StoreConfig::default())?;
//! store.register_opener("mem", Arc::new(memory));
//!
//! let unit = ClassUnit::new(
//!     Arc::new(store),
//!     vec![Location::new_root("mem:app.jar")?],
//!     LoaderConfig::default(),
//! )?;
//! let defined = unit.resolve_class("com.example.Util")?;
//! assert_eq!(defined.origin.external_form(), "nested:mem:util.jar^/");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod companion;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod probe;
pub mod unit;

pub use config::LoaderConfig;
pub use descriptor::RootDescriptor;
pub use error::{LoaderError, LoaderResult};
pub use probe::{ProbedRoot, RootProbe};
pub use unit::{ClassUnit, DefinedUnit, Resources, class_resource_name};
