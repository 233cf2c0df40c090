//! Location and archive formats for nested archive resolution
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Archive-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate holds the pure, stateless pieces of the nested archive system:
//!
//! - **Location**: the `nested:` addressing scheme that names a resource at any
//!   depth inside archives packaged inside other archives
//! - **Zip**: a central-directory parser, entry reader and builder for the
//!   zip/jar container format
//! - **Manifest**: the main-attribute reader used for `Class-Path` companion
//!   declarations
//!
//! # Location text form
//!
//! ```text
//! nested:/opt/app/outer.zip^/lib/inner.jar^/pkg/Foo.class
//! └─────┘└────────────────┘  └───────────┘  └───────────┘
//!  scheme   root locator         hop 1          hop 2
//! ```
//!
//! A trailing delimiter marks a location that denotes an archive itself rather
//! than a resource inside it.
//!
//! ```rust
//! use nestjar_formats::location::Location;
//!
//! let outer = Location::new_root("/opt/app/outer.zip")?;
//! let class = outer.join("lib/inner.jar")?.join("pkg/Foo.class")?;
//! assert_eq!(
//!     class.external_form(),
//!     "nested:/opt/app/outer.zip^/lib/inner.jar^/pkg/Foo.class"
//! );
//! assert_eq!(Location::parse(&class.external_form())?, class);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: zip archives can be parsed and built
//! - **Zero-Copy Parsing**: stored entries are sliced out of the archive buffer
//! - **Untrusted Input**: every offset and size is validated against the buffer

#![warn(missing_docs)]

pub mod location;
pub mod manifest;
pub mod zip;

pub use location::{Location, LocationError, LocationResult, RootLocator};
pub use manifest::Manifest;
pub use zip::{CompressionMethod, ZipBuilder, ZipDirectory, ZipEntry, ZipError, ZipResult};
