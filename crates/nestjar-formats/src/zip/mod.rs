//! Zip/jar container format
//!
//! Archives are read from memory. The central directory is parsed up front;
//! entry payloads are read on demand, either as a zero-copy slice (stored) or
//! by inflating (deflate).
//!
//! # Supported
//!
//! - Zip32 (EOCD + central directory), archive comments
//! - Stored (method 0) and deflate (method 8) entries
//! - CRC-32 verification of read content
//!
//! # Not Supported
//!
//! - Zip64 (sentinel `0xFFFF`/`0xFFFFFFFF` fields)
//! - Multi-disk archives
//! - Encrypted entries (listed, but reading fails)
//!
//! ```rust
//! use bytes::Bytes;
//! use nestjar_formats::zip::{ZipBuilder, ZipDirectory};
//!
//! let mut inner = ZipBuilder::new();
//! inner.add_deflated("pkg/Foo.class", b"class bytes")?;
//!
//! let mut outer = ZipBuilder::new();
//! outer.add_stored("inner.zip", &inner.finish()?)?;
//! let outer = Bytes::from(outer.finish()?);
//!
//! let directory = ZipDirectory::parse(&outer)?;
//! let inner = directory.find("inner.zip").unwrap().read(&outer, u64::MAX, true)?;
//! let directory = ZipDirectory::parse(&inner)?;
//! let class = directory.find("pkg/Foo.class").unwrap().read(&inner, u64::MAX, true)?;
//! assert_eq!(&class[..], b"class bytes");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod directory;
mod error;
pub mod header;
pub mod time;

pub use builder::ZipBuilder;
pub use directory::{CompressionMethod, ZipDirectory, ZipEntry};
pub use error::{ZipError, ZipResult};
pub use time::DosDateTime;
