//! # zpack Archive
//!
//! Container formats built on the zpack DEFLATE codec.
//!
//! - **GZIP** (RFC 1952): single or concatenated members, with filename,
//!   comment, extra field and header CRC
//! - **ZIP**: in-memory writer and reader for stored and deflated entries,
//!   with the legacy PKWARE cipher for old password-protected archives
//!
//! ## Example
//!
//! ```rust
//! use zpack_archive::gzip;
//! use zpack_archive::zip::{ZipArchive, ZipEntryOptions, ZipWriter};
//!
//! let gz = gzip::compress(b"hello gzip").unwrap();
//! assert_eq!(gzip::decompress(&gz).unwrap(), b"hello gzip");
//!
//! let mut writer = ZipWriter::new();
//! writer.add_entry("hello.txt", b"hello zip", ZipEntryOptions::default()).unwrap();
//! let bytes = writer.serialize().unwrap();
//! let archive = ZipArchive::open(&bytes).unwrap();
//! assert_eq!(archive.extract("hello.txt").unwrap(), b"hello zip");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod gzip;
pub mod zip;

// Re-exports
pub use gzip::{GzipHeader, GzipMember, GzipOptions};
pub use zip::{ZipArchive, ZipEntry, ZipEntryOptions, ZipWriter};
