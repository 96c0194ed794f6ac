//! # zpack Core
//!
//! Core components for the zpack compression library.
//!
//! This crate provides the fundamental building blocks shared by the codec
//! and container crates:
//!
//! - [`bitstream`]: Bit-level I/O with resumable cursors
//! - [`crc`]: CRC-32 (GZIP, ZIP)
//! - [`adler`]: Adler-32 (ZLIB)
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! zpack is designed as a layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Container                                           │
//! │     GZIP members, ZIP archives (zpack-archive)          │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Deflate (LZ77+Huffman), Inflate, ZLIB               │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: BitStream (this crate)                              │
//! │     BitReader/BitWriter, CRC-32, Adler-32               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use zpack_core::bitstream::BitReader;
//! use zpack_core::crc::Crc32;
//!
//! // Read bits from data
//! let data = [0xAB, 0xCD];
//! let mut reader = BitReader::new(&data);
//! let bits = reader.read_bits(12).unwrap();
//! assert_eq!(bits, 0xDAB);
//!
//! // Compute CRC-32
//! let crc = Crc32::compute(b"The quick brown fox jumps over the lazy dog");
//! assert_eq!(crc, 0x414FA339);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adler;
pub mod bitstream;
pub mod crc;
pub mod error;

// Re-exports for convenience
pub use adler::Adler32;
pub use bitstream::{BitCursor, BitReader, BitWriter};
pub use crc::Crc32;
pub use error::{ChecksumKind, ErrorKind, Result, ZpackError};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adler::Adler32;
    pub use crate::bitstream::{BitCursor, BitReader, BitWriter};
    pub use crate::crc::Crc32;
    pub use crate::error::{ErrorKind, Result, ZpackError};
}
