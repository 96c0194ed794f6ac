//! # zpack-deflate
//!
//! Pure Rust implementation of the DEFLATE compression algorithm (RFC 1951)
//! and its ZLIB container (RFC 1950).
//!
//! ## Features
//!
//! - **Decompression**: Full support for all DEFLATE block types
//!   - Stored (uncompressed) blocks
//!   - Fixed Huffman codes
//!   - Dynamic Huffman codes
//! - **Streaming decompression**: [`InflateStream`] accepts input in
//!   arbitrary pieces and suspends cleanly when a field is incomplete
//! - **Compression**: LZ77 + Huffman encoding
//!   - Stored, fixed or dynamic strategy
//!   - Length-limited Huffman codes (package-merge)
//!   - Optional lazy matching
//! - **ZLIB**: one-shot and incremental, with Adler-32 verification
//!
//! ## Example
//!
//! ```rust
//! use zpack_deflate::{deflate, inflate};
//!
//! // Compress data
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original).unwrap();
//!
//! // Decompress data
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Strategies
//!
//! - [`CompressionType::None`]: stored blocks, 65535 bytes each
//! - [`CompressionType::Fixed`]: one block with the predefined tables
//! - [`CompressionType::Dynamic`]: one block with tables fitted to the input (default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod stream;
pub mod tables;
pub mod zlib;

// Re-exports
pub use deflate::{CompressionType, DeflateOptions, Deflater, deflate, deflate_with};
pub use huffman::{HuffmanBuilder, HuffmanTable};
pub use inflate::{BufferType, InflateOptions, RawInflater, inflate, inflate_with};
pub use lz77::{Lz77Matcher, Lz77Output, Lz77Token};
pub use stream::{InflateState, InflateStream};
pub use zlib::{ZlibInflateStream, ZlibOptions};
