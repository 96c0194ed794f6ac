//! Error types for zpack operations.
//!
//! Every fallible operation in the workspace reports a [`ZpackError`]. The
//! variants carry enough context to diagnose a broken stream, and
//! [`ZpackError::kind`] folds them into the coarse categories callers
//! usually branch on (format, checksum, size, password, unsupported).

use std::fmt;
use thiserror::Error;

/// Which checksum failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-32 of decompressed data (GZIP trailer, ZIP entries).
    Crc32,
    /// Adler-32 of decompressed data (ZLIB trailer).
    Adler32,
    /// 16-bit GZIP header CRC (FHCRC).
    HeaderCrc16,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc32 => f.write_str("crc-32"),
            Self::Adler32 => f.write_str("adler-32"),
            Self::HeaderCrc16 => f.write_str("header crc16"),
        }
    }
}

/// Coarse classification of a [`ZpackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or truncated input.
    Format,
    /// A stored checksum disagrees with the data.
    Checksum,
    /// A stored length disagrees with the data.
    SizeMismatch,
    /// An encrypted entry was accessed without a password.
    PasswordRequired,
    /// The supplied password does not match the entry.
    WrongPassword,
    /// Valid input that uses a feature this codec does not implement.
    Unsupported,
    /// A named entry does not exist.
    NotFound,
}

/// The main error type for zpack operations.
#[derive(Debug, Error)]
pub enum ZpackError {
    /// Invalid magic number in a container header.
    #[error("Invalid signature: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Corrupted data inside a compressed stream.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A bit pattern that maps to no Huffman code.
    #[error("Invalid code length at bit position {bit_position}")]
    InvalidHuffmanCode {
        /// Bit position where the invalid code was found.
        bit_position: u64,
    },

    /// Back-reference pointing before the start of the output.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Number of bytes available behind the cursor.
        history_size: usize,
    },

    /// Input ended before the structure being decoded was complete.
    #[error("Unexpected end of input: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Checksum verification failed.
    #[error("invalid {kind} checksum: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Which checksum failed.
        kind: ChecksumKind,
        /// Value stored in the stream.
        expected: u32,
        /// Value computed over the data.
        computed: u32,
    },

    /// Stored uncompressed size disagrees with the decoded length.
    #[error("invalid input size: expected {expected}, actual {actual}")]
    SizeMismatch {
        /// Size recorded in the stream (mod 2^32 where applicable).
        expected: u64,
        /// Size actually produced.
        actual: u64,
    },

    /// Entry is encrypted and no password was supplied.
    #[error("please set password for entry: {name}")]
    PasswordRequired {
        /// Name of the encrypted entry.
        name: String,
    },

    /// The password check byte did not match.
    #[error("wrong password for entry: {name}")]
    WrongPassword {
        /// Name of the encrypted entry.
        name: String,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// Unsupported format feature (flag, option or extension).
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Description of the feature.
        feature: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },
}

/// Result type alias for zpack operations.
pub type Result<T> = std::result::Result<T, ZpackError>;

impl ZpackError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(bit_position: u64) -> Self {
        Self::InvalidHuffmanCode { bit_position }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history_size: usize) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(kind: ChecksumKind, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            kind,
            expected,
            computed,
        }
    }

    /// Create a size mismatch error.
    pub fn size_mismatch(expected: u64, actual: u64) -> Self {
        Self::SizeMismatch { expected, actual }
    }

    /// Create a password required error.
    pub fn password_required(name: impl Into<String>) -> Self {
        Self::PasswordRequired { name: name.into() }
    }

    /// Create a wrong password error.
    pub fn wrong_password(name: impl Into<String>) -> Self {
        Self::WrongPassword { name: name.into() }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported_feature(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Move input positions forward by `bytes`.
    ///
    /// Used when the reader that raised the error only saw a suffix of the
    /// input. Errors without a position are returned unchanged.
    pub fn offset_by(self, bytes: u64) -> Self {
        match self {
            Self::CorruptedData { offset, message } => Self::CorruptedData {
                offset: offset + bytes,
                message,
            },
            Self::InvalidHuffmanCode { bit_position } => Self::InvalidHuffmanCode {
                bit_position: bit_position + bytes * 8,
            },
            other => other,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMagic { .. }
            | Self::InvalidHeader { .. }
            | Self::CorruptedData { .. }
            | Self::InvalidHuffmanCode { .. }
            | Self::InvalidDistance { .. }
            | Self::UnexpectedEof { .. } => ErrorKind::Format,
            Self::ChecksumMismatch { .. } => ErrorKind::Checksum,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::PasswordRequired { .. } => ErrorKind::PasswordRequired,
            Self::WrongPassword { .. } => ErrorKind::WrongPassword,
            Self::UnsupportedMethod { .. } | Self::UnsupportedFeature { .. } => {
                ErrorKind::Unsupported
            }
            Self::EntryNotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Returns `true` for malformed or truncated input.
    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}
