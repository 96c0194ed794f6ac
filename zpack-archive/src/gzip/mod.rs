//! GZIP format support (RFC 1952).
//!
//! A GZIP buffer is one or more members laid end to end. Each member is a
//! header, one raw DEFLATE stream and an 8-byte trailer (CRC-32 and size
//! mod 2^32, both little-endian). [`decompress`] walks every member and
//! concatenates the payloads; [`members`] keeps the per-member metadata.
//!
//! ## Example
//!
//! ```rust
//! use zpack_archive::gzip::{self, GzipOptions};
//!
//! let options = GzipOptions::default().with_filename("hello.txt").with_mtime(0);
//! let mut bytes = gzip::compress_with(b"Hello, ", &options).unwrap();
//! bytes.extend(gzip::compress(b"World!").unwrap());
//!
//! assert_eq!(gzip::decompress(&bytes).unwrap(), b"Hello, World!");
//! let members = gzip::members(&bytes).unwrap();
//! assert_eq!(members[0].header.filename.as_deref(), Some("hello.txt"));
//! ```

mod header;

pub use header::{CM_DEFLATE, GZIP_MAGIC, GzipHeader, OS_UNKNOWN, flags};

use std::time::{SystemTime, UNIX_EPOCH};
use zpack_core::crc::Crc32;
use zpack_core::error::{ChecksumKind, Result, ZpackError};
use zpack_deflate::{CompressionType, DeflateOptions, Deflater, RawInflater};

/// Size of the CRC-32 + ISIZE trailer.
const TRAILER_SIZE: usize = 8;

/// Options for writing a GZIP member.
#[derive(Debug, Clone)]
pub struct GzipOptions {
    /// Original filename (FNAME).
    pub filename: Option<String>,
    /// Free-form comment (FCOMMENT).
    pub comment: Option<String>,
    /// Modification time; `None` stamps the current time.
    pub mtime: Option<u32>,
    /// Raw extra field (FEXTRA).
    pub extra: Option<Vec<u8>>,
    /// Emit the 16-bit header CRC (FHCRC).
    pub header_crc: bool,
    /// Mark the payload as text (FTEXT).
    pub text: bool,
    /// Operating system byte.
    pub os: u8,
    /// Encoder options for the body.
    pub deflate: DeflateOptions,
}

impl Default for GzipOptions {
    fn default() -> Self {
        Self {
            filename: None,
            comment: None,
            mtime: None,
            extra: None,
            header_crc: false,
            text: false,
            os: OS_UNKNOWN,
            deflate: DeflateOptions::default(),
        }
    }
}

impl GzipOptions {
    /// Set the stored filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the stored comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: u32) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set the raw extra field.
    pub fn with_extra(mut self, extra: impl Into<Vec<u8>>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Request a header CRC.
    pub fn with_header_crc(mut self, header_crc: bool) -> Self {
        self.header_crc = header_crc;
        self
    }

    /// Mark the payload as text.
    pub fn with_text(mut self, text: bool) -> Self {
        self.text = text;
        self
    }

    /// Set the operating system byte.
    pub fn with_os(mut self, os: u8) -> Self {
        self.os = os;
        self
    }

    /// Set the encoder options.
    pub fn with_deflate(mut self, deflate: DeflateOptions) -> Self {
        self.deflate = deflate;
        self
    }

    fn header(&self) -> GzipHeader {
        let xfl = match self.deflate.compression_type {
            CompressionType::Dynamic => 2,
            CompressionType::None | CompressionType::Fixed => 4,
        };

        GzipHeader {
            flags: if self.text { flags::FTEXT } else { 0 },
            mtime: self.mtime.unwrap_or_else(unix_now),
            xfl,
            os: self.os,
            extra: self.extra.clone(),
            filename: self.filename.clone(),
            comment: self.comment.clone(),
            header_crc: self.header_crc.then_some(0),
        }
    }
}

/// One decoded GZIP member.
#[derive(Debug, Clone)]
pub struct GzipMember {
    /// Parsed header.
    pub header: GzipHeader,
    /// Decompressed payload.
    pub data: Vec<u8>,
    /// CRC-32 from the trailer.
    pub crc32: u32,
    /// Uncompressed size mod 2^32 from the trailer.
    pub isize: u32,
}

/// Compress `data` into a single GZIP member with default options.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &GzipOptions::default())
}

/// Compress `data` into a single GZIP member.
pub fn compress_with(data: &[u8], options: &GzipOptions) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2 + 32);
    options.header().write(&mut output)?;

    Deflater::new(options.deflate.clone()).compress_into(data, &mut output)?;

    output.extend_from_slice(&Crc32::compute(data).to_le_bytes());
    output.extend_from_slice(&(data.len() as u32).to_le_bytes());

    tracing::debug!(
        input = data.len(),
        output = output.len(),
        "gzip member written"
    );
    Ok(output)
}

/// Decompress every member of a GZIP buffer and concatenate the payloads.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    for_each_member(data, |member| output.extend_from_slice(&member.data))?;
    Ok(output)
}

/// Decode every member of a GZIP buffer, keeping the headers.
pub fn members(data: &[u8]) -> Result<Vec<GzipMember>> {
    let mut members = Vec::new();
    for_each_member(data, |member| members.push(member))?;
    Ok(members)
}

fn for_each_member(data: &[u8], mut visit: impl FnMut(GzipMember)) -> Result<()> {
    if data.is_empty() {
        return Err(ZpackError::unexpected_eof(header::FIXED_HEADER_SIZE));
    }

    let mut pos = 0;
    while pos < data.len() {
        let (member, used) = read_member(&data[pos..])?;
        tracing::debug!(
            offset = pos,
            name = member.header.filename.as_deref().unwrap_or(""),
            size = member.data.len(),
            "gzip member decoded"
        );
        visit(member);
        pos += used;
    }
    Ok(())
}

/// Decode the member at the start of `data`, returning it and its encoded length.
fn read_member(data: &[u8]) -> Result<(GzipMember, usize)> {
    let (header, header_len) = GzipHeader::parse(data)?;

    let body = &data[header_len..];
    let mut inflater = RawInflater::new(body);
    let payload = inflater.decompress()?;
    let trailer_start = header_len + inflater.consumed();

    let trailer = data
        .get(trailer_start..trailer_start + TRAILER_SIZE)
        .ok_or_else(|| {
            ZpackError::unexpected_eof(trailer_start + TRAILER_SIZE - data.len())
        })?;
    let crc32 = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let computed = Crc32::compute(&payload);
    if computed != crc32 {
        return Err(ZpackError::checksum_mismatch(
            ChecksumKind::Crc32,
            crc32,
            computed,
        ));
    }

    let actual = payload.len() as u32;
    if actual != isize {
        return Err(ZpackError::size_mismatch(isize as u64, actual as u64));
    }

    Ok((
        GzipMember {
            header,
            data: payload,
            crc32,
            isize,
        },
        trailer_start + TRAILER_SIZE,
    ))
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zpack_core::error::ErrorKind;

    #[test]
    fn test_roundtrip_default() {
        let input = b"Hello, World! Hello, World! Hello, World!";
        let compressed = compress(input).unwrap();
        assert_eq!(&compressed[0..3], &[0x1F, 0x8B, 8]);
        assert_eq!(compressed[8], 2);
        assert_eq!(compressed[9], OS_UNKNOWN);
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_xfl_follows_strategy() {
        for (compression_type, xfl) in [
            (CompressionType::None, 4),
            (CompressionType::Fixed, 4),
            (CompressionType::Dynamic, 2),
        ] {
            let options = GzipOptions::default()
                .with_deflate(DeflateOptions::default().with_compression_type(compression_type));
            let compressed = compress_with(b"xfl", &options).unwrap();
            assert_eq!(compressed[8], xfl);
            assert_eq!(decompress(&compressed).unwrap(), b"xfl");
        }
    }

    #[test]
    fn test_empty_payload() {
        let compressed = compress(b"").unwrap();
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }

    #[test]
    fn test_empty_buffer_is_error() {
        assert_eq!(decompress(&[]).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn test_metadata_survives() {
        let options = GzipOptions::default()
            .with_filename("notes.txt")
            .with_comment("kept")
            .with_mtime(1234)
            .with_extra(vec![1, 2, 3])
            .with_header_crc(true)
            .with_text(true)
            .with_os(3);
        let compressed = compress_with(b"payload", &options).unwrap();

        let members = members(&compressed).unwrap();
        assert_eq!(members.len(), 1);
        let member = &members[0];
        assert_eq!(member.header.filename.as_deref(), Some("notes.txt"));
        assert_eq!(member.header.comment.as_deref(), Some("kept"));
        assert_eq!(member.header.mtime, 1234);
        assert_eq!(member.header.extra.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(member.header.os, 3);
        assert!(member.header.is_text());
        assert!(member.header.header_crc.is_some());
        assert_eq!(member.data, b"payload");
        assert_eq!(member.isize, 7);
        assert_eq!(member.crc32, Crc32::compute(b"payload"));
    }

    #[test]
    fn test_multi_member() {
        let mut bytes = compress(b"first ").unwrap();
        bytes.extend(compress(b"").unwrap());
        bytes.extend(compress(b"second").unwrap());
        assert_eq!(decompress(&bytes).unwrap(), b"first second");
        assert_eq!(members(&bytes).unwrap().len(), 3);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut bytes = compress(b"checksummed").unwrap();
        let crc_at = bytes.len() - 8;
        bytes[crc_at] ^= 1;
        assert!(matches!(
            decompress(&bytes),
            Err(ZpackError::ChecksumMismatch {
                kind: ChecksumKind::Crc32,
                ..
            })
        ));
    }

    #[test]
    fn test_size_mismatch() {
        let mut bytes = compress(b"sized").unwrap();
        let size_at = bytes.len() - 4;
        bytes[size_at] = 6;
        assert_eq!(
            decompress(&bytes).unwrap_err().kind(),
            ErrorKind::SizeMismatch
        );
    }

    #[test]
    fn test_missing_trailer() {
        let bytes = compress(b"truncated").unwrap();
        let err = decompress(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ZpackError::UnexpectedEof { expected: 3 }));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let mut bytes = compress(b"data").unwrap();
        bytes.extend_from_slice(b"junk");
        assert_eq!(decompress(&bytes).unwrap_err().kind(), ErrorKind::Format);
    }
}
