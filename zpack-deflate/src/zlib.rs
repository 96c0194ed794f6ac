//! Zlib format wrapper for DEFLATE compression.
//!
//! The zlib format (RFC 1950) wraps raw DEFLATE data with a header and
//! an Adler-32 checksum.
//!
//! # Format
//!
//! ```text
//! +---+---+============+---+---+---+---+
//! |CMF|FLG| compressed |    ADLER32    |
//! +---+---+============+---+---+---+---+
//! ```
//!
//! - CMF: Compression Method and Flags
//!   - Bits 0-3: CM (Compression Method) - must be 8 for DEFLATE
//!   - Bits 4-7: CINFO (Compression Info) - log2(window size) - 8
//! - FLG: Flags
//!   - Bits 0-4: FCHECK - check bits so (CMF*256 + FLG) mod 31 == 0
//!   - Bit 5: FDICT - preset dictionary present (not supported)
//!   - Bits 6-7: FLEVEL - compression level hint (0-3)
//! - Compressed data (DEFLATE format)
//! - ADLER32: Adler-32 checksum of uncompressed data (big-endian)
//!
//! # Example
//!
//! ```
//! use zpack_deflate::zlib;
//!
//! let data = b"Hello, World! Hello, World!";
//! let compressed = zlib::compress(data).unwrap();
//! assert_eq!(&compressed[..2], &[0x78, 0x9C]);
//! assert_eq!(zlib::decompress(&compressed, true).unwrap(), data);
//! ```

use crate::deflate::{CompressionType, DeflateOptions, Deflater};
use crate::inflate::RawInflater;
use crate::stream::InflateStream;
use zpack_core::adler::Adler32;
use zpack_core::error::{ChecksumKind, Result, ZpackError};

/// Compression method 8 with a 32 KiB window (CINFO = 7).
const CMF_DEFLATE_32K: u8 = 0x78;

/// Size of the ZLIB header.
const HEADER_SIZE: usize = 2;

/// Size of the Adler-32 trailer.
const TRAILER_SIZE: usize = 4;

/// ZLIB compression options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZlibOptions {
    /// Options for the DEFLATE body.
    pub deflate: DeflateOptions,
}

impl ZlibOptions {
    /// Set the DEFLATE options.
    pub fn with_deflate(mut self, deflate: DeflateOptions) -> Self {
        self.deflate = deflate;
        self
    }
}

/// FLEVEL hint for a compression type.
fn flevel(compression_type: CompressionType) -> u8 {
    match compression_type {
        CompressionType::None => 0,
        CompressionType::Fixed => 1,
        CompressionType::Dynamic => 2,
    }
}

/// Build the CMF/FLG pair.
fn header(compression_type: CompressionType) -> [u8; 2] {
    let cmf = CMF_DEFLATE_32K;
    let flg = flevel(compression_type) << 6;
    let remainder = (cmf as u16 * 256 + flg as u16) % 31;
    let fcheck = if remainder == 0 { 0 } else { 31 - remainder as u8 };
    [cmf, flg | fcheck]
}

/// Validate the CMF/FLG pair.
fn check_header(cmf: u8, flg: u8) -> Result<()> {
    if cmf & 0x0F != 8 {
        return Err(ZpackError::unsupported_method(format!(
            "zlib compression method {}",
            cmf & 0x0F
        )));
    }
    if cmf >> 4 > 7 {
        return Err(ZpackError::invalid_header(format!(
            "invalid zlib window size: CINFO {}",
            cmf >> 4
        )));
    }
    if (cmf as u16 * 256 + flg as u16) % 31 != 0 {
        return Err(ZpackError::invalid_header("zlib header check failed"));
    }
    if flg & 0x20 != 0 {
        return Err(ZpackError::unsupported_feature("zlib preset dictionary"));
    }
    Ok(())
}

fn verify_adler32(expected: u32, computed: u32) -> Result<()> {
    if expected != computed {
        return Err(ZpackError::checksum_mismatch(
            ChecksumKind::Adler32,
            expected,
            computed,
        ));
    }
    Ok(())
}

/// Compress data into a zlib stream with default options.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &ZlibOptions::default())
}

/// Compress data into a zlib stream.
pub fn compress_with(data: &[u8], options: &ZlibOptions) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2 + HEADER_SIZE + TRAILER_SIZE + 64);
    output.extend_from_slice(&header(options.deflate.compression_type));

    Deflater::new(options.deflate.clone()).compress_into(data, &mut output)?;

    output.extend_from_slice(&Adler32::checksum(data).to_be_bytes());
    Ok(output)
}

/// Decompress a zlib stream.
///
/// With `verify`, the Adler-32 trailer must match the output. The trailer
/// must be present either way.
pub fn decompress(data: &[u8], verify: bool) -> Result<Vec<u8>> {
    let [cmf, flg, ..] = *data else {
        return Err(ZpackError::unexpected_eof(HEADER_SIZE - data.len()));
    };
    check_header(cmf, flg)?;

    let body = &data[HEADER_SIZE..];
    let mut inflater = RawInflater::new(body);
    let output = inflater.decompress()?;

    let trailer_start = inflater.consumed();
    let Some(trailer) = body.get(trailer_start..trailer_start + TRAILER_SIZE) else {
        return Err(ZpackError::unexpected_eof(
            trailer_start + TRAILER_SIZE - body.len(),
        ));
    };

    if verify {
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        verify_adler32(expected, Adler32::checksum(&output))?;
    }

    Ok(output)
}

/// Incremental zlib decoder.
///
/// Parses the header once two bytes are available, streams the body
/// through [`InflateStream`], and checks the Adler-32 trailer when it
/// arrives.
#[derive(Debug)]
pub struct ZlibInflateStream {
    header: Vec<u8>,
    header_parsed: bool,
    inflater: InflateStream,
    adler: Adler32,
    verify: bool,
    finished: bool,
}

impl Default for ZlibInflateStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibInflateStream {
    /// Create a decoder that verifies the trailer.
    pub fn new() -> Self {
        Self::with_verify(true)
    }

    /// Create a decoder, optionally skipping the trailer check.
    pub fn with_verify(verify: bool) -> Self {
        Self {
            header: Vec::with_capacity(HEADER_SIZE),
            header_parsed: false,
            inflater: InflateStream::new(),
            adler: Adler32::new(),
            verify,
            finished: false,
        }
    }

    /// Whether the body and trailer have both been consumed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed more input; returns the bytes it completed.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<u8>> {
        if self.finished {
            return Ok(Vec::new());
        }

        if !self.header_parsed {
            let take = (HEADER_SIZE - self.header.len()).min(data.len());
            self.header.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.header.len() < HEADER_SIZE {
                return Ok(Vec::new());
            }
            check_header(self.header[0], self.header[1])?;
            self.header_parsed = true;
        }

        let output = self.inflater.feed(data)?;
        self.adler.update(&output);

        if self.inflater.is_finished() {
            if let [a, b, c, d, ..] = *self.inflater.remaining_input() {
                if self.verify {
                    verify_adler32(u32::from_be_bytes([a, b, c, d]), self.adler.finish())?;
                }
                self.finished = true;
            }
        }

        Ok(output)
    }
}
