//! GZIP member header parsing and writing.

use encoding_rs::WINDOWS_1252;
use zpack_core::crc::Crc32;
use zpack_core::error::{ChecksumKind, Result, ZpackError};

/// GZIP magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// GZIP compression method: DEFLATE.
pub const CM_DEFLATE: u8 = 8;

/// Size of the fixed part of a member header.
pub const FIXED_HEADER_SIZE: usize = 10;

/// GZIP header flags.
pub mod flags {
    /// Text file.
    pub const FTEXT: u8 = 0x01;
    /// Header CRC present.
    pub const FHCRC: u8 = 0x02;
    /// Extra field present.
    pub const FEXTRA: u8 = 0x04;
    /// Original filename present.
    pub const FNAME: u8 = 0x08;
    /// Comment present.
    pub const FCOMMENT: u8 = 0x10;
    /// Bits no decoder may see set.
    pub const RESERVED: u8 = 0xE0;
}

/// Operating system byte for "unknown".
pub const OS_UNKNOWN: u8 = 255;

/// GZIP member header.
///
/// `flags` only carries FTEXT when writing; the FEXTRA, FNAME, FCOMMENT
/// and FHCRC bits are derived from which optional fields are present.
/// After parsing, `flags` is the byte exactly as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    /// Flags.
    pub flags: u8,
    /// Modification time (Unix timestamp, 0 if unknown).
    pub mtime: u32,
    /// Extra flags (2 = maximum compression, 4 = fastest).
    pub xfl: u8,
    /// Operating system.
    pub os: u8,
    /// Raw FEXTRA payload.
    pub extra: Option<Vec<u8>>,
    /// Original filename (ISO-8859-1 on the wire).
    pub filename: Option<String>,
    /// Comment (ISO-8859-1 on the wire).
    pub comment: Option<String>,
    /// Header CRC16. When writing, any `Some` value requests the field and
    /// the real CRC is computed.
    pub header_crc: Option<u16>,
}

impl Default for GzipHeader {
    fn default() -> Self {
        Self {
            flags: 0,
            mtime: 0,
            xfl: 0,
            os: OS_UNKNOWN,
            extra: None,
            filename: None,
            comment: None,
            header_crc: None,
        }
    }
}

impl GzipHeader {
    /// Create a new GZIP header with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the producer marked the payload as text.
    pub fn is_text(&self) -> bool {
        self.flags & flags::FTEXT != 0
    }

    /// The flag byte this header serializes with.
    pub fn wire_flags(&self) -> u8 {
        let mut value = self.flags & flags::FTEXT;
        if self.header_crc.is_some() {
            value |= flags::FHCRC;
        }
        if self.extra.is_some() {
            value |= flags::FEXTRA;
        }
        if self.filename.is_some() {
            value |= flags::FNAME;
        }
        if self.comment.is_some() {
            value |= flags::FCOMMENT;
        }
        value
    }

    /// Append the serialized header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();

        out.extend_from_slice(&GZIP_MAGIC);
        out.push(CM_DEFLATE);
        out.push(self.wire_flags());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.push(self.xfl);
        out.push(self.os);

        if let Some(extra) = &self.extra {
            let xlen = u16::try_from(extra.len()).map_err(|_| {
                ZpackError::invalid_header(format!(
                    "gzip extra field is {} bytes, limit is 65535",
                    extra.len()
                ))
            })?;
            out.extend_from_slice(&xlen.to_le_bytes());
            out.extend_from_slice(extra);
        }

        if let Some(filename) = &self.filename {
            out.extend_from_slice(&encode_latin1(filename));
            out.push(0);
        }

        if let Some(comment) = &self.comment {
            out.extend_from_slice(&encode_latin1(comment));
            out.push(0);
        }

        if self.header_crc.is_some() {
            let crc16 = (Crc32::compute(&out[start..]) & 0xFFFF) as u16;
            out.extend_from_slice(&crc16.to_le_bytes());
        }

        Ok(())
    }

    /// Parse a header at the start of `data`.
    ///
    /// Returns the header and the number of bytes it occupies.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(ZpackError::unexpected_eof(FIXED_HEADER_SIZE - data.len()));
        }

        if data[0..2] != GZIP_MAGIC {
            return Err(ZpackError::invalid_magic(GZIP_MAGIC.to_vec(), data[0..2].to_vec()));
        }

        let method = data[2];
        if method != CM_DEFLATE {
            return Err(ZpackError::unsupported_method(format!("gzip method {}", method)));
        }

        let flag_byte = data[3];
        if flag_byte & flags::RESERVED != 0 {
            return Err(ZpackError::unsupported_feature(format!(
                "reserved gzip flag bits {:#04x}",
                flag_byte & flags::RESERVED
            )));
        }

        let mut header = Self {
            flags: flag_byte,
            mtime: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            xfl: data[8],
            os: data[9],
            ..Self::default()
        };
        let mut pos = FIXED_HEADER_SIZE;

        if flag_byte & flags::FEXTRA != 0 {
            let len_bytes = take(data, pos, 2)?;
            let xlen = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
            pos += 2;
            header.extra = Some(take(data, pos, xlen)?.to_vec());
            pos += xlen;
        }

        if flag_byte & flags::FNAME != 0 {
            let (text, next) = take_zero_terminated(data, pos)?;
            header.filename = Some(decode_latin1(text));
            pos = next;
        }

        if flag_byte & flags::FCOMMENT != 0 {
            let (text, next) = take_zero_terminated(data, pos)?;
            header.comment = Some(decode_latin1(text));
            pos = next;
        }

        if flag_byte & flags::FHCRC != 0 {
            let crc_bytes = take(data, pos, 2)?;
            let stored = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
            let computed = (Crc32::compute(&data[..pos]) & 0xFFFF) as u16;
            if stored != computed {
                return Err(ZpackError::checksum_mismatch(
                    ChecksumKind::HeaderCrc16,
                    stored as u32,
                    computed as u32,
                ));
            }
            header.header_crc = Some(stored);
            pos += 2;
        }

        Ok((header, pos))
    }
}

fn take(data: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    data.get(pos..pos + len)
        .ok_or_else(|| ZpackError::unexpected_eof(pos + len - data.len()))
}

fn take_zero_terminated(data: &[u8], pos: usize) -> Result<(&[u8], usize)> {
    let rest = data.get(pos..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ZpackError::unexpected_eof(1))?;
    Ok((&rest[..end], pos + end + 1))
}

/// Decode ISO-8859-1 text.
///
/// windows-1252 is the WHATWG label for Latin-1 and agrees with it on
/// every printable position.
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    WINDOWS_1252
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

/// Encode text as ISO-8859-1, replacing anything outside it (and NUL) with `?`.
pub(crate) fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0 => b'?',
            code @ 1..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}
