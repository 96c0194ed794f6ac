//! ZIP record layouts: local file header, central directory header and
//! end of central directory, plus DOS timestamps.

use encoding_rs::WINDOWS_1252;
use std::time::{SystemTime, UNIX_EPOCH};
use zpack_core::error::{Result, ZpackError};

/// Local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// Central directory file header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// End of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// Version needed to extract: 2.0 (deflate, traditional encryption).
pub const VERSION_NEEDED: u16 = 20;

/// Entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// CRC and sizes follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

pub(crate) const LOCAL_HEADER_SIZE: usize = 30;
pub(crate) const CENTRAL_HEADER_SIZE: usize = 46;
pub(crate) const EOCD_SIZE: usize = 22;

/// Longest archive comment the EOCD length field can describe.
const MAX_COMMENT: usize = 0xFFFF;

/// ZIP compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Stored (no compression).
    Stored,
    /// Deflate compression.
    Deflate,
    /// Unknown method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Create from a u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            _ => Self::Unknown(value),
        }
    }

    /// The on-disk method id.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => id,
        }
    }
}

/// Host system recorded in the high byte of "version made by".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingSystem {
    /// MS-DOS and OS/2 (FAT).
    #[default]
    MsDos,
    /// Unix.
    Unix,
    /// Classic Macintosh.
    Macintosh,
}

impl OperatingSystem {
    /// The on-disk host id.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::MsDos => 0,
            Self::Unix => 3,
            Self::Macintosh => 7,
        }
    }

    /// Map a host id back, if it is one of the known three.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::MsDos),
            3 => Some(Self::Unix),
            7 => Some(Self::Macintosh),
            _ => None,
        }
    }
}

/// MS-DOS packed date and time, two-second resolution, 1980..=2107.
///
/// `time` is `hour << 11 | minute << 5 | second / 2`,
/// `date` is `(year - 1980) << 9 | month << 5 | day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Packed time.
    pub time: u16,
    /// Packed date.
    pub date: u16,
}

impl Default for DosDateTime {
    /// 1980-01-01 00:00:00, the DOS epoch.
    fn default() -> Self {
        Self {
            time: 0,
            date: (1 << 5) | 1,
        }
    }
}

impl DosDateTime {
    /// Pack calendar fields. Years outside 1980..=2107 clamp to the
    /// nearest representable instant; other fields are masked.
    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        if year < 1980 {
            return Self::default();
        }
        if year > 2107 {
            return Self::from_parts(2107, 12, 31, 23, 59, 58);
        }

        let time = ((hour as u16 & 0x1F) << 11)
            | ((minute as u16 & 0x3F) << 5)
            | ((second as u16 / 2) & 0x1F);
        let date = ((year - 1980) << 9) | ((month as u16 & 0x0F) << 5) | (day as u16 & 0x1F);
        Self { time, date }
    }

    /// Unpack into (year, month, day, hour, minute, second).
    pub fn to_parts(self) -> (u16, u8, u8, u8, u8, u8) {
        (
            (self.date >> 9) + 1980,
            ((self.date >> 5) & 0x0F) as u8,
            (self.date & 0x1F) as u8,
            (self.time >> 11) as u8,
            ((self.time >> 5) & 0x3F) as u8,
            ((self.time & 0x1F) * 2) as u8,
        )
    }

    /// Convert seconds since the Unix epoch (UTC).
    pub fn from_unix(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let time_of_day = secs % 86_400;
        let (year, month, day) = civil_from_days(days);

        Self::from_parts(
            year.clamp(0, u16::MAX as i64) as u16,
            month,
            day,
            (time_of_day / 3600) as u8,
            ((time_of_day % 3600) / 60) as u8,
            (time_of_day % 60) as u8,
        )
    }

    /// Convert a system timestamp (UTC). Times before 1980 clamp to the DOS epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self::from_unix(elapsed.as_secs()),
            Err(_) => Self::default(),
        }
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Decode an entry name or comment: UTF-8 when flagged or valid, else
/// the DOS-era single-byte code page approximated by windows-1252.
pub fn decode_text(bytes: &[u8], flags: u16) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) if flags & FLAG_UTF8 != 0 => String::from_utf8_lossy(bytes).into_owned(),
        Err(_) => WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0
            .into_owned(),
    }
}

#[inline]
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Bounds-checked slice of `len` bytes at `pos`.
pub(crate) fn slice_at(data: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    pos.checked_add(len)
        .and_then(|end| data.get(pos..end))
        .ok_or_else(|| ZpackError::unexpected_eof(pos.saturating_add(len) - data.len()))
}

fn check_signature(buf: &[u8], expected: u32) -> Result<()> {
    let found = read_u32(buf, 0);
    if found != expected {
        return Err(ZpackError::invalid_magic(
            expected.to_le_bytes().to_vec(),
            found.to_le_bytes().to_vec(),
        ));
    }
    Ok(())
}

fn len_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        ZpackError::invalid_header(format!("{} is {} bytes, limit is 65535", what, len))
    })
}

/// ZIP local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Stored size, including any encryption header.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
    /// Raw file name.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Serialized length.
    pub fn size(&self) -> usize {
        LOCAL_HEADER_SIZE + self.name.len() + self.extra.len()
    }

    /// Append the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = len_u16(self.name.len(), "file name")?;
        let extra_len = len_u16(self.extra.len(), "extra field")?;

        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_u16().to_le_bytes());
        out.extend_from_slice(&self.modified.time.to_le_bytes());
        out.extend_from_slice(&self.modified.date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        Ok(())
    }

    /// Parse the header at `pos`. Returns it and the offset of the entry data.
    pub fn parse(data: &[u8], pos: usize) -> Result<(Self, usize)> {
        let buf = slice_at(data, pos, LOCAL_HEADER_SIZE)?;
        check_signature(buf, LOCAL_FILE_HEADER_SIG)?;

        let name_len = read_u16(buf, 26) as usize;
        let extra_len = read_u16(buf, 28) as usize;
        let name = slice_at(data, pos + LOCAL_HEADER_SIZE, name_len)?.to_vec();
        let extra = slice_at(data, pos + LOCAL_HEADER_SIZE + name_len, extra_len)?.to_vec();

        let header = Self {
            version_needed: read_u16(buf, 4),
            flags: read_u16(buf, 6),
            method: CompressionMethod::from_u16(read_u16(buf, 8)),
            modified: DosDateTime {
                time: read_u16(buf, 10),
                date: read_u16(buf, 12),
            },
            crc32: read_u32(buf, 14),
            compressed_size: read_u32(buf, 18),
            uncompressed_size: read_u32(buf, 22),
            name,
            extra,
        };
        let data_offset = pos + header.size();
        Ok((header, data_offset))
    }
}

/// ZIP central directory file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Host system in the high byte, APPNOTE version in the low byte.
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Stored size, including any encryption header.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
    /// Raw file name.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// Raw file comment.
    pub comment: Vec<u8>,
    /// Disk number where the entry starts.
    pub disk_start: u16,
    /// Internal attributes.
    pub internal_attributes: u16,
    /// External (host) attributes.
    pub external_attributes: u32,
    /// Offset of the local file header.
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    /// Serialized length.
    pub fn size(&self) -> usize {
        CENTRAL_HEADER_SIZE + self.name.len() + self.extra.len() + self.comment.len()
    }

    /// The local header carrying the same entry fields.
    pub fn local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method,
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            name: self.name.clone(),
            extra: self.extra.clone(),
        }
    }

    /// Append the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = len_u16(self.name.len(), "file name")?;
        let extra_len = len_u16(self.extra.len(), "extra field")?;
        let comment_len = len_u16(self.comment.len(), "file comment")?;

        out.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_u16().to_le_bytes());
        out.extend_from_slice(&self.modified.time.to_le_bytes());
        out.extend_from_slice(&self.modified.date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.disk_start.to_le_bytes());
        out.extend_from_slice(&self.internal_attributes.to_le_bytes());
        out.extend_from_slice(&self.external_attributes.to_le_bytes());
        out.extend_from_slice(&self.local_header_offset.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    /// Parse the header at `pos`. Returns it and the offset just past it.
    pub fn parse(data: &[u8], pos: usize) -> Result<(Self, usize)> {
        let buf = slice_at(data, pos, CENTRAL_HEADER_SIZE)?;
        check_signature(buf, CENTRAL_DIR_HEADER_SIG)?;

        let name_len = read_u16(buf, 28) as usize;
        let extra_len = read_u16(buf, 30) as usize;
        let comment_len = read_u16(buf, 32) as usize;

        let mut cursor = pos + CENTRAL_HEADER_SIZE;
        let name = slice_at(data, cursor, name_len)?.to_vec();
        cursor += name_len;
        let extra = slice_at(data, cursor, extra_len)?.to_vec();
        cursor += extra_len;
        let comment = slice_at(data, cursor, comment_len)?.to_vec();
        cursor += comment_len;

        let header = Self {
            version_made_by: read_u16(buf, 4),
            version_needed: read_u16(buf, 6),
            flags: read_u16(buf, 8),
            method: CompressionMethod::from_u16(read_u16(buf, 10)),
            modified: DosDateTime {
                time: read_u16(buf, 12),
                date: read_u16(buf, 14),
            },
            crc32: read_u32(buf, 16),
            compressed_size: read_u32(buf, 20),
            uncompressed_size: read_u32(buf, 24),
            name,
            extra,
            comment,
            disk_start: read_u16(buf, 34),
            internal_attributes: read_u16(buf, 36),
            external_attributes: read_u32(buf, 38),
            local_header_offset: read_u32(buf, 42),
        };
        Ok((header, cursor))
    }
}

/// End of central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk holding the start of the central directory.
    pub central_directory_disk: u16,
    /// Entries on this disk.
    pub disk_entries: u16,
    /// Entries in total.
    pub total_entries: u16,
    /// Size of the central directory.
    pub central_directory_size: u32,
    /// Offset of the central directory.
    pub central_directory_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Append the record to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let comment_len = len_u16(self.comment.len(), "archive comment")?;

        out.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.central_directory_disk.to_le_bytes());
        out.extend_from_slice(&self.disk_entries.to_le_bytes());
        out.extend_from_slice(&self.total_entries.to_le_bytes());
        out.extend_from_slice(&self.central_directory_size.to_le_bytes());
        out.extend_from_slice(&self.central_directory_offset.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    /// Scan backward from the end of `data` for the record.
    ///
    /// The comment is variable length, so the record can start anywhere in
    /// the last 65535 + 22 bytes. The nearest signature whose comment fits
    /// inside the buffer wins.
    pub fn find(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < EOCD_SIZE {
            return Err(ZpackError::unexpected_eof(EOCD_SIZE - data.len()));
        }

        let search_start = data.len().saturating_sub(MAX_COMMENT + EOCD_SIZE);
        let signature = END_OF_CENTRAL_DIR_SIG.to_le_bytes();

        let pos = (search_start..=data.len() - EOCD_SIZE)
            .rev()
            .find(|&pos| {
                data[pos..pos + 4] == signature
                    && pos + EOCD_SIZE + read_u16(data, pos + 20) as usize <= data.len()
            })
            .ok_or_else(|| ZpackError::invalid_header("End of central directory not found"))?;

        let buf = &data[pos..pos + EOCD_SIZE];
        let comment_len = read_u16(buf, 20) as usize;
        let record = Self {
            disk_number: read_u16(buf, 4),
            central_directory_disk: read_u16(buf, 6),
            disk_entries: read_u16(buf, 8),
            total_entries: read_u16(buf, 10),
            central_directory_size: read_u32(buf, 12),
            central_directory_offset: read_u32(buf, 16),
            comment: data[pos + EOCD_SIZE..pos + EOCD_SIZE + comment_len].to_vec(),
        };
        Ok((record, pos))
    }
}
