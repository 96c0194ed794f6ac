//! ZIP archive support (PKWARE APPNOTE subset).
//!
//! Archives are built and read entirely in memory. Entries are stored or
//! deflated, optionally protected with the legacy [`crypto::ZipCrypto`]
//! cipher. ZIP64, spanning and data descriptors on write are out of scope.
//!
//! ## Example
//!
//! ```rust
//! use zpack_archive::zip::{ZipArchive, ZipEntryOptions, ZipWriter};
//!
//! let mut writer = ZipWriter::new();
//! writer.add_entry("a.txt", b"alpha alpha alpha", ZipEntryOptions::default()).unwrap();
//! writer.add_entry("b.bin", &[0, 1, 2], ZipEntryOptions::default().with_compress(false)).unwrap();
//! let bytes = writer.serialize().unwrap();
//!
//! let archive = ZipArchive::open(&bytes).unwrap();
//! assert_eq!(archive.list_names(), ["a.txt", "b.bin"]);
//! assert_eq!(archive.extract("a.txt").unwrap(), b"alpha alpha alpha");
//! ```

pub mod crypto;
mod header;

pub use header::{
    CENTRAL_DIR_HEADER_SIG, CentralDirectoryHeader, CompressionMethod, DosDateTime,
    END_OF_CENTRAL_DIR_SIG, EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED,
    FLAG_UTF8, LOCAL_FILE_HEADER_SIG, LocalFileHeader, OperatingSystem, VERSION_NEEDED,
    decode_text,
};

use crypto::{ENCRYPTION_HEADER_SIZE, ZipCrypto};
use header::slice_at;
use std::time::{SystemTime, UNIX_EPOCH};
use zpack_core::crc::Crc32;
use zpack_core::error::{ChecksumKind, Result, ZpackError};
use zpack_deflate::{DeflateOptions, Deflater, InflateOptions, inflate_with};

/// Cap on the output buffer pre-sized from a declared entry size.
const MAX_PREALLOC: usize = 1 << 26;

/// Options for one entry added to a [`ZipWriter`].
#[derive(Debug, Clone)]
pub struct ZipEntryOptions {
    /// Deflate the data (otherwise store it).
    pub compress: bool,
    /// Encoder options when compressing.
    pub deflate: DeflateOptions,
    /// Per-entry comment (central directory only).
    pub comment: Option<Vec<u8>>,
    /// Extra field, written to both headers.
    pub extra_field: Option<Vec<u8>>,
    /// Host system recorded in "version made by".
    pub os: OperatingSystem,
    /// Modification time; `None` stamps the current time.
    pub modified: Option<DosDateTime>,
    /// Entry password; overrides the archive password.
    pub password: Option<Vec<u8>>,
}

impl Default for ZipEntryOptions {
    fn default() -> Self {
        Self {
            compress: true,
            deflate: DeflateOptions::default(),
            comment: None,
            extra_field: None,
            os: OperatingSystem::default(),
            modified: None,
            password: None,
        }
    }
}

impl ZipEntryOptions {
    /// Deflate or store.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the encoder options.
    pub fn with_deflate(mut self, deflate: DeflateOptions) -> Self {
        self.deflate = deflate;
        self
    }

    /// Set the entry comment.
    pub fn with_comment(mut self, comment: impl Into<Vec<u8>>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the extra field.
    pub fn with_extra_field(mut self, extra_field: impl Into<Vec<u8>>) -> Self {
        self.extra_field = Some(extra_field.into());
        self
    }

    /// Set the host system.
    pub fn with_os(mut self, os: OperatingSystem) -> Self {
        self.os = os;
        self
    }

    /// Set the modification time.
    pub fn with_modified(mut self, modified: DosDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Encrypt this entry with `password`.
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// An entry whose data has been compressed but not yet placed.
#[derive(Debug, Clone)]
struct PendingEntry {
    name: Vec<u8>,
    utf8: bool,
    method: CompressionMethod,
    modified: DosDateTime,
    crc32: u32,
    uncompressed_size: u32,
    payload: Vec<u8>,
    extra: Vec<u8>,
    comment: Vec<u8>,
    os: OperatingSystem,
    password: Option<Vec<u8>>,
}

/// In-memory ZIP archive builder.
#[derive(Debug, Clone, Default)]
pub struct ZipWriter {
    entries: Vec<PendingEntry>,
    password: Option<Vec<u8>>,
    comment: Vec<u8>,
}

impl ZipWriter {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encrypt every entry without its own password with `password`.
    pub fn set_password(&mut self, password: impl Into<Vec<u8>>) {
        self.password = Some(password.into());
    }

    /// Set the archive comment.
    pub fn set_comment(&mut self, comment: impl Into<Vec<u8>>) {
        self.comment = comment.into();
    }

    /// Compress `data` and append it as entry `name`.
    pub fn add_entry(&mut self, name: &str, data: &[u8], options: ZipEntryOptions) -> Result<()> {
        let uncompressed_size = u32::try_from(data.len()).map_err(|_| {
            ZpackError::unsupported_feature(format!(
                "entry {} is {} bytes, zip64 is not supported",
                name,
                data.len()
            ))
        })?;

        let crc32 = Crc32::compute(data);
        let (method, payload) = if options.compress {
            let deflater = Deflater::new(options.deflate);
            (CompressionMethod::Deflate, deflater.compress(data)?)
        } else {
            (CompressionMethod::Stored, data.to_vec())
        };

        tracing::trace!(
            name,
            method = ?method,
            uncompressed = data.len(),
            compressed = payload.len(),
            "zip entry added"
        );

        self.entries.push(PendingEntry {
            name: name.as_bytes().to_vec(),
            utf8: !name.is_ascii(),
            method,
            modified: options.modified.unwrap_or_else(DosDateTime::now),
            crc32,
            uncompressed_size,
            payload,
            extra: options.extra_field.unwrap_or_default(),
            comment: options.comment.unwrap_or_default(),
            os: options.os,
            password: options.password,
        });
        Ok(())
    }

    /// Lay out local headers, data, central directory and end record.
    ///
    /// Encrypted entries get a fresh random header on every call.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let total_entries = u16::try_from(self.entries.len()).map_err(|_| {
            ZpackError::unsupported_feature(format!(
                "{} entries, zip64 is not supported",
                self.entries.len()
            ))
        })?;

        let mut output = Vec::new();
        let mut central = Vec::with_capacity(self.entries.len());

        for (index, entry) in self.entries.iter().enumerate() {
            let local_header_offset = offset_u32(output.len())?;
            let password = entry.password.as_ref().or(self.password.as_ref());

            let mut flags = 0;
            if entry.utf8 {
                flags |= FLAG_UTF8;
            }

            let data = match password {
                Some(password) => {
                    flags |= FLAG_ENCRYPTED;
                    encrypt_payload(entry, password, index)
                }
                None => entry.payload.clone(),
            };
            let compressed_size = u32::try_from(data.len()).map_err(|_| {
                ZpackError::unsupported_feature("compressed entry exceeds 4 GiB")
            })?;

            let header = CentralDirectoryHeader {
                version_made_by: ((entry.os.to_u8() as u16) << 8) | VERSION_NEEDED,
                version_needed: VERSION_NEEDED,
                flags,
                method: entry.method,
                modified: entry.modified,
                crc32: entry.crc32,
                compressed_size,
                uncompressed_size: entry.uncompressed_size,
                name: entry.name.clone(),
                extra: entry.extra.clone(),
                comment: entry.comment.clone(),
                disk_start: 0,
                internal_attributes: 0,
                external_attributes: 0,
                local_header_offset,
            };

            header.local_header().write(&mut output)?;
            output.extend_from_slice(&data);
            central.push(header);
        }

        let central_directory_offset = offset_u32(output.len())?;
        for header in &central {
            header.write(&mut output)?;
        }
        let central_directory_size = offset_u32(output.len())? - central_directory_offset;

        EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            disk_entries: total_entries,
            total_entries,
            central_directory_size,
            central_directory_offset,
            comment: self.comment.clone(),
        }
        .write(&mut output)?;

        tracing::debug!(
            entries = self.entries.len(),
            size = output.len(),
            "zip archive serialized"
        );
        Ok(output)
    }
}

fn offset_u32(offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .map_err(|_| ZpackError::unsupported_feature("archive exceeds 4 GiB, zip64 is not supported"))
}

/// Prefix the 12-byte header and encrypt. The check byte is the low byte
/// of the entry CRC.
fn encrypt_payload(entry: &PendingEntry, password: &[u8], index: usize) -> Vec<u8> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ ((index as u64) << 32)
        ^ entry.crc32 as u64;

    let mut cipher = ZipCrypto::new(password);
    let header = cipher.generate_header_seeded(entry.crc32 as u8, seed);

    let mut data = Vec::with_capacity(ENCRYPTION_HEADER_SIZE + entry.payload.len());
    data.extend_from_slice(&header);
    data.extend_from_slice(&entry.payload);
    cipher.encrypt_buffer(&mut data[ENCRYPTION_HEADER_SIZE..]);
    data
}

/// Central directory metadata for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Decoded name.
    pub name: String,
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
    /// General purpose bit flag.
    pub flags: u16,
    /// Raw version-made-by field.
    pub version_made_by: u16,
    /// Raw extra field from the central directory.
    pub extra: Vec<u8>,
    /// Raw entry comment.
    pub comment: Vec<u8>,
    /// Offset of the local file header.
    pub local_header_offset: u32,
}

impl ZipEntry {
    fn from_central(header: CentralDirectoryHeader) -> Self {
        Self {
            name: decode_text(&header.name, header.flags),
            method: header.method,
            modified: header.modified,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            flags: header.flags,
            version_made_by: header.version_made_by,
            extra: header.extra,
            comment: header.comment,
            local_header_offset: header.local_header_offset,
        }
    }

    /// Whether the entry uses the legacy cipher.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Host system, if it is one of the known ones.
    pub fn os(&self) -> Option<OperatingSystem> {
        OperatingSystem::from_u8((self.version_made_by >> 8) as u8)
    }

    /// Entry comment decoded like the name.
    pub fn comment_text(&self) -> String {
        decode_text(&self.comment, self.flags)
    }
}

/// Read-only view of a ZIP archive held in memory.
#[derive(Debug, Clone)]
pub struct ZipArchive<'a> {
    data: &'a [u8],
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
    password: Option<Vec<u8>>,
    verify: bool,
}

impl<'a> ZipArchive<'a> {
    /// Locate the end record and parse the central directory.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let (eocd, eocd_pos) = EndOfCentralDirectory::find(data)?;

        if eocd.disk_number != 0 || eocd.central_directory_disk != 0 {
            return Err(ZpackError::unsupported_feature("multi-disk archive"));
        }

        let mut pos = eocd.central_directory_offset as usize;
        let cd_end = pos + eocd.central_directory_size as usize;
        if cd_end > eocd_pos {
            return Err(ZpackError::invalid_header(format!(
                "central directory [{}, {}) overlaps end record at {}",
                pos, cd_end, eocd_pos
            )));
        }

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            let (header, next) = CentralDirectoryHeader::parse(data, pos)?;
            entries.push(ZipEntry::from_central(header));
            pos = next;
        }

        tracing::debug!(
            entries = entries.len(),
            central_directory_offset = eocd.central_directory_offset,
            "zip central directory parsed"
        );

        Ok(Self {
            data,
            entries,
            comment: eocd.comment,
            password: None,
            verify: true,
        })
    }

    /// Entry names in central-directory order.
    pub fn list_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// All entry metadata.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// First entry named `name`.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Raw archive comment.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Default password for encrypted entries.
    pub fn set_password(&mut self, password: impl Into<Vec<u8>>) {
        self.password = Some(password.into());
    }

    /// Enable or disable CRC and size verification (on by default).
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Extract `name` using the archive password, if any.
    pub fn extract(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ZpackError::entry_not_found(name))?;
        self.extract_entry(entry, self.password.as_deref())
    }

    /// Extract `name` with an explicit password.
    pub fn extract_with_password(&self, name: &str, password: &[u8]) -> Result<Vec<u8>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ZpackError::entry_not_found(name))?;
        self.extract_entry(entry, Some(password))
    }

    /// Extract the data of `entry`.
    pub fn extract_entry(&self, entry: &ZipEntry, password: Option<&[u8]>) -> Result<Vec<u8>> {
        let (_, data_offset) = LocalFileHeader::parse(self.data, entry.local_header_offset as usize)?;
        let stored = slice_at(self.data, data_offset, entry.compressed_size as usize)?;

        let decrypted;
        let compressed = if entry.is_encrypted() {
            let password = password.ok_or_else(|| ZpackError::password_required(&entry.name))?;
            decrypted = decrypt_payload(entry, stored, password)?;
            &decrypted[..]
        } else {
            stored
        };

        let output = match entry.method {
            CompressionMethod::Stored => compressed.to_vec(),
            CompressionMethod::Deflate => {
                let options = InflateOptions::default()
                    .with_buffer_size((entry.uncompressed_size as usize).min(MAX_PREALLOC));
                inflate_with(compressed, &options)?
            }
            CompressionMethod::Unknown(id) => {
                return Err(ZpackError::unsupported_method(format!("zip method {}", id)));
            }
        };

        if self.verify {
            let computed = Crc32::compute(&output);
            if computed != entry.crc32 {
                return Err(ZpackError::checksum_mismatch(
                    ChecksumKind::Crc32,
                    entry.crc32,
                    computed,
                ));
            }
            if output.len() as u64 != entry.uncompressed_size as u64 {
                return Err(ZpackError::size_mismatch(
                    entry.uncompressed_size as u64,
                    output.len() as u64,
                ));
            }
        }

        tracing::debug!(
            name = %entry.name,
            method = ?entry.method,
            size = output.len(),
            "zip entry extracted"
        );
        Ok(output)
    }
}

/// Check the header byte and decrypt the rest.
///
/// Writers disagree on the check byte: the low CRC byte, the high CRC byte
/// (APPNOTE), or the high time byte when a data descriptor follows. Any of
/// them is accepted.
fn decrypt_payload(entry: &ZipEntry, stored: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let header: &[u8; ENCRYPTION_HEADER_SIZE] = stored
        .get(..ENCRYPTION_HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| {
            ZpackError::corrupted(
                entry.local_header_offset as u64,
                "encrypted entry shorter than its 12-byte header",
            )
        })?;

    let mut cipher = ZipCrypto::new(password);
    let check = cipher.decrypt_header(header);

    let matches = check == entry.crc32 as u8
        || check == (entry.crc32 >> 24) as u8
        || (entry.flags & FLAG_DATA_DESCRIPTOR != 0 && check == (entry.modified.time >> 8) as u8);
    if !matches {
        return Err(ZpackError::wrong_password(&entry.name));
    }

    let mut data = stored[ENCRYPTION_HEADER_SIZE..].to_vec();
    cipher.decrypt_buffer(&mut data);
    Ok(data)
}
