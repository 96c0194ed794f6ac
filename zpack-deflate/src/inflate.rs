//! DEFLATE decompression (inflate).
//!
//! This module implements the DEFLATE decompression algorithm as specified
//! in RFC 1951. It supports all three block types:
//! - Type 0: Stored (uncompressed)
//! - Type 1: Fixed Huffman codes
//! - Type 2: Dynamic Huffman codes
//!
//! The field parsers here are written against "maybe not enough input":
//! each returns `Ok(None)` when the data ends mid-field, which
//! [`RawInflater`] turns into an error and the streaming decoder turns
//! into a suspension point.

use crate::huffman::{END_OF_BLOCK, HuffmanTable};
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_EXTRA_BITS, LENGTH_EXTRA_BITS, MAX_MATCH, decode_distance,
    decode_length, fixed_distance_table, fixed_litlen_table,
};
use zpack_core::BitReader;
use zpack_core::error::{Result, ZpackError};

/// Default output growth step / initial capacity (32 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 0x8000;

/// Upper bound on a single adaptive growth step.
const MAX_ADAPTIVE_STEP: usize = 1 << 26;

/// How the one-shot decoder grows its output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferType {
    /// Grow in fixed `buffer_size` increments.
    Block,
    /// Grow by an estimate derived from the input consumed so far.
    #[default]
    Adaptive,
}

/// Decompression options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InflateOptions {
    /// Output growth strategy.
    pub buffer_type: BufferType,
    /// Initial output capacity, and the growth step for [`BufferType::Block`].
    pub buffer_size: Option<usize>,
}

impl InflateOptions {
    /// Set the output growth strategy.
    pub fn with_buffer_type(mut self, buffer_type: BufferType) -> Self {
        self.buffer_type = buffer_type;
        self
    }

    /// Set the initial output capacity.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    fn block_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }
}

/// BTYPE of a DEFLATE block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockType {
    Stored,
    Fixed,
    Dynamic,
}

/// One decoded literal/length symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Symbol {
    Literal(u8),
    EndOfBlock,
    Copy { length: usize, distance: usize },
}

/// Read BFINAL and BTYPE.
pub(crate) fn try_read_block_header(
    reader: &mut BitReader<'_>,
) -> Result<Option<(bool, BlockType)>> {
    let Some(header) = reader.try_read_bits(3) else {
        return Ok(None);
    };

    let is_final = header & 1 != 0;
    let block_type = match header >> 1 {
        0 => BlockType::Stored,
        1 => BlockType::Fixed,
        2 => BlockType::Dynamic,
        _ => return Err(ZpackError::invalid_header("Reserved block type 3")),
    };

    tracing::trace!(is_final, ?block_type, "inflate: block header");
    Ok(Some((is_final, block_type)))
}

/// Align and read a stored block's LEN/NLEN pair.
pub(crate) fn try_read_stored_length(reader: &mut BitReader<'_>) -> Result<Option<usize>> {
    reader.align_to_byte();
    let Some(len) = reader.try_read_bits(16) else {
        return Ok(None);
    };
    let Some(nlen) = reader.try_read_bits(16) else {
        return Ok(None);
    };

    if len != !nlen & 0xFFFF {
        return Err(ZpackError::corrupted(
            reader.byte_position() as u64,
            format!("length verify failed: LEN {:#06x}, NLEN {:#06x}", len, nlen),
        ));
    }
    Ok(Some(len as usize))
}

/// Read a dynamic block's table description and build both tables.
///
/// All-or-nothing: on `Ok(None)` the caller must rewind the reader.
pub(crate) fn try_read_dynamic_tables(
    reader: &mut BitReader<'_>,
) -> Result<Option<(HuffmanTable, HuffmanTable)>> {
    let Some(counts) = reader.try_read_bits(14) else {
        return Ok(None);
    };
    let hlit = (counts & 0x1F) as usize + 257;
    let hdist = ((counts >> 5) & 0x1F) as usize + 1;
    let hclen = ((counts >> 10) & 0xF) as usize + 4;

    if hlit > 286 || hdist > 30 {
        return Err(ZpackError::invalid_header(format!(
            "Too many length or distance symbols: HLIT {}, HDIST {}",
            hlit, hdist
        )));
    }

    let mut codelen_lengths = [0u8; 19];
    for &symbol in &CODE_LENGTH_ORDER[..hclen] {
        let Some(len) = reader.try_read_bits(3) else {
            return Ok(None);
        };
        codelen_lengths[symbol] = len as u8;
    }
    let codelen_table = HuffmanTable::from_lengths(&codelen_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut i = 0;
    while i < lengths.len() {
        let Some(symbol) = codelen_table.try_decode(reader)? else {
            return Ok(None);
        };

        let (value, repeat) = match symbol {
            0..=15 => {
                lengths[i] = symbol as u8;
                i += 1;
                continue;
            }
            16 => {
                let Some(extra) = reader.try_read_bits(2) else {
                    return Ok(None);
                };
                if i == 0 {
                    return Err(ZpackError::corrupted(
                        reader.byte_position() as u64,
                        "Repeat code 16 with no previous length",
                    ));
                }
                (lengths[i - 1], extra as usize + 3)
            }
            17 => {
                let Some(extra) = reader.try_read_bits(3) else {
                    return Ok(None);
                };
                (0, extra as usize + 3)
            }
            18 => {
                let Some(extra) = reader.try_read_bits(7) else {
                    return Ok(None);
                };
                (0, extra as usize + 11)
            }
            _ => return Err(ZpackError::invalid_huffman(reader.bit_position())),
        };

        if i + repeat > lengths.len() {
            return Err(ZpackError::corrupted(
                reader.byte_position() as u64,
                "Code length repeat overflows HLIT + HDIST",
            ));
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    if lengths[END_OF_BLOCK as usize] == 0 {
        return Err(ZpackError::invalid_header("Missing end-of-block code"));
    }

    let litlen = HuffmanTable::from_lengths(&lengths[..hlit])?;
    let dist = HuffmanTable::from_lengths(&lengths[hlit..])?;
    Ok(Some((litlen, dist)))
}

/// Decode one literal, end-of-block, or length/distance pair.
///
/// All-or-nothing: on `Ok(None)` the caller must rewind the reader.
#[inline]
pub(crate) fn try_decode_symbol(
    reader: &mut BitReader<'_>,
    litlen: &HuffmanTable,
    dist: &HuffmanTable,
) -> Result<Option<Symbol>> {
    let Some(code) = litlen.try_decode(reader)? else {
        return Ok(None);
    };

    match code {
        0..=255 => Ok(Some(Symbol::Literal(code as u8))),
        END_OF_BLOCK => Ok(Some(Symbol::EndOfBlock)),
        257..=285 => {
            let Some(extra) = reader.try_read_bits(LENGTH_EXTRA_BITS[(code - 257) as usize])
            else {
                return Ok(None);
            };
            let length = decode_length(code, extra as u16) as usize;

            let Some(dist_code) = dist.try_decode(reader)? else {
                return Ok(None);
            };
            if dist_code >= 30 {
                return Err(ZpackError::corrupted(
                    reader.byte_position() as u64,
                    format!("Invalid distance code: {}", dist_code),
                ));
            }
            let Some(extra) = reader.try_read_bits(DISTANCE_EXTRA_BITS[dist_code as usize])
            else {
                return Ok(None);
            };
            let distance = decode_distance(dist_code, extra as u16) as usize;

            Ok(Some(Symbol::Copy { length, distance }))
        }
        _ => Err(ZpackError::corrupted(
            reader.byte_position() as u64,
            format!("Invalid literal/length code: {}", code),
        )),
    }
}

/// Append `length` bytes copied from `distance` bytes back.
#[inline]
pub(crate) fn copy_match(output: &mut Vec<u8>, distance: usize, length: usize) -> Result<()> {
    if distance == 0 || distance > output.len() {
        return Err(ZpackError::invalid_distance(distance, output.len()));
    }

    let start = output.len() - distance;
    if distance >= length {
        output.extend_from_within(start..start + length);
    } else {
        // Overlapping copy repeats the last `distance` bytes
        for i in 0..length {
            let byte = output[start + i];
            output.push(byte);
        }
    }
    Ok(())
}

/// One-shot raw DEFLATE decoder over a complete input buffer.
///
/// Truncated input is an error. After [`decompress`](Self::decompress),
/// [`consumed`](Self::consumed) tells container formats where their
/// trailer starts.
#[derive(Debug)]
pub struct RawInflater<'a> {
    reader: BitReader<'a>,
    output: Vec<u8>,
    options: InflateOptions,
    finished: bool,
}

impl<'a> RawInflater<'a> {
    /// Create a decoder with default options.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, InflateOptions::default())
    }

    /// Create a decoder with explicit options.
    pub fn with_options(data: &'a [u8], options: InflateOptions) -> Self {
        Self {
            reader: BitReader::new(data),
            output: Vec::with_capacity(options.block_size()),
            options,
            finished: false,
        }
    }

    /// Decode every block up to and including the final one.
    pub fn decompress(&mut self) -> Result<Vec<u8>> {
        while !self.finished {
            let (is_final, block_type) = try_read_block_header(&mut self.reader)?
                .ok_or_else(|| ZpackError::unexpected_eof(1))?;

            match block_type {
                BlockType::Stored => self.inflate_stored()?,
                BlockType::Fixed => {
                    let litlen = fixed_litlen_table()?;
                    let dist = fixed_distance_table()?;
                    self.inflate_huffman(litlen, dist)?;
                }
                BlockType::Dynamic => {
                    let (litlen, dist) = try_read_dynamic_tables(&mut self.reader)?
                        .ok_or_else(|| ZpackError::unexpected_eof(1))?;
                    self.inflate_huffman(&litlen, &dist)?;
                }
            }

            self.finished = is_final;
        }

        self.reader.align_to_byte();
        Ok(std::mem::take(&mut self.output))
    }

    /// Bytes of input used so far; after the final block, the offset of the
    /// first byte past the (byte-aligned) DEFLATE stream.
    pub fn consumed(&self) -> usize {
        self.reader.byte_position()
    }

    /// Whether the final block has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn inflate_stored(&mut self) -> Result<()> {
        let len = try_read_stored_length(&mut self.reader)?
            .ok_or_else(|| ZpackError::unexpected_eof(4))?;

        let bytes = self.reader.take_bytes(len);
        if bytes.len() < len {
            return Err(ZpackError::unexpected_eof(len - bytes.len()));
        }

        self.reserve(len, 8);
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn inflate_huffman(&mut self, litlen: &HuffmanTable, dist: &HuffmanTable) -> Result<()> {
        loop {
            let symbol = try_decode_symbol(&mut self.reader, litlen, dist)?
                .ok_or_else(|| ZpackError::unexpected_eof(1))?;

            match symbol {
                Symbol::Literal(byte) => {
                    self.reserve(1, litlen.min_length());
                    self.output.push(byte);
                }
                Symbol::Copy { length, distance } => {
                    self.reserve(length, litlen.min_length());
                    copy_match(&mut self.output, distance, length)?;
                }
                Symbol::EndOfBlock => return Ok(()),
            }
        }
    }

    /// Make room for `additional` bytes, growing per the buffer strategy.
    #[inline]
    fn reserve(&mut self, additional: usize, min_code_length: u8) {
        let needed = self.output.len() + additional;
        if needed <= self.output.capacity() {
            return;
        }

        let current = self.output.capacity().max(1);
        let target = match self.options.buffer_type {
            BufferType::Block => {
                let step = self.options.block_size();
                current + (needed - current).div_ceil(step) * step
            }
            BufferType::Adaptive => self.adaptive_capacity(current, min_code_length),
        };

        self.output.reserve_exact(target.max(needed) - self.output.len());
    }

    /// Project the final output size from the input consumed so far.
    fn adaptive_capacity(&self, current: usize, min_code_length: u8) -> usize {
        let input_len = self.reader.data().len();
        let position = self.reader.byte_position().max(1);
        let ratio = input_len / position + 1;

        let grown = if ratio < 2 {
            let remaining = input_len.saturating_sub(position);
            let max_codes = remaining / min_code_length.max(1) as usize;
            let max_inflate = max_codes / 2 * MAX_MATCH;
            if max_inflate < current {
                current + max_inflate
            } else {
                current.saturating_mul(2)
            }
        } else {
            current.saturating_mul(ratio)
        };

        grown.min(current.saturating_add(MAX_ADAPTIVE_STEP))
    }
}

/// Decompress raw DEFLATE data with default options.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    RawInflater::new(data).decompress()
}

/// Decompress raw DEFLATE data with explicit options.
pub fn inflate_with(data: &[u8], options: &InflateOptions) -> Result<Vec<u8>> {
    RawInflater::with_options(data, options.clone()).decompress()
}
