//! Bit-level I/O over in-memory buffers.
//!
//! This module provides [`BitReader`] and [`BitWriter`] for reading and
//! writing data at the bit level, which is what DEFLATE's variable-length
//! Huffman codes and sub-byte header fields need.
//!
//! # Bit Ordering
//!
//! DEFLATE packs data elements LSB-first (Least Significant Bit first): bits
//! fill each byte starting from its least significant bit. Huffman codes are
//! the exception, they are packed starting with their most significant bit,
//! which [`BitWriter::write_bits_reversed`] takes care of.
//!
//! # Resumable Reads
//!
//! The reader's whole position is a small `Copy` value, [`BitCursor`]. A
//! decoder that may run out of input mid-field takes a snapshot with
//! [`BitReader::cursor`], and on failure rolls back with
//! [`BitReader::rewind`], so no partial bits are ever consumed twice.
//!
//! # Example
//!
//! ```
//! use zpack_core::bitstream::{BitReader, BitWriter};
//!
//! // Writing bits
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);  // Write 3 bits
//! writer.write_bits(0b1100, 4); // Write 4 bits
//! let output = writer.finish();
//!
//! // Reading bits
//! let mut reader = BitReader::new(&output);
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
//! ```

use crate::error::{Result, ZpackError};

/// Reverse the low `len` bits of `code`.
#[inline]
pub fn reverse_bits(code: u32, len: u8) -> u32 {
    if len == 0 {
        return 0;
    }
    code.reverse_bits() >> (32 - len as u32)
}

/// Snapshot of a [`BitReader`] position.
///
/// Holds the index of the next unread byte plus the bits already pulled
/// from earlier bytes but not yet consumed. Invariant: every buffered bit
/// comes from a byte before `byte_pos`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitCursor {
    byte_pos: usize,
    buffer: u64,
    bits_in_buffer: u8,
}

impl BitCursor {
    /// A cursor positioned at the start of byte `byte_pos` with an empty bit buffer.
    pub fn at(byte_pos: usize) -> Self {
        Self {
            byte_pos,
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    /// Index of the next byte that has not been pulled into the bit buffer.
    pub fn byte_pos(&self) -> usize {
        self.byte_pos
    }

    /// Number of buffered, unconsumed bits.
    pub fn bits_in_buffer(&self) -> u8 {
        self.bits_in_buffer
    }

    /// Number of leading bytes with no bit left in the buffer.
    ///
    /// These can be dropped from the underlying input; a byte that is only
    /// partly consumed still counts as unread.
    pub fn consumed_bytes(&self) -> usize {
        self.byte_pos - (self.bits_in_buffer as usize).div_ceil(8)
    }

    /// Shift the cursor after `consumed` leading bytes were dropped from the
    /// underlying buffer.
    pub fn rebase(self, consumed: usize) -> Self {
        debug_assert!(consumed <= self.consumed_bytes());
        let rebased = Self {
            byte_pos: self.byte_pos - consumed,
            ..self
        };
        debug_assert!(rebased.byte_pos * 8 >= rebased.bits_in_buffer as usize);
        rebased
    }
}

/// A bit-level reader over a byte slice.
///
/// The reader only pulls a byte into its 64-bit buffer when a read needs it,
/// so a failed read never touches more input than necessary. Reads come in
/// two flavours: `try_*` methods return `None` when input runs out (the
/// streaming decoder suspends on that), while the plain methods turn it into
/// [`ZpackError::UnexpectedEof`].
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// Input bytes.
    data: &'a [u8],
    /// Current position.
    cursor: BitCursor,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first byte of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_cursor(data, BitCursor::default())
    }

    /// Create a reader positioned at byte `offset` of `data`.
    pub fn at_offset(data: &'a [u8], offset: usize) -> Self {
        Self::with_cursor(data, BitCursor::at(offset))
    }

    /// Resume reading `data` from a previously saved cursor.
    pub fn with_cursor(data: &'a [u8], cursor: BitCursor) -> Self {
        Self { data, cursor }
    }

    /// Snapshot the current position.
    #[inline]
    pub fn cursor(&self) -> BitCursor {
        self.cursor
    }

    /// Roll back to a snapshot taken with [`cursor`](Self::cursor).
    #[inline]
    pub fn rewind(&mut self, cursor: BitCursor) {
        self.cursor = cursor;
    }

    /// The underlying input.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Total bits consumed so far (for error reporting).
    pub fn bit_position(&self) -> u64 {
        self.cursor.byte_pos as u64 * 8 - self.cursor.bits_in_buffer as u64
    }

    /// Index of the first byte not (even partially) consumed.
    ///
    /// Exact once the reader is byte-aligned.
    pub fn byte_position(&self) -> usize {
        self.cursor.byte_pos - (self.cursor.bits_in_buffer / 8) as usize
    }

    /// Number of whole bytes not yet consumed.
    pub fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.byte_position())
    }

    /// Returns `true` when every bit of the input has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.bits_in_buffer == 0 && self.cursor.byte_pos >= self.data.len()
    }

    /// Pull bytes until at least `count` bits are buffered.
    ///
    /// Returns `false` if the input ran out first.
    #[inline]
    fn refill(&mut self, count: u8) -> bool {
        debug_assert!(count <= 32, "Cannot buffer more than 32 bits at once");

        let cursor = &mut self.cursor;
        while cursor.bits_in_buffer < count {
            let Some(&byte) = self.data.get(cursor.byte_pos) else {
                return false;
            };
            cursor.buffer |= (byte as u64) << cursor.bits_in_buffer;
            cursor.bits_in_buffer += 8;
            cursor.byte_pos += 1;
        }
        true
    }

    /// Read up to 32 bits, or `None` if the input is exhausted first.
    ///
    /// On `None` the reader may have buffered the trailing bytes; callers
    /// that want to retry later must [`rewind`](Self::rewind).
    #[inline]
    pub fn try_read_bits(&mut self, count: u8) -> Option<u32> {
        if count == 0 {
            return Some(0);
        }
        if !self.refill(count) {
            return None;
        }

        let mask = (1u64 << count).wrapping_sub(1);
        let result = (self.cursor.buffer & mask) as u32;

        self.cursor.buffer >>= count;
        self.cursor.bits_in_buffer -= count;

        Some(result)
    }

    /// Read up to 32 bits from the stream.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of bits to read (0-32)
    ///
    /// # Returns
    ///
    /// The bits read as a u32, with the first bit read in the LSB position.
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        self.try_read_bits(count)
            .ok_or_else(|| ZpackError::unexpected_eof((count as usize).div_ceil(8)))
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Peek at up to `count` bits without consuming them.
    ///
    /// Near the end of input fewer bits may exist; the missing high bits
    /// read as zero and the second value reports how many are real.
    #[inline]
    pub fn peek_bits(&mut self, count: u8) -> (u32, u8) {
        self.refill(count);
        let available = self.cursor.bits_in_buffer.min(count);
        let mask = (1u64 << count).wrapping_sub(1);
        ((self.cursor.buffer & mask) as u32, available)
    }

    /// Drop `count` bits that a previous [`peek_bits`](Self::peek_bits)
    /// reported as available.
    #[inline]
    pub fn consume(&mut self, count: u8) {
        debug_assert!(count <= self.cursor.bits_in_buffer);
        self.cursor.buffer >>= count;
        self.cursor.bits_in_buffer -= count;
    }

    /// Align to the next byte boundary by discarding partial bits.
    ///
    /// Whole bytes still sitting in the bit buffer are handed back to the
    /// byte stream, so [`byte_position`](Self::byte_position) points at the
    /// first unread byte afterwards.
    pub fn align_to_byte(&mut self) {
        let returned = (self.cursor.bits_in_buffer / 8) as usize;
        self.cursor.byte_pos -= returned;
        self.cursor.buffer = 0;
        self.cursor.bits_in_buffer = 0;
    }

    /// Take up to `len` raw bytes from a byte-aligned position.
    ///
    /// Returns fewer bytes when the input is shorter.
    pub fn take_bytes(&mut self, len: usize) -> &'a [u8] {
        debug_assert_eq!(self.cursor.bits_in_buffer, 0, "reader must be aligned");
        let start = self.cursor.byte_pos.min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        self.cursor.byte_pos = end;
        &self.data[start..end]
    }
}

/// A bit-level writer that appends to an owned byte buffer.
///
/// `BitWriter` accumulates bits in a 64-bit register and moves each completed
/// byte into its `Vec<u8>`, which grows by doubling. Call
/// [`finish`](Self::finish) to pad the last partial byte with zeros and take
/// the buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    /// Completed bytes.
    output: Vec<u8>,
    /// Bit buffer (LSB-first).
    buffer: u64,
    /// Number of bits in buffer.
    bits_in_buffer: u8,
    /// Total bits written.
    total_bits_written: u64,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_vec(Vec::with_capacity(capacity))
    }

    /// Continue writing after the bytes already in `output`.
    ///
    /// Containers use this to emit the compressed body straight after
    /// their header.
    pub fn from_vec(output: Vec<u8>) -> Self {
        Self {
            output,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_written: 0,
        }
    }

    /// Get the total number of bits written so far.
    pub fn bits_written(&self) -> u64 {
        self.total_bits_written
    }

    /// Number of bytes the finished buffer would hold.
    pub fn len(&self) -> usize {
        self.output.len() + (self.bits_in_buffer as usize).div_ceil(8)
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn flush_bytes(&mut self) {
        while self.bits_in_buffer >= 8 {
            self.output.push((self.buffer & 0xFF) as u8);
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }
    }

    /// Write up to 32 bits to the stream.
    ///
    /// # Arguments
    ///
    /// * `value` - The bits to write (LSB-first)
    /// * `count` - Number of bits to write (0-32)
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32, "Cannot write more than 32 bits at once");

        if count == 0 {
            return;
        }

        let mask = if count == 32 {
            u32::MAX
        } else {
            (1u32 << count).wrapping_sub(1)
        };

        self.buffer |= ((value & mask) as u64) << self.bits_in_buffer;
        self.bits_in_buffer += count;
        self.total_bits_written += count as u64;

        self.flush_bytes();
    }

    /// Write the low `count` bits of `value` most significant bit first.
    ///
    /// This is how Huffman codes are packed.
    #[inline]
    pub fn write_bits_reversed(&mut self, value: u32, count: u8) {
        self.write_bits(reverse_bits(value, count), count);
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u32, 1);
    }

    /// Pad to byte boundary with zeros.
    pub fn align_to_byte(&mut self) {
        if self.bits_in_buffer % 8 != 0 {
            let padding = 8 - (self.bits_in_buffer % 8);
            self.write_bits(0, padding);
        }
    }

    /// Write bytes directly to the stream.
    ///
    /// Fast path when byte-aligned; otherwise each byte is shifted in.
    pub fn write_bytes(&mut self, buf: &[u8]) {
        if self.bits_in_buffer == 0 {
            self.output.extend_from_slice(buf);
            self.total_bits_written += buf.len() as u64 * 8;
        } else {
            for &byte in buf {
                self.write_bits(byte as u32, 8);
            }
        }
    }

    /// Pad the final partial byte with zeros and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.output
    }
}
