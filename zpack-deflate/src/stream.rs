//! Streaming DEFLATE decompression.
//!
//! [`InflateStream`] accepts compressed input in arbitrary pieces and returns
//! whatever output those pieces complete. Running out of input is not an
//! error: the decoder rolls back to the last field boundary, keeps the
//! unconsumed bytes, and resumes on the next [`feed`](InflateStream::feed).
//!
//! ```text
//! Initialized -> BlockHeaderStart -> BlockHeaderEnd -> BlockBodyStart
//!      ^                                                    |
//!      |                                                    v
//! DecodeBlockEnd <- DecodeBlockStart <---------------- BlockBodyEnd
//!      |
//!      v (final block)
//!   Finished
//! ```
//!
//! # Example
//!
//! ```
//! use zpack_deflate::{InflateStream, deflate};
//!
//! let compressed = deflate(b"streaming streaming streaming").unwrap();
//! let mut stream = InflateStream::new();
//! let mut output = Vec::new();
//! for byte in &compressed {
//!     output.extend(stream.feed(std::slice::from_ref(byte)).unwrap());
//! }
//! assert!(stream.is_finished());
//! assert_eq!(output, b"streaming streaming streaming");
//! ```

use crate::huffman::HuffmanTable;
use crate::inflate::{
    BlockType, Symbol, copy_match, try_decode_symbol, try_read_block_header,
    try_read_dynamic_tables, try_read_stored_length,
};
use crate::tables::{WINDOW_SIZE, fixed_distance_table, fixed_litlen_table};
use zpack_core::error::Result;
use zpack_core::{BitCursor, BitReader};

/// Parse phase of an [`InflateStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InflateState {
    /// Between blocks.
    #[default]
    Initialized,
    /// Reading BFINAL/BTYPE.
    BlockHeaderStart,
    /// Block type known, body header not yet read.
    BlockHeaderEnd,
    /// Reading the stored length or the dynamic table description.
    BlockBodyStart,
    /// Body header read; tables ready.
    BlockBodyEnd,
    /// Decoding block data.
    DecodeBlockStart,
    /// Block data complete.
    DecodeBlockEnd,
    /// The final block has been decoded.
    Finished,
}

/// What the current block still needs to produce.
#[derive(Debug)]
enum ActiveBlock {
    Stored { remaining: usize },
    Huffman { litlen: HuffmanTable, dist: HuffmanTable },
}

/// Resumable raw DEFLATE decoder.
#[derive(Debug, Default)]
pub struct InflateStream {
    /// Input not yet consumed; `cursor` indexes into it.
    input: Vec<u8>,
    cursor: BitCursor,
    /// Bytes dropped from the front of `input` so far.
    dropped: u64,
    state: InflateState,
    is_final: bool,
    block_type: Option<BlockType>,
    block: Option<ActiveBlock>,
    /// The last `WINDOW_SIZE` bytes of output, for back-references.
    history: Vec<u8>,
    total_out: u64,
}

impl InflateStream {
    /// Create a decoder waiting for its first block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current parse phase.
    pub fn state(&self) -> InflateState {
        self.state
    }

    /// Whether the final block has been fully decoded.
    pub fn is_finished(&self) -> bool {
        self.state == InflateState::Finished
    }

    /// Total bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Bytes fed but not consumed by the DEFLATE stream.
    ///
    /// Once finished, this is whatever followed the stream, starting at the
    /// byte boundary after the final block.
    pub fn remaining_input(&self) -> &[u8] {
        let start = self.cursor.consumed_bytes().min(self.input.len());
        &self.input[start..]
    }

    /// Add `data` to the input and decode as far as possible.
    ///
    /// Returns the newly produced bytes, which may be empty when `data` did
    /// not complete a symbol. After the stream has finished, further input
    /// is only retained (see [`remaining_input`](Self::remaining_input)).
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.input.extend_from_slice(data);
        if self.is_finished() {
            return Ok(Vec::new());
        }

        let input = std::mem::take(&mut self.input);
        let mut reader = BitReader::with_cursor(&input, self.cursor);
        let start = self.history.len();

        let result = self.run(&mut reader);

        self.cursor = reader.cursor();
        self.input = input;
        let produced = self.history[start..].to_vec();
        self.total_out += produced.len() as u64;
        let result = result.map_err(|err| err.offset_by(self.dropped));
        self.compact();

        result.map(|()| produced)
    }

    /// Step the state machine until it finishes or needs more input.
    fn run(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        loop {
            match self.state {
                InflateState::Initialized | InflateState::BlockHeaderStart => {
                    self.state = InflateState::BlockHeaderStart;
                    let checkpoint = reader.cursor();
                    let Some((is_final, block_type)) = try_read_block_header(reader)? else {
                        return self.suspend(reader, checkpoint);
                    };
                    self.is_final = is_final;
                    self.block_type = Some(block_type);
                    self.state = InflateState::BlockHeaderEnd;
                }
                InflateState::BlockHeaderEnd => match self.block_type {
                    Some(BlockType::Fixed) => {
                        self.block = Some(ActiveBlock::Huffman {
                            litlen: fixed_litlen_table()?.clone(),
                            dist: fixed_distance_table()?.clone(),
                        });
                        self.state = InflateState::BlockBodyEnd;
                    }
                    _ => self.state = InflateState::BlockBodyStart,
                },
                InflateState::BlockBodyStart => {
                    let checkpoint = reader.cursor();
                    let block = match self.block_type {
                        Some(BlockType::Stored) => try_read_stored_length(reader)?
                            .map(|remaining| ActiveBlock::Stored { remaining }),
                        _ => try_read_dynamic_tables(reader)?
                            .map(|(litlen, dist)| ActiveBlock::Huffman { litlen, dist }),
                    };
                    let Some(block) = block else {
                        return self.suspend(reader, checkpoint);
                    };
                    self.block = Some(block);
                    self.state = InflateState::BlockBodyEnd;
                }
                InflateState::BlockBodyEnd => self.state = InflateState::DecodeBlockStart,
                InflateState::DecodeBlockStart => {
                    if !self.decode_block(reader)? {
                        tracing::trace!(
                            consumed = reader.byte_position(),
                            "inflate stream: waiting for block data"
                        );
                        return Ok(());
                    }
                    self.block = None;
                    self.state = InflateState::DecodeBlockEnd;
                }
                InflateState::DecodeBlockEnd => {
                    if self.is_final {
                        reader.align_to_byte();
                        self.state = InflateState::Finished;
                    } else {
                        self.state = InflateState::Initialized;
                    }
                }
                InflateState::Finished => return Ok(()),
            }
        }
    }

    /// Roll back to `checkpoint` and wait for more input.
    fn suspend(&self, reader: &mut BitReader<'_>, checkpoint: BitCursor) -> Result<()> {
        reader.rewind(checkpoint);
        tracing::trace!(state = ?self.state, "inflate stream: waiting for input");
        Ok(())
    }

    /// Decode block data; `Ok(false)` means the input ran out first.
    fn decode_block(&mut self, reader: &mut BitReader<'_>) -> Result<bool> {
        match &mut self.block {
            Some(ActiveBlock::Stored { remaining }) => {
                let bytes = reader.take_bytes(*remaining);
                self.history.extend_from_slice(bytes);
                *remaining -= bytes.len();
                Ok(*remaining == 0)
            }
            Some(ActiveBlock::Huffman { litlen, dist }) => loop {
                let checkpoint = reader.cursor();
                let Some(symbol) = try_decode_symbol(reader, litlen, dist)? else {
                    reader.rewind(checkpoint);
                    return Ok(false);
                };
                match symbol {
                    Symbol::Literal(byte) => self.history.push(byte),
                    Symbol::Copy { length, distance } => {
                        copy_match(&mut self.history, distance, length)?;
                    }
                    Symbol::EndOfBlock => return Ok(true),
                }
            },
            None => Ok(true),
        }
    }

    /// Drop consumed input and output older than the window.
    ///
    /// Bytes whose bits still sit in the cursor's buffer are kept.
    fn compact(&mut self) {
        let consumed = self.cursor.consumed_bytes().min(self.input.len());
        if consumed > 0 {
            self.input.drain(..consumed);
            self.cursor = self.cursor.rebase(consumed);
            self.dropped += consumed as u64;
        }

        if self.history.len() > WINDOW_SIZE {
            let excess = self.history.len() - WINDOW_SIZE;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate::{CompressionType, DeflateOptions, deflate_with};
    use crate::inflate::inflate;
    use crate::tables::{fixed_litlen_codes, fixed_litlen_lengths};
    use zpack_core::BitWriter;
    use zpack_core::error::ZpackError;

    fn sample(len: usize) -> Vec<u8> {
        let words: [&[u8]; 5] = [b"alpha ", b"beta ", b"gamma ", b"delta ", b"\n"];
        let mut state = 12345u32;
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            out.extend_from_slice(words[(state >> 16) as usize % words.len()]);
        }
        out.truncate(len);
        out
    }

    /// A final fixed block holding `symbols`, with no end-of-block code.
    fn fixed_block(symbols: &[u16]) -> Vec<u8> {
        let codes = fixed_litlen_codes();
        let lengths = fixed_litlen_lengths();
        let mut writer = BitWriter::new();
        writer.write_bits(1, 1);
        writer.write_bits(1, 2);
        for &symbol in symbols {
            let symbol = symbol as usize;
            writer.write_bits_reversed(codes[symbol] as u32, lengths[symbol]);
        }
        writer.finish()
    }

    fn feed_in_chunks(compressed: &[u8], chunk: usize) -> Vec<u8> {
        let mut stream = InflateStream::new();
        let mut output = Vec::new();
        for piece in compressed.chunks(chunk) {
            output.extend(stream.feed(piece).unwrap());
        }
        assert!(stream.is_finished());
        output
    }

    #[test]
    fn test_byte_at_a_time_all_types() {
        let input = sample(50_000);
        for compression_type in [
            CompressionType::None,
            CompressionType::Fixed,
            CompressionType::Dynamic,
        ] {
            let options = DeflateOptions::default().with_compression_type(compression_type);
            let compressed = deflate_with(&input, &options).unwrap();
            assert_eq!(feed_in_chunks(&compressed, 1), inflate(&compressed).unwrap());
        }
    }

    #[test]
    fn test_various_chunk_sizes() {
        let input = sample(100_000);
        let compressed = deflate_with(&input, &DeflateOptions::default()).unwrap();
        for chunk in [2, 3, 7, 64, 1000, compressed.len()] {
            assert_eq!(feed_in_chunks(&compressed, chunk), input);
        }
    }

    #[test]
    fn test_states() {
        let compressed = deflate_with(b"hello", &DeflateOptions::default()).unwrap();
        let mut stream = InflateStream::new();
        assert_eq!(stream.state(), InflateState::Initialized);

        // Not even a full block header
        assert!(stream.feed(&[]).unwrap().is_empty());
        assert_eq!(stream.state(), InflateState::BlockHeaderStart);

        // Header read, dynamic table description incomplete
        assert!(stream.feed(&compressed[..1]).unwrap().is_empty());
        assert_eq!(stream.state(), InflateState::BlockBodyStart);

        assert_eq!(stream.feed(&compressed[1..]).unwrap(), b"hello");
        assert_eq!(stream.state(), InflateState::Finished);
        assert_eq!(stream.total_out(), 5);
    }

    #[test]
    fn test_history_is_bounded() {
        let input = sample(300_000);
        let compressed = deflate_with(&input, &DeflateOptions::default()).unwrap();

        let mut stream = InflateStream::new();
        let mut output = Vec::new();
        for piece in compressed.chunks(4096) {
            output.extend(stream.feed(piece).unwrap());
            assert!(stream.history.len() <= WINDOW_SIZE);
        }
        assert_eq!(output, input);
    }

    #[test]
    fn test_remaining_input_after_finish() {
        let mut data = deflate_with(b"payload", &DeflateOptions::default()).unwrap();
        data.extend_from_slice(&[1, 2, 3, 4]);

        let mut stream = InflateStream::new();
        assert_eq!(stream.feed(&data).unwrap(), b"payload");
        assert!(stream.is_finished());
        assert_eq!(stream.remaining_input(), &[1, 2, 3, 4]);

        assert!(stream.feed(&[5]).unwrap().is_empty());
        assert_eq!(stream.remaining_input(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_error_offset_after_compaction() {
        // Five 9-bit literals end on a byte boundary, so the 8-bit literal
        // after them leaves a whole byte buffered when the next code is cut.
        let data = fixed_block(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, b'a' as u16, 0xFF, 286]);
        assert_eq!(data.len(), 10);

        let mut stream = InflateStream::new();
        assert_eq!(
            stream.feed(&data[..8]).unwrap(),
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, b'a']
        );
        assert_eq!(stream.state(), InflateState::DecodeBlockStart);
        assert_eq!(stream.cursor.bits_in_buffer(), 8);
        assert_eq!(stream.cursor.byte_pos(), 1);
        assert_eq!(stream.input, &data[7..8]);
        assert_eq!(stream.dropped, 7);

        let err = stream.feed(&data[8..]).unwrap_err();
        assert!(matches!(err, ZpackError::CorruptedData { offset: 10, .. }));
        assert_eq!(err.to_string(), inflate(&data).unwrap_err().to_string());
    }

    #[test]
    fn test_invalid_code_after_compaction() {
        // Literal/length symbols 286 and 287 are never valid
        let data = fixed_block(&[b'x' as u16, b'y' as u16, b'z' as u16, 287]);
        let mut stream = InflateStream::new();
        let mut output = Vec::new();
        let mut failure = None;
        for byte in &data {
            match stream.feed(std::slice::from_ref(byte)) {
                Ok(produced) => output.extend(produced),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        assert_eq!(output, b"xyz");
        let err = failure.unwrap();
        assert_eq!(err.to_string(), inflate(&data).unwrap_err().to_string());
    }

    #[test]
    fn test_errors_surface() {
        let mut stream = InflateStream::new();
        // Stored block with a bad NLEN
        let err = stream
            .feed(&[0x01, 0x05, 0x00, 0x00, 0x00, b'x'])
            .unwrap_err();
        assert!(matches!(err, ZpackError::CorruptedData { .. }));

        let mut stream = InflateStream::new();
        assert!(stream.feed(&[0x07]).is_err());
    }
}
