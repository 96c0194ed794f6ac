//! DEFLATE compression.
//!
//! This module implements DEFLATE compression as specified in RFC 1951.
//! It supports three strategies:
//! - Stored blocks (no compression, 65535-byte chunks)
//! - Fixed Huffman codes (one block, predefined tables)
//! - Dynamic Huffman codes (one block, tables derived from the input)
//!
//! # Example
//!
//! ```
//! use zpack_deflate::{CompressionType, DeflateOptions, deflate_with, inflate};
//!
//! let options = DeflateOptions::default().with_compression_type(CompressionType::Fixed);
//! let compressed = deflate_with(b"abcabcabcabc", &options).unwrap();
//! assert_eq!(inflate(&compressed).unwrap(), b"abcabcabcabc");
//! ```

use crate::huffman::{END_OF_BLOCK, HuffmanBuilder, MAX_CODE_LENGTH, canonical_codes};
use crate::lz77::{DEFAULT_MAX_CHAIN, Lz77Matcher, Lz77Token};
use crate::tables::{
    CODE_LENGTH_ORDER, MAX_STORED_BLOCK, distance_to_code, fixed_distance_codes,
    fixed_distance_lengths, fixed_litlen_codes, fixed_litlen_lengths, length_to_code,
};
use zpack_core::BitWriter;
use zpack_core::error::Result;

/// Length limit for distance codes.
const MAX_DISTANCE_CODE_LENGTH: u8 = 7;

/// Length limit for the code-length alphabet (3-bit fields).
const MAX_CODELEN_CODE_LENGTH: u8 = 7;

/// Block strategy used by the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    /// Stored blocks only.
    None,
    /// Predefined Huffman tables.
    Fixed,
    /// Huffman tables computed from the input.
    #[default]
    Dynamic,
}

impl CompressionType {
    /// BTYPE field value.
    fn btype(self) -> u32 {
        match self {
            Self::None => 0b00,
            Self::Fixed => 0b01,
            Self::Dynamic => 0b10,
        }
    }
}

/// Compression options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateOptions {
    /// Block strategy.
    pub compression_type: CompressionType,
    /// Lazy matching threshold; 0 disables lazy matching.
    pub lazy_depth: u16,
    /// Hash-chain candidates examined per position.
    pub max_chain: usize,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        Self {
            compression_type: CompressionType::Dynamic,
            lazy_depth: 0,
            max_chain: DEFAULT_MAX_CHAIN,
        }
    }
}

impl DeflateOptions {
    /// Set the block strategy.
    pub fn with_compression_type(mut self, compression_type: CompressionType) -> Self {
        self.compression_type = compression_type;
        self
    }

    /// Set the lazy matching threshold.
    pub fn with_lazy_depth(mut self, lazy_depth: u16) -> Self {
        self.lazy_depth = lazy_depth;
        self
    }

    /// Set the hash-chain search bound.
    pub fn with_max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = max_chain;
        self
    }
}

/// A run-length encoded code length: (symbol, extra bit count, extra value).
type CodeLengthSymbol = (u8, u8, u8);

/// Encoder-side view of a Huffman code: MSB-first codes plus their lengths.
struct CodeSet<'a> {
    codes: &'a [u16],
    lengths: &'a [u8],
}

impl CodeSet<'_> {
    #[inline]
    fn write(&self, writer: &mut BitWriter, symbol: usize) {
        writer.write_bits_reversed(self.codes[symbol] as u32, self.lengths[symbol]);
    }
}

/// DEFLATE compressor.
#[derive(Debug, Clone, Default)]
pub struct Deflater {
    options: DeflateOptions,
}

impl Deflater {
    /// Create a compressor with the given options.
    pub fn new(options: DeflateOptions) -> Self {
        Self { options }
    }

    /// The options this compressor was created with.
    pub fn options(&self) -> &DeflateOptions {
        &self.options
    }

    /// Compress `data` into a fresh raw DEFLATE stream.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() / 2 + 64);
        self.compress_into(data, &mut output)?;
        Ok(output)
    }

    /// Append the raw DEFLATE stream for `data` to `output`.
    ///
    /// Container formats call this after writing their header.
    pub fn compress_into(&self, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
        let mut writer = BitWriter::from_vec(std::mem::take(output));

        match self.options.compression_type {
            CompressionType::None => {
                tracing::debug!(input = data.len(), "deflate: stored blocks");
                write_stored_blocks(&mut writer, data);
            }
            CompressionType::Fixed => {
                let lz = self.matcher().compress(data);
                tracing::debug!(
                    input = data.len(),
                    tokens = lz.tokens.len(),
                    "deflate: fixed huffman block"
                );
                write_fixed_block(&mut writer, &lz.tokens);
            }
            CompressionType::Dynamic => {
                let lz = self.matcher().compress(data);
                tracing::debug!(
                    input = data.len(),
                    tokens = lz.tokens.len(),
                    "deflate: dynamic huffman block"
                );
                write_dynamic_block(&mut writer, &lz.tokens, &lz.litlen_freqs, &lz.dist_freqs)?;
            }
        }

        *output = writer.finish();
        Ok(())
    }

    fn matcher(&self) -> Lz77Matcher {
        Lz77Matcher::new()
            .with_lazy_depth(self.options.lazy_depth)
            .with_max_chain(self.options.max_chain)
    }
}

fn write_block_header(writer: &mut BitWriter, is_final: bool, kind: CompressionType) {
    writer.write_bit(is_final);
    writer.write_bits(kind.btype(), 2);
}

/// Write stored (uncompressed) blocks; empty input yields one empty final block.
fn write_stored_blocks(writer: &mut BitWriter, data: &[u8]) {
    let mut chunks = data.chunks(MAX_STORED_BLOCK).peekable();

    if chunks.peek().is_none() {
        write_stored_block(writer, &[], true);
        return;
    }

    while let Some(chunk) = chunks.next() {
        write_stored_block(writer, chunk, chunks.peek().is_none());
    }
}

fn write_stored_block(writer: &mut BitWriter, chunk: &[u8], is_final: bool) {
    write_block_header(writer, is_final, CompressionType::None);
    writer.align_to_byte();

    let len = chunk.len() as u16;
    writer.write_bits(len as u32, 16);
    writer.write_bits(!len as u32, 16);
    writer.write_bytes(chunk);
}

/// Write the whole token stream as one final fixed-Huffman block.
fn write_fixed_block(writer: &mut BitWriter, tokens: &[Lz77Token]) {
    let litlen_lengths = fixed_litlen_lengths();
    let dist_lengths = fixed_distance_lengths();
    let litlen = CodeSet {
        codes: fixed_litlen_codes(),
        lengths: &litlen_lengths,
    };
    let dist = CodeSet {
        codes: fixed_distance_codes(),
        lengths: &dist_lengths,
    };

    write_block_header(writer, true, CompressionType::Fixed);
    write_tokens(writer, tokens, &litlen, &dist);
}

/// Write the whole token stream as one final dynamic-Huffman block.
fn write_dynamic_block(
    writer: &mut BitWriter,
    tokens: &[Lz77Token],
    litlen_freqs: &[u32],
    dist_freqs: &[u32],
) -> Result<()> {
    let litlen_lengths =
        HuffmanBuilder::from_frequencies(litlen_freqs, MAX_CODE_LENGTH as u8).build_lengths()?;

    let mut dist_lengths =
        HuffmanBuilder::from_frequencies(dist_freqs, MAX_DISTANCE_CODE_LENGTH).build_lengths()?;
    if dist_lengths.iter().all(|&len| len == 0) {
        // HDIST cannot describe an empty code; send one unused code instead
        dist_lengths[0] = 1;
    }

    let hlit = used_prefix(&litlen_lengths, 257);
    let hdist = used_prefix(&dist_lengths, 1);

    let mut combined = Vec::with_capacity(hlit + hdist);
    combined.extend_from_slice(&litlen_lengths[..hlit]);
    combined.extend_from_slice(&dist_lengths[..hdist]);

    let (rle, codelen_freqs) = tree_transmit_symbols(&combined);
    let codelen_lengths = HuffmanBuilder::from_frequencies(&codelen_freqs, MAX_CODELEN_CODE_LENGTH)
        .build_lengths()?;

    let hclen = CODE_LENGTH_ORDER
        .iter()
        .rposition(|&symbol| codelen_lengths[symbol] != 0)
        .map_or(4, |last| (last + 1).max(4));

    write_block_header(writer, true, CompressionType::Dynamic);
    writer.write_bits((hlit - 257) as u32, 5);
    writer.write_bits((hdist - 1) as u32, 5);
    writer.write_bits((hclen - 4) as u32, 4);
    for &symbol in &CODE_LENGTH_ORDER[..hclen] {
        writer.write_bits(codelen_lengths[symbol] as u32, 3);
    }

    let codelen_codes = canonical_codes(&codelen_lengths);
    let codelen = CodeSet {
        codes: &codelen_codes,
        lengths: &codelen_lengths,
    };
    for &(symbol, extra_bits, extra) in &rle {
        codelen.write(writer, symbol as usize);
        writer.write_bits(extra as u32, extra_bits);
    }

    let litlen_codes = canonical_codes(&litlen_lengths);
    let dist_codes = canonical_codes(&dist_lengths);
    write_tokens(
        writer,
        tokens,
        &CodeSet {
            codes: &litlen_codes,
            lengths: &litlen_lengths,
        },
        &CodeSet {
            codes: &dist_codes,
            lengths: &dist_lengths,
        },
    );

    Ok(())
}

/// Number of leading entries up to the last non-zero length, at least `min`.
fn used_prefix(lengths: &[u8], min: usize) -> usize {
    lengths
        .iter()
        .rposition(|&len| len != 0)
        .map_or(min, |last| (last + 1).max(min))
}

/// Write tokens followed by end-of-block.
fn write_tokens(writer: &mut BitWriter, tokens: &[Lz77Token], litlen: &CodeSet, dist: &CodeSet) {
    for token in tokens {
        match *token {
            Lz77Token::Literal(byte) => litlen.write(writer, byte as usize),
            Lz77Token::Match { length, distance } => {
                let (len_code, len_extra_bits, len_extra) = length_to_code(length);
                litlen.write(writer, len_code as usize);
                writer.write_bits(len_extra as u32, len_extra_bits);

                let (dist_code, dist_extra_bits, dist_extra) = distance_to_code(distance);
                dist.write(writer, dist_code as usize);
                writer.write_bits(dist_extra as u32, dist_extra_bits);
            }
        }
    }
    litlen.write(writer, END_OF_BLOCK as usize);
}

/// Run-length encode code lengths through the 19-symbol alphabet.
///
/// Returns the symbols with their extra bits, and the symbol frequencies.
/// A repeat run never leaves a tail of 1 or 2 entries; it is shortened to
/// leave exactly 3, which one more repeat symbol can cover.
fn tree_transmit_symbols(lengths: &[u8]) -> (Vec<CodeLengthSymbol>, [u32; 19]) {
    let mut symbols = Vec::with_capacity(lengths.len());
    let mut freqs = [0u32; 19];
    let mut emit = |symbol: CodeLengthSymbol| {
        freqs[symbol.0 as usize] += 1;
        symbols.push(symbol);
    };

    let mut i = 0;
    while i < lengths.len() {
        let value = lengths[i];
        let run = lengths[i..].iter().take_while(|&&len| len == value).count();
        i += run;

        let mut remaining = run;
        if value != 0 {
            emit((value, 0, 0));
            remaining -= 1;
        }

        if remaining < 3 {
            for _ in 0..remaining {
                emit((value, 0, 0));
            }
            continue;
        }

        let max_repeat = if value == 0 { 138 } else { 6 };
        while remaining > 0 {
            let mut repeat = remaining.min(max_repeat);
            if repeat > remaining - 3 && repeat < remaining {
                repeat = remaining - 3;
            }
            remaining -= repeat;

            let symbol = match (value, repeat) {
                (0, 3..=10) => (17, 3, (repeat - 3) as u8),
                (0, _) => (18, 7, (repeat - 11) as u8),
                _ => (16, 2, (repeat - 3) as u8),
            };
            emit(symbol);
        }
    }

    (symbols, freqs)
}

/// Compress data with the default options (dynamic Huffman, greedy matching).
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    Deflater::default().compress(data)
}

/// Compress data with explicit options.
pub fn deflate_with(data: &[u8], options: &DeflateOptions) -> Result<Vec<u8>> {
    Deflater::new(options.clone()).compress(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::inflate;

    const ALL_TYPES: [CompressionType; 3] = [
        CompressionType::None,
        CompressionType::Fixed,
        CompressionType::Dynamic,
    ];

    fn compress(data: &[u8], compression_type: CompressionType) -> Vec<u8> {
        let options = DeflateOptions::default().with_compression_type(compression_type);
        deflate_with(data, &options).unwrap()
    }

    /// Expand tree-transmit symbols back into code lengths.
    fn expand(symbols: &[CodeLengthSymbol]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for &(symbol, _, extra) in symbols {
            match symbol {
                16 => {
                    let prev = *out.last().unwrap();
                    out.extend(std::iter::repeat_n(prev, 3 + extra as usize));
                }
                17 => out.extend(std::iter::repeat_n(0, 3 + extra as usize)),
                18 => out.extend(std::iter::repeat_n(0, 11 + extra as usize)),
                len => out.push(len),
            }
        }
        out
    }

    #[test]
    fn test_deflate_stored() {
        let input = b"Hello, World!";
        let compressed = compress(input, CompressionType::None);

        // header byte, LEN, NLEN, payload
        assert_eq!(compressed.len(), 1 + 4 + input.len());
        assert_eq!(compressed[0], 0b001);
        assert_eq!(&compressed[1..5], &[13, 0, 0xF2, 0xFF]);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }

    #[test]
    fn test_deflate_stored_empty() {
        let compressed = compress(b"", CompressionType::None);
        assert_eq!(compressed, vec![0x01, 0x00, 0x00, 0xFF, 0xFF]);
        assert!(inflate(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_deflate_stored_multiple_blocks() {
        let input: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&input, CompressionType::None);

        // Three blocks, only the last one final
        assert_eq!(compressed.len(), input.len() + 3 * 5);
        assert_eq!(compressed[0] & 1, 0);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }

    #[test]
    fn test_deflate_fixed_known_output() {
        // Single literal 'a' with fixed codes: 0x4B 0x04 0x00
        assert_eq!(compress(b"a", CompressionType::Fixed), vec![0x4B, 0x04, 0x00]);
        // Empty fixed block is just BFINAL/BTYPE plus end-of-block
        assert_eq!(compress(b"", CompressionType::Fixed), vec![0x03, 0x00]);
    }

    #[test]
    fn test_deflate_compressed() {
        let input = b"AAAAAAAAAABBBBBBBBBBCCCCCCCCCC";
        for compression_type in [CompressionType::Fixed, CompressionType::Dynamic] {
            let compressed = compress(input, compression_type);
            assert!(
                compressed.len() < input.len(),
                "{:?}: compressed {} bytes to {} bytes",
                compression_type,
                input.len(),
                compressed.len()
            );
            assert_eq!(inflate(&compressed).unwrap(), input);
        }
    }

    #[test]
    fn test_deflate_roundtrip() {
        let inputs = [
            Vec::new(),
            b"Hello".to_vec(),
            b"The quick brown fox jumps over the lazy dog".to_vec(),
            vec![0u8; 1000],
            (0..=255).collect::<Vec<u8>>(),
            (0..70_000u32).map(|i| (i * 31 % 97) as u8).collect(),
        ];

        for input in &inputs {
            for compression_type in ALL_TYPES {
                for lazy_depth in [0, 16] {
                    let options = DeflateOptions::default()
                        .with_compression_type(compression_type)
                        .with_lazy_depth(lazy_depth);
                    let compressed = deflate_with(input, &options).unwrap();
                    let decompressed = inflate(&compressed).unwrap();
                    assert_eq!(
                        &decompressed,
                        input,
                        "Roundtrip failed for {:?} lazy {} with {} bytes",
                        compression_type,
                        lazy_depth,
                        input.len()
                    );
                }
            }
        }
    }

    #[test]
    fn test_deflate_dynamic_beats_fixed_on_skewed_text() {
        let input: Vec<u8> = b"aaaaaaabaaaaaaabbbbbbaaaacccaabababababababcababa"
            .iter()
            .cycle()
            .take(4000)
            .enumerate()
            .map(|(i, &b)| if i % 7 == 0 { b'a' } else { b })
            .collect();

        let dynamic = compress(&input, CompressionType::Dynamic);
        let fixed = compress(&input, CompressionType::Fixed);
        assert!(
            dynamic.len() <= fixed.len(),
            "Dynamic ({} bytes) should be <= fixed ({} bytes)",
            dynamic.len(),
            fixed.len()
        );
        assert_eq!(inflate(&dynamic).unwrap(), input);
        assert_eq!(inflate(&fixed).unwrap(), input);
    }

    #[test]
    fn test_deflate_dynamic_without_matches() {
        // No back-references: the distance code is a single unused entry
        let input = b"abcdefghijklmnopqrstuvwxyz";
        let compressed = compress(input, CompressionType::Dynamic);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }

    #[test]
    fn test_tree_transmit_symbols() {
        let mut lengths = vec![8u8; 144];
        lengths.extend([9u8; 112]);
        lengths.extend([7u8; 24]);
        lengths.extend([0u8; 150]);
        lengths.extend([5u8, 5, 0, 0, 3]);

        let (symbols, freqs) = tree_transmit_symbols(&lengths);
        assert_eq!(expand(&symbols), lengths);
        assert_eq!(freqs.iter().sum::<u32>() as usize, symbols.len());
        for &(symbol, extra_bits, extra) in &symbols {
            match symbol {
                16 => assert!(extra_bits == 2 && extra <= 3),
                17 => assert!(extra_bits == 3 && extra <= 7),
                18 => assert!(extra_bits == 7 && extra <= 127),
                _ => assert_eq!(extra_bits, 0),
            }
        }
    }

    #[test]
    fn test_tree_transmit_avoids_short_tail() {
        // 1 + 7 repeats: 6 + 1 would strand a single entry, so 4 + 3 is used
        let (symbols, _) = tree_transmit_symbols(&[4u8; 8]);
        assert_eq!(symbols, vec![(4, 0, 0), (16, 2, 1), (16, 2, 0)]);

        // 140 zeros: 138 + 2 would strand two, so 137 + 3 is used
        let (symbols, _) = tree_transmit_symbols(&[0u8; 140]);
        assert_eq!(symbols, vec![(18, 7, 126), (17, 3, 0)]);

        // Short runs stay literal
        let (symbols, _) = tree_transmit_symbols(&[0u8, 0, 6, 6, 6]);
        assert_eq!(
            symbols,
            vec![(0, 0, 0), (0, 0, 0), (6, 0, 0), (6, 0, 0), (6, 0, 0)]
        );
    }

    #[test]
    fn test_used_prefix() {
        assert_eq!(used_prefix(&[0; 30], 1), 1);
        assert_eq!(used_prefix(&[1, 0, 2, 0, 0], 1), 3);
        let mut litlen = vec![0u8; 286];
        litlen[256] = 1;
        assert_eq!(used_prefix(&litlen, 257), 257);
        litlen[270] = 4;
        assert_eq!(used_prefix(&litlen, 257), 271);
    }
}
