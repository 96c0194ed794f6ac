//! Huffman coding for DEFLATE.
//!
//! This module implements both directions of canonical Huffman coding as
//! specified in RFC 1951, where codes of the same length are assigned
//! consecutive values in symbol order, so a code is fully described by its
//! code lengths.
//!
//! - [`HuffmanTable`] turns a code-length array into a single-level lookup
//!   table indexed by the next `max_length` stream bits.
//! - [`HuffmanBuilder`] turns symbol frequencies into length-limited optimal
//!   code lengths (package-merge), and [`canonical_codes`] assigns the bit
//!   patterns.
//!
//! # Alphabets
//!
//! DEFLATE uses three Huffman alphabets:
//! - **Literal/Length**: 0-285 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-29 (back-reference distances)
//! - **Code Length**: 0-18 (for encoding dynamic Huffman trees)

use zpack_core::bitstream::{BitReader, reverse_bits};
use zpack_core::error::{Result, ZpackError};

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Size of the literal/length alphabet (0-285).
pub const LITLEN_ALPHABET_SIZE: usize = 286;

/// Size of the distance alphabet (0-29).
pub const DISTANCE_ALPHABET_SIZE: usize = 30;

/// Size of the code length alphabet (0-18).
pub const CODELEN_ALPHABET_SIZE: usize = 19;

/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;

/// One slot of the lookup table. `length == 0` marks a bit pattern that
/// belongs to no code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Entry {
    symbol: u16,
    length: u8,
}

/// A canonical Huffman decode table.
///
/// Every code of length `l` is stored bit-reversed at index `rev(code)` and
/// replicated over all `2^(max_length - l)` values of the bits above it, so
/// decoding is one lookup on the next `max_length` bits followed by
/// consuming only the entry's own length.
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    entries: Vec<Entry>,
    max_length: u8,
    min_length: u8,
}

impl HuffmanTable {
    /// Build a decode table from code lengths.
    ///
    /// `lengths[i]` is the bit length of symbol `i`; 0 means unused.
    /// Over-subscribed sets are rejected. Incomplete sets are accepted, and
    /// their unused patterns fail at decode time.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut bl_count = [0u32; MAX_CODE_LENGTH + 1];
        let mut max_length = 0u8;
        let mut min_length = u8::MAX;

        for &len in lengths {
            if len == 0 {
                continue;
            }
            if len as usize > MAX_CODE_LENGTH {
                return Err(ZpackError::invalid_header(format!(
                    "Code length {} exceeds maximum {}",
                    len, MAX_CODE_LENGTH
                )));
            }
            bl_count[len as usize] += 1;
            max_length = max_length.max(len);
            min_length = min_length.min(len);
        }

        if max_length == 0 {
            return Ok(Self {
                entries: vec![Entry::default()],
                max_length: 0,
                min_length: 0,
            });
        }

        // Kraft check: remaining code space after each length
        let mut left: i64 = 1;
        for &count in &bl_count[1..=max_length as usize] {
            left = (left << 1) - count as i64;
            if left < 0 {
                return Err(ZpackError::invalid_header("Over-subscribed Huffman code"));
            }
        }

        let mut next_code = first_codes(&bl_count, max_length);

        let size = 1usize << max_length;
        let mut entries = vec![Entry::default(); size];

        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;

            let entry = Entry {
                symbol: symbol as u16,
                length: len,
            };
            let step = 1usize << len;
            let mut index = reverse_bits(code, len) as usize;
            while index < size {
                entries[index] = entry;
                index += step;
            }
        }

        Ok(Self {
            entries,
            max_length,
            min_length,
        })
    }

    /// Longest code length in the table (0 for an empty code).
    pub fn max_length(&self) -> u8 {
        self.max_length
    }

    /// Shortest code length in the table (0 for an empty code).
    pub fn min_length(&self) -> u8 {
        self.min_length
    }

    /// Decode one symbol, or `Ok(None)` if the input ends before the code
    /// is complete.
    ///
    /// On `Ok(None)` nothing is consumed.
    #[inline]
    pub fn try_decode(&self, reader: &mut BitReader<'_>) -> Result<Option<u16>> {
        if self.max_length == 0 {
            return Err(ZpackError::invalid_huffman(reader.bit_position()));
        }

        let (bits, available) = reader.peek_bits(self.max_length);
        let entry = self.entries[bits as usize];

        if entry.length == 0 {
            if available < self.max_length {
                return Ok(None);
            }
            return Err(ZpackError::invalid_huffman(reader.bit_position()));
        }
        if entry.length > available {
            return Ok(None);
        }

        reader.consume(entry.length);
        Ok(Some(entry.symbol))
    }

    /// Decode one symbol; running out of input is an error.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        self.try_decode(reader)?
            .ok_or_else(|| ZpackError::unexpected_eof(1))
    }
}

/// First canonical code of each length (RFC 1951 3.2.2 step 2).
fn first_codes(
    bl_count: &[u32; MAX_CODE_LENGTH + 1],
    max_length: u8,
) -> [u32; MAX_CODE_LENGTH + 1] {
    let mut next_code = [0u32; MAX_CODE_LENGTH + 1];
    let mut code = 0u32;
    for bits in 1..=max_length as usize {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    next_code
}

/// Assign canonical codes to a set of code lengths.
///
/// The result holds the code of symbol `i` at index `i`, MSB-first and not
/// bit-reversed; unused symbols get 0.
pub fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
    let mut bl_count = [0u32; MAX_CODE_LENGTH + 1];
    let mut max_length = 0u8;
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
            max_length = max_length.max(len);
        }
    }

    let mut next_code = first_codes(&bl_count, max_length);
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            code as u16
        })
        .collect()
}

/// Builder for creating Huffman code lengths from frequencies.
#[derive(Debug, Clone)]
pub struct HuffmanBuilder {
    frequencies: Vec<u32>,
    max_length: u8,
}

impl HuffmanBuilder {
    /// Create a new Huffman builder.
    pub fn new(alphabet_size: usize, max_length: u8) -> Self {
        Self {
            frequencies: vec![0; alphabet_size],
            max_length,
        }
    }

    /// Create a builder from an existing frequency table.
    pub fn from_frequencies(frequencies: &[u32], max_length: u8) -> Self {
        Self {
            frequencies: frequencies.to_vec(),
            max_length,
        }
    }

    /// Add a symbol occurrence.
    pub fn add(&mut self, symbol: u16) {
        self.add_count(symbol, 1);
    }

    /// Add multiple occurrences of a symbol.
    pub fn add_count(&mut self, symbol: u16, count: u32) {
        if let Some(freq) = self.frequencies.get_mut(symbol as usize) {
            *freq += count;
        }
    }

    /// Accumulated frequencies.
    pub fn frequencies(&self) -> &[u32] {
        &self.frequencies
    }

    /// Build code lengths from frequencies.
    ///
    /// Returns an array where `result[i]` is the code length for symbol `i`,
    /// optimal among codes no longer than `max_length`. A lone used symbol
    /// gets length 1, since DEFLATE cannot express a zero-length code.
    pub fn build_lengths(&self) -> Result<Vec<u8>> {
        let mut lengths = vec![0u8; self.frequencies.len()];

        let mut symbols: Vec<(u32, usize)> = self
            .frequencies
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f > 0)
            .map(|(i, &f)| (f, i))
            .collect();

        match symbols.len() {
            0 => return Ok(lengths),
            1 => {
                lengths[symbols[0].1] = 1;
                return Ok(lengths);
            }
            n if self.max_length as u32 >= usize::BITS || n > 1usize << self.max_length => {
                return Err(ZpackError::invalid_header(format!(
                    "{} symbols cannot be coded in {} bits",
                    n, self.max_length
                )));
            }
            _ => {}
        }

        symbols.sort_unstable();
        let weights: Vec<u64> = symbols.iter().map(|&(f, _)| f as u64).collect();
        let code_lengths = package_merge(&weights, self.max_length)?;

        for (&(_, symbol), len) in symbols.iter().zip(code_lengths) {
            lengths[symbol] = len;
        }

        Ok(lengths)
    }
}

/// Item of the package-merge lists: an original symbol or a package of two
/// earlier items.
#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(usize),
    Package(usize, usize),
}

/// Length-limited code lengths by package-merge (coin collector).
///
/// `weights` must be sorted ascending and hold at least two entries, at most
/// `2^limit`. The working list starts as the leaves at the deepest level;
/// each of the `limit - 1` rounds pairs it into packages and merges those
/// with a fresh copy of the leaves. The first `2n - 2` items of the final
/// list form the optimal solution, and a symbol's code length is the number
/// of times its leaf occurs inside them. Packages are kept in an arena and
/// expanded with an explicit stack.
fn package_merge(weights: &[u64], limit: u8) -> Result<Vec<u8>> {
    let n = weights.len();
    let mut arena: Vec<(Node, u64)> = (0..n).map(|i| (Node::Leaf(i), weights[i])).collect();

    let mut list: Vec<usize> = (0..n).collect();
    for _ in 1..limit {
        let mut packages = Vec::with_capacity(list.len() / 2);
        for pair in list.chunks_exact(2) {
            let weight = arena[pair[0]].1 + arena[pair[1]].1;
            packages.push(arena.len());
            arena.push((Node::Package(pair[0], pair[1]), weight));
        }

        // Merge leaves and packages by weight; leaves win ties
        let mut merged = Vec::with_capacity(n + packages.len());
        let (mut i, mut j) = (0, 0);
        while i < n || j < packages.len() {
            let take_leaf = j >= packages.len() || (i < n && arena[i].1 <= arena[packages[j]].1);
            if take_leaf {
                merged.push(i);
                i += 1;
            } else {
                merged.push(packages[j]);
                j += 1;
            }
        }
        list = merged;
    }

    let selected = 2 * n - 2;
    if list.len() < selected {
        return Err(ZpackError::invalid_header("Huffman length limit too small"));
    }

    let mut lengths = vec![0u8; n];
    let mut stack: Vec<usize> = list[..selected].to_vec();
    while let Some(id) = stack.pop() {
        match arena[id].0 {
            Node::Leaf(symbol) => lengths[symbol] += 1,
            Node::Package(a, b) => {
                stack.push(a);
                stack.push(b);
            }
        }
    }

    Ok(lengths)
}
