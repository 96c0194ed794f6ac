//! LZ77 matching for DEFLATE compression.
//!
//! This module finds repeated sequences in the input and replaces them with
//! back-references (length, distance pairs).
//!
//! # Algorithm
//!
//! Every position whose next 3 bytes are available is hashed and pushed on a
//! chain of earlier positions with the same hash. To encode a position the
//! chain is walked newest-first (back to front), stopping at the first
//! candidate older than the 32 KiB window. Each candidate is first probed at
//! the current best length, so candidates that cannot beat it are skipped
//! without a full comparison.
//!
//! With a non-zero lazy depth, a match shorter than the depth is held back
//! for one position: if the match starting one byte later is strictly longer
//! it wins and the held byte becomes a literal, otherwise the earlier match
//! is emitted.

use crate::huffman::{DISTANCE_ALPHABET_SIZE, END_OF_BLOCK, LITLEN_ALPHABET_SIZE};
use crate::tables::{MAX_MATCH, MIN_MATCH, WINDOW_SIZE, distance_to_code, length_to_code};

/// Size of the hash table (power of 2).
const HASH_BITS: u32 = 15;

const HASH_SIZE: usize = 1 << HASH_BITS;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Default bound on candidates examined per position.
pub const DEFAULT_MAX_CHAIN: usize = 4096;

/// A token produced by LZ77 compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to previously seen data.
    Match {
        /// Number of bytes to copy (3-258).
        length: u16,
        /// Distance back into the window (1-32768).
        distance: u16,
    },
}

/// Tokens plus the symbol statistics the Huffman stage needs.
#[derive(Debug, Clone)]
pub struct Lz77Output {
    /// Tokens in stream order.
    pub tokens: Vec<Lz77Token>,
    /// Literal/length symbol frequencies, end-of-block counted once.
    pub litlen_freqs: Vec<u32>,
    /// Distance symbol frequencies.
    pub dist_freqs: Vec<u32>,
}

impl Lz77Output {
    fn with_capacity(capacity: usize) -> Self {
        let mut litlen_freqs = vec![0; LITLEN_ALPHABET_SIZE];
        litlen_freqs[END_OF_BLOCK as usize] = 1;
        Self {
            tokens: Vec::with_capacity(capacity),
            litlen_freqs,
            dist_freqs: vec![0; DISTANCE_ALPHABET_SIZE],
        }
    }

    fn literal(&mut self, byte: u8) {
        self.tokens.push(Lz77Token::Literal(byte));
        self.litlen_freqs[byte as usize] += 1;
    }

    fn back_reference(&mut self, m: Match) {
        let (length_code, _, _) = length_to_code(m.length as u16);
        let (dist_code, _, _) = distance_to_code(m.distance as u16);
        self.tokens.push(Lz77Token::Match {
            length: m.length as u16,
            distance: m.distance as u16,
        });
        self.litlen_freqs[length_code as usize] += 1;
        self.dist_freqs[dist_code as usize] += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    length: usize,
    distance: usize,
}

/// Hash chains over the input: `head[h]` is the newest position with hash
/// `h`, `prev[p % WINDOW_SIZE]` the one before `p`. Positions are stored
/// plus one so that 0 means "none".
struct HashChains {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl HashChains {
    fn new() -> Self {
        Self {
            head: vec![0; HASH_SIZE],
            prev: vec![0; WINDOW_SIZE],
        }
    }

    #[inline]
    fn hash(data: &[u8], pos: usize) -> usize {
        let key = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], 0]);
        (key.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    /// Record `pos`; a no-op when fewer than 3 bytes follow it.
    #[inline]
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let h = Self::hash(data, pos);
        self.prev[pos & WINDOW_MASK] = self.head[h];
        self.head[h] = pos as u32 + 1;
    }

    #[inline]
    fn first(&self, data: &[u8], pos: usize) -> Option<usize> {
        match self.head[Self::hash(data, pos)] {
            0 => None,
            p => Some(p as usize - 1),
        }
    }

    #[inline]
    fn next(&self, candidate: usize) -> Option<usize> {
        match self.prev[candidate & WINDOW_MASK] {
            0 => None,
            p => Some(p as usize - 1),
        }
    }
}

/// LZ77 matcher for DEFLATE compression.
#[derive(Debug, Clone)]
pub struct Lz77Matcher {
    /// Matches shorter than this are deferred by one position (0 = greedy).
    lazy_depth: u16,
    /// Candidates examined per position.
    max_chain: usize,
}

impl Default for Lz77Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Lz77Matcher {
    /// Greedy matcher with the default chain bound.
    pub fn new() -> Self {
        Self {
            lazy_depth: 0,
            max_chain: DEFAULT_MAX_CHAIN,
        }
    }

    /// Set the lazy-matching threshold.
    pub fn with_lazy_depth(mut self, lazy_depth: u16) -> Self {
        self.lazy_depth = lazy_depth;
        self
    }

    /// Set the maximum number of chain candidates examined per position.
    pub fn with_max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = max_chain.max(1);
        self
    }

    /// Tokenize `data` and collect symbol frequencies.
    pub fn compress(&self, data: &[u8]) -> Lz77Output {
        let n = data.len();
        let mut out = Lz77Output::with_capacity(n / 2 + 16);
        let mut chains = HashChains::new();

        let mut pos = 0;
        let mut deferred: Option<Match> = None;

        while pos < n {
            if n - pos < MIN_MATCH {
                if let Some(m) = deferred.take() {
                    let start = pos - 1;
                    out.back_reference(m);
                    pos = start + m.length;
                    continue;
                }
                out.literal(data[pos]);
                pos += 1;
                continue;
            }

            let found = self.longest_match(data, pos, &chains);
            chains.insert(data, pos);

            if let Some(held) = deferred.take() {
                match found {
                    Some(m) if m.length > held.length => {
                        out.literal(data[pos - 1]);
                        out.back_reference(m);
                        pos = self.skip(data, &mut chains, pos, pos, m.length);
                    }
                    _ => {
                        out.back_reference(held);
                        pos = self.skip(data, &mut chains, pos, pos - 1, held.length);
                    }
                }
                continue;
            }

            match found {
                Some(m) if (m.length as u16) < self.lazy_depth => {
                    deferred = Some(m);
                    pos += 1;
                }
                Some(m) => {
                    out.back_reference(m);
                    pos = self.skip(data, &mut chains, pos, pos, m.length);
                }
                None => {
                    out.literal(data[pos]);
                    pos += 1;
                }
            }
        }

        out
    }

    /// Hash the not-yet-seen positions covered by a match starting at `start`
    /// and return the position after it. Everything up to and including
    /// `hashed` is already in the chains.
    fn skip(
        &self,
        data: &[u8],
        chains: &mut HashChains,
        hashed: usize,
        start: usize,
        length: usize,
    ) -> usize {
        let end = start + length;
        for p in hashed + 1..end {
            chains.insert(data, p);
        }
        end
    }

    /// Longest match for `pos` among the chained candidates.
    fn longest_match(&self, data: &[u8], pos: usize, chains: &HashChains) -> Option<Match> {
        let max_len = MAX_MATCH.min(data.len() - pos);
        if max_len < MIN_MATCH {
            return None;
        }

        let target = &data[pos..pos + max_len];
        let mut best = Match {
            length: MIN_MATCH - 1,
            distance: 0,
        };

        let mut candidate = chains.first(data, pos);
        let mut budget = self.max_chain;

        while let Some(p) = candidate {
            let distance = pos - p;
            if distance > WINDOW_SIZE || budget == 0 {
                break;
            }
            budget -= 1;

            // A candidate that differs at the current best length cannot improve on it
            if data[p + best.length] == target[best.length] {
                let length = data[p..]
                    .iter()
                    .zip(target)
                    .take_while(|(a, b)| a == b)
                    .count();
                if length > best.length {
                    best = Match { length, distance };
                    if length == max_len {
                        break;
                    }
                }
            }

            candidate = chains.next(p);
        }

        (best.length >= MIN_MATCH).then_some(best)
    }
}
