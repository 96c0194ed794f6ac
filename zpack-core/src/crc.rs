//! CRC-32 (ISO 3309) as used by GZIP trailers and ZIP entries.
//!
//! ## Performance Optimization
//!
//! Inputs of 16 bytes or more go through the "slicing-by-8" technique,
//! processing 8 bytes per step with 8 pre-computed lookup tables. Shorter
//! inputs use the plain single-table loop.
//!
//! ## Incremental Use
//!
//! A finished CRC can be fed back in with [`Crc32::resume`] (or the
//! [`update_crc32`] shorthand) to extend it over more data. This is how a
//! multi-part payload is checked without concatenating it first.

/// CRC-32 lookup table (polynomial 0xEDB88320, reflected).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-32 slicing-by-8 lookup tables.
const CRC32_TABLE_SLICE: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];
    tables[0] = CRC32_TABLE;

    let mut t = 1;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = CRC32_TABLE[(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }

    tables
};

/// CRC-32 calculator (ISO 3309).
///
/// - Polynomial: 0x04C11DB7 (reflected: 0xEDB88320)
/// - Initial value: 0xFFFFFFFF
/// - Final XOR: 0xFFFFFFFF
/// - Reflected input: Yes
/// - Reflected output: Yes
///
/// # Example
///
/// ```
/// use zpack_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"The quick brown fox ");
/// crc.update(b"jumps over the lazy dog");
/// assert_eq!(crc.finalize(), 0x414FA339);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Continue from a previously finalized CRC value.
    pub fn resume(prior: u32) -> Self {
        Self {
            crc: prior ^ 0xFFFFFFFF,
        }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= 16 {
            crc32_slice8(&mut self.crc, data);
        } else {
            crc32_sw(&mut self.crc, data);
        }
    }

    /// Get the current CRC value (without finalizing).
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Finalize and return the CRC value.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Compute CRC-32 for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        update_crc32(0, data)
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Extend a finalized CRC-32 (`prior`, 0 for none) over `data`.
#[inline]
pub fn update_crc32(prior: u32, data: &[u8]) -> u32 {
    let mut crc = Crc32::resume(prior);
    crc.update(data);
    crc.finalize()
}

/// One raw table step on an un-inverted CRC register.
///
/// The legacy ZIP cipher drives its key schedule with this.
#[inline(always)]
pub fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

#[inline]
fn crc32_sw(crc: &mut u32, data: &[u8]) {
    for &byte in data {
        *crc = crc32_step(*crc, byte);
    }
}

#[inline]
fn crc32_slice8(crc: &mut u32, data: &[u8]) {
    let mut c = *crc;
    let mut chunks = data.chunks_exact(8);

    for bytes in &mut chunks {
        let crc_xor = c ^ u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let b0 = (crc_xor & 0xFF) as usize;
        let b1 = ((crc_xor >> 8) & 0xFF) as usize;
        let b2 = ((crc_xor >> 16) & 0xFF) as usize;
        let b3 = ((crc_xor >> 24) & 0xFF) as usize;

        c = CRC32_TABLE_SLICE[7][b0]
            ^ CRC32_TABLE_SLICE[6][b1]
            ^ CRC32_TABLE_SLICE[5][b2]
            ^ CRC32_TABLE_SLICE[4][b3]
            ^ CRC32_TABLE_SLICE[3][bytes[4] as usize]
            ^ CRC32_TABLE_SLICE[2][bytes[5] as usize]
            ^ CRC32_TABLE_SLICE[1][bytes[6] as usize]
            ^ CRC32_TABLE_SLICE[0][bytes[7] as usize];
    }

    for &byte in chunks.remainder() {
        c = crc32_step(c, byte);
    }

    *crc = c;
}
