//! Adler-32 checksum (RFC 1950), used by the ZLIB trailer.

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Largest n such that 255n(n+1)/2 + (n+1)(ADLER_MOD-1) fits in 32 bits.
///
/// Reducing once per `NMAX` bytes is therefore enough to never overflow.
const NMAX: usize = 5552;

/// Adler-32 checksum calculator.
///
/// Two 16-bit accumulators modulo 65521, seeded at `a = 1, b = 0`. Faster
/// than CRC-32 but weaker on short inputs.
///
/// # Example
///
/// ```
/// use zpack_core::adler::Adler32;
///
/// assert_eq!(Adler32::checksum(b""), 1);
/// assert_eq!(Adler32::checksum(b"Wikipedia"), 0x11E60398);
/// ```
#[derive(Clone, Debug)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Create a new Adler-32 calculator.
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Continue from a previously finished checksum.
    pub fn resume(prior: u32) -> Self {
        Self {
            a: prior & 0xFFFF,
            b: prior >> 16,
        }
    }

    /// Update the checksum with more data.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += byte as u32;
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        self.a = a;
        self.b = b;
    }

    /// Return the checksum of everything fed so far.
    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Compute Adler-32 checksum of data in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.finish()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adler32_empty() {
        assert_eq!(Adler32::checksum(b""), 1);
    }

    #[test]
    fn test_adler32_known_vectors() {
        assert_eq!(Adler32::checksum(b"a"), 0x00620062);
        assert_eq!(Adler32::checksum(b"abc"), 0x024D0127);
        assert_eq!(Adler32::checksum(b"Wikipedia"), 0x11E60398);
    }

    #[test]
    fn test_adler32_incremental() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
        let mut adler = Adler32::new();
        for chunk in data.chunks(777) {
            adler.update(chunk);
        }
        assert_eq!(adler.finish(), Adler32::checksum(&data));
    }

    #[test]
    fn test_adler32_resume() {
        let data = vec![0xFFu8; 12_000];
        let first = Adler32::checksum(&data[..5000]);
        let mut adler = Adler32::resume(first);
        adler.update(&data[5000..]);
        assert_eq!(adler.finish(), Adler32::checksum(&data));
    }

    #[test]
    fn test_adler32_no_overflow_on_ff() {
        // Worst case for the accumulators
        let data = vec![0xFFu8; NMAX * 3 + 17];
        let mut a: u64 = 1;
        let mut b: u64 = 0;
        for &byte in &data {
            a = (a + byte as u64) % ADLER_MOD as u64;
            b = (b + a) % ADLER_MOD as u64;
        }
        assert_eq!(Adler32::checksum(&data), ((b << 16) | a) as u32);
    }
}
