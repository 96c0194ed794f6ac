//! Traditional PKWARE ("ZipCrypto") stream cipher.
//!
//! **Security Warning**: this cipher is cryptographically broken. It falls
//! to known-plaintext attacks with a dozen bytes of plaintext. It exists so
//! old archives can be read and written; it is not a way to protect data.
//!
//! ## Algorithm Overview
//!
//! - Three 32-bit keys start at fixed values and absorb the password.
//! - Every plaintext byte advances the keys through a CRC-32 step and an LCG.
//! - Each entry starts with a 12-byte encrypted header whose last byte is a
//!   check byte derived from the entry CRC, so a wrong password is caught
//!   before any data is inflated.
//!
//! ## Example
//!
//! ```rust
//! use zpack_archive::zip::crypto::ZipCrypto;
//!
//! let mut data = b"Hello, World!".to_vec();
//! ZipCrypto::new(b"mypassword").encrypt_buffer(&mut data);
//! ZipCrypto::new(b"mypassword").decrypt_buffer(&mut data);
//! assert_eq!(&data, b"Hello, World!");
//! ```

use zpack_core::crc::crc32_step;

const INITIAL_KEY0: u32 = 0x12345678;
const INITIAL_KEY1: u32 = 0x23456789;
const INITIAL_KEY2: u32 = 0x34567890;

/// Size of the encryption header in bytes.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// ZipCrypto key state.
#[derive(Debug, Clone)]
pub struct ZipCrypto {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCrypto {
    /// Create a cipher keyed with `password`.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self {
            key0: INITIAL_KEY0,
            key1: INITIAL_KEY1,
            key2: INITIAL_KEY2,
        };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    /// Current key state.
    #[must_use]
    pub fn keys(&self) -> (u32, u32, u32) {
        (self.key0, self.key1, self.key2)
    }

    /// Advance the keys by one plaintext byte:
    ///
    /// - key0 = crc32(key0, byte)
    /// - key1 = (key1 + (key0 & 0xff)) * 134775813 + 1
    /// - key2 = crc32(key2, key1 >> 24)
    #[inline]
    fn update_keys(&mut self, byte: u8) {
        self.key0 = crc32_step(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.key2 = crc32_step(self.key2, (self.key1 >> 24) as u8);
    }

    /// ((key2 | 2) * ((key2 | 2) ^ 1)) >> 8, truncated to a byte.
    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypt one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let cipher_byte = byte ^ self.stream_byte();
        self.update_keys(byte);
        cipher_byte
    }

    /// Decrypt one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain_byte = byte ^ self.stream_byte();
        self.update_keys(plain_byte);
        plain_byte
    }

    /// Encrypt a buffer in place.
    pub fn encrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypt a buffer in place.
    pub fn decrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Build the encrypted 12-byte header: 11 filler bytes, then `check`.
    pub fn generate_header(
        &mut self,
        check: u8,
        filler: &[u8; ENCRYPTION_HEADER_SIZE - 1],
    ) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        for (slot, &byte) in header.iter_mut().zip(filler) {
            *slot = self.encrypt_byte(byte);
        }
        header[ENCRYPTION_HEADER_SIZE - 1] = self.encrypt_byte(check);
        header
    }

    /// Build the header with filler bytes drawn from an LCG seeded by `seed`.
    ///
    /// The filler only needs to differ between entries; it is not secret.
    pub fn generate_header_seeded(&mut self, check: u8, seed: u64) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut state = seed;
        let mut filler = [0u8; ENCRYPTION_HEADER_SIZE - 1];
        for byte in filler.iter_mut() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *byte = (state >> 56) as u8;
        }
        self.generate_header(check, &filler)
    }

    /// Decrypt a 12-byte header and return its check byte.
    pub fn decrypt_header(&mut self, header: &[u8; ENCRYPTION_HEADER_SIZE]) -> u8 {
        let mut plain = *header;
        self.decrypt_buffer(&mut plain);
        plain[ENCRYPTION_HEADER_SIZE - 1]
    }
}
