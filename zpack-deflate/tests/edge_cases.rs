//! Edge case tests for DEFLATE compression.

use zpack_core::error::ErrorKind;
use zpack_deflate::{CompressionType, DeflateOptions, deflate, deflate_with, inflate, zlib};

const ALL_TYPES: [CompressionType; 3] = [
    CompressionType::None,
    CompressionType::Fixed,
    CompressionType::Dynamic,
];

fn roundtrip_all(input: &[u8]) {
    for compression_type in ALL_TYPES {
        for lazy_depth in [0, 32] {
            let options = DeflateOptions::default()
                .with_compression_type(compression_type)
                .with_lazy_depth(lazy_depth);
            let compressed = deflate_with(input, &options).unwrap();
            let decompressed = inflate(&compressed).unwrap();
            assert_eq!(
                decompressed,
                input,
                "{:?} (lazy {}) failed for {} bytes",
                compression_type,
                lazy_depth,
                input.len()
            );
        }
    }
}

fn random_bytes(size: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..size)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

#[test]
fn test_empty_input() {
    roundtrip_all(b"");
}

#[test]
fn test_single_byte() {
    roundtrip_all(b"A");
    roundtrip_all(&[0]);
    roundtrip_all(&[255]);
}

#[test]
fn test_two_and_three_bytes() {
    roundtrip_all(b"AB");
    roundtrip_all(b"AAA");
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    roundtrip_all(&input);

    let compressed = deflate(&input).unwrap();
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_all_same_byte() {
    let input = vec![255u8; 5000];
    roundtrip_all(&input);

    let compressed = deflate(&input).unwrap();
    assert!(compressed.len() < input.len() / 20);
}

#[test]
fn test_max_match_length() {
    let mut input = Vec::new();
    for i in 0..10u8 {
        input.extend(std::iter::repeat_n(i, 258));
        input.extend(std::iter::repeat_n(42u8, 258));
    }
    roundtrip_all(&input);
}

#[test]
fn test_all_literals() {
    // Incompressible data never finds a match
    roundtrip_all(&random_bytes(10_000, 7));
}

#[test]
fn test_alternating_pattern() {
    let input: Vec<u8> = (0..1000)
        .map(|i| if i % 2 == 0 { b'A' } else { b'B' })
        .collect();
    roundtrip_all(&input);
}

#[test]
fn test_large_input() {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let input: Vec<u8> = pattern.iter().copied().cycle().take(1024 * 1024).collect();

    let compressed = deflate(&input).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed.len(), 1024 * 1024);
    assert_eq!(decompressed, input);
}

#[test]
fn test_incremental_pattern() {
    let mut input = Vec::new();
    for i in 0..256 {
        input.extend(std::iter::repeat_n(i as u8, 10));
    }
    roundtrip_all(&input);
}

#[test]
fn test_stored_is_larger() {
    let input = b"Hello, world! This is a test of DEFLATE compression with stored blocks.";
    let options = DeflateOptions::default().with_compression_type(CompressionType::None);
    let compressed = deflate_with(input, &options).unwrap();
    assert_eq!(compressed.len(), input.len() + 5);
}

#[test]
fn test_binary_data() {
    let input: Vec<u8> = (0..=255).cycle().take(5000).collect();
    roundtrip_all(&input);
}

#[test]
fn test_long_distance_match() {
    // A match exactly at the window limit, and one just past it
    for gap in [32768 - 16, 32768, 32769] {
        let pattern = b"PATTERN_TO_MATCH";
        let mut input = random_bytes(gap + pattern.len(), 3);
        input[..pattern.len()].copy_from_slice(pattern);
        input[gap..].copy_from_slice(pattern);
        roundtrip_all(&input);
    }
}

#[test]
fn test_utf8_text() {
    let input = "Grüße, 世界! Привет, мир! こんにちは ".repeat(200);
    roundtrip_all(input.as_bytes());
}

#[test]
fn test_window_sized_inputs() {
    for size in [32767, 32768, 32769, 65535, 65536, 65537] {
        let input: Vec<u8> = random_bytes(size / 4, size as u32)
            .into_iter()
            .cycle()
            .take(size)
            .collect();
        roundtrip_all(&input);
    }
}

#[test]
fn test_truncated_stream_is_error() {
    let input = random_bytes(5000, 11);
    for compression_type in ALL_TYPES {
        let options = DeflateOptions::default().with_compression_type(compression_type);
        let compressed = deflate_with(&input, &options).unwrap();
        let err = inflate(&compressed[..compressed.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format, "{:?}", compression_type);
    }
}

#[test]
fn test_corrupted_zlib_trailer_each_byte() {
    let input = b"corrupt me, corrupt me, corrupt me";
    let compressed = zlib::compress(input).unwrap();
    let len = compressed.len();

    for i in len - 4..len {
        let mut damaged = compressed.clone();
        damaged[i] ^= 0x40;
        let err = zlib::decompress(&damaged, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Checksum);
    }
}

#[test]
fn test_garbage_never_panics() {
    for seed in 0..200 {
        let garbage = random_bytes(64 + seed as usize, seed);
        let _ = inflate(&garbage);
        let _ = zlib::decompress(&garbage, true);
    }
}
