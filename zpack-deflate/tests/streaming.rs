//! Streaming decoder equivalence tests.

use zpack_deflate::{
    CompressionType, DeflateOptions, InflateState, InflateStream, ZlibInflateStream,
    deflate_with, inflate, zlib,
};

fn text(size: usize) -> Vec<u8> {
    let words: &[&[u8]] = &[
        b"the", b"quick", b"brown", b"fox", b"jumps", b"over", b"lazy", b"dog", b"and", b"runs",
    ];
    let mut data = Vec::with_capacity(size);
    let mut seed = 42u32;
    while data.len() < size {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        data.extend_from_slice(words[(seed >> 16) as usize % words.len()]);
        data.push(b' ');
    }
    data.truncate(size);
    data
}

fn stream_decode(compressed: &[u8], chunk: usize) -> Vec<u8> {
    let mut stream = InflateStream::new();
    let mut output = Vec::new();
    for piece in compressed.chunks(chunk) {
        output.extend(stream.feed(piece).unwrap());
    }
    assert_eq!(stream.state(), InflateState::Finished);
    output
}

#[test]
fn test_byte_at_a_time_matches_one_shot() {
    for size in [0, 1, 100, 40_000] {
        let input = text(size);
        for compression_type in [
            CompressionType::None,
            CompressionType::Fixed,
            CompressionType::Dynamic,
        ] {
            let options = DeflateOptions::default().with_compression_type(compression_type);
            let compressed = deflate_with(&input, &options).unwrap();
            let one_shot = inflate(&compressed).unwrap();
            assert_eq!(stream_decode(&compressed, 1), one_shot);
            assert_eq!(one_shot, input);
        }
    }
}

#[test]
fn test_large_stream_in_odd_chunks() {
    let input = text(500_000);
    let compressed = deflate_with(&input, &DeflateOptions::default().with_lazy_depth(16)).unwrap();
    for chunk in [13, 4099] {
        assert_eq!(stream_decode(&compressed, chunk), input);
    }
}

#[test]
fn test_multiple_stored_blocks_streamed() {
    let input = text(200_000);
    let options = DeflateOptions::default().with_compression_type(CompressionType::None);
    let compressed = deflate_with(&input, &options).unwrap();
    assert_eq!(stream_decode(&compressed, 777), input);
}

#[test]
fn test_empty_feeds_are_harmless() {
    let input = text(1000);
    let compressed = deflate_with(&input, &DeflateOptions::default()).unwrap();

    let mut stream = InflateStream::new();
    let mut output = Vec::new();
    for piece in compressed.chunks(10) {
        output.extend(stream.feed(&[]).unwrap());
        output.extend(stream.feed(piece).unwrap());
    }
    output.extend(stream.feed(&[]).unwrap());
    assert!(stream.is_finished());
    assert_eq!(output, input);
}

#[test]
fn test_zlib_stream_matches_one_shot() {
    let input = text(70_000);
    let compressed = zlib::compress(&input).unwrap();

    let mut stream = ZlibInflateStream::new();
    let mut output = Vec::new();
    for piece in compressed.chunks(3) {
        output.extend(stream.feed(piece).unwrap());
    }
    assert!(stream.is_finished());
    assert_eq!(output, zlib::decompress(&compressed, true).unwrap());
}

fn flip_bit(data: &[u8], bit: usize) -> Vec<u8> {
    let mut damaged = data.to_vec();
    damaged[bit / 8] ^= 1 << (bit % 8);
    damaged
}

#[test]
fn test_corrupted_stream_byte_at_a_time() {
    let input = text(1500);
    let mut rejected = 0;
    for compression_type in [CompressionType::Fixed, CompressionType::Dynamic] {
        let options = DeflateOptions::default().with_compression_type(compression_type);
        let compressed = deflate_with(&input, &options).unwrap();

        for bit in (0..compressed.len() * 8).step_by(11) {
            let damaged = flip_bit(&compressed, bit);
            let mut stream = InflateStream::new();
            let outcome = damaged
                .chunks(1)
                .try_for_each(|piece| stream.feed(piece).map(drop));

            if let Err(err) = outcome {
                rejected += 1;
                let one_shot = inflate(&damaged).unwrap_err();
                assert_eq!(err.to_string(), one_shot.to_string(), "bit {}", bit);
            }
        }
    }
    assert!(rejected > 0);
}

#[test]
fn test_truncated_stream_waits_for_input() {
    let compressed = deflate_with(&text(4000), &DeflateOptions::default()).unwrap();
    for cut in [1, 2, 5, compressed.len() / 3, compressed.len() - 1] {
        let mut stream = InflateStream::new();
        for piece in compressed[..cut].chunks(3) {
            stream.feed(piece).unwrap();
        }
        assert!(!stream.is_finished(), "cut at {}", cut);
        assert!(inflate(&compressed[..cut]).is_err());
    }
}

#[test]
fn test_corrupted_zlib_stream_byte_at_a_time() {
    let compressed = zlib::compress(&text(2000)).unwrap();
    for bit in (0..compressed.len() * 8).step_by(5) {
        let damaged = flip_bit(&compressed, bit);
        let mut stream = ZlibInflateStream::new();
        let outcome = damaged
            .chunks(1)
            .try_for_each(|piece| stream.feed(piece).map(drop));

        if outcome.is_err() {
            assert!(zlib::decompress(&damaged, true).is_err(), "bit {}", bit);
        }
    }
}
