//! Benchmarks for LZ77 matching performance.

use zpack_deflate::lz77::{Lz77Matcher, Lz77Token};

fn main() {
    let test_cases = vec![
        ("small_random", generate_random(1024)),
        ("medium_random", generate_random(64 * 1024)),
        ("large_random", generate_random(256 * 1024)),
        ("small_repeated", generate_repeated(1024)),
        ("medium_repeated", generate_repeated(64 * 1024)),
        ("large_repeated", generate_repeated(256 * 1024)),
        ("small_text", generate_text_like(1024)),
        ("medium_text", generate_text_like(64 * 1024)),
        ("large_text", generate_text_like(256 * 1024)),
    ];

    println!("LZ77 Matching Benchmarks");
    println!("========================\n");

    for (name, data) in &test_cases {
        println!("Test: {} ({} bytes)", name, data.len());

        for (label, lazy_depth, max_chain) in [
            ("greedy/16", 0, 16),
            ("greedy/4096", 0, 4096),
            ("lazy32/4096", 32, 4096),
        ] {
            let matcher = Lz77Matcher::new()
                .with_lazy_depth(lazy_depth)
                .with_max_chain(max_chain);

            let start = std::time::Instant::now();
            let output = matcher.compress(data);
            let elapsed = start.elapsed();

            let covered: usize = output
                .tokens
                .iter()
                .map(|t| match t {
                    Lz77Token::Literal(_) => 1,
                    Lz77Token::Match { length, .. } => *length as usize,
                })
                .sum();

            let throughput = data.len() as f64 / elapsed.as_secs_f64() / 1024.0 / 1024.0;
            let ratio = (data.len() as f64 / output.tokens.len().max(1) as f64).max(1.0);

            println!(
                "  {:<12} {:8.2} MB/s, {:7} tokens, {:6.2}x ratio, {:8} µs",
                label,
                throughput,
                output.tokens.len(),
                ratio,
                elapsed.as_micros()
            );

            // Sanity check
            assert_eq!(covered, data.len());
        }
        println!();
    }
}

fn generate_random(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed = 12345u32;
    for _ in 0..size {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((seed >> 16) as u8);
    }
    data
}

fn generate_repeated(size: usize) -> Vec<u8> {
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

fn generate_text_like(size: usize) -> Vec<u8> {
    let words: &[&[u8]] = &[
        b"the", b"quick", b"brown", b"fox", b"jumps", b"over", b"lazy", b"dog", b"and", b"runs",
        b"through", b"forest", b"near", b"river", b"under", b"blue", b"sky", b"with", b"wind",
        b"blowing",
    ];
    let mut data = Vec::with_capacity(size);
    let mut seed = 42u32;

    while data.len() < size {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        let word_idx = (seed >> 16) as usize % words.len();
        data.extend_from_slice(words[word_idx]);
        data.push(b' ');
    }
    data.truncate(size);
    data
}
