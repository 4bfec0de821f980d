//! Danmaku Payload Inspector
//!
//! Decodes a saved segment reply (`seg.so` body) and reports what the decoder
//! recovered, including a hex window around the first problem offset.
//!
//! Usage:
//!   cargo run --bin danmaku_inspect -- 2024-03-02.so
//!   cargo run --bin danmaku_inspect -- 2024-03-02.so --json --context 32

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use danmaku_crawler::harvest::DanmakuCollector;
use danmaku_crawler::output::to_pretty_json;
use danmaku_crawler::wire::{decode_envelope, DanmakuElement, DanmakuPool};

#[derive(Parser, Debug)]
#[command(name = "danmaku_inspect")]
#[command(about = "Inspect a saved danmaku segment payload")]
struct Args {
    /// Path to the raw payload
    path: PathBuf,

    /// Print the deduplicated records as JSON
    #[arg(long, default_value = "false")]
    json: bool,

    /// Bytes of hex shown on each side of a decode error
    #[arg(long, default_value = "16")]
    context: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let payload =
        fs::read(&args.path).with_context(|| format!("Failed to read {}", args.path.display()))?;

    println!("=== Danmaku Inspector ===");
    println!("File: {}", args.path.display());
    println!("Size: {} bytes", payload.len());
    println!();

    let decoded = decode_envelope(&payload);
    let elems = &decoded.value;

    println!("Status:   {}", decoded.status.as_str());
    println!("Elements: {}", elems.len());
    print_progress_range(elems);
    print_pools(elems);

    let mut collector = DanmakuCollector::new();
    collector.absorb(elems.iter());
    println!("Unique (progress, text): {}", collector.len());
    println!();

    if let Some(err) = decoded.status.error() {
        println!("--- Decode problem ---");
        println!("Error: {}", err);
        println!("{}", hex_window(&payload, err.offset(), args.context));
        println!();
    }

    if args.json {
        println!("{}", to_pretty_json(&collector.into_sorted())?);
    }

    println!("=== Inspection Complete ===");
    Ok(())
}

fn print_progress_range(elems: &[DanmakuElement]) {
    let progress: Vec<u64> = elems.iter().filter_map(|e| e.progress).collect();
    match (progress.iter().min(), progress.iter().max()) {
        (Some(lo), Some(hi)) => println!(
            "Progress: {:.3}s .. {:.3}s ({} with offset)",
            *lo as f64 / 1000.0,
            *hi as f64 / 1000.0,
            progress.len()
        ),
        _ => println!("Progress: none"),
    }
}

fn print_pools(elems: &[DanmakuElement]) {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for e in elems {
        let name = match e.pool {
            None | Some(DanmakuPool::Normal) => "normal",
            Some(DanmakuPool::Subtitle) => "subtitle",
            Some(DanmakuPool::Special) => "special",
            Some(DanmakuPool::Other(_)) => "other",
        };
        *counts.entry(name).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort();
    println!("Pools:    {:?}", counts);
}

/// Hex dump of `payload[offset - context .. offset + context]` with a marker
/// under the byte at `offset`.
fn hex_window(payload: &[u8], offset: usize, context: usize) -> String {
    let offset = offset.min(payload.len());
    let start = offset.saturating_sub(context);
    let end = offset.saturating_add(context).min(payload.len());

    let before = hex::encode(&payload[start..offset]);
    let after = hex::encode(&payload[offset..end]);
    let marker = " ".repeat(before.len() + "Bytes @".len() + digits(start) + 2);
    format!("Bytes @{}: {}{}\n{}^ offset {}", start, before, after, marker, offset)
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}
