//! Per-record work, run on the engine's worker threads.

use core::time::Duration;
use rand::Rng;
use std::{io, thread};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a over `bytes`, chained `rounds` times.
pub fn fnv1a(bytes: &[u8], rounds: u32) -> u64 {
    let mut hash = FNV_OFFSET;
    for _ in 0..rounds {
        for &b in bytes {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Sleeps up to `max`, chosen at random.
pub fn jitter(max: Duration) {
    if max.is_zero() {
        return;
    }
    let millis = rand::rng().random_range(0..=max.as_millis() as u64);
    thread::sleep(Duration::from_millis(millis));
}

/// `<hash>  <line>`
pub fn digest(line: &str, rounds: u32) -> String {
    format!("{:016x}  {line}", fnv1a(line.as_bytes(), rounds))
}

pub fn matches(line: &str, pattern: &str, invert: bool) -> bool {
    line.contains(pattern) != invert
}

/// Splits a record into owned words. A read error is passed through as the
/// only element.
pub fn words(record: io::Result<String>) -> Vec<io::Result<String>> {
    match record {
        Ok(line) => line.split_whitespace().map(|w| Ok(w.to_owned())).collect(),
        Err(e) => vec![Err(e)],
    }
}
