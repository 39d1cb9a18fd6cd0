//! Wire-stable hashing.
//!
//! The resolvers need hashes that every peer computes identically, so the
//! host's randomized hashers are out. This module keeps the two fixed
//! algorithms the wire contract depends on: MurmurHash3 in its x64 128-bit
//! variant for long meta-string handles, and the 31-multiplicative string
//! hash used by schema fingerprints.

const C1: u64 = 0x87C3_7B91_1142_53D5;
const C2: u64 = 0x4CF5_AD43_2745_937F;

/// Computes MurmurHash3 x64 128-bit over `data` with the given seed.
#[must_use]
pub fn murmur3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;
    let blocks = data.len() / 16;

    for i in 0..blocks {
        let k1 = read_u64_le(data, i * 16);
        let k2 = read_u64_le(data, i * 16 + 8);

        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52DC_E729);

        h2 ^= mix_k2(k2);
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5AB5);
    }

    let tail = &data[blocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;
    for (i, &byte) in tail.iter().enumerate() {
        if i < 8 {
            k1 |= u64::from(byte) << (8 * i);
        } else {
            k2 |= u64::from(byte) << (8 * (i - 8));
        }
    }
    if !tail.is_empty() {
        if tail.len() > 8 {
            h2 ^= mix_k2(k2);
        }
        h1 ^= mix_k1(k1);
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

fn read_u64_le(data: &[u8], at: usize) -> u64 {
    let mut out = 0u64;
    for i in 0..8 {
        out |= u64::from(data[at + i]) << (8 * i);
    }
    out
}

fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    k ^= k >> 33;
    k = k.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    k ^= k >> 33;
    k
}

/// The 31-multiplicative string hash used when a named type participates in
/// a schema fingerprint. The running value is collapsed by division while it
/// reaches the 31-bit ceiling, so the result always fits an `i32`.
#[must_use]
pub fn string_hash_31(input: &str) -> i32 {
    let mut hash: i64 = 17;
    for &byte in input.as_bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(i64::from(byte));
        while hash >= i64::from(i32::MAX) {
            hash /= 7;
        }
    }
    hash as i32
}
