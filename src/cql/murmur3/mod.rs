// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The Murmur3 x64/128 variant used by the Cassandra partitioner. Unlike
//! the reference implementation, Cassandra performs the finalization
//! arithmetic on signed 64-bit values; tokens derived from the first half
//! must match the server's, so the signed semantics are kept here.

use std::convert::TryInto;

const C1: i64 = -8_663_945_395_140_668_459; // 0x87c37b91114253d5
const C2: i64 = 0x4cf5_ad43_2745_937f;

/// Hash a serialized partition key. The partition token is the first half
/// of the pair.
pub fn murmur3_cassandra_x64_128(data: &[u8], seed: u32) -> (i64, i64) {
    let mut h1 = seed as i64;
    let mut h2 = seed as i64;

    let mut chunks = data.chunks_exact(16);
    for chunk in chunks.by_ref() {
        let k1 = i64::from_le_bytes(chunk[..8].try_into().unwrap());
        let k2 = i64::from_le_bytes(chunk[8..].try_into().unwrap());
        h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 = h1.rotate_left(27).wrapping_add(h2).wrapping_mul(5).wrapping_add(0x52dc_e729);
        h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 = h2.rotate_left(31).wrapping_add(h1).wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0i64;
        let mut k2 = 0i64;
        for (i, byte) in tail.iter().enumerate() {
            if i < 8 {
                k1 ^= (*byte as i64) << (8 * i);
            } else {
                k2 ^= (*byte as i64) << (8 * (i - 8));
            }
        }
        if tail.len() > 8 {
            k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
            h2 ^= k2;
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as i64;
    h2 ^= data.len() as i64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

fn fmix64(mut k: i64) -> i64 {
    k ^= ((k as u64) >> 33) as i64;
    k = k.wrapping_mul(-49_064_778_989_728_563); // 0xff51afd7ed558ccd
    k ^= ((k as u64) >> 33) as i64;
    k = k.wrapping_mul(-4_265_267_296_055_464_877); // 0xc4ceb9fe1a85ec53
    k ^= ((k as u64) >> 33) as i64;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    // the partition-key tokens from the Cassandra data-distribution docs
    #[test]
    fn known_tokens() {
        assert_eq!(murmur3_cassandra_x64_128(b"jim", 0).0, 2_680_261_686_609_811_218);
        assert_eq!(murmur3_cassandra_x64_128(b"carol", 0).0, 4_016_264_465_811_926_804);
        assert_eq!(murmur3_cassandra_x64_128(b"johnny", 0).0, -6_723_372_854_036_780_875);
        assert_eq!(murmur3_cassandra_x64_128(b"suzy", 0).0, -7_348_672_971_196_922_731);
        assert_eq!(murmur3_cassandra_x64_128(b"", 0).0, 0);
    }

    #[test]
    fn deterministic() {
        let a = murmur3_cassandra_x64_128(b"partition-key-bytes", 0);
        let b = murmur3_cassandra_x64_128(b"partition-key-bytes", 0);
        assert_eq!(a, b);
        let c = murmur3_cassandra_x64_128(b"partition-key-bytez", 0);
        assert_ne!(a, c);
    }

    #[test]
    fn tail_lengths_cover_both_lanes() {
        // exercise 1..=15 byte tails plus a full block
        for len in 0..=17 {
            let data: Vec<u8> = (0..len).collect();
            let (h1, h2) = murmur3_cassandra_x64_128(&data, 0);
            let again = murmur3_cassandra_x64_128(&data, 0);
            assert_eq!((h1, h2), again);
        }
    }
}
