//! MurmurHash3 128-bit (x64 variant).
//!
//! Every persistent identifier in the store is the 128-bit digest of some
//! string, so this function defines the on-disk key space and must stay
//! byte-for-byte stable.

#[inline(always)]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Compute MurmurHash3 128-bit hash (x64 variant) of the given data with a
/// seed. Returns `(h1, h2)` as two u64 values.
pub fn murmurhash3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1: u64 = seed;
    let mut h2: u64 = seed;

    let nblocks = data.len() / 16;

    // Body: process 16-byte blocks.
    for block in data.chunks_exact(16) {
        let mut k1 = u64::from_le_bytes(block[..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..].try_into().unwrap());

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x38495ab5);
    }

    // Tail: 0..=15 remaining bytes, accumulated high-to-low as in the
    // reference fallthrough switch.
    let tail = &data[nblocks * 16..];
    if tail.len() > 8 {
        let mut k2: u64 = 0;
        for i in (8..tail.len()).rev() {
            k2 ^= (tail[i] as u64) << ((i - 8) * 8);
        }
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        let mut k1: u64 = 0;
        for i in (0..tail.len().min(8)).rev() {
            k1 ^= (tail[i] as u64) << (i * 8);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    // Finalization.
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

/// Convenience: compute MurmurHash3 128-bit and return as `[u8; 16]`.
pub fn murmurhash3_x64_128_bytes(data: &[u8], seed: u64) -> [u8; 16] {
    let (h1, h2) = murmurhash3_x64_128(data, seed);
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&h1.to_le_bytes());
    out[8..].copy_from_slice(&h2.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let (a1, a2) = murmurhash3_x64_128(b"/lustre/scratch/a.bam", 0);
        let (b1, b2) = murmurhash3_x64_128(b"/lustre/scratch/a.bam", 0);
        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
    }

    #[test]
    fn test_different_seeds() {
        let a = murmurhash3_x64_128(b"hello", 0);
        let b = murmurhash3_x64_128(b"hello", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_data() {
        let a = murmurhash3_x64_128(b"/a", 0);
        let b = murmurhash3_x64_128(b"/b", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_bytes_format() {
        let bytes = murmurhash3_x64_128_bytes(b"test", 0);
        let (h1, h2) = murmurhash3_x64_128(b"test", 0);
        assert_eq!(&bytes[..8], &h1.to_le_bytes());
        assert_eq!(&bytes[8..], &h2.to_le_bytes());
    }

    #[test]
    fn test_all_tail_lengths() {
        // Exercise every tail length 0..16 and make sure nearby inputs do
        // not collide.
        let data: Vec<u8> = (0u8..48).collect();
        let mut seen = Vec::new();
        for len in 0..=data.len() {
            let h = murmurhash3_x64_128(&data[..len], 0);
            assert!(!seen.contains(&h));
            seen.push(h);
        }
    }
}
