//! @dose
//! purpose: Fast non-cryptographic 32-bit content hash used as the chunk cache key.
//!
//! invariants:
//!     - Same input always yields the same hash, across runs and platforms
//!
//! gotchas:
//!     - Collisions are possible; a colliding chunk reuses another chunk's count until the next
//!       whole-document encode clears the cache

const DJB2_SEED: u32 = 5381;

/// djb2 (xor variant) over the UTF-8 bytes of `input`
pub fn hash_chunk(input: &str) -> u32 {
    input
        .bytes()
        .fold(DJB2_SEED, |hash, byte| hash.wrapping_mul(33) ^ u32::from(byte))
}
