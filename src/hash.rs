//! Hash functions over raw key bytes and the derivation of a slot position
//! and control fragment from a 64-bit hash.

use core::hash::BuildHasher;
use core::hash::Hasher;

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 14695981039346656037;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 1099511628211;

/// 2^64 divided by the golden ratio, used to spread hashes over buckets.
pub const GOLDEN_RATIO: u64 = 0x9E37_79B9_7F4A_7C15;

/// A hash function over the raw bytes of a key.
///
/// A table calls this once per keyed operation and once per live entry when
/// it rehashes, so implementations must be deterministic for the lifetime of
/// the table.
///
/// Implemented for [`Fnv1a`] (the default), for plain `fn(&[u8]) -> u64`
/// pointers, and, behind their features, for xxHash3 and foldhash.
///
/// # Examples
///
/// ```rust
/// use swiss_table::hash::ByteHasher;
///
/// fn first_byte(bytes: &[u8]) -> u64 {
///     bytes.first().copied().unwrap_or(0) as u64 * 0x0101_0101_0101_0101
/// }
///
/// let hasher: fn(&[u8]) -> u64 = first_byte;
/// assert_eq!(hasher.hash_bytes(&[2, 9]), 0x0202_0202_0202_0202);
/// ```
pub trait ByteHasher {
    /// Hashes `bytes` to a 64-bit value.
    fn hash_bytes(&self, bytes: &[u8]) -> u64;
}

impl ByteHasher for fn(&[u8]) -> u64 {
    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        self(bytes)
    }
}

/// The byte-wise FNV-1a hash, the default hasher of every table.
///
/// Also usable as a [`BuildHasher`] for other collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fnv1a;

impl BuildHasher for Fnv1a {
    type Hasher = FnvHasher;

    #[inline]
    fn build_hasher(&self) -> FnvHasher {
        FnvHasher::default()
    }
}

impl ByteHasher for Fnv1a {
    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.build_hasher();
        hasher.write(bytes);
        hasher.finish()
    }
}

/// Streaming FNV-1a state.
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher {
    state: u64,
}

impl Default for FnvHasher {
    #[inline]
    fn default() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Hasher for FnvHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = (self.state ^ byte as u64).wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }
}

/// The 64-bit xxHash3 function.
#[cfg(feature = "xxh3")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3 {
    seed: u64,
}

#[cfg(feature = "xxh3")]
impl Xxh3 {
    /// Creates an xxHash3 hasher with the given seed. `Xxh3::default()` uses
    /// seed 0.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

#[cfg(feature = "xxh3")]
impl ByteHasher for Xxh3 {
    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        if self.seed == 0 {
            xxhash_rust::xxh3::xxh3_64(bytes)
        } else {
            xxhash_rust::xxh3::xxh3_64_with_seed(bytes, self.seed)
        }
    }
}

#[cfg(feature = "foldhash")]
impl ByteHasher for foldhash::fast::FixedState {
    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.build_hasher();
        hasher.write(bytes);
        hasher.finish()
    }
}

/// Returns the home bucket of `hash` in a table of `1 << log2_capacity`
/// slots.
///
/// Only the top bits of the hash multiplied by [`GOLDEN_RATIO`] are used,
/// which mixes low-entropy hashes far better than masking the low bits.
#[inline(always)]
pub fn bucket_index(hash: u64, log2_capacity: u32) -> usize {
    debug_assert!((1..64).contains(&log2_capacity));
    (hash.wrapping_mul(GOLDEN_RATIO) >> (64 - log2_capacity)) as usize
}

/// Returns the 7-bit fragment of `hash` stored in an occupied control byte:
/// bits 56 through 62.
#[inline(always)]
pub fn fragment(hash: u64) -> u8 {
    ((hash >> 56) & 0x7F) as u8
}

#[cfg(test)]
mod tests {
    use core::hash::Hash;

    use siphasher::sip::SipHasher;

    use super::*;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(Fnv1a.hash_bytes(b""), FNV_OFFSET_BASIS);
        assert_eq!(Fnv1a.hash_bytes(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(Fnv1a.hash_bytes(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn fnv1a_streams_like_one_shot() {
        let mut hasher = Fnv1a.build_hasher();
        hasher.write(b"foo");
        hasher.write(b"bar");
        assert_eq!(hasher.finish(), Fnv1a.hash_bytes(b"foobar"));
    }

    #[test]
    fn function_pointer_hasher() {
        fn sip(bytes: &[u8]) -> u64 {
            let mut hasher = SipHasher::new_with_keys(1, 2);
            bytes.hash(&mut hasher);
            hasher.finish()
        }

        let hasher: fn(&[u8]) -> u64 = sip;
        assert_eq!(hasher.hash_bytes(b"key"), sip(b"key"));
        assert_ne!(hasher.hash_bytes(b"key"), hasher.hash_bytes(b"kez"));
    }

    #[test]
    fn bucket_index_uses_top_bits() {
        assert_eq!(bucket_index(0, 4), 0);
        assert_eq!(bucket_index(1, 4), (GOLDEN_RATIO >> 60) as usize);
        assert_eq!(bucket_index(1, 1), 1);
        for hash in [0u64, 1, 2, 0xdead_beef, u64::MAX] {
            assert!(bucket_index(hash, 3) < 8);
            assert!(bucket_index(hash, 20) < 1 << 20);
        }
    }

    #[test]
    fn fragment_is_bits_56_to_62() {
        assert_eq!(fragment(0xFF00_0000_0000_0000), 0x7F);
        assert_eq!(fragment(0x8000_0000_0000_0000), 0x00);
        assert_eq!(fragment(0x2A00_0000_0000_0000), 0x2A);
        assert_eq!(fragment(0x00FF_FFFF_FFFF_FFFF), 0x00);
    }

    #[cfg(feature = "xxh3")]
    #[test]
    fn xxh3_matches_reference() {
        assert_eq!(
            Xxh3::default().hash_bytes(b"swiss"),
            xxhash_rust::xxh3::xxh3_64(b"swiss")
        );
        assert_eq!(
            Xxh3::with_seed(7).hash_bytes(b"swiss"),
            xxhash_rust::xxh3::xxh3_64_with_seed(b"swiss", 7)
        );
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn foldhash_fixed_state_is_deterministic() {
        let state = foldhash::fast::FixedState::with_seed(42);
        assert_eq!(state.hash_bytes(b"swiss"), state.hash_bytes(b"swiss"));
    }
}
