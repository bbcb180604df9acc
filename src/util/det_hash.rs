//! Deterministic hashing for sampling decisions.
//!
//! `std`'s default hasher is randomly keyed per process, so two processes
//! would disagree about the same trace. This hasher uses a fixed seed and is
//! stable across runs, machines and releases of this crate.

use std::hash::Hasher;

/// Deterministic, non-cryptographic hasher.
#[derive(Debug, Clone)]
pub(crate) struct DetHasher {
    state: u64,
}

impl DetHasher {
    /// Fixed seed ensures deterministic hashes across runs.
    const SEED: u64 = 0x16f1_1fe8_9b0d_677c;
    /// Prime multiplier for mixing.
    const MULTIPLIER: u64 = 0x517c_c1b7_2722_0a95;

    /// Starts from `seed` mixed into the fixed seed.
    pub(crate) fn with_seed(seed: u64) -> Self {
        let mut hasher = Self::default();
        hasher.write_u64(seed);
        hasher
    }
}

impl Default for DetHasher {
    fn default() -> Self {
        Self { state: Self::SEED }
    }
}

impl Hasher for DetHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = self.state.wrapping_mul(Self::MULTIPLIER);
            self.state ^= u64::from(byte);
        }
    }

    fn write_u8(&mut self, i: u8) {
        self.state = self.state.wrapping_mul(Self::MULTIPLIER) ^ u64::from(i);
    }

    fn write_u64(&mut self, i: u64) {
        self.state = self.state.wrapping_mul(Self::MULTIPLIER) ^ i;
    }

    fn finish(&self) -> u64 {
        // Final mixing for better distribution.
        let mut h = self.state;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(bytes: &[u8]) -> u64 {
        let mut h = DetHasher::default();
        h.write(bytes);
        h.finish()
    }

    #[test]
    fn same_input_same_hash() {
        assert_eq!(hash(b"trace-1"), hash(b"trace-1"));
        assert_ne!(hash(b"trace-1"), hash(b"trace-2"));
    }

    #[test]
    fn seed_changes_hash() {
        let mut a = DetHasher::with_seed(1);
        let mut b = DetHasher::with_seed(2);
        a.write(b"trace");
        b.write(b"trace");
        assert_ne!(a.finish(), b.finish());
    }
}
