use crate::dedup::Fingerprint;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only Bloom filter over atomic words
///
/// `insert` and `might_contain` never take a lock. Bits are only ever set,
/// so a reader racing a writer can at worst miss a bit that is being set
/// concurrently, and the exact store arbitrates that case.
#[derive(Debug)]
pub struct BloomFilter {
    words: Box<[AtomicU64]>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Sizes the filter for `expected_items` at `false_positive_rate`
    ///
    /// Uses the usual optimum: `m = -n ln p / (ln 2)^2` bits and
    /// `k = (m / n) ln 2` probes.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let bits = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_words = bits.div_ceil(64);
        let num_bits = num_words * 64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 30.0) as u32;

        let words = (0..num_words).map(|_| AtomicU64::new(0)).collect();

        Self {
            words,
            num_bits,
            num_hashes,
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Sets the fingerprint's bits; returns true if any bit was previously unset
    pub fn insert(&self, fingerprint: Fingerprint) -> bool {
        let mut newly_set = false;
        for bit in self.probes(fingerprint) {
            let mask = 1u64 << (bit % 64);
            let previous = self.words[(bit / 64) as usize].fetch_or(mask, Ordering::AcqRel);
            newly_set |= previous & mask == 0;
        }
        newly_set
    }

    /// False means definitely absent; true means "maybe"
    pub fn might_contain(&self, fingerprint: Fingerprint) -> bool {
        self.probes(fingerprint).all(|bit| {
            let mask = 1u64 << (bit % 64);
            self.words[(bit / 64) as usize].load(Ordering::Acquire) & mask != 0
        })
    }

    /// Fraction of bits set, a rough saturation gauge
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self
            .words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as u64)
            .sum();
        set as f64 / self.num_bits as f64
    }

    /// Kirsch-Mitzenmacher double hashing: `h1 + i * h2`
    fn probes(&self, fingerprint: Fingerprint) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = fingerprint.halves();
        let h2 = h2 | 1;
        (0..self.num_hashes as u64)
            .map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }
}
