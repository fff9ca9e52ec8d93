use xxhash_rust::xxh3::xxh3_128;

/// 128-bit xxh3 hash of a normalized URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u128);

impl Fingerprint {
    pub fn of(key: &str) -> Self {
        Self(xxh3_128(key.as_bytes()))
    }

    /// The two independent 64-bit halves used for double hashing
    pub fn halves(self) -> (u64, u64) {
        ((self.0 >> 64) as u64, self.0 as u64)
    }

    /// Picks one of `count` lock stripes
    pub fn stripe(self, count: usize) -> usize {
        (self.0 % count as u128) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(Fingerprint::of("http://a.test/"), Fingerprint::of("http://a.test/"));
        assert_ne!(Fingerprint::of("http://a.test/"), Fingerprint::of("http://a.test/x"));
    }

    #[test]
    fn test_stripe_in_range() {
        for key in ["a", "b", "c", "http://a.test/"] {
            assert!(Fingerprint::of(key).stripe(64) < 64);
        }
    }
}
