// 🔢 Prime Set - Sieve of Eratosthenes, built once, read-only afterwards

/// Default upper bound of the precomputed set
pub const DEFAULT_PRIME_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct PrimeSet {
    sieve: Vec<bool>,
}

impl PrimeSet {
    /// Sieve every number in `[0, limit]`
    pub fn new(limit: usize) -> Self {
        let mut sieve = vec![true; limit + 1];
        for slot in sieve.iter_mut().take(2) {
            *slot = false;
        }

        let mut i = 2;
        while i * i <= limit {
            if sieve[i] {
                for multiple in (i * i..=limit).step_by(i) {
                    sieve[multiple] = false;
                }
            }
            i += 1;
        }

        PrimeSet { sieve }
    }

    /// Largest number covered by the sieve
    pub fn limit(&self) -> usize {
        self.sieve.len() - 1
    }

    /// Membership test. Anything above the limit is reported as not prime.
    pub fn contains(&self, n: u64) -> bool {
        usize::try_from(n)
            .ok()
            .and_then(|n| self.sieve.get(n))
            .copied()
            .unwrap_or(false)
    }

    /// Number of primes in the set
    pub fn len(&self) -> usize {
        self.sieve.iter().filter(|&&p| p).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PrimeSet {
    fn default() -> Self {
        Self::new(DEFAULT_PRIME_LIMIT)
    }
}
