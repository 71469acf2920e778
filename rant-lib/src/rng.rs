//! Deterministic random numbers
//!
//! SplitMix64, seeded directly from the run seed. Everything random in a run (block choices,
//! random chars, dictionary picks) draws from one [Rng] owned by the vm, so a seed fully
//! determines the output.

/// A deterministic pseudo random number stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rng {
    seed: u64,
    state: u64,
    generation: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng {
            seed,
            state: seed,
            generation: 0,
        }
    }

    /// the seed this stream was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// how many values have been drawn so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn next_u64(&mut self) -> u64 {
        self.generation += 1;
        self.state = splitmix64_next(self.state);
        splitmix64_mix(self.state)
    }

    /// uniform in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// uniform in [0, n), 0 if n is 0
    pub fn next_below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }

    /// Random integer in [min, max] (inclusive). Swapped bounds are accepted.
    pub fn int_range(&mut self, min: i64, max: i64) -> i64 {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let range = (max as i128 - min as i128 + 1) as u128;
        let random = self.next_u64() as u128;
        (min as i128 + (random % range) as i128) as i64
    }

    /// Select an index based on weights. Weights do not need to sum to 1, non positive
    /// weights are never selected unless all of them are.
    pub fn weighted_choice(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if weights.is_empty() || total <= 0.0 || !total.is_finite() {
            return self.next_below(weights.len());
        }
        let threshold = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = 0;
        for (i, &weight) in weights.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_positive = i;
            if threshold < cumulative {
                return i;
            }
        }
        last_positive
    }
}

/// A fixed set of seeds, addressed by hashing a key.
///
/// Different runs that sample a pool built from the same seed with the same key get the same
/// random stream, no matter what seed drives the surrounding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPool {
    seeds: Vec<u64>,
}

impl SeedPool {
    pub fn new(seed: u64, size: usize) -> Self {
        let mut rng = Rng::new(seed);
        SeedPool {
            seeds: (0..size.max(1)).map(|_| rng.next_u64()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn slot(&self, key: &str) -> usize {
        (fnv1a64_str(key) % self.seeds.len() as u64) as usize
    }

    pub fn rng_for(&self, key: &str) -> Rng {
        Rng::new(self.seeds[self.slot(key)])
    }
}

const FNV1A_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME_64: u64 = 0x00000100000001B3;

pub const fn fnv1a64_str(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let mut hash = FNV1A_OFFSET_BASIS_64;
    let mut i = 0usize;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV1A_PRIME_64);
        i += 1;
    }
    hash
}

const fn splitmix64_next(state: u64) -> u64 {
    state.wrapping_add(0x9E3779B97F4A7C15)
}

const fn splitmix64_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Rng::new(7);
        let mut b = Rng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_eq!(a.generation(), 100);
        assert_ne!(Rng::new(1).next_u64(), Rng::new(2).next_u64());
    }

    #[test]
    fn ranges_stay_in_bounds() {
        let mut rng = Rng::new(3);
        for _ in 0..1000 {
            let v = rng.int_range(-3, 5);
            assert!((-3..=5).contains(&v));
            assert!(rng.next_below(4) < 4);
            let f = rng.next_f64();
            assert!((0.0..1.0).contains(&f));
        }
        assert_eq!(rng.int_range(9, 9), 9);
        assert!((1..=4).contains(&rng.int_range(4, 1)));
    }

    #[test]
    fn zero_weights_are_never_chosen() {
        let mut rng = Rng::new(11);
        for _ in 0..500 {
            assert_ne!(rng.weighted_choice(&[1.0, 0.0, 2.0, -1.0]), 1);
            assert_ne!(rng.weighted_choice(&[1.0, 0.0, 2.0, -1.0]), 3);
        }
        assert_eq!(rng.weighted_choice(&[0.0, 5.0]), 1);
    }

    #[test]
    fn pools_are_keyed_by_hash() {
        let pool = SeedPool::new(0, 16);
        assert_eq!(pool.len(), 16);
        assert_eq!(pool.rng_for("B"), pool.rng_for("B"));
        assert_eq!(pool.slot("B"), (fnv1a64_str("B") % 16) as usize);
        assert_eq!(SeedPool::new(0, 16), pool);
    }

    #[test]
    fn fnv_reference_value() {
        assert_eq!(fnv1a64_str(""), FNV1A_OFFSET_BASIS_64);
        assert_eq!(fnv1a64_str("a"), 0xaf63dc4c8601ec8c);
    }
}
