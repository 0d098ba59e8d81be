//! Seedable random source owned by each generator.
//!
//! Same LCG the drum humanizer has always used; every instance carries its
//! own state so tests can pin seeds and replay identical performances.

const MUL: u64 = 6364136223846793005;
const INC: u64 = 1442695040888963407;

#[derive(Debug, Clone)]
pub struct GenRng {
    state: u64,
}

impl GenRng {
    pub fn new(seed: u64) -> Self {
        let mut rng = Self { state: seed ^ 0x9E37_79B9_7F4A_7C15 };
        rng.step();
        rng
    }

    /// Derive an independent stream, e.g. one per instrument.
    pub fn fork(&mut self, salt: u64) -> GenRng {
        let seed = self.step() ^ salt.wrapping_mul(MUL);
        GenRng::new(seed)
    }

    #[inline]
    fn step(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(MUL).wrapping_add(INC);
        self.state
    }

    /// Raw 64-bit draw, e.g. to seed another generator.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.step()
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.step() >> 40) as f32 / (1u64 << 24) as f32
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.step() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// True with probability `p`.
    #[inline]
    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }

    /// Uniform integer in `[0, n)`; 0 when `n == 0`.
    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        ((self.next_f64() * n as f64) as usize).min(n - 1)
    }

    /// Uniform in `[lo, hi)`.
    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Symmetric jitter in `[-amount, amount)`.
    pub fn jitter(&mut self, amount: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * amount
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.below(items.len()))
        }
    }

    /// Cumulative weighted draw. Returns `None` when the total weight is not
    /// positive.
    pub fn weighted_index(&mut self, weights: &[f32]) -> Option<usize> {
        let total: f32 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        let mut r = self.next_f32() * total;
        let mut last = None;
        for (i, &w) in weights.iter().enumerate() {
            if !(w.is_finite() && w > 0.0) {
                continue;
            }
            last = Some(i);
            if r < w {
                return Some(i);
            }
            r -= w;
        }
        last
    }
}

impl Default for GenRng {
    fn default() -> Self {
        Self::new(12345)
    }
}
