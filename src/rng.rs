//! Seedable Random Number Generation
//!
//! Every module owns its own generator, so the audio path never touches
//! thread-local or global state. The generator is Xorshift128+, which is fast
//! and good enough for noise, chaos jitter and micro-detuning.
//!
//! With the `std` feature the default seed comes from `rand`'s entropy source;
//! without it every instance starts from the same fixed seed.

use std::f64::consts::TAU;

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Xorshift128+ generator state
#[derive(Debug, Clone, Copy)]
pub struct Rng {
    state: [u64; 2],
}

impl Rng {
    /// Raw two-word state. An all-zero state would lock up, so it is nudged.
    #[inline]
    pub const fn from_state(a: u64, b: u64) -> Self {
        let a = if a == 0 && b == 0 { 1 } else { a };
        Self { state: [a, b] }
    }

    /// Expand one 64-bit seed into a full state
    #[inline]
    pub fn from_seed(seed: u64) -> Self {
        Self::from_state(splitmix64(seed), splitmix64(seed.wrapping_add(GOLDEN_GAMMA)))
    }

    #[cfg(feature = "std")]
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random::<u64>())
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, mut b] = self.state;
        let out = a.wrapping_add(b);
        b ^= a;
        self.state = [a.rotate_left(24) ^ b ^ (b << 16), b.rotate_left(37)];
        out
    }

    /// Uniform in [0, 1) from the top 53 bits
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [-1, 1)
    #[inline]
    pub fn next_f64_bipolar(&mut self) -> f64 {
        2.0 * self.next_f64() - 1.0
    }

    /// Uniform index in `0..bound`; 0 when `bound` is 0.
    #[inline]
    pub fn next_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.next_u64() % bound as u64) as usize
    }

    /// Standard normal sample (Box-Muller)
    pub fn next_normal(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let radius = libm::sqrt(-2.0 * libm::log(1.0 - self.next_f64()));
        radius * libm::cos(TAU * self.next_f64())
    }
}

impl Default for Rng {
    fn default() -> Self {
        #[cfg(feature = "std")]
        {
            Self::from_entropy()
        }
        #[cfg(not(feature = "std"))]
        {
            Self::from_state(0x853c_49e6_748f_ea9b, 0xda3e_39cb_94b9_5bdb)
        }
    }
}

#[inline]
fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
