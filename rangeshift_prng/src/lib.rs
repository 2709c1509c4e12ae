// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// The generator core is hand-rolled so its output is identical on every
// platform; it implements `rand_core::RngCore` so that `rand_distr`
// distributions (the binomial sampler in `rangeshift_sim`) can draw from it.
//
// Seeds for individual operator calls are never taken from a shared,
// advancing generator. Instead `derive_seed()` mixes a base seed with a step
// index and a stream tag, so every call is a pure function of its inputs and a
// run can be replayed from any step.
//
// **Critical constraint: determinism.** Every method on `SimRng` must produce
// identical output given the same prior state, regardless of platform,
// compiler version, or optimization level. Do not use floating-point
// arithmetic in the core generator, stdlib PRNG, or any source of
// non-determinism in this module.

use rand_core::RngCore;
use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG, the simulation's sole source of randomness.
///
/// Each stochastic operator call owns exactly one `SimRng` (or, in parallel
/// mode, one per grid cell), seeded deterministically.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimRng {
    s: [u64; 4],
}

impl SimRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `SimRng` instances created with the same seed will produce
    /// identical output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a `u32` by taking the upper 32 bits of a `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        SimRng::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        SimRng::next_u64(self)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = SimRng::next_u64(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Derive the seed for one operator call from a base seed, a step index and a
/// stream tag.
///
/// Pure function: the same triple always yields the same seed. Different
/// steps or streams yield decorrelated seeds (each input passes through a
/// SplitMix64 round before being folded in), so step 0 of one stream never
/// collides with a later step of another the way `seed * step` would.
pub fn derive_seed(base: u64, step: u64, stream: u64) -> u64 {
    let mut state = base;
    let mut mixed = splitmix64(&mut state);
    state = mixed ^ step;
    mixed = splitmix64(&mut state);
    state = mixed ^ stream.rotate_left(32);
    splitmix64(&mut state)
}

/// SplitMix64, used for seeding xoshiro256++ from a single `u64` and for
/// seed derivation.
///
/// This is the standard recommendation from the xoshiro authors for
/// expanding a small seed into a larger state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
