// Constrained stochastic sampling: the binomial sampler, the sequential
// multinomial allocator, and the per-cell scheduling that drives both.
//
// ## Binomial sampler
//
// `binomial()` draws one `Binomial(n, p)` outcome via `rand_distr`. The
// degenerate cases `n = 0`, `p = 0` and `p = 1` are answered without touching
// the generator. A probability outside [0, 1] (including NaN) is an error;
// callers clamp before sampling.
//
// ## Sequential multinomial allocator
//
// A multinomial split of `n` trials over ordered categories `p_1..p_k` plus a
// residual mass `m` (an implicit category that receives no explicit draw) is
// sampled one category at a time: `y_i ~ Binomial(u, p_i / (p_i + ... + p_k + m))`
// where `u` is the number of trials not yet allocated. Conditioning on the
// mass that remains after the categories already decided makes the joint
// outcome exactly multinomial in any category order. `conditional_shares()`
// precomputes the conditional probabilities; `allocate()` performs the draws.
// A category whose remaining mass is zero gets a share of zero, and so does
// every category after it.
//
// ## Scheduling
//
// `CellSampler` owns the generator for one operator call. In
// `Sampling::Stochastic` every cell draws from that one generator, strictly
// in row-major cell order. In `Sampling::ParallelStochastic` cells run on
// rayon, each with its own `SimRng` seeded by
// `derive_seed(call_seed, cell, stream)`; results are then applied back in
// row-major order, so the output does not depend on thread count.
//
// **Critical constraint: determinism.** Every draw must be attributable to a
// (seed, stream, cell) triple or to a fixed position in the serial stream.

use crate::error::SimError;
use crate::prng::{SimRng, derive_seed};
use crate::types::Sampling;
use rand_distr::{Binomial, Distribution};
use rayon::prelude::*;

/// Convert a real-valued cell count to a binomial trial count, truncating
/// toward zero. Negative and NaN counts give zero trials.
pub fn trials(count: f64) -> u64 {
    if count > 0.0 { count as u64 } else { 0 }
}

/// Draw one outcome from `Binomial(n, p)`.
pub fn binomial(n: u64, p: f64, rng: &mut SimRng) -> Result<u64, SimError> {
    if n == 0 {
        return Ok(0);
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::InvalidProbability { value: p });
    }
    if p == 0.0 {
        return Ok(0);
    }
    if p == 1.0 {
        return Ok(n);
    }
    let dist = Binomial::new(n, p).map_err(|_| SimError::InvalidProbability { value: p })?;
    Ok(dist.sample(rng))
}

/// Expected-value counterpart of `binomial`: `count * p`.
///
/// Applies the same probability check as the sampler, so deterministic and
/// stochastic runs fail on the same inputs. Non-positive counts contribute 0
/// (as `trials` gives them no trials); NaN and infinite counts are errors.
pub fn expected_count(count: f64, p: f64) -> Result<f64, SimError> {
    if !count.is_finite() {
        return Err(SimError::InvalidCount { value: count });
    }
    if count <= 0.0 {
        return Ok(0.0);
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::InvalidProbability { value: p });
    }
    Ok(count * p)
}

/// Fill `shares[i]` with the conditional probability of category `i` given
/// that categories `0..i` have been decided:
/// `probs[i] / (probs[i..].sum() + residual)`.
///
/// Zero remaining mass yields a share of 0. Shares are capped at 1 to absorb
/// rounding in the suffix sums; NaN passes through so the sampler rejects it.
pub fn conditional_shares(probs: &[f64], residual: f64, shares: &mut [f64]) {
    assert_eq!(probs.len(), shares.len());
    let mut remaining = residual;
    for (share, &p) in shares.iter_mut().zip(probs).rev() {
        remaining += p;
        *share = if remaining <= 0.0 {
            0.0
        } else {
            let q = p / remaining;
            if q > 1.0 { 1.0 } else { q }
        };
    }
}

/// Sequentially allocate `trials` across categories with the given
/// conditional shares, writing one count per category into `out`.
///
/// The total allocated never exceeds `trials`. Once every trial is placed the
/// remaining categories get 0 without consuming random draws.
pub fn allocate(
    trials: u64,
    shares: &[f64],
    rng: &mut SimRng,
    out: &mut [u64],
) -> Result<(), SimError> {
    assert_eq!(shares.len(), out.len());
    let mut unallocated = trials;
    for (y, &q) in out.iter_mut().zip(shares) {
        if unallocated == 0 {
            *y = 0;
            continue;
        }
        let drawn = binomial(unallocated, q, rng)?.min(unallocated);
        *y = drawn;
        unallocated -= drawn;
    }
    Ok(())
}

/// Convenience wrapper: one multinomial draw of `trials` over `probs` with an
/// implicit residual category of mass `residual`.
pub fn multinomial(
    trials: u64,
    probs: &[f64],
    residual: f64,
    rng: &mut SimRng,
) -> Result<Vec<u64>, SimError> {
    let mut shares = vec![0.0; probs.len()];
    conditional_shares(probs, residual, &mut shares);
    let mut out = vec![0; probs.len()];
    allocate(trials, &shares, rng, &mut out)?;
    Ok(out)
}

/// The generator (or generators) for one stochastic operator call.
pub struct CellSampler {
    sampling: Sampling,
    seed: u64,
    rng: SimRng,
}

impl CellSampler {
    pub fn new(sampling: Sampling, seed: u64) -> Self {
        Self {
            sampling,
            seed,
            rng: SimRng::new(seed),
        }
    }

    /// Run `draw` for every cell in `0..cells` and hand each result to
    /// `apply` in row-major order.
    ///
    /// `stream` separates the per-cell substreams of different passes within
    /// one call (e.g. one per source stage); it is ignored by the serial
    /// schedule, where passes simply continue the shared stream.
    pub fn for_each_cell<T, D, A>(
        &mut self,
        cells: usize,
        stream: u64,
        draw: D,
        mut apply: A,
    ) -> Result<(), SimError>
    where
        T: Send,
        D: Fn(usize, &mut SimRng) -> Result<T, SimError> + Sync,
        A: FnMut(usize, T),
    {
        match self.sampling {
            Sampling::ParallelStochastic => {
                let seed = self.seed;
                let drawn: Vec<T> = (0..cells)
                    .into_par_iter()
                    .map(|cell| {
                        let mut rng = SimRng::new(derive_seed(seed, cell as u64, stream));
                        draw(cell, &mut rng)
                    })
                    .collect::<Result<Vec<T>, SimError>>()?;
                for (cell, value) in drawn.into_iter().enumerate() {
                    apply(cell, value);
                }
            }
            Sampling::Stochastic | Sampling::Deterministic => {
                for cell in 0..cells {
                    let value = draw(cell, &mut self.rng)?;
                    apply(cell, value);
                }
            }
        }
        Ok(())
    }

    /// Binomial sampler over a field: one independent `Binomial(n[c], p[c])`
    /// draw per cell.
    pub fn binomial_field(
        &mut self,
        stream: u64,
        counts: &[f64],
        probs: &[f64],
    ) -> Result<Vec<u64>, SimError> {
        assert_eq!(counts.len(), probs.len());
        let mut out = vec![0; counts.len()];
        self.for_each_cell(
            counts.len(),
            stream,
            |cell, rng| binomial(trials(counts[cell]), probs[cell], rng),
            |cell, y| out[cell] = y,
        )?;
        Ok(out)
    }
}
