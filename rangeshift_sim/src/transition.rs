// Stage transitions: probability construction and the transition operator.
//
// ## Probability construction
//
// For a (source, target) pair the per-cell probability is linear in the
// current state:
//
//   p = alpha[t, s]
//     + sum over stages d of beta[t, s, d] * N[:, :, d]
//     + sum over variables e of gamma[t, s, e] * E[:, :, e]
//
// accumulated per cell in exactly that order (intercept, then stages
// ascending, then variables ascending), skipping zero coefficients. A pair
// whose intercept plus all its coefficients sum to exactly zero is skipped
// altogether and keeps probability 0, which makes sparse parameter sets cheap.
//
// Grid-constrained mode then clamps every target's field to [0, 1] and, in
// each cell where the targets sum past 1, divides the whole target vector by
// that sum. Pairwise mode clamps only.
//
// ## Operator
//
// `transition()` returns the post-transition population; the input is never
// mutated. Sources are processed in ascending order and their contributions
// accumulate into the output stages.
//
// - `GridConstrained`: each source's count is split across targets with the
//   sequential multinomial allocator (residual = stay + mortality), or in
//   deterministic mode `N[s] * p[t]` is added directly. Mass is never created.
// - `Pairwise`: each pair draws `Binomial(N[s], p)` independently, so the
//   draws for one source can sum past its count. The optional fecundity slot
//   builds its probability with the intercept forced to 1 and multiplies the
//   result by the true intercept afterwards (rounded in stochastic mode).
//
// See also: `sampling.rs` for the allocator and scheduling, `sim.rs` for the
// driver that calls this once per step.
//
// **Critical constraint: determinism.** The serial stochastic stream is
// consumed source by source, then (pairwise) target by target, then cell by
// cell in row-major order.

use crate::error::SimError;
use crate::grid::{Grid, GridStack};
use crate::sampling::{CellSampler, allocate, conditional_shares, expected_count, trials};
use crate::types::{Sampling, StagePair, TransitionMode};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use tracing::trace;

/// Demographic parameters for the transition operator.
///
/// All three arrays are indexed `[target, source, ...]`, for both transition
/// modes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionParams {
    /// Intercepts, `[target, source]`.
    pub alpha: Grid,
    /// Density dependence, `[target, source, influencing stage]`.
    pub beta: GridStack,
    /// Environmental effects, `[target, source, environment variable]`.
    pub gamma: GridStack,
}

impl TransitionParams {
    pub fn new(alpha: Grid, beta: GridStack, gamma: GridStack) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Intercept-only parameters: zero density and environment effects.
    pub fn intercepts(alpha: Grid, variables: usize) -> Self {
        let (targets, sources) = (alpha.rows(), alpha.cols());
        Self {
            beta: GridStack::zeros(targets, sources, targets.max(sources)),
            gamma: GridStack::zeros(targets, sources, variables),
            alpha,
        }
    }

    pub fn targets(&self) -> usize {
        self.alpha.rows()
    }

    pub fn sources(&self) -> usize {
        self.alpha.cols()
    }
}

// ---------------------------------------------------------------------------
// Probability construction
// ---------------------------------------------------------------------------

/// Write the unclamped probability field for one pair into `out`, using
/// `intercept` in place of `alpha[t, s]`. Returns `false` (leaving `out`
/// untouched) when the pair has no nonzero parameter.
fn build_pair(
    out: &mut [f64],
    pair: StagePair,
    intercept: f64,
    params: &TransitionParams,
    population: &GridStack,
    environment: &GridStack,
) -> bool {
    let (t, s) = (pair.target, pair.source);
    let density_sum: f64 = params.beta.tube(t, s).sum();
    let env_sum: f64 = params.gamma.tube(t, s).sum();
    if intercept + density_sum + env_sum == 0.0 {
        trace!(%pair, "skipping transition pair with no parameters");
        return false;
    }

    out.fill(intercept);
    for (d, m) in params.beta.tube(t, s).enumerate() {
        if m != 0.0 {
            for (p, n) in out.iter_mut().zip(population.layer(d)) {
                *p += n * m;
            }
        }
    }
    for (e, m) in params.gamma.tube(t, s).enumerate() {
        if m != 0.0 {
            for (p, x) in out.iter_mut().zip(environment.layer(e)) {
                *p += x * m;
            }
        }
    }
    true
}

/// Jointly constrained target probabilities for one source stage:
/// a (row, col, target) stack, clamped to [0, 1] with every cell's target
/// vector summing to at most 1.
pub fn transition_probabilities(
    source: usize,
    params: &TransitionParams,
    population: &GridStack,
    environment: &GridStack,
) -> GridStack {
    let targets = params.targets();
    let mut probs = GridStack::zeros(population.rows(), population.cols(), targets);
    for target in 0..targets {
        let pair = StagePair::new(source, target);
        let intercept = params.alpha[(target, source)];
        build_pair(
            probs.layer_mut(target),
            pair,
            intercept,
            params,
            population,
            environment,
        );
        for p in probs.layer_mut(target) {
            *p = p.clamp(0.0, 1.0);
        }
    }

    for cell in 0..probs.cells() {
        let total: f64 = probs.cell_tube(cell).sum();
        if total > 1.0 {
            for target in 0..targets {
                probs.layer_mut(target)[cell] /= total;
            }
        }
    }
    probs
}

/// Clamped probability field for one pair, independent of the other targets.
/// `None` when the pair is skipped.
pub fn pair_probability(
    pair: StagePair,
    intercept: f64,
    params: &TransitionParams,
    population: &GridStack,
    environment: &GridStack,
) -> Option<Grid> {
    let mut field = Grid::zeros(population.rows(), population.cols());
    if !build_pair(
        field.as_mut_slice(),
        pair,
        intercept,
        params,
        population,
        environment,
    ) {
        return None;
    }
    for p in field.as_mut_slice() {
        *p = p.clamp(0.0, 1.0);
    }
    Some(field)
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Apply one demographic transition to `population` under `environment`.
///
/// `seed` fully determines the random stream; the same inputs and seed give
/// bit-identical output.
pub fn transition(
    population: &GridStack,
    environment: &GridStack,
    params: &TransitionParams,
    mode: TransitionMode,
    sampling: Sampling,
    seed: u64,
) -> Result<GridStack, SimError> {
    let mut sampler = CellSampler::new(sampling, seed);
    match mode {
        TransitionMode::GridConstrained => {
            grid_constrained(population, environment, params, sampling, &mut sampler)
        }
        TransitionMode::Pairwise { fecundity_slot } => pairwise(
            population,
            environment,
            params,
            fecundity_slot,
            sampling,
            &mut sampler,
        ),
    }
}

fn grid_constrained(
    population: &GridStack,
    environment: &GridStack,
    params: &TransitionParams,
    sampling: Sampling,
    sampler: &mut CellSampler,
) -> Result<GridStack, SimError> {
    let targets = params.targets();
    let cells = population.cells();
    let mut next = GridStack::zeros(population.rows(), population.cols(), population.layers());

    for source in 0..params.sources() {
        let probs = transition_probabilities(source, params, population, environment);
        let counts = population.layer(source);

        if !sampling.is_stochastic() {
            for target in 0..targets {
                let layer = next.layer_mut(target);
                for ((acc, &n), &p) in layer.iter_mut().zip(counts).zip(probs.layer(target)) {
                    *acc += expected_count(n, p)?;
                }
            }
            continue;
        }

        let mut allocations: Vec<SmallVec<[u64; 8]>> = Vec::with_capacity(cells);
        sampler.for_each_cell(
            cells,
            source as u64,
            |cell, rng| {
                let p: SmallVec<[f64; 8]> = probs.cell_tube(cell).collect();
                let residual = (1.0 - p.iter().sum::<f64>()).max(0.0);
                let mut shares: SmallVec<[f64; 8]> = smallvec![0.0; targets];
                conditional_shares(&p, residual, &mut shares);
                let mut out: SmallVec<[u64; 8]> = smallvec![0; targets];
                allocate(trials(counts[cell]), &shares, rng, &mut out)?;
                Ok(out)
            },
            |_, out| allocations.push(out),
        )?;

        for target in 0..targets {
            let layer = next.layer_mut(target);
            for (acc, out) in layer.iter_mut().zip(&allocations) {
                *acc += out[target] as f64;
            }
        }
    }
    Ok(next)
}

fn pairwise(
    population: &GridStack,
    environment: &GridStack,
    params: &TransitionParams,
    fecundity_slot: Option<StagePair>,
    sampling: Sampling,
    sampler: &mut CellSampler,
) -> Result<GridStack, SimError> {
    let targets = params.targets();
    let mut next = GridStack::zeros(population.rows(), population.cols(), population.layers());

    for source in 0..params.sources() {
        let counts = population.layer(source);
        for target in 0..targets {
            let pair = StagePair::new(source, target);
            let alpha = params.alpha[(target, source)];
            let is_slot = fecundity_slot == Some(pair);
            let intercept = if is_slot { 1.0 } else { alpha };
            let Some(probs) = pair_probability(pair, intercept, params, population, environment)
            else {
                continue;
            };
            let scale = if is_slot { alpha } else { 1.0 };

            let layer = next.layer_mut(target);
            if sampling.is_stochastic() {
                let stream = (source * targets + target) as u64;
                let drawn = sampler.binomial_field(stream, counts, probs.as_slice())?;
                for (acc, y) in layer.iter_mut().zip(drawn) {
                    *acc += if is_slot {
                        (y as f64 * scale).round()
                    } else {
                        y as f64
                    };
                }
            } else {
                for ((acc, &n), &p) in layer.iter_mut().zip(counts).zip(probs.as_slice()) {
                    *acc += expected_count(n, p)? * scale;
                }
            }
        }
    }
    Ok(next)
}
