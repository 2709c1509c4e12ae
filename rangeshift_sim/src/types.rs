// Core enums and small value types shared across the engine.
//
// Operator behavior is selected with explicit tagged variants rather than
// boolean flags: `TransitionMode` picks the transition algorithm,
// `Sampling` picks stochastic vs. expected-value evaluation (and the
// stochastic schedule), and `Boundary` picks what happens to dispersers that
// leave the grid. All derive serde so they can appear in `SimConfig`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage indexing
// ---------------------------------------------------------------------------

/// An ordered (source, target) stage pair: individuals in `source` moving to
/// (or, for a fecundity slot, producing individuals in) `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StagePair {
    pub source: usize,
    pub target: usize,
}

impl StagePair {
    pub const fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }

    /// The conventional fecundity slot of a three-stage life cycle: adults
    /// (stage 2) producing stage-0 recruits, i.e. `alpha[0, 2]`.
    pub const fn conventional_fecundity() -> Self {
        Self::new(2, 0)
    }
}

impl fmt::Display for StagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

// ---------------------------------------------------------------------------
// Operator modes
// ---------------------------------------------------------------------------

/// Which transition algorithm to run. The two variants differ in their
/// conservation guarantees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionMode {
    /// Per source stage, target probabilities are jointly normalized and one
    /// multinomial split allocates the source population. Never creates
    /// individuals.
    #[default]
    GridConstrained,
    /// Every (source, target) pair is drawn independently from the full source
    /// population. Draws for one source may jointly exceed its count.
    Pairwise {
        /// The pair whose intercept acts as a fecundity multiplier instead
        /// of a probability. `None` treats every pair as a plain probability.
        fecundity_slot: Option<StagePair>,
    },
}

/// How operators turn probabilities into counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sampling {
    /// Expected values: counts times probabilities, no randomness.
    Deterministic,
    /// One generator per operator call, consumed in row-major cell order.
    #[default]
    Stochastic,
    /// Cells processed in parallel, each drawing from its own substream
    /// derived from the call seed and the cell index. Reproducible and
    /// independent of thread count, but a different stream from `Stochastic`.
    ParallelStochastic,
}

impl Sampling {
    pub fn is_stochastic(self) -> bool {
        !matches!(self, Sampling::Deterministic)
    }
}

/// Fate of dispersers that land outside the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    /// Fold the padding back onto the mirrored interior rows and columns.
    /// Conserves total mass.
    #[default]
    Reflecting,
    /// Discard the padding; mass leaves the domain.
    Absorbing,
}
