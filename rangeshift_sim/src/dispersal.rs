// Dispersal: redistribute an offspring field over the grid through a
// neighborhood kernel.
//
// ## Kernel
//
// A `Kernel` is a square weight matrix of odd side `2r + 1`; entry (i, j) is
// the weight of landing at offset (i - r, j - r) from the source cell, the
// center entry being "stay". Construction rejects any other shape. The kernel
// also caches its processing order: flat entry indices sorted by descending
// weight, ties kept in row-major order.
//
// ## Operator
//
// `disperse()` works on a zero-padded grid of size (rows + 2r) x (cols + 2r),
// where source cell (a, b) maps kernel entry (i, j) to padded cell
// (a + i, b + j).
//
// - Stochastic: each source cell's count is split across kernel entries with
//   the sequential multinomial allocator, most probable entry first. The
//   weights are normalized internally (no residual category), so a kernel
//   with any positive weight places every seed.
// - Deterministic: `S[a, b] * kernel` is added directly. Non-positive seed
//   counts place nothing, as in the stochastic path; NaN or infinite counts
//   are an error.
//
// With a reflecting boundary the padding strips are folded back onto the
// interior before cropping: for each `i in 0..r`, top row `i` is added onto
// row `2r - 1 - i`, left column `i` onto column `2r - 1 - i`, then the
// bottom and right strips onto their mirrors. Rows and columns are folded
// whole, so corner mass travels through both folds and total mass is
// conserved. With an absorbing boundary the padding is dropped.
//
// See also: `sampling.rs` for the allocator, `sim.rs` for the driver.
//
// **Critical constraint: determinism.** The serial stochastic stream visits
// source cells in row-major order and kernel entries in the cached order.

use crate::error::SimError;
use crate::grid::Grid;
use crate::sampling::{CellSampler, allocate, conditional_shares, trials};
use crate::types::{Boundary, Sampling};
use serde::{Deserialize, Serialize};

/// Per-cell substream tag for parallel dispersal.
const DISPERSAL_CELL_STREAM: u64 = 0;

/// A square, odd-sided neighborhood weight matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Grid", into = "Grid")]
pub struct Kernel {
    weights: Grid,
    radius: usize,
    order: Vec<usize>,
}

impl Kernel {
    pub fn new(weights: Grid) -> Result<Self, SimError> {
        let (rows, cols) = (weights.rows(), weights.cols());
        if rows != cols || rows % 2 == 0 || !weights.is_consistent() {
            return Err(SimError::KernelShape { rows, cols });
        }
        Ok(Self::with_order(weights))
    }

    /// The 3x3 nearest-neighbor kernel: weight `stay` at the center and the
    /// remaining `1 - stay` split evenly over the eight neighbors.
    pub fn nearest(stay: f64) -> Self {
        let mut weights = Grid::filled(3, 3, (1.0 - stay) / 8.0);
        weights[(1, 1)] = stay;
        Self::with_order(weights)
    }

    /// Wrap a weight matrix already known to be square and odd-sided.
    fn with_order(weights: Grid) -> Self {
        let w = weights.as_slice();
        let mut order: Vec<usize> = (0..w.len()).collect();
        order.sort_by(|&a, &b| w[b].total_cmp(&w[a]));
        Self {
            radius: (weights.rows() - 1) / 2,
            weights,
            order,
        }
    }

    /// The 1x1 kernel: everything stays in place.
    pub fn stay() -> Self {
        Self {
            weights: Grid::filled(1, 1, 1.0),
            radius: 0,
            order: vec![0],
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Side length, `2 * radius + 1`.
    pub fn side(&self) -> usize {
        self.weights.rows()
    }

    pub fn weights(&self) -> &Grid {
        &self.weights
    }

    /// Flat entry indices in the order the stochastic allocator visits them.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

impl TryFrom<Grid> for Kernel {
    type Error = SimError;

    fn try_from(weights: Grid) -> Result<Self, SimError> {
        Kernel::new(weights)
    }
}

impl From<Kernel> for Grid {
    fn from(kernel: Kernel) -> Grid {
        kernel.weights
    }
}

/// Disperse `seeds` through `kernel`, returning a field of the same shape.
pub fn disperse(
    seeds: &Grid,
    kernel: &Kernel,
    boundary: Boundary,
    sampling: Sampling,
    seed: u64,
) -> Result<Grid, SimError> {
    let r = kernel.radius();
    let side = kernel.side();
    let (rows, cols) = (seeds.rows(), seeds.cols());
    let mut padded = Grid::zeros(rows + 2 * r, cols + 2 * r);
    let weights = kernel.weights();

    if sampling.is_stochastic() {
        let ordered: Vec<f64> = kernel
            .order()
            .iter()
            .map(|&k| weights.as_slice()[k])
            .collect();
        let mut shares = vec![0.0; ordered.len()];
        conditional_shares(&ordered, 0.0, &mut shares);

        let counts = seeds.as_slice();
        let mut sampler = CellSampler::new(sampling, seed);
        sampler.for_each_cell(
            counts.len(),
            DISPERSAL_CELL_STREAM,
            |cell, rng| {
                let mut out = vec![0; shares.len()];
                allocate(trials(counts[cell]), &shares, rng, &mut out)?;
                Ok(out)
            },
            |cell, out| {
                let (a, b) = (cell / cols, cell % cols);
                for (&k, &y) in kernel.order().iter().zip(&out) {
                    if y > 0 {
                        padded[(a + k / side, b + k % side)] += y as f64;
                    }
                }
            },
        )?;
    } else {
        for a in 0..rows {
            for b in 0..cols {
                let s = seeds[(a, b)];
                if !s.is_finite() {
                    return Err(SimError::InvalidCount { value: s });
                }
                if s <= 0.0 {
                    continue;
                }
                for i in 0..side {
                    for j in 0..side {
                        padded[(a + i, b + j)] += s * weights[(i, j)];
                    }
                }
            }
        }
    }

    if boundary == Boundary::Reflecting {
        reflect(&mut padded, r);
    }
    Ok(crop(&padded, r, rows, cols))
}

/// Fold the `r`-wide padding strips of `padded` back onto the interior.
fn reflect(padded: &mut Grid, r: usize) {
    let (rows, cols) = (padded.rows(), padded.cols());
    for i in 0..r {
        add_row(padded, i, 2 * r - 1 - i);
        add_col(padded, i, 2 * r - 1 - i);
        add_row(padded, rows - 1 - i, rows - 2 * r + i);
        add_col(padded, cols - 1 - i, cols - 2 * r + i);
    }
}

fn add_row(grid: &mut Grid, from: usize, onto: usize) {
    for c in 0..grid.cols() {
        let v = grid[(from, c)];
        grid[(onto, c)] += v;
    }
}

fn add_col(grid: &mut Grid, from: usize, onto: usize) {
    for row in 0..grid.rows() {
        let v = grid[(row, from)];
        grid[(row, onto)] += v;
    }
}

fn crop(padded: &Grid, r: usize, rows: usize, cols: usize) -> Grid {
    let mut interior = Grid::zeros(rows, cols);
    for a in 0..rows {
        for b in 0..cols {
            interior[(a, b)] = padded[(a + r, b + r)];
        }
    }
    interior
}
