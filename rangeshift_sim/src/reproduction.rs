// Reproduction: the fecundity-weighted offspring field.
//
// `reproduce()` sums `fecundity[stage] * N[:, :, stage]` over stages in
// ascending order, skipping stages with zero fecundity. Pure and
// deterministic; the offspring field feeds straight into dispersal.

use crate::grid::{Grid, GridStack};

/// Offspring produced in each cell by the given population.
///
/// `fecundity` must have one entry per stage of `population`.
pub fn reproduce(population: &GridStack, fecundity: &[f64]) -> Grid {
    assert!(
        fecundity.len() >= population.layers(),
        "reproduce: {} fecundity values for {} stages",
        fecundity.len(),
        population.layers()
    );
    let mut offspring = Grid::zeros(population.rows(), population.cols());
    for (stage, &f) in fecundity.iter().enumerate().take(population.layers()) {
        if f == 0.0 {
            continue;
        }
        for (s, n) in offspring.as_mut_slice().iter_mut().zip(population.layer(stage)) {
            *s += n * f;
        }
    }
    offspring
}
