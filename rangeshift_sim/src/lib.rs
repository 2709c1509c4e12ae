// rangeshift_sim: stage-structured population dynamics on a raster.
//
// This crate contains the whole engine: demographic transitions between life
// stages driven by intercepts, density dependence and environmental
// covariates; fecundity-weighted reproduction; kernel dispersal with
// reflecting or absorbing edges; and the time-stepping driver that chains
// them. It has no I/O beyond loading scenario JSON and can be tested,
// benchmarked, and run headless.
//
// Module overview:
// - `grid.rs`:         Dense row-major `Grid` and layer-major `GridStack`.
// - `types.rs`:        StagePair, TransitionMode, Sampling, Boundary.
// - `error.rs`:        SimError.
// - `sampling.rs`:     Binomial draws, sequential multinomial allocation, per-cell scheduling.
// - `transition.rs`:   TransitionParams, probability construction, the transition operator.
// - `reproduction.rs`: Fecundity-weighted offspring field.
// - `dispersal.rs`:    Kernel, boundary folding, the dispersal operator.
// - `sim.rs`:          Simulation state machine, `simulate()`, TimeSeries.
// - `config.rs`:       SimConfig + Scenario (JSON loading and validation).
// - `prng`:            Re-exported from `rangeshift_prng`: xoshiro256++ with seed derivation.
//
// The companion crate `rangeshift_cli` wraps this library as a command-line
// tool.
//
// **Critical constraint: determinism.** Every operator is a pure function of
// its inputs and an explicit seed. No global generator, no system time, no OS
// entropy.

pub mod config;
pub mod dispersal;
pub mod error;
pub mod grid;
pub use rangeshift_prng as prng;
pub mod reproduction;
pub mod sampling;
pub mod sim;
pub mod transition;
pub mod types;

pub use config::{Scenario, SimConfig};
pub use dispersal::{Kernel, disperse};
pub use error::SimError;
pub use grid::{Grid, GridStack};
pub use reproduction::reproduce;
pub use sim::{Simulation, StepReport, TimeSeries, simulate};
pub use transition::{TransitionParams, transition};
pub use types::{Boundary, Sampling, StagePair, TransitionMode};
