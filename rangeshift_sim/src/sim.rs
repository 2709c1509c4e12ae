// Simulation driver: the time-stepping loop.
//
// `Simulation` owns the evolving population and the step counter; everything
// else (environment series, parameters, fecundity, kernel) is borrowed
// read-only from the caller. It is a small state machine over steps
// `0..=config.steps`, terminal at `config.steps`. One `step()`:
//
//   1. picks the environment frame: frame 0 for a single-frame
//      (time-invariant) series, otherwise the frame at the step index;
//   2. runs `transition()` with seed `derive_seed(seed, step, TRANSITION_STREAM)`;
//   3. runs `reproduce()` on the transitioned population;
//   4. runs `disperse()` on the offspring with
//      seed `derive_seed(seed, step, DISPERSAL_STREAM)`;
//   5. adds the dispersed offspring into stage 0.
//
// `simulate()` wraps this: it records the configured stage of the initial
// population as frame 0 and the stage after each step as frame `step + 1`,
// producing `steps + 1` frames.
//
// Per-step seeds are derived, never carried over, so any step can be
// replayed from the base seed alone. Errors propagate immediately; there
// are no retries and no partial time series.
//
// See also: `transition.rs`, `reproduction.rs`, `dispersal.rs` for the
// operators, `config.rs` for `SimConfig` and `Scenario`.
//
// **Critical constraint: determinism.** Given the same inputs and config, a
// run is bit-identical.

use crate::config::SimConfig;
use crate::dispersal::{Kernel, disperse};
use crate::error::SimError;
use crate::grid::{Grid, GridStack};
use crate::prng::derive_seed;
use crate::reproduction::reproduce;
use crate::transition::{TransitionParams, transition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Stream tag for per-step transition seeds.
pub const TRANSITION_STREAM: u64 = 0;
/// Stream tag for per-step dispersal seeds.
pub const DISPERSAL_STREAM: u64 = 1;

/// The recorded stage of the population at every step, frame 0 being the
/// initial state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// The stage that was recorded.
    pub stage: usize,
    frames: Vec<Grid>,
}

impl TimeSeries {
    pub fn frames(&self) -> &[Grid] {
        &self.frames
    }

    pub fn frame(&self, step: usize) -> Option<&Grid> {
        self.frames.get(step)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total recorded abundance per frame.
    pub fn totals(&self) -> Vec<f64> {
        self.frames.iter().map(Grid::sum).collect()
    }
}

/// What one step did, for logging and inspection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    /// Index of the step that ran.
    pub step: usize,
    /// Offspring produced before dispersal.
    pub offspring: f64,
    /// Offspring that landed inside the grid.
    pub settled: f64,
    /// Total population after the step.
    pub population: f64,
}

/// A run in progress.
pub struct Simulation<'a> {
    population: GridStack,
    environment: &'a [GridStack],
    params: &'a TransitionParams,
    fecundity: &'a [f64],
    kernel: &'a Kernel,
    config: SimConfig,
    step: usize,
}

impl<'a> Simulation<'a> {
    pub fn new(
        initial: GridStack,
        environment: &'a [GridStack],
        params: &'a TransitionParams,
        fecundity: &'a [f64],
        kernel: &'a Kernel,
        config: SimConfig,
    ) -> Self {
        Self {
            population: initial,
            environment,
            params,
            fecundity,
            kernel,
            config,
            step: 0,
        }
    }

    /// Index of the next step to run.
    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.config.steps
    }

    pub fn population(&self) -> &GridStack {
        &self.population
    }

    pub fn into_population(self) -> GridStack {
        self.population
    }

    /// The configured stage of the current population.
    pub fn recorded(&self) -> Grid {
        self.population.layer_grid(self.config.record_stage)
    }

    fn environment_frame(&self) -> Result<&'a GridStack, SimError> {
        let frames: &'a [GridStack] = self.environment;
        let index = if frames.len() == 1 { 0 } else { self.step };
        frames.get(index).ok_or(SimError::EnvironmentTooShort {
            needed: index + 1,
            available: frames.len(),
        })
    }

    /// Advance one step: transition, reproduction, dispersal, merge.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        let env = self.environment_frame()?;
        let step = self.step as u64;
        let config = &self.config;

        let mut next = transition(
            &self.population,
            env,
            self.params,
            config.transition_mode,
            config.sampling,
            derive_seed(config.seed, step, TRANSITION_STREAM),
        )?;
        let offspring = reproduce(&next, self.fecundity);
        let dispersed = disperse(
            &offspring,
            self.kernel,
            config.boundary,
            config.sampling,
            derive_seed(config.seed, step, DISPERSAL_STREAM),
        )?;
        next.add_to_layer(0, &dispersed);
        self.population = next;

        let report = StepReport {
            step: self.step,
            offspring: offspring.sum(),
            settled: dispersed.sum(),
            population: self.population.total(),
        };
        debug!(
            step = report.step,
            offspring = report.offspring,
            settled = report.settled,
            population = report.population,
            "step complete"
        );
        self.step += 1;
        Ok(report)
    }
}

/// Run a full simulation and return the recorded stage at every step.
pub fn simulate(
    initial: &GridStack,
    environment: &[GridStack],
    params: &TransitionParams,
    fecundity: &[f64],
    kernel: &Kernel,
    config: &SimConfig,
) -> Result<TimeSeries, SimError> {
    if config.record_stage >= initial.layers() {
        return Err(SimError::StageOutOfRange {
            what: "record",
            stage: config.record_stage,
            stages: initial.layers(),
        });
    }
    info!(
        rows = initial.rows(),
        cols = initial.cols(),
        stages = initial.layers(),
        steps = config.steps,
        sampling = ?config.sampling,
        mode = ?config.transition_mode,
        "starting simulation"
    );

    let mut sim = Simulation::new(
        initial.clone(),
        environment,
        params,
        fecundity,
        kernel,
        config.clone(),
    );
    let mut frames = Vec::with_capacity(config.steps + 1);
    frames.push(sim.recorded());
    while !sim.is_finished() {
        sim.step()?;
        frames.push(sim.recorded());
    }

    info!(
        population = sim.population().total(),
        "simulation finished"
    );
    Ok(TimeSeries {
        stage: config.record_stage,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Boundary, Sampling};

    fn two_stage_params() -> TransitionParams {
        // Juveniles mature with 0.3, stay with 0.5; adults survive with 0.9.
        TransitionParams::intercepts(Grid::from_vec(2, 2, vec![0.5, 0.0, 0.3, 0.9]), 0)
    }

    fn initial() -> GridStack {
        let mut pop = GridStack::zeros(4, 4, 2);
        pop[(1, 1, 1)] = 30.0;
        pop[(2, 2, 0)] = 50.0;
        pop
    }

    fn config(steps: usize, sampling: Sampling) -> SimConfig {
        SimConfig {
            steps,
            sampling,
            record_stage: 1,
            ..SimConfig::default()
        }
    }

    #[test]
    fn records_steps_plus_one_frames() {
        let env = [GridStack::zeros(4, 4, 0)];
        let series = simulate(
            &initial(),
            &env,
            &two_stage_params(),
            &[0.0, 2.0],
            &Kernel::stay(),
            &config(5, Sampling::Stochastic),
        )
        .unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series.stage, 1);
        assert_eq!(series.frame(0).unwrap()[(1, 1)], 30.0);
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let env = [GridStack::zeros(4, 4, 0)];
        let kernel = Kernel::new(Grid::filled(3, 3, 1.0 / 9.0)).unwrap();
        let run = || {
            simulate(
                &initial(),
                &env,
                &two_stage_params(),
                &[0.0, 2.0],
                &kernel,
                &config(8, Sampling::Stochastic),
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn deterministic_step_matches_hand_computation() {
        // One cell, stay kernel: adults 10 -> 9 survive, produce 2 * 9 = 18
        // juveniles; juveniles 0 before the step.
        let mut pop = GridStack::zeros(1, 1, 2);
        pop[(0, 0, 1)] = 10.0;
        let env = [GridStack::zeros(1, 1, 0)];
        let params = two_stage_params();
        let fecundity = [0.0, 2.0];
        let kernel = Kernel::stay();
        let mut sim = Simulation::new(
            pop,
            &env,
            &params,
            &fecundity,
            &kernel,
            config(1, Sampling::Deterministic),
        );
        let report = sim.step().unwrap();
        assert!(sim.is_finished());
        assert!((report.offspring - 18.0).abs() < 1e-9);
        assert!((sim.population()[(0, 0, 0)] - 18.0).abs() < 1e-9);
        assert!((sim.population()[(0, 0, 1)] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn time_varying_environment_must_cover_all_steps() {
        let env = [GridStack::zeros(4, 4, 0), GridStack::zeros(4, 4, 0)];
        let result = simulate(
            &initial(),
            &env,
            &two_stage_params(),
            &[0.0, 2.0],
            &Kernel::stay(),
            &config(3, Sampling::Stochastic),
        );
        assert!(matches!(
            result,
            Err(SimError::EnvironmentTooShort {
                needed: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn time_varying_environment_is_indexed_by_step() {
        // Survival of stage 0 driven entirely by the environment: frame 0
        // kills everything, frame 1 keeps everything.
        let mut params = TransitionParams::intercepts(Grid::zeros(1, 1), 1);
        params.gamma[(0, 0, 0)] = 1.0;
        let env = [
            GridStack::from_vec(1, 1, 1, vec![0.0]),
            GridStack::from_vec(1, 1, 1, vec![1.0]),
        ];
        let pop = GridStack::from_vec(1, 1, 1, vec![10.0]);
        let fecundity = [0.0];
        let kernel = Kernel::stay();
        let cfg = SimConfig {
            steps: 2,
            record_stage: 0,
            sampling: Sampling::Deterministic,
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(
            pop.clone(),
            &env[1..],
            &params,
            &fecundity,
            &kernel,
            cfg.clone(),
        );
        sim.step().unwrap();
        // Single remaining frame is treated as time-invariant.
        assert_eq!(sim.population()[(0, 0, 0)], 10.0);

        let series = simulate(&pop, &env, &params, &fecundity, &kernel, &cfg).unwrap();
        assert_eq!(series.totals(), vec![10.0, 0.0, 0.0]);
    }

    #[test]
    fn record_stage_out_of_range_is_rejected() {
        let env = [GridStack::zeros(4, 4, 0)];
        let cfg = SimConfig {
            record_stage: 2,
            ..SimConfig::default()
        };
        let result = simulate(
            &initial(),
            &env,
            &two_stage_params(),
            &[0.0, 2.0],
            &Kernel::stay(),
            &cfg,
        );
        assert!(matches!(result, Err(SimError::StageOutOfRange { .. })));
    }

    #[test]
    fn absorbing_boundary_loses_edge_offspring() {
        let mut pop = GridStack::zeros(1, 1, 2);
        pop[(0, 0, 1)] = 10.0;
        let env = [GridStack::zeros(1, 1, 0)];
        let kernel = Kernel::new(Grid::filled(3, 3, 1.0 / 9.0)).unwrap();
        let cfg = SimConfig {
            steps: 1,
            record_stage: 0,
            boundary: Boundary::Absorbing,
            sampling: Sampling::Deterministic,
            ..SimConfig::default()
        };
        let params = two_stage_params();
        let series = simulate(&pop, &env, &params, &[0.0, 2.0], &kernel, &cfg).unwrap();
        // 18 offspring, only the center ninth stays on a 1x1 grid.
        assert!((series.frame(1).unwrap()[(0, 0)] - 2.0).abs() < 1e-9);
    }
}
