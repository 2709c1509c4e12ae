// Data-driven run configuration.
//
// `SimConfig` holds the run controls (seed, step count, recorded stage and
// operator modes). `Scenario` bundles a config with every input array of one
// run and is the unit loaded from JSON by the CLI. The operators never read
// files or carry defaults of their own; everything tunable comes through here.
//
// `Scenario::validate()` checks shape agreement across all inputs before a
// run. The core operators assume consistent shapes and panic on violations,
// so loading goes through validation first.
//
// See also: `sim.rs` which consumes `SimConfig`, `dispersal.rs` for `Kernel`
// (validated on deserialization), `transition.rs` for `TransitionParams`.
//
// **Critical constraint: determinism.** A scenario file plus its seed fully
// determines the output time series.

use crate::dispersal::Kernel;
use crate::error::SimError;
use crate::grid::{Grid, GridStack};
use crate::sim::{TimeSeries, simulate};
use crate::transition::TransitionParams;
use crate::types::{Boundary, Sampling, TransitionMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run controls. Missing fields take their defaults when loaded from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Base seed; every per-step, per-operator seed is derived from it.
    pub seed: u64,
    /// Number of steps to run.
    pub steps: usize,
    /// Stage recorded into the time series.
    pub record_stage: usize,
    pub boundary: Boundary,
    pub sampling: Sampling,
    pub transition_mode: TransitionMode,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            steps: 100,
            record_stage: 0,
            boundary: Boundary::default(),
            sampling: Sampling::default(),
            transition_mode: TransitionMode::default(),
        }
    }
}

/// Everything one run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SimConfig,
    /// Initial population, one layer per stage.
    pub initial: GridStack,
    /// Environment frames, one layer per variable. A single frame is used for
    /// every step; otherwise frame `i` drives step `i`.
    pub environment: Vec<GridStack>,
    pub params: TransitionParams,
    /// Per-stage offspring per individual.
    pub fecundity: Vec<f64>,
    pub kernel: Kernel,
}

impl Scenario {
    /// Parse and validate a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        let scenario: Scenario = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse, and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn stages(&self) -> usize {
        self.initial.layers()
    }

    /// Check that every input agrees with the initial population's shape and
    /// stage count, and that the environment covers the configured steps.
    pub fn validate(&self) -> Result<(), SimError> {
        let (rows, cols, stages) = (
            self.initial.rows(),
            self.initial.cols(),
            self.initial.layers(),
        );
        if !self.initial.is_consistent() {
            return Err(mismatch(
                "initial population data",
                rows * cols * stages,
                self.initial.as_slice().len(),
            ));
        }

        let params = &self.params;
        let alpha_shape = (params.targets(), params.sources());
        if !params.alpha.is_consistent() || alpha_shape != (stages, stages) {
            return Err(mismatch(
                "alpha shape",
                format!("{stages}x{stages}"),
                format!("{}x{}", params.targets(), params.sources()),
            ));
        }
        let beta = &params.beta;
        let beta_shape = (beta.rows(), beta.cols(), beta.layers());
        if !beta.is_consistent() || beta_shape != (stages, stages, stages) {
            return Err(mismatch(
                "beta shape",
                format!("{stages}x{stages}x{stages}"),
                format!("{}x{}x{}", beta.rows(), beta.cols(), beta.layers()),
            ));
        }
        let gamma = &params.gamma;
        if !gamma.is_consistent() || (gamma.rows(), gamma.cols()) != (stages, stages) {
            return Err(mismatch(
                "gamma shape",
                format!("{stages}x{stages}xE"),
                format!("{}x{}x{}", gamma.rows(), gamma.cols(), gamma.layers()),
            ));
        }

        if self.environment.is_empty() {
            return Err(SimError::EnvironmentTooShort {
                needed: 1,
                available: 0,
            });
        }
        for frame in &self.environment {
            let shape = (frame.rows(), frame.cols(), frame.layers());
            if !frame.is_consistent() || shape != (rows, cols, gamma.layers()) {
                return Err(mismatch(
                    "environment frame shape",
                    format!("{rows}x{cols}x{}", gamma.layers()),
                    format!("{}x{}x{}", shape.0, shape.1, shape.2),
                ));
            }
        }
        let frames = self.environment.len();
        if frames > 1 && frames < self.config.steps {
            return Err(SimError::EnvironmentTooShort {
                needed: self.config.steps,
                available: frames,
            });
        }

        if self.fecundity.len() != stages {
            return Err(mismatch("fecundity length", stages, self.fecundity.len()));
        }
        if self.config.record_stage >= stages {
            return Err(SimError::StageOutOfRange {
                what: "record",
                stage: self.config.record_stage,
                stages,
            });
        }
        if let TransitionMode::Pairwise {
            fecundity_slot: Some(pair),
        } = self.config.transition_mode
        {
            let stage = pair.source.max(pair.target);
            if stage >= stages {
                return Err(SimError::StageOutOfRange {
                    what: "fecundity slot",
                    stage,
                    stages,
                });
            }
        }
        Ok(())
    }

    /// Validate and run.
    pub fn run(&self) -> Result<TimeSeries, SimError> {
        self.validate()?;
        simulate(
            &self.initial,
            &self.environment,
            &self.params,
            &self.fecundity,
            &self.kernel,
            &self.config,
        )
    }
}

fn mismatch(what: &'static str, expected: impl ToString, actual: impl ToString) -> SimError {
    SimError::ShapeMismatch {
        what,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

impl Default for Scenario {
    /// A small three-stage example: juveniles, subadults, adults on a 10x10
    /// grid with an east-west environmental gradient. Adults start in the
    /// western columns; subadult maturation improves toward the east.
    fn default() -> Self {
        let (rows, cols, stages) = (10, 10, 3);

        #[rustfmt::skip]
        let alpha = Grid::from_vec(stages, stages, vec![
            0.40, 0.00, 0.00,
            0.25, 0.55, 0.00,
            0.00, 0.15, 0.85,
        ]);
        let mut params = TransitionParams::intercepts(alpha, 1);
        // Juvenile survival drops with local adult density.
        params.beta[(0, 0, 2)] = -0.002;
        // Maturation into adults responds to the gradient.
        params.gamma[(2, 1, 0)] = 0.2;

        let mut initial = GridStack::zeros(rows, cols, stages);
        for row in 3..7 {
            for col in 0..2 {
                initial[(row, col, 2)] = 40.0;
            }
        }

        let mut gradient = GridStack::zeros(rows, cols, 1);
        for row in 0..rows {
            for col in 0..cols {
                gradient[(row, col, 0)] = col as f64 / (cols - 1) as f64;
            }
        }

        Self {
            config: SimConfig::default(),
            initial,
            environment: vec![gradient],
            params,
            fecundity: vec![0.0, 0.0, 2.5],
            kernel: Kernel::nearest(0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StagePair;

    #[test]
    fn default_config_values() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 1);
        assert_eq!(config.steps, 100);
        assert_eq!(config.record_stage, 0);
        assert_eq!(config.boundary, Boundary::Reflecting);
        assert_eq!(config.sampling, Sampling::Stochastic);
        assert_eq!(config.transition_mode, TransitionMode::GridConstrained);
    }

    #[test]
    fn config_loads_from_json_string() {
        let json = r#"{
            "seed": 7,
            "steps": 12,
            "record_stage": 2,
            "boundary": "Absorbing",
            "sampling": "ParallelStochastic",
            "transition_mode": {
                "Pairwise": { "fecundity_slot": { "source": 2, "target": 0 } }
            }
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.steps, 12);
        assert_eq!(config.boundary, Boundary::Absorbing);
        assert_eq!(config.sampling, Sampling::ParallelStochastic);
        assert_eq!(
            config.transition_mode,
            TransitionMode::Pairwise {
                fecundity_slot: Some(StagePair::conventional_fecundity())
            }
        );
    }

    #[test]
    fn partial_config_takes_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 9 }"#).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.steps, 100);
        assert_eq!(config.sampling, Sampling::Stochastic);
    }

    #[test]
    fn default_scenario_is_valid() {
        let scenario = Scenario::default();
        assert_eq!(scenario.stages(), 3);
        assert_eq!(scenario.kernel.radius(), 1);
        scenario.validate().unwrap();
    }

    #[test]
    fn default_scenario_serializes() {
        let scenario = Scenario::default();
        let json = serde_json::to_string_pretty(&scenario).unwrap();
        let restored = Scenario::from_json(&json).unwrap();
        assert_eq!(restored, scenario);
    }

    #[test]
    fn bad_kernel_in_json_is_rejected() {
        let mut value = serde_json::to_value(Scenario::default()).unwrap();
        value["kernel"] = serde_json::json!({
            "rows": 2,
            "cols": 2,
            "data": [0.25, 0.25, 0.25, 0.25]
        });
        let result = Scenario::from_json(&value.to_string());
        assert!(matches!(result, Err(SimError::Json(_))));
    }

    #[test]
    fn fecundity_length_must_match_stages() {
        let mut scenario = Scenario::default();
        scenario.fecundity.pop();
        assert!(matches!(
            scenario.validate(),
            Err(SimError::ShapeMismatch {
                what: "fecundity length",
                ..
            })
        ));
    }

    #[test]
    fn environment_shape_must_match_population() {
        let mut scenario = Scenario::default();
        scenario.environment = vec![GridStack::zeros(10, 9, 1)];
        assert!(matches!(
            scenario.validate(),
            Err(SimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn time_varying_environment_must_cover_steps() {
        let mut scenario = Scenario::default();
        scenario.config.steps = 5;
        let frame = scenario.environment[0].clone();
        scenario.environment = vec![frame; 3];
        assert!(matches!(
            scenario.validate(),
            Err(SimError::EnvironmentTooShort {
                needed: 5,
                available: 3
            })
        ));
    }

    #[test]
    fn fecundity_slot_must_name_existing_stages() {
        let mut scenario = Scenario::default();
        scenario.config.transition_mode = TransitionMode::Pairwise {
            fecundity_slot: Some(StagePair::new(3, 0)),
        };
        assert!(matches!(
            scenario.validate(),
            Err(SimError::StageOutOfRange { stage: 3, .. })
        ));
    }

    #[test]
    fn default_scenario_runs() {
        let mut scenario = Scenario::default();
        scenario.config.steps = 4;
        scenario.config.record_stage = 2;
        let series = scenario.run().unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series.frame(0).unwrap().sum(), 320.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = Scenario::load("/nonexistent/rangeshift/scenario.json");
        assert!(matches!(result, Err(SimError::Io(_))));
    }
}
