// Benchmarks for the per-step pipeline (transition, reproduction, dispersal)
// on the example scenario scaled up to a larger grid.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rangeshift_sim::{Boundary, Grid, GridStack, Kernel, Sampling, Scenario, Simulation, disperse};
use std::hint::black_box;

fn scaled_scenario(side: usize) -> Scenario {
    let mut scenario = Scenario::default();
    let stages = scenario.stages();
    let mut initial = GridStack::zeros(side, side, stages);
    for row in 0..side {
        for col in 0..side {
            initial[(row, col, 2)] = ((row * 7 + col * 13) % 50) as f64;
        }
    }
    let mut env = GridStack::zeros(side, side, 1);
    for row in 0..side {
        for col in 0..side {
            env[(row, col, 0)] = col as f64 / side as f64;
        }
    }
    scenario.initial = initial;
    scenario.environment = vec![env];
    scenario
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    for sampling in [
        Sampling::Deterministic,
        Sampling::Stochastic,
        Sampling::ParallelStochastic,
    ] {
        let mut scenario = scaled_scenario(128);
        scenario.config.sampling = sampling;
        group.bench_function(format!("{sampling:?}_128x128"), |b| {
            b.iter_batched(
                || scenario.initial.clone(),
                |initial| {
                    let mut sim = Simulation::new(
                        initial,
                        &scenario.environment,
                        &scenario.params,
                        &scenario.fecundity,
                        &scenario.kernel,
                        scenario.config.clone(),
                    );
                    let _ = black_box(sim.step());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_dispersal(c: &mut Criterion) {
    let mut seeds = Grid::zeros(128, 128);
    for (i, s) in seeds.as_mut_slice().iter_mut().enumerate() {
        *s = (i % 37) as f64;
    }
    let kernel = Kernel::new(Grid::filled(5, 5, 1.0 / 25.0)).expect("5x5 kernel is valid");

    c.bench_function("disperse_stochastic_5x5", |b| {
        b.iter(|| {
            disperse(
                black_box(&seeds),
                &kernel,
                Boundary::Reflecting,
                Sampling::Stochastic,
                7,
            )
        })
    });
}

criterion_group!(benches, bench_step, bench_dispersal);
criterion_main!(benches);
