//! Benchmarks for auto-evo runs and the population model.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use auto_evo::{
    AutoEvoConfig, Collaborators, PatchMap, PopulationModel, Run, RunResults, WorldDescription,
    compute::auto_evo::{Perturbation, PopulationSimulator},
    world::{Patch, PatchEnvironment, Species, SpeciesTraits},
};

/// A ring of patches, each holding every species.
fn ring_world(patches: u32, species: usize) -> PatchMap {
    let species: Vec<Species> = (0..species)
        .map(|i| {
            let traits = SpeciesTraits {
                preferred_temperature: 5.0 + 3.0 * i as f32,
                ..Default::default()
            };
            Species::new(format!("species {i}"), traits, 0)
        })
        .collect();

    let mut map = PatchMap::new();
    for id in 0..patches {
        let environment = PatchEnvironment {
            temperature: 30.0 * id as f32 / patches as f32,
            resources: 1.0,
        };
        let patch = Patch::new(id, format!("patch {id}"), environment);
        for s in &species {
            patch.add_species(s.clone(), 100);
        }
        map.add_patch(patch);
    }
    for id in 0..patches {
        map.connect(id, (id + 1) % patches);
    }
    map
}

fn bench_simulate_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_map");
    let model = PopulationModel::new(Default::default());

    for patches in [4, 16, 64] {
        let map = ring_world(patches, 8);
        let perturbation = Perturbation::none(10);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_patches", patches)),
            &patches,
            |b, _| {
                b.iter(|| {
                    let mut results = RunResults::new();
                    model
                        .simulate_map(black_box(&map), &perturbation, &mut results)
                        .unwrap();
                    results
                });
            },
        );
    }

    group.finish();
}

fn bench_standard_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("standard_run");
    let config = AutoEvoConfig {
        random_seed: Some(1),
        ..Default::default()
    };
    let collaborators = Collaborators::with_defaults(&config);

    let example = Arc::new(WorldDescription::default().build().unwrap().map);
    let ring = Arc::new(ring_world(16, 6));

    for (name, map) in [("example", example), ("ring_16x6", ring)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let run = Run::standard(Arc::clone(&map), &collaborators, &config);
                while !run.step().unwrap() {}
                run.take_results()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simulate_map, bench_standard_run);
criterion_main!(benches);
