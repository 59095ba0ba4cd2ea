//! A migration search driven through the scheduler and applied to the map.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use auto_evo::compute::auto_evo::{
    AutoEvoError, FindBestMigration, Migration, MigrationGenerator, MutationApplier, Perturbation,
    PopulationSimulator, RunStep,
};
use auto_evo::schema::AutoEvoConfig;
use auto_evo::world::{Patch, PatchEnvironment, PatchMap, Species, SpeciesTraits};
use auto_evo::{AutoEvo, Run, RunResults};

/// Keeps populations as they are, except that individuals moved into patch 1
/// gain 20% of the species' total population there.
struct RewardsSpreading;

impl PopulationSimulator for RewardsSpreading {
    fn simulate_map(
        &self,
        map: &PatchMap,
        perturbation: &Perturbation,
        results: &mut RunResults,
    ) -> Result<(), AutoEvoError> {
        for patch in map.patches() {
            for (species, population) in patch.populations() {
                results.add_population_result_for_species(&species, patch.id(), population);
            }
        }
        for (species, migration) in &perturbation.migrations {
            let total = results.global_population(species)?;
            let from = results.population_in_patch(species, migration.from)?;
            let to = results.population_in_patch(species, migration.to)?;
            results.add_population_result_for_species(
                species,
                migration.from,
                from - migration.amount,
            );
            results.add_population_result_for_species(
                species,
                migration.to,
                to + migration.amount + total / 5,
            );
        }
        Ok(())
    }

    fn simulate_patch(
        &self,
        patch: &Patch,
        results: &mut RunResults,
        _perturbation: &Perturbation,
    ) -> Result<(), AutoEvoError> {
        for (species, population) in patch.populations() {
            results.add_population_result_for_species(&species, patch.id(), population);
        }
        Ok(())
    }
}

struct AlwaysSpread;

impl MigrationGenerator for AlwaysSpread {
    fn propose_migration(&self, _map: &PatchMap, _species: &Species) -> Option<Migration> {
        Some(Migration {
            from: 0,
            to: 1,
            amount: 30,
        })
    }
}

struct NoMutations;

impl MutationApplier for NoMutations {
    fn apply_mutation(&self, species: &Species, _mutation: &Species) {
        panic!("unexpected mutation of {species}");
    }
}

fn two_patch_world() -> (Arc<PatchMap>, Species) {
    let species = Species::new("Drifting kelp", SpeciesTraits::default(), 100);
    let mut map = PatchMap::new();
    map.add_patch(Patch::new(0, "Kelp Forest", PatchEnvironment::default()));
    map.add_patch(Patch::new(1, "Open Water", PatchEnvironment::default()));
    map.connect(0, 1);
    map.patch(0).unwrap().add_species(species.clone(), 100);
    map.patch(1).unwrap().add_species(species.clone(), 0);
    (Arc::new(map), species)
}

fn migration_search(map: &Arc<PatchMap>, species: &Species) -> FindBestMigration {
    FindBestMigration::new(
        Arc::clone(map),
        species.clone(),
        Arc::new(RewardsSpreading),
        Arc::new(AlwaysSpread),
        1,
    )
}

fn assert_migrated(results: &RunResults, map: &PatchMap, species: &Species) {
    let migrations = results.migrations_for(species);
    assert_eq!(migrations.len(), 1);
    assert_eq!(
        (migrations[0].from, migrations[0].to, migrations[0].amount),
        (0, 1, 30)
    );

    results.apply_results(map, &NoMutations, true);

    assert_eq!(map.patch(0).unwrap().species_population(species), Some(70));
    assert_eq!(map.patch(1).unwrap().species_population(species), Some(30));
    assert_eq!(species.population(), 100);
}

#[test]
fn test_best_migration_is_recorded_and_applied() {
    let (map, species) = two_patch_world();
    let mut step = migration_search(&map, &species);
    let mut results = RunResults::new();

    while !step.advance(&mut results).unwrap() {}
    assert_eq!(step.remaining_steps(), 0);

    assert_migrated(&results, &map, &species);
}

#[test]
fn test_migration_run_through_scheduler() {
    let (map, species) = two_patch_world();
    let config = AutoEvoConfig::default();
    let scheduler = AutoEvo::new(&config).unwrap();

    let steps: Vec<Box<dyn RunStep>> = vec![Box::new(migration_search(&map, &species))];
    let run = Arc::new(Run::new(Arc::clone(&map), steps).with_label("spreading"));
    scheduler.enqueue(Arc::clone(&run)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while run.in_progress() {
        assert!(Instant::now() < deadline, "run did not finish");
        thread::sleep(Duration::from_millis(5));
    }

    assert!(run.was_successful());
    let results = run.take_results().unwrap();
    assert_migrated(&results, &map, &species);
}
