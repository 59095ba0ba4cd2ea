//! Built-in population model used to score auto-evo candidates.
//!
//! Each patch is simulated independently with a competitive logistic model:
//! the patch carries `resources × capacity_per_resource` individuals, split
//! between species in proportion to their fitness-weighted populations.
//! Fitness falls off as a Gaussian of the distance between the patch
//! temperature and the species' preferred temperature.

use rayon::prelude::*;

use crate::compute::auto_evo::{
    AutoEvoError, Migration, Perturbation, PopulationSimulator, RunResults,
};
use crate::schema::PopulationModelConfig;
use crate::world::{Patch, PatchEnvironment, PatchId, PatchMap, Species, SpeciesTraits};

/// Deterministic competitive logistic population model.
#[derive(Debug, Clone)]
pub struct PopulationModel {
    config: PopulationModelConfig,
}

impl PopulationModel {
    pub fn new(config: PopulationModelConfig) -> Self {
        Self { config }
    }

    /// How well a species does in an environment, in `[0, efficiency]`.
    pub fn fitness(traits: SpeciesTraits, environment: PatchEnvironment) -> f64 {
        let tolerance = f64::from(traits.temperature_tolerance).max(f64::EPSILON);
        let offset = f64::from(environment.temperature) - f64::from(traits.preferred_temperature);
        let distance = offset / tolerance;
        f64::from(traits.efficiency).max(0.0) * (-distance * distance).exp()
    }

    /// Carrying capacity of a patch.
    pub fn capacity(&self, environment: PatchEnvironment) -> f64 {
        f64::from(environment.resources).max(0.0) * f64::from(self.config.capacity_per_resource)
    }

    /// Simulate one patch and return the final population of every species in it.
    fn run_patch(
        &self,
        patch: &Patch,
        perturbation: &Perturbation,
        migrations: &[(Species, Migration)],
    ) -> Vec<(Species, i64)> {
        let environment = patch.environment();
        let mut populations = starting_populations(patch, perturbation, migrations);
        let fitness: Vec<f64> = populations
            .iter()
            .map(|(species, _)| Self::fitness(species.traits(), environment))
            .collect();
        let capacity = self.capacity(environment);
        let rate = f64::from(self.config.growth_rate);

        for _ in 0..perturbation.steps {
            let weighted: f64 = populations
                .iter()
                .zip(&fitness)
                .map(|((_, n), f)| n * f)
                .sum();

            for ((_, n), f) in populations.iter_mut().zip(&fitness) {
                let share = if weighted > 0.0 { *n * f / weighted } else { 0.0 };
                let target = capacity * f * share;
                *n = (*n + rate * (target - *n)).max(0.0);
            }
        }

        populations
            .into_iter()
            .map(|(species, n)| (species, n.round() as i64))
            .collect()
    }
}

/// Populations at the start of a simulation, with `perturbation` applied.
fn starting_populations(
    patch: &Patch,
    perturbation: &Perturbation,
    migrations: &[(Species, Migration)],
) -> Vec<(Species, f64)> {
    let original = patch.populations();
    let mut populations: Vec<(Species, f64)> = original
        .iter()
        .filter(|(species, _)| !perturbation.excludes(species))
        .map(|(species, n)| (species.clone(), (*n).max(0) as f64))
        .collect();

    for extra in &perturbation.extra_species {
        if populations.iter().any(|(species, _)| species == extra) {
            continue;
        }
        let seeded = extra
            .ancestor()
            .and_then(|ancestor| original.iter().find(|(species, _)| species == ancestor));
        if let Some((_, n)) = seeded {
            populations.push((extra.clone(), (*n).max(0) as f64));
        }
    }

    for (species, migration) in migrations {
        let amount = migration.amount.max(0) as f64;
        let entry = populations.iter_mut().find(|(s, _)| s == species);
        if migration.from == patch.id() {
            if let Some((_, n)) = entry {
                *n = (*n - amount).max(0.0);
            }
        } else if migration.to == patch.id() {
            match entry {
                Some((_, n)) => *n += amount,
                None => populations.push((species.clone(), amount)),
            }
        }
    }

    populations
}

/// Check migration endpoints and limit each amount to what the source patch holds.
fn resolve_migrations(
    map: &PatchMap,
    perturbation: &Perturbation,
) -> Result<Vec<(Species, Migration)>, AutoEvoError> {
    perturbation
        .migrations
        .iter()
        .map(|(species, migration)| {
            let source = map.patch(migration.from).ok_or_else(|| {
                AutoEvoError::Simulation(format!("migration from unknown patch {}", migration.from))
            })?;
            if map.patch(migration.to).is_none() {
                return Err(AutoEvoError::Simulation(format!(
                    "migration to unknown patch {}",
                    migration.to
                )));
            }
            let available = source.species_population(species).unwrap_or(0).max(0);
            Ok((
                species.clone(),
                Migration {
                    amount: migration.amount.clamp(0, available),
                    ..*migration
                },
            ))
        })
        .collect()
}

impl PopulationSimulator for PopulationModel {
    fn simulate_map(
        &self,
        map: &PatchMap,
        perturbation: &Perturbation,
        results: &mut RunResults,
    ) -> Result<(), AutoEvoError> {
        let migrations = resolve_migrations(map, perturbation)?;
        let patches: Vec<&Patch> = map.patches().collect();

        let outcomes: Vec<(PatchId, Vec<(Species, i64)>)> = patches
            .par_iter()
            .map(|patch| (patch.id(), self.run_patch(patch, perturbation, &migrations)))
            .collect();

        for (patch, populations) in outcomes {
            for (species, population) in populations {
                results.add_population_result_for_species(&species, patch, population);
            }
        }
        Ok(())
    }

    fn simulate_patch(
        &self,
        patch: &Patch,
        results: &mut RunResults,
        perturbation: &Perturbation,
    ) -> Result<(), AutoEvoError> {
        let populations = self.run_patch(patch, perturbation, &perturbation.migrations);
        for (species, population) in populations {
            results.add_population_result_for_species(&species, patch.id(), population);
        }
        Ok(())
    }
}
