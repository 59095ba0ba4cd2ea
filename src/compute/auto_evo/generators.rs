//! Built-in random mutation and migration generators.

use std::sync::{Mutex, PoisonError};

use rand::prelude::*;

use crate::schema::{MigrationConfig, MutationConfig};
use crate::world::{PatchMap, Species, SpeciesTraits};

use super::{Migration, MigrationGenerator, MutationApplier, MutationGenerator};

const TEMPERATURE_BOUNDS: (f32, f32) = (-50.0, 150.0);
const TOLERANCE_BOUNDS: (f32, f32) = (0.5, 50.0);
const EFFICIENCY_BOUNDS: (f32, f32) = (0.05, 1.0);

/// Gaussian trait mutations.
///
/// Also acts as the [`MutationApplier`], copying the mutant's traits onto
/// the live species.
pub struct RandomMutations {
    config: MutationConfig,
    rng: Mutex<StdRng>,
}

impl RandomMutations {
    pub fn new(config: MutationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn mutate_traits(&self, traits: SpeciesTraits) -> SpeciesTraits {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let strength = self.config.strength;
        let mut nudge = |value: f32, bounds: (f32, f32)| {
            let noise: f32 = rng.sample(rand_distr::StandardNormal);
            (value + noise * strength * (bounds.1 - bounds.0)).clamp(bounds.0, bounds.1)
        };

        SpeciesTraits {
            preferred_temperature: nudge(traits.preferred_temperature, TEMPERATURE_BOUNDS),
            temperature_tolerance: nudge(traits.temperature_tolerance, TOLERANCE_BOUNDS),
            efficiency: nudge(traits.efficiency, EFFICIENCY_BOUNDS),
        }
    }
}

impl MutationGenerator for RandomMutations {
    fn propose_mutation(&self, species: &Species) -> Option<Species> {
        let traits = self.mutate_traits(species.traits());
        if traits == species.traits() {
            return None;
        }
        Some(species.mutant(traits))
    }
}

impl MutationApplier for RandomMutations {
    fn apply_mutation(&self, species: &Species, mutation: &Species) {
        log::debug!("Applying mutation {mutation} to {species}");
        species.set_traits(mutation.traits());
    }
}

/// Random moves of part of a population into a neighbouring patch.
pub struct RandomMigrations {
    config: MigrationConfig,
    rng: Mutex<StdRng>,
}

impl RandomMigrations {
    pub fn new(config: MigrationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl MigrationGenerator for RandomMigrations {
    fn propose_migration(&self, map: &PatchMap, species: &Species) -> Option<Migration> {
        let sources: Vec<_> = map
            .patches()
            .filter(|patch| patch.adjacent().next().is_some())
            .filter_map(|patch| {
                let population = patch.species_population(species)?;
                let threshold = self.config.min_population.max(1);
                (population >= threshold).then_some((patch, population))
            })
            .collect();

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let (source, population) = sources.choose(&mut *rng)?;
        let targets: Vec<_> = source.adjacent().collect();
        let to = *targets.choose(&mut *rng)?;

        let fraction = if self.config.max_fraction > self.config.min_fraction {
            rng.gen_range(self.config.min_fraction..=self.config.max_fraction)
        } else {
            self.config.min_fraction
        };
        let amount = ((*population as f64 * fraction as f64) as i64).clamp(1, *population);

        Some(Migration {
            from: source.id(),
            to,
            amount,
        })
    }
}
