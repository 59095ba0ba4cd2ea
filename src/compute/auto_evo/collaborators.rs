//! Injected collaborators: scoring, mutation and migration functions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::PopulationModel;
use crate::schema::AutoEvoConfig;
use crate::world::{Patch, PatchId, PatchMap, Species};

use super::generators::{RandomMigrations, RandomMutations};
use super::{AutoEvoError, RunResults};

/// A proposed transfer of population between two patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub from: PatchId,
    pub to: PatchId,
    pub amount: i64,
}

/// Changes applied on top of the map for one scoring call.
#[derive(Debug, Clone, Default)]
pub struct Perturbation {
    /// Species removed from every patch.
    pub excluded_species: Vec<Species>,
    /// Species added, seeded from their ancestor's per-patch populations.
    pub extra_species: Vec<Species>,
    /// Migrations applied to the starting populations.
    pub migrations: Vec<(Species, Migration)>,
    /// Simulation steps to run.
    pub steps: u32,
}

impl Perturbation {
    /// No changes, just `steps` steps of simulation.
    pub fn none(steps: u32) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Replace `original` with `mutant` everywhere.
    pub fn replace(original: &Species, mutant: &Species, steps: u32) -> Self {
        Self {
            excluded_species: vec![original.clone()],
            extra_species: vec![mutant.clone()],
            steps,
            ..Default::default()
        }
    }

    /// Apply a single migration of `species`.
    pub fn migrate(species: &Species, migration: Migration, steps: u32) -> Self {
        Self {
            migrations: vec![(species.clone(), migration)],
            steps,
            ..Default::default()
        }
    }

    pub fn excludes(&self, species: &Species) -> bool {
        self.excluded_species.contains(species)
    }
}

/// Simulates how populations evolve.
///
/// Implementations must be deterministic for a given map state and perturbation.
pub trait PopulationSimulator: Send + Sync {
    /// Simulate every patch and record the resulting population of every species.
    fn simulate_map(
        &self,
        map: &PatchMap,
        perturbation: &Perturbation,
        results: &mut RunResults,
    ) -> Result<(), AutoEvoError>;

    /// Simulate a single patch, recording into a shared results buffer.
    fn simulate_patch(
        &self,
        patch: &Patch,
        results: &mut RunResults,
        perturbation: &Perturbation,
    ) -> Result<(), AutoEvoError>;
}

/// Proposes mutated clones of a species.
pub trait MutationGenerator: Send + Sync {
    /// A new mutant whose ancestor is `species`, or `None` if no mutation could be made.
    fn propose_mutation(&self, species: &Species) -> Option<Species>;
}

/// Applies a chosen mutation to the live species.
pub trait MutationApplier: Send + Sync {
    fn apply_mutation(&self, species: &Species, mutation: &Species);
}

/// Proposes migrations of a species between adjacent patches.
pub trait MigrationGenerator: Send + Sync {
    fn propose_migration(&self, map: &PatchMap, species: &Species) -> Option<Migration>;
}

/// The full set of collaborators a run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub simulator: Arc<dyn PopulationSimulator>,
    pub mutations: Arc<dyn MutationGenerator>,
    pub applier: Arc<dyn MutationApplier>,
    pub migrations: Arc<dyn MigrationGenerator>,
}

impl Collaborators {
    /// Built-in population model and random generators configured from `config`.
    pub fn with_defaults(config: &AutoEvoConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mutations = Arc::new(RandomMutations::new(config.mutation.clone(), seed));

        Self {
            simulator: Arc::new(PopulationModel::new(config.population.clone())),
            mutations: Arc::clone(&mutations) as Arc<dyn MutationGenerator>,
            applier: mutations,
            migrations: Arc::new(RandomMigrations::new(
                config.migration.clone(),
                seed.wrapping_add(1),
            )),
        }
    }
}
