//! Staged results of a run.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use crate::world::{PatchId, PatchMap, Species};

use super::{AutoEvoError, MutationApplier};

/// A committed migration of part of a species' population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationEvent {
    pub from: PatchId,
    pub to: PatchId,
    pub amount: i64,
}

/// Everything a run decided for one species.
#[derive(Debug, Clone)]
pub struct SpeciesResult {
    /// The species this result belongs to.
    pub species: Species,
    /// New population per patch. Later writes for a patch replace earlier ones.
    pub new_population_in_patches: BTreeMap<PatchId, i64>,
    /// Chosen mutation, `None` when the species stays as it is.
    pub mutated_properties: Option<Species>,
    /// Migrations in the order they were committed.
    pub spread_to_patches: Vec<MigrationEvent>,
}

impl SpeciesResult {
    fn new(species: Species) -> Self {
        Self {
            species,
            new_population_in_patches: BTreeMap::new(),
            mutated_properties: None,
            spread_to_patches: Vec::new(),
        }
    }
}

/// Results buffer filled by a run's steps.
///
/// Holds exactly one [`SpeciesResult`] per species, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    results: HashMap<Species, SpeciesResult>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, species: &Species) -> &mut SpeciesResult {
        self.results
            .entry(species.clone())
            .or_insert_with(|| SpeciesResult::new(species.clone()))
    }

    /// Record the chosen mutation for `species`, replacing any earlier choice.
    pub fn add_mutation_result_for_species(&mut self, species: &Species, mutated: Option<Species>) {
        self.entry(species).mutated_properties = mutated;
    }

    /// Record the population of `species` in a patch, replacing any earlier value.
    pub fn add_population_result_for_species(
        &mut self,
        species: &Species,
        patch: PatchId,
        population: i64,
    ) {
        self.entry(species)
            .new_population_in_patches
            .insert(patch, population);
    }

    /// Append a migration of `amount` individuals of `species` from one patch to another.
    pub fn add_migration_result_for_species(
        &mut self,
        species: &Species,
        from: PatchId,
        to: PatchId,
        amount: i64,
    ) {
        self.entry(species)
            .spread_to_patches
            .push(MigrationEvent { from, to, amount });
    }

    /// Sum of the non-negative recorded populations of `species`.
    pub fn global_population(&self, species: &Species) -> Result<i64, AutoEvoError> {
        let result = self
            .results
            .get(species)
            .ok_or_else(|| AutoEvoError::SpeciesNotFound(species.to_string()))?;
        Ok(result
            .new_population_in_patches
            .values()
            .map(|population| (*population).max(0))
            .sum())
    }

    /// Recorded population of `species` in `patch`.
    pub fn population_in_patch(
        &self,
        species: &Species,
        patch: PatchId,
    ) -> Result<i64, AutoEvoError> {
        self.results
            .get(species)
            .and_then(|r| r.new_population_in_patches.get(&patch))
            .copied()
            .ok_or_else(|| AutoEvoError::PopulationNotFound {
                species: species.to_string(),
                patch,
            })
    }

    pub fn get(&self, species: &Species) -> Option<&SpeciesResult> {
        self.results.get(species)
    }

    pub fn mutation_for(&self, species: &Species) -> Option<&Species> {
        self.results
            .get(species)
            .and_then(|r| r.mutated_properties.as_ref())
    }

    pub fn migrations_for(&self, species: &Species) -> &[MigrationEvent] {
        self.results
            .get(species)
            .map(|r| r.spread_to_patches.as_slice())
            .unwrap_or_default()
    }

    /// Species with recorded results, ordered by species id.
    pub fn species(&self) -> Vec<Species> {
        let mut species: Vec<Species> = self.results.keys().cloned().collect();
        species.sort_by_key(Species::id);
        species
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Apply everything recorded to the live world.
    ///
    /// This is the only place a run's outcome touches the world. It must not be
    /// called while a run reading `map` is in progress. Inconsistencies such as
    /// unknown patch ids are logged and the affected entry is skipped.
    ///
    /// A migration moves at most the population the source patch holds, so the
    /// source never goes negative.
    pub fn apply_results(
        &self,
        map: &PatchMap,
        applier: &dyn MutationApplier,
        skip_mutations: bool,
    ) {
        for species in self.species() {
            let Some(result) = self.results.get(&species) else {
                continue;
            };

            if !skip_mutations && let Some(mutation) = &result.mutated_properties {
                log::info!("Applying mutation to {species}");
                applier.apply_mutation(&species, mutation);
            }

            for (&patch_id, &population) in &result.new_population_in_patches {
                let Some(patch) = map.patch(patch_id) else {
                    log::error!("Cannot apply population of {species}: patch {patch_id} not found");
                    continue;
                };
                if !patch.update_species_population(&species, population) {
                    log::warn!(
                        "{species} has no entry in patch {patch_id}, population {population} not applied"
                    );
                }
            }

            for event in &result.spread_to_patches {
                apply_migration(map, &species, event);
            }

            species.set_population(map.total_population(&species));
        }
    }

    /// Human-readable summary of the results.
    pub fn make_summary(&self, map: Option<&PatchMap>) -> String {
        let patch_name = |id: PatchId| {
            map.and_then(|m| m.patch(id))
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| format!("patch {id}"))
        };

        let mut out = String::new();
        for species in self.species() {
            let Some(result) = self.results.get(&species) else {
                continue;
            };
            let _ = writeln!(out, "{species}:");

            match &result.mutated_properties {
                Some(mutant) => {
                    let traits = mutant.traits();
                    let _ = writeln!(
                        out,
                        "  mutated: preferred temperature {:.1}, tolerance {:.1}, efficiency {:.2}",
                        traits.preferred_temperature,
                        traits.temperature_tolerance,
                        traits.efficiency
                    );
                }
                None => {
                    let _ = writeln!(out, "  not mutated");
                }
            }

            for (&patch, &population) in &result.new_population_in_patches {
                let _ = writeln!(out, "  population in {}: {population}", patch_name(patch));
            }

            for event in &result.spread_to_patches {
                let _ = writeln!(
                    out,
                    "  migrates {} from {} to {}",
                    event.amount,
                    patch_name(event.from),
                    patch_name(event.to)
                );
            }
        }
        out
    }
}

fn apply_migration(map: &PatchMap, species: &Species, event: &MigrationEvent) {
    let (Some(source), Some(destination)) = (map.patch(event.from), map.patch(event.to)) else {
        log::error!(
            "Cannot apply migration of {species} from {} to {}: patch not found",
            event.from,
            event.to
        );
        return;
    };

    let Some(source_population) = source.species_population(species) else {
        log::error!(
            "Cannot apply migration of {species}: no population in source patch {}",
            event.from
        );
        return;
    };

    let moved = event.amount.clamp(0, source_population.max(0));
    if moved < event.amount {
        log::warn!(
            "Migration of {species} from {} limited to {moved} of {}",
            event.from,
            event.amount
        );
    }
    source.update_species_population(species, source_population - moved);

    match destination.species_population(species) {
        Some(current) => {
            destination.update_species_population(species, current + moved);
        }
        None => {
            destination.add_species(species.clone(), moved);
        }
    }
}
