//! Habitat patches and the map that owns them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::Species;

/// Patch identifier, unique within a [`PatchMap`].
pub type PatchId = u32;

/// Environmental conditions of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatchEnvironment {
    /// Average temperature.
    pub temperature: f32,
    /// Available resources, scaled into a carrying capacity by the population model.
    pub resources: f32,
}

impl Default for PatchEnvironment {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            resources: 1.0,
        }
    }
}

/// A single habitat patch holding per-species populations.
#[derive(Debug)]
pub struct Patch {
    id: PatchId,
    name: String,
    environment: PatchEnvironment,
    adjacent: BTreeSet<PatchId>,
    populations: RwLock<Vec<(Species, i64)>>,
}

impl Patch {
    pub fn new(id: PatchId, name: impl Into<String>, environment: PatchEnvironment) -> Self {
        Self {
            id,
            name: name.into(),
            environment,
            adjacent: BTreeSet::new(),
            populations: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PatchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> PatchEnvironment {
        self.environment
    }

    /// Ids of the patches reachable from this one.
    pub fn adjacent(&self) -> impl Iterator<Item = PatchId> + '_ {
        self.adjacent.iter().copied()
    }

    pub fn is_adjacent(&self, other: PatchId) -> bool {
        self.adjacent.contains(&other)
    }

    /// Population of `species` here, or `None` if the species has no entry.
    pub fn species_population(&self, species: &Species) -> Option<i64> {
        self.populations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(s, _)| s == species)
            .map(|(_, population)| *population)
    }

    /// Overwrite the population of a species already present.
    ///
    /// Returns false if the species has no entry in this patch.
    pub fn update_species_population(&self, species: &Species, population: i64) -> bool {
        let mut populations = self
            .populations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match populations.iter_mut().find(|(s, _)| s == species) {
            Some(entry) => {
                entry.1 = population;
                true
            }
            None => false,
        }
    }

    /// Add a new species entry. Returns false if the species is already present.
    pub fn add_species(&self, species: Species, population: i64) -> bool {
        let mut populations = self
            .populations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if populations.iter().any(|(s, _)| *s == species) {
            return false;
        }
        populations.push((species, population));
        true
    }

    /// Snapshot of every species entry in insertion order.
    pub fn populations(&self) -> Vec<(Species, i64)> {
        self.populations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// All patches of the world.
#[derive(Debug, Default)]
pub struct PatchMap {
    patches: BTreeMap<PatchId, Patch>,
    current: Option<PatchId>,
}

impl PatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a patch, replacing any patch with the same id.
    ///
    /// The first patch added becomes the current patch.
    pub fn add_patch(&mut self, patch: Patch) {
        if self.current.is_none() {
            self.current = Some(patch.id);
        }
        self.patches.insert(patch.id, patch);
    }

    /// Link two patches in both directions. Returns false if either is missing.
    pub fn connect(&mut self, a: PatchId, b: PatchId) -> bool {
        if a == b || !self.patches.contains_key(&a) || !self.patches.contains_key(&b) {
            return false;
        }
        if let Some(patch) = self.patches.get_mut(&a) {
            patch.adjacent.insert(b);
        }
        if let Some(patch) = self.patches.get_mut(&b) {
            patch.adjacent.insert(a);
        }
        true
    }

    pub fn patch(&self, id: PatchId) -> Option<&Patch> {
        self.patches.get(&id)
    }

    pub fn current_patch(&self) -> Option<&Patch> {
        self.current.and_then(|id| self.patches.get(&id))
    }

    pub fn set_current_patch(&mut self, id: PatchId) -> bool {
        if self.patches.contains_key(&id) {
            self.current = Some(id);
            true
        } else {
            false
        }
    }

    /// Patches ordered by id.
    pub fn patches(&self) -> impl Iterator<Item = &Patch> {
        self.patches.values()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Distinct species present in any patch, ordered by species id.
    pub fn species(&self) -> Vec<Species> {
        let mut species: Vec<Species> = Vec::new();
        for patch in self.patches.values() {
            for (s, _) in patch.populations() {
                if !species.contains(&s) {
                    species.push(s);
                }
            }
        }
        species.sort_by_key(Species::id);
        species
    }

    /// Sum of the non-negative populations of `species` over all patches.
    pub fn total_population(&self, species: &Species) -> i64 {
        self.patches
            .values()
            .filter_map(|p| p.species_population(species))
            .map(|population| population.max(0))
            .sum()
    }
}
