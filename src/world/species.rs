//! Shared species handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

static NEXT_SPECIES_ID: AtomicU64 = AtomicU64::new(1);

/// Heritable properties of a species that mutations act on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesTraits {
    /// Temperature at which the species thrives.
    pub preferred_temperature: f32,
    /// How far from the preferred temperature the species still copes.
    pub temperature_tolerance: f32,
    /// Resource usage efficiency (0.0-1.0).
    pub efficiency: f32,
}

impl Default for SpeciesTraits {
    fn default() -> Self {
        Self {
            preferred_temperature: 20.0,
            temperature_tolerance: 10.0,
            efficiency: 0.5,
        }
    }
}

struct SpeciesData {
    id: u64,
    name: String,
    traits: RwLock<SpeciesTraits>,
    population: AtomicI64,
    ancestor: Option<Species>,
}

/// Handle to a species.
///
/// Cloning is cheap and every clone refers to the same species. Equality and
/// hashing use the identity of the underlying allocation, so two species with
/// the same name and traits are still different keys.
#[derive(Clone)]
pub struct Species(Arc<SpeciesData>);

impl Species {
    /// Create a new species with the given traits and global population.
    pub fn new(name: impl Into<String>, traits: SpeciesTraits, population: i64) -> Self {
        Self(Arc::new(SpeciesData {
            id: NEXT_SPECIES_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            traits: RwLock::new(traits),
            population: AtomicI64::new(population),
            ancestor: None,
        }))
    }

    /// Create a mutated clone of this species with different traits.
    ///
    /// The clone is a distinct species whose ancestor is `self`.
    pub fn mutant(&self, traits: SpeciesTraits) -> Self {
        Self(Arc::new(SpeciesData {
            id: NEXT_SPECIES_ID.fetch_add(1, Ordering::Relaxed),
            name: self.0.name.clone(),
            traits: RwLock::new(traits),
            population: AtomicI64::new(self.population()),
            ancestor: Some(self.clone()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Current heritable traits.
    pub fn traits(&self) -> SpeciesTraits {
        *self.0.traits.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the heritable traits of the live species.
    pub fn set_traits(&self, traits: SpeciesTraits) {
        *self.0.traits.write().unwrap_or_else(PoisonError::into_inner) = traits;
    }

    /// Global population across all patches.
    pub fn population(&self) -> i64 {
        self.0.population.load(Ordering::Acquire)
    }

    pub fn set_population(&self, population: i64) {
        self.0.population.store(population, Ordering::Release);
    }

    /// The species this one was cloned from, if it is a mutant.
    pub fn ancestor(&self) -> Option<&Species> {
        self.0.ancestor.as_ref()
    }

    /// Check whether two handles refer to the same species.
    #[inline]
    pub fn same_as(&self, other: &Species) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Species {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Species {}

impl Hash for Species {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Species")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("population", &self.population())
            .finish()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.0.name, self.0.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_equality() {
        let a = Species::new("Primum", SpeciesTraits::default(), 10);
        let b = Species::new("Primum", SpeciesTraits::default(), 10);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let set: HashSet<Species> = [a.clone(), a.clone(), b.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_mutant_keeps_ancestor() {
        let original = Species::new("Primum", SpeciesTraits::default(), 40);
        let traits = SpeciesTraits {
            efficiency: 0.9,
            ..SpeciesTraits::default()
        };
        let mutant = original.mutant(traits);

        assert_ne!(mutant, original);
        assert_eq!(mutant.ancestor(), Some(&original));
        assert_eq!(mutant.population(), 40);
        assert_eq!(mutant.traits().efficiency, 0.9);
        assert_eq!(original.traits().efficiency, 0.5);
    }

    #[test]
    fn test_set_traits_visible_through_clones() {
        let species = Species::new("Primum", SpeciesTraits::default(), 0);
        let handle = species.clone();
        species.set_traits(SpeciesTraits {
            preferred_temperature: 5.0,
            ..SpeciesTraits::default()
        });
        assert_eq!(handle.traits().preferred_temperature, 5.0);
    }
}
