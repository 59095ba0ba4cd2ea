//! Serializable world descriptions used to build a [`PatchMap`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::world::{Patch, PatchEnvironment, PatchId, PatchMap, Species, SpeciesTraits};

/// Description of the species and patches of a world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldDescription {
    /// Species definitions, referenced by name from patches.
    pub species: Vec<SpeciesDescription>,
    /// Patch definitions.
    pub patches: Vec<PatchDescription>,
    /// Patch the player (or observer) is in.
    #[serde(default)]
    pub current_patch: Option<PatchId>,
}

/// A species definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesDescription {
    pub name: String,
    #[serde(default)]
    pub traits: SpeciesTraits,
}

/// A patch definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDescription {
    pub id: PatchId,
    pub name: String,
    #[serde(default)]
    pub environment: PatchEnvironment,
    /// Adjacent patch ids. Links are made bidirectional.
    #[serde(default)]
    pub adjacent: Vec<PatchId>,
    /// Initial populations keyed by species name.
    #[serde(default)]
    pub populations: HashMap<String, i64>,
}

/// A built world: the patch map plus its species handles in description order.
#[derive(Debug)]
pub struct World {
    pub map: PatchMap,
    pub species: Vec<Species>,
}

impl WorldDescription {
    /// Build the patch map and species handles.
    ///
    /// Global species populations are initialised from the patch populations.
    pub fn build(&self) -> Result<World, WorldError> {
        let mut by_name: HashMap<&str, Species> = HashMap::new();
        let mut species = Vec::with_capacity(self.species.len());
        for desc in &self.species {
            if by_name.contains_key(desc.name.as_str()) {
                return Err(WorldError::DuplicateSpecies(desc.name.clone()));
            }
            let handle = Species::new(desc.name.clone(), desc.traits, 0);
            by_name.insert(&desc.name, handle.clone());
            species.push(handle);
        }

        let mut map = PatchMap::new();
        for desc in &self.patches {
            if map.patch(desc.id).is_some() {
                return Err(WorldError::DuplicatePatch(desc.id));
            }
            let patch = Patch::new(desc.id, desc.name.clone(), desc.environment);

            let mut populations: Vec<_> = desc.populations.iter().collect();
            populations.sort();
            for (name, population) in populations {
                let handle = by_name
                    .get(name.as_str())
                    .ok_or_else(|| WorldError::UnknownSpecies {
                        patch: desc.id,
                        species: name.clone(),
                    })?;
                patch.add_species(handle.clone(), *population);
            }
            map.add_patch(patch);
        }

        for desc in &self.patches {
            for &other in &desc.adjacent {
                if !map.connect(desc.id, other) {
                    return Err(WorldError::InvalidLink {
                        from: desc.id,
                        to: other,
                    });
                }
            }
        }

        if let Some(current) = self.current_patch
            && !map.set_current_patch(current)
        {
            return Err(WorldError::UnknownPatch(current));
        }

        for handle in &species {
            handle.set_population(map.total_population(handle));
        }

        Ok(World { map, species })
    }
}

impl Default for WorldDescription {
    fn default() -> Self {
        let species = vec![
            SpeciesDescription {
                name: "Primum thermofilum".into(),
                traits: SpeciesTraits {
                    preferred_temperature: 45.0,
                    temperature_tolerance: 15.0,
                    efficiency: 0.6,
                },
            },
            SpeciesDescription {
                name: "Frigus lentum".into(),
                traits: SpeciesTraits {
                    preferred_temperature: 8.0,
                    temperature_tolerance: 6.0,
                    efficiency: 0.4,
                },
            },
        ];

        let patches = vec![
            PatchDescription {
                id: 0,
                name: "Hydrothermal Vent".into(),
                environment: PatchEnvironment {
                    temperature: 50.0,
                    resources: 1.5,
                },
                adjacent: vec![1],
                populations: HashMap::from([
                    ("Primum thermofilum".into(), 400),
                    ("Frigus lentum".into(), 50),
                ]),
            },
            PatchDescription {
                id: 1,
                name: "Sea Floor".into(),
                environment: PatchEnvironment {
                    temperature: 12.0,
                    resources: 1.0,
                },
                adjacent: vec![0, 2],
                populations: HashMap::from([("Frigus lentum".into(), 300)]),
            },
            PatchDescription {
                id: 2,
                name: "Cave".into(),
                environment: PatchEnvironment {
                    temperature: 16.0,
                    resources: 0.6,
                },
                adjacent: vec![1],
                populations: HashMap::new(),
            },
        ];

        Self {
            species,
            patches,
            current_patch: Some(0),
        }
    }
}

/// World description errors.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("Species '{0}' is defined more than once")]
    DuplicateSpecies(String),
    #[error("Patch {0} is defined more than once")]
    DuplicatePatch(PatchId),
    #[error("Patch {patch} references unknown species '{species}'")]
    UnknownSpecies { patch: PatchId, species: String },
    #[error("Cannot link patch {from} to patch {to}")]
    InvalidLink { from: PatchId, to: PatchId },
    #[error("Unknown patch {0}")]
    UnknownPatch(PatchId),
}
