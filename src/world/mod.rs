//! World model - Species, habitat patches and the patch map.
//!
//! These are the objects a finished auto-evo run applies its results to.
//! Runs read them through shared handles while in progress; populations and
//! traits use interior mutability so results can be applied without
//! exclusive ownership of the map.

mod patch;
mod species;

pub use patch::{Patch, PatchEnvironment, PatchId, PatchMap};
pub use species::{Species, SpeciesTraits};
