//! Background population evolution ("auto-evo").
//!
//! Evolves species populations across a [`PatchMap`](crate::world::PatchMap)
//! on a dedicated worker thread without blocking the caller.
//!
//! # Overview
//!
//! - **Results** (`results`): per-species staged outcome of a run. Nothing in
//!   the world changes until [`RunResults::apply_results`] is called.
//! - **Steps** (`steps`): resumable units of work, each increment short enough
//!   that cancellation between increments stays responsive.
//! - **Run** (`run`): ordered steps plus a GatheringInfo → Stepping → Ended
//!   state machine, progress counters and an abort flag.
//! - **Scheduler** (`scheduler`): [`AutoEvo`] owns the worker thread and a FIFO
//!   queue of runs.
//! - **Collaborators** (`collaborators`): the scoring, mutation and migration
//!   functions steps call into, injected as trait objects.

mod collaborators;
mod generators;
mod results;
mod run;
mod scheduler;
mod steps;

pub use collaborators::{
    Collaborators, Migration, MigrationGenerator, MutationApplier, MutationGenerator,
    Perturbation, PopulationSimulator,
};
pub use generators::{RandomMigrations, RandomMutations};
pub use results::{MigrationEvent, RunResults, SpeciesResult};
pub use run::Run;
pub use scheduler::{AutoEvo, IDLE_STATUS};
pub use steps::{CalculatePopulation, FindBestMigration, FindBestMutation, Lambda, RunStep};

use crate::world::PatchId;

/// Error type for auto-evo operations.
#[derive(Debug, thiserror::Error)]
pub enum AutoEvoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No results recorded for species {0}")]
    SpeciesNotFound(String),

    #[error("No population recorded for species {species} in patch {patch}")]
    PopulationNotFound { species: String, patch: PatchId },

    #[error("Population simulation failed: {0}")]
    Simulation(String),

    #[error("Step failed: {0}")]
    StepFailed(String),

    #[error("Auto-evo worker failure: {0}")]
    Worker(String),
}
