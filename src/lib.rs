//! Auto-evo - Background evolution of species across a patch map.
//!
//! An auto-evo run tries out mutations and migrations for every species,
//! scores each candidate with a population simulation, and records the best
//! outcome. Runs are made of small resumable steps executed one increment at a
//! time by a single background worker, so they can report progress and be
//! aborted at any point.
//!
//! # Architecture
//!
//! - `world`: species and patch map shared between the caller and runs
//! - `schema`: configuration, world descriptions and progress snapshots
//! - `compute`: the auto-evo scheduler, run steps and the population model
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use auto_evo::{AutoEvo, AutoEvoConfig, Collaborators, Run, WorldDescription};
//!
//! let config = AutoEvoConfig::default();
//! let world = WorldDescription::default().build().unwrap();
//! let map = Arc::new(world.map);
//!
//! let collaborators = Collaborators::with_defaults(&config);
//! let scheduler = AutoEvo::new(&config).unwrap();
//! let run = Arc::new(Run::standard(Arc::clone(&map), &collaborators, &config));
//! scheduler.enqueue(Arc::clone(&run)).unwrap();
//!
//! while run.in_progress() {
//!     println!("{}", scheduler.status_string());
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//!
//! if let Some(results) = run.take_results() {
//!     results.apply_results(&map, collaborators.applier.as_ref(), false);
//! }
//! ```

pub mod compute;
pub mod schema;
pub mod world;

// Re-export commonly used types
pub use compute::PopulationModel;
pub use compute::auto_evo::{AutoEvo, AutoEvoError, Collaborators, Run, RunResults, RunStep};
pub use schema::{AutoEvoConfig, RunProgress, RunState, WorldDescription};
pub use world::{Patch, PatchMap, Species};
