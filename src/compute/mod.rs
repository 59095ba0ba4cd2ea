//! Compute module - auto-evo scheduling and population modelling.

pub mod auto_evo;
mod population;

pub use population::*;
