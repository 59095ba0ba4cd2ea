//! Schema module - Configuration, world descriptions and progress types.

mod config;
mod progress;
mod world;

pub use config::*;
pub use progress::*;
pub use world::*;
