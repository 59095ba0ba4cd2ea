//! Configuration types for auto-evo runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level auto-evo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoEvoConfig {
    /// Candidate mutations tried per species and run.
    #[serde(default = "default_mutations_per_species")]
    pub mutations_per_species: usize,
    /// Score the unmutated species as a baseline candidates must beat.
    #[serde(default = "default_allow_no_mutation")]
    pub allow_no_mutation: bool,
    /// Candidate migrations tried per species and run.
    #[serde(default = "default_migrations_per_species")]
    pub migrations_per_species: usize,
    /// Simulation steps per scoring call.
    #[serde(default = "default_simulation_steps")]
    pub simulation_steps: u32,
    /// Consecutive failed increments after which a run is aborted.
    #[serde(default = "default_max_step_failures")]
    pub max_step_failures: u32,
    /// Random seed for the built-in generators.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Mutation generator settings.
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Migration generator settings.
    #[serde(default)]
    pub migration: MigrationConfig,
    /// Population model settings.
    #[serde(default)]
    pub population: PopulationModelConfig,
}

impl Default for AutoEvoConfig {
    fn default() -> Self {
        Self {
            mutations_per_species: default_mutations_per_species(),
            allow_no_mutation: default_allow_no_mutation(),
            migrations_per_species: default_migrations_per_species(),
            simulation_steps: default_simulation_steps(),
            max_step_failures: default_max_step_failures(),
            random_seed: None,
            mutation: MutationConfig::default(),
            migration: MigrationConfig::default(),
            population: PopulationModelConfig::default(),
        }
    }
}

fn default_mutations_per_species() -> usize {
    3
}
fn default_allow_no_mutation() -> bool {
    true
}
fn default_migrations_per_species() -> usize {
    3
}
fn default_simulation_steps() -> u32 {
    10
}
fn default_max_step_failures() -> u32 {
    5
}

/// Settings for the random mutation generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Standard deviation of the Gaussian noise, relative to each trait's scale.
    #[serde(default = "default_mutation_strength")]
    pub strength: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            strength: default_mutation_strength(),
        }
    }
}

fn default_mutation_strength() -> f32 {
    0.1
}

/// Settings for the random migration generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Smallest source population a migration may start from.
    #[serde(default = "default_min_population")]
    pub min_population: i64,
    /// Smallest fraction of the source population to move.
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f32,
    /// Largest fraction of the source population to move.
    #[serde(default = "default_max_fraction")]
    pub max_fraction: f32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            min_population: default_min_population(),
            min_fraction: default_min_fraction(),
            max_fraction: default_max_fraction(),
        }
    }
}

fn default_min_population() -> i64 {
    20
}
fn default_min_fraction() -> f32 {
    0.1
}
fn default_max_fraction() -> f32 {
    0.4
}

/// Parameters of the built-in population model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationModelConfig {
    /// Fraction of the gap to the target population closed per step.
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f32,
    /// Carrying capacity per unit of patch resources.
    #[serde(default = "default_capacity_per_resource")]
    pub capacity_per_resource: f32,
}

impl Default for PopulationModelConfig {
    fn default() -> Self {
        Self {
            growth_rate: default_growth_rate(),
            capacity_per_resource: default_capacity_per_resource(),
        }
    }
}

fn default_growth_rate() -> f32 {
    0.3
}
fn default_capacity_per_resource() -> f32 {
    1000.0
}

impl AutoEvoConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation_steps == 0 {
            return Err(ConfigError::InvalidSimulationSteps);
        }
        if self.max_step_failures == 0 {
            return Err(ConfigError::InvalidFailureCap);
        }
        if !(self.mutation.strength >= 0.0) {
            return Err(ConfigError::InvalidMutationStrength(self.mutation.strength));
        }
        let migration = &self.migration;
        if migration.min_population < 1 {
            return Err(ConfigError::InvalidMinPopulation(migration.min_population));
        }
        if !(0.0 < migration.min_fraction
            && migration.min_fraction <= migration.max_fraction
            && migration.max_fraction <= 1.0)
        {
            return Err(ConfigError::InvalidMigrationFractions {
                min: migration.min_fraction,
                max: migration.max_fraction,
            });
        }
        if !(self.population.growth_rate > 0.0 && self.population.growth_rate <= 1.0) {
            return Err(ConfigError::InvalidGrowthRate(self.population.growth_rate));
        }
        if !(self.population.capacity_per_resource >= 0.0) {
            return Err(ConfigError::InvalidCapacity(
                self.population.capacity_per_resource,
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Simulation steps must be positive")]
    InvalidSimulationSteps,
    #[error("Step failure cap must be positive")]
    InvalidFailureCap,
    #[error("Mutation strength {0} must be non-negative")]
    InvalidMutationStrength(f32),
    #[error("Migration minimum population {0} must be at least 1")]
    InvalidMinPopulation(i64),
    #[error("Migration fractions must satisfy 0 < min ({min}) <= max ({max}) <= 1")]
    InvalidMigrationFractions { min: f32, max: f32 },
    #[error("Growth rate {0} must be in (0, 1]")]
    InvalidGrowthRate(f32),
    #[error("Capacity per resource {0} must be non-negative")]
    InvalidCapacity(f32),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
