//! Resumable units of work making up a run.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::world::{PatchId, PatchMap, Species};

use super::{
    AutoEvoError, Migration, MigrationGenerator, MutationGenerator, Perturbation,
    PopulationSimulator, RunResults,
};

/// A unit of work that is advanced in short increments.
pub trait RunStep: Send {
    /// Perform one increment, returning true once the step is done.
    ///
    /// A step is never advanced again after it reports done.
    fn advance(&mut self, results: &mut RunResults) -> Result<bool, AutoEvoError>;

    /// Estimated increments left. Never increases between calls to `advance`.
    fn remaining_steps(&self) -> usize;

    /// Short description used in logs.
    fn label(&self) -> String {
        String::from("step")
    }
}

/// Score the whole map under `perturbation` and read back the global population of `species`.
fn score_species(
    simulator: &dyn PopulationSimulator,
    map: &PatchMap,
    perturbation: &Perturbation,
    species: &Species,
) -> Result<i64, AutoEvoError> {
    let mut scratch = RunResults::new();
    simulator.simulate_map(map, perturbation, &mut scratch)?;
    scratch.global_population(species)
}

/// Best candidate seen so far by a search step.
#[derive(Debug, Clone)]
struct Best<T> {
    choice: T,
    score: i64,
}

/// Greedy search for the mutation that gives a species the highest global population.
pub struct FindBestMutation {
    map: Arc<PatchMap>,
    species: Species,
    simulator: Arc<dyn PopulationSimulator>,
    generator: Arc<dyn MutationGenerator>,
    steps: u32,
    baseline_pending: bool,
    mutations_left: usize,
    baseline_failed: bool,
    best: Option<Best<Option<Species>>>,
}

impl FindBestMutation {
    pub fn new(
        map: Arc<PatchMap>,
        species: Species,
        simulator: Arc<dyn PopulationSimulator>,
        generator: Arc<dyn MutationGenerator>,
        mutations_to_try: usize,
        allow_no_mutation: bool,
    ) -> Self {
        Self {
            map,
            species,
            simulator,
            generator,
            steps: 10,
            baseline_pending: allow_no_mutation,
            mutations_left: mutations_to_try,
            baseline_failed: false,
            best: None,
        }
    }

    /// Simulation steps per scoring call.
    pub fn with_simulation_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    fn score_baseline(&mut self) {
        match score_species(
            self.simulator.as_ref(),
            &self.map,
            &Perturbation::none(self.steps),
            &self.species,
        ) {
            Ok(score) => {
                log::debug!("{}: unmutated baseline scores {score}", self.species);
                self.best = Some(Best {
                    choice: None,
                    score,
                });
            }
            Err(err) => {
                log::warn!(
                    "{}: baseline simulation failed, keeping species unmutated: {err}",
                    self.species
                );
                self.baseline_failed = true;
                self.mutations_left = 0;
            }
        }
    }

    fn try_mutation(&mut self) {
        let Some(mutant) = self.generator.propose_mutation(&self.species) else {
            log::debug!("{}: no mutation proposed", self.species);
            return;
        };

        let perturbation = Perturbation::replace(&self.species, &mutant, self.steps);
        let score =
            match score_species(self.simulator.as_ref(), &self.map, &perturbation, &mutant) {
                Ok(score) => score,
                Err(err) => {
                    log::warn!("{}: scoring mutation failed: {err}", self.species);
                    return;
                }
            };

        let improves = self.best.as_ref().is_none_or(|best| score > best.score);
        log::debug!(
            "{}: mutation scores {score}{}",
            self.species,
            if improves { " (new best)" } else { "" }
        );
        if improves {
            self.best = Some(Best {
                choice: Some(mutant),
                score,
            });
        }
    }
}

impl RunStep for FindBestMutation {
    fn advance(&mut self, results: &mut RunResults) -> Result<bool, AutoEvoError> {
        if self.baseline_pending {
            self.baseline_pending = false;
            self.score_baseline();
        } else if self.mutations_left > 0 {
            self.mutations_left -= 1;
            self.try_mutation();
        }

        if self.remaining_steps() > 0 {
            return Ok(false);
        }

        let choice = if self.baseline_failed {
            None
        } else {
            self.best.take().and_then(|best| best.choice)
        };
        results.add_mutation_result_for_species(&self.species, choice);
        Ok(true)
    }

    fn remaining_steps(&self) -> usize {
        usize::from(self.baseline_pending) + self.mutations_left
    }

    fn label(&self) -> String {
        format!("finding best mutation for {}", self.species)
    }
}

/// Greedy search for a migration that raises a species' global population.
pub struct FindBestMigration {
    map: Arc<PatchMap>,
    species: Species,
    simulator: Arc<dyn PopulationSimulator>,
    generator: Arc<dyn MigrationGenerator>,
    steps: u32,
    baseline_pending: bool,
    migrations_left: usize,
    baseline: Option<i64>,
    best: Option<Best<Migration>>,
}

impl FindBestMigration {
    pub fn new(
        map: Arc<PatchMap>,
        species: Species,
        simulator: Arc<dyn PopulationSimulator>,
        generator: Arc<dyn MigrationGenerator>,
        migrations_to_try: usize,
    ) -> Self {
        Self {
            map,
            species,
            simulator,
            generator,
            steps: 10,
            baseline_pending: true,
            migrations_left: migrations_to_try,
            baseline: None,
            best: None,
        }
    }

    /// Simulation steps per scoring call.
    pub fn with_simulation_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    fn score_baseline(&mut self) {
        match score_species(
            self.simulator.as_ref(),
            &self.map,
            &Perturbation::none(self.steps),
            &self.species,
        ) {
            Ok(score) => {
                log::debug!("{}: no-migration baseline scores {score}", self.species);
                self.baseline = Some(score);
            }
            Err(err) => {
                log::warn!(
                    "{}: baseline simulation failed, skipping migration search: {err}",
                    self.species
                );
                self.migrations_left = 0;
            }
        }
    }

    fn try_migration(&mut self) {
        let Some(bar) = self.best.as_ref().map(|b| b.score).or(self.baseline) else {
            return;
        };

        let Some(migration) = self.generator.propose_migration(&self.map, &self.species) else {
            log::debug!("{}: no migration proposed", self.species);
            return;
        };

        let perturbation = Perturbation::migrate(&self.species, migration, self.steps);
        let score = match score_species(
            self.simulator.as_ref(),
            &self.map,
            &perturbation,
            &self.species,
        ) {
            Ok(score) => score,
            Err(err) => {
                log::warn!("{}: scoring migration failed: {err}", self.species);
                return;
            }
        };

        log::debug!(
            "{}: migration of {} from {} to {} scores {score}",
            self.species,
            migration.amount,
            migration.from,
            migration.to
        );
        if score > bar {
            self.best = Some(Best {
                choice: migration,
                score,
            });
        }
    }
}

impl RunStep for FindBestMigration {
    fn advance(&mut self, results: &mut RunResults) -> Result<bool, AutoEvoError> {
        if self.baseline_pending {
            self.baseline_pending = false;
            self.score_baseline();
        } else if self.migrations_left > 0 {
            self.migrations_left -= 1;
            self.try_migration();
        }

        if self.remaining_steps() > 0 {
            return Ok(false);
        }

        if let Some(best) = self.best.take() {
            let Migration { from, to, amount } = best.choice;
            results.add_migration_result_for_species(&self.species, from, to, amount);
        }
        Ok(true)
    }

    fn remaining_steps(&self) -> usize {
        usize::from(self.baseline_pending) + self.migrations_left
    }

    fn label(&self) -> String {
        format!("finding best migration for {}", self.species)
    }
}

/// Simulates every patch once, one patch per increment, into the run's results.
pub struct CalculatePopulation {
    map: Arc<PatchMap>,
    simulator: Arc<dyn PopulationSimulator>,
    steps: u32,
    patches: VecDeque<PatchId>,
}

impl CalculatePopulation {
    /// Snapshot the patches of `map` to process.
    pub fn new(map: Arc<PatchMap>, simulator: Arc<dyn PopulationSimulator>) -> Self {
        let patches = map.patches().map(|p| p.id()).collect();
        Self {
            map,
            simulator,
            steps: 10,
            patches,
        }
    }

    /// Simulation steps per patch.
    pub fn with_simulation_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }
}

impl RunStep for CalculatePopulation {
    fn advance(&mut self, results: &mut RunResults) -> Result<bool, AutoEvoError> {
        if let Some(id) = self.patches.pop_front() {
            match self.map.patch(id) {
                Some(patch) => {
                    let perturbation = Perturbation::none(self.steps);
                    if let Err(err) = self.simulator.simulate_patch(patch, results, &perturbation) {
                        log::warn!("Population simulation of patch {id} failed: {err}");
                    }
                }
                None => log::error!("Patch {id} disappeared from the map"),
            }
        }
        Ok(self.patches.is_empty())
    }

    fn remaining_steps(&self) -> usize {
        self.patches.len()
    }

    fn label(&self) -> String {
        String::from("calculating populations")
    }
}

type Callback = Box<dyn FnOnce(&mut RunResults) + Send>;

/// Runs an arbitrary callback as a single-increment step.
pub struct Lambda {
    label: String,
    callback: Option<Callback>,
}

impl Lambda {
    pub fn new(
        label: impl Into<String>,
        callback: impl FnOnce(&mut RunResults) + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            callback: Some(Box::new(callback)),
        }
    }
}

impl RunStep for Lambda {
    fn advance(&mut self, results: &mut RunResults) -> Result<bool, AutoEvoError> {
        if let Some(callback) = self.callback.take() {
            callback(results);
        }
        Ok(true)
    }

    fn remaining_steps(&self) -> usize {
        usize::from(self.callback.is_some())
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
