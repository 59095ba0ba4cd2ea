//! A single auto-evo run: ordered steps plus a small state machine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::schema::{AutoEvoConfig, RunProgress, RunState};
use crate::world::PatchMap;

use super::{
    AutoEvoError, CalculatePopulation, Collaborators, FindBestMigration, FindBestMutation, Lambda,
    RunResults, RunStep,
};

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// State touched only while holding the run's step lock.
struct RunInner {
    steps: VecDeque<Box<dyn RunStep>>,
    results: Option<RunResults>,
    started: Option<Instant>,
}

/// One complete evolution cycle over a patch map.
///
/// A run is shared between the caller and the scheduler's worker thread.
/// Progress queries read atomics and never block; [`Run::step`] and
/// [`Run::abort`] serialize on the same lock, so an abort waits for at most
/// one increment to finish.
pub struct Run {
    id: u64,
    label: String,
    map: Arc<PatchMap>,
    inner: Mutex<RunInner>,
    state: AtomicU8,
    completed_steps: AtomicI64,
    total_steps: AtomicI64,
    in_progress: AtomicBool,
    success: AtomicBool,
    abort_requested: AtomicBool,
}

impl Run {
    /// Create a run that executes `steps` in order against `map`.
    pub fn new(map: Arc<PatchMap>, steps: Vec<Box<dyn RunStep>>) -> Self {
        let id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            label: format!("run {id}"),
            map,
            inner: Mutex::new(RunInner {
                steps: steps.into(),
                results: Some(RunResults::new()),
                started: None,
            }),
            state: AtomicU8::new(RunState::GatheringInfo as u8),
            completed_steps: AtomicI64::new(0),
            total_steps: AtomicI64::new(-1),
            in_progress: AtomicBool::new(true),
            success: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
        }
    }

    /// The standard cycle: for every species a mutation search then a
    /// migration search, followed by a population tally of every patch.
    pub fn standard(
        map: Arc<PatchMap>,
        collaborators: &Collaborators,
        config: &AutoEvoConfig,
    ) -> Self {
        let mut steps: Vec<Box<dyn RunStep>> = Vec::new();

        for species in map.species() {
            steps.push(Box::new(
                FindBestMutation::new(
                    Arc::clone(&map),
                    species.clone(),
                    Arc::clone(&collaborators.simulator),
                    Arc::clone(&collaborators.mutations),
                    config.mutations_per_species,
                    config.allow_no_mutation,
                )
                .with_simulation_steps(config.simulation_steps),
            ));
            steps.push(Box::new(
                FindBestMigration::new(
                    Arc::clone(&map),
                    species,
                    Arc::clone(&collaborators.simulator),
                    Arc::clone(&collaborators.migrations),
                    config.migrations_per_species,
                )
                .with_simulation_steps(config.simulation_steps),
            ));
        }

        steps.push(Box::new(
            CalculatePopulation::new(Arc::clone(&map), Arc::clone(&collaborators.simulator))
                .with_simulation_steps(config.simulation_steps),
        ));

        let summary_map = Arc::clone(&map);
        steps.push(Box::new(Lambda::new("summarizing results", move |results| {
            log::info!(
                "Auto-evo results:\n{}",
                results.make_summary(Some(&summary_map))
            );
        })));

        Self::new(map, steps)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The map this run reads.
    pub fn map(&self) -> &Arc<PatchMap> {
        &self.map
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn was_successful(&self) -> bool {
        self.success.load(Ordering::Acquire)
    }

    /// Increments performed so far, counting every successful `advance` call
    /// rather than whole steps, so that it lines up with [`Run::total_steps`].
    pub fn completed_steps(&self) -> i64 {
        self.completed_steps.load(Ordering::Acquire)
    }

    /// Estimated total increments, -1 until the run has gathered its steps.
    pub fn total_steps(&self) -> i64 {
        self.total_steps.load(Ordering::Acquire)
    }

    fn lock_inner(&self) -> MutexGuard<'_, RunInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("{}: step lock poisoned, recovering", self.label);
            PoisonError::into_inner(poisoned)
        })
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Called by the worker right before it starts stepping this run.
    pub fn on_begin_executing(&self) {
        let mut inner = self.lock_inner();
        if inner.started.is_none() {
            inner.started = Some(Instant::now());
        }
        log::info!("Starting auto-evo {}", self.label);
    }

    /// Perform one increment of work. Returns true once the run has ended.
    ///
    /// Errors from a step leave the run's progress unchanged; calling `step`
    /// again retries the same step.
    pub fn step(&self) -> Result<bool, AutoEvoError> {
        let mut inner = self.lock_inner();

        if self.abort_requested.load(Ordering::Acquire) {
            self.mark_aborted();
            return Ok(true);
        }

        match self.state() {
            RunState::Ended => return Ok(true),
            RunState::GatheringInfo => {
                let total = remaining_estimate(&inner.steps);
                self.total_steps.store(total, Ordering::Release);
                log::debug!(
                    "{}: {} steps queued, ~{total} increments",
                    self.label,
                    inner.steps.len()
                );
                self.set_state(RunState::Stepping);
            }
            RunState::Stepping => {}
        }

        let RunInner { steps, results, .. } = &mut *inner;
        let Some(results) = results.as_mut() else {
            return Err(AutoEvoError::StepFailed(format!(
                "{}: results already taken",
                self.label
            )));
        };

        if let Some(step) = steps.front_mut() {
            let done = step.advance(results)?;
            self.completed_steps.fetch_add(1, Ordering::AcqRel);
            if done {
                log::debug!("{}: finished {}", self.label, step.label());
                steps.pop_front();
            }
            let total = self.completed_steps() + remaining_estimate(steps);
            self.total_steps.store(total, Ordering::Release);
        }

        if steps.is_empty() {
            self.finish(&inner);
            return Ok(true);
        }
        Ok(false)
    }

    fn finish(&self, inner: &RunInner) {
        self.set_state(RunState::Ended);
        self.success.store(true, Ordering::Release);
        self.in_progress.store(false, Ordering::Release);
        match inner.started {
            Some(started) => log::info!(
                "Auto-evo {} finished in {:.2}s",
                self.label,
                started.elapsed().as_secs_f64()
            ),
            None => log::info!("Auto-evo {} finished", self.label),
        }
    }

    /// Stop the run. Blocks until any in-flight increment completes.
    ///
    /// No new increment starts once an abort has been requested.
    pub fn abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
        let _inner = self.lock_inner();
        self.mark_aborted();
    }

    fn mark_aborted(&self) {
        let state = self.state();
        if state == RunState::Ended && self.was_successful() {
            return;
        }
        if state != RunState::Ended {
            log::info!("Aborting auto-evo {}", self.label);
        }
        self.set_state(RunState::Ended);
        self.in_progress.store(false, Ordering::Release);
        self.success.store(false, Ordering::Release);
    }

    /// Fraction of the run completed, in [0, 1].
    pub fn completion_fraction(&self) -> f32 {
        if self.state() == RunState::Ended && self.was_successful() {
            return 1.0;
        }
        let total = self.total_steps();
        if total <= 0 {
            return 0.0;
        }
        (self.completed_steps() as f32 / total as f32).clamp(0.0, 1.0)
    }

    /// Human-readable status for display.
    pub fn status_string(&self) -> String {
        match self.state() {
            RunState::GatheringInfo => String::from("Gathering information..."),
            RunState::Stepping => format!(
                "Step {} of {} ({:.0}%)",
                self.completed_steps(),
                self.total_steps().max(0),
                self.completion_fraction() * 100.0
            ),
            RunState::Ended if self.was_successful() => String::from("Finished"),
            RunState::Ended => String::from("Aborted"),
        }
    }

    /// Snapshot of the run's progress.
    pub fn progress(&self) -> RunProgress {
        RunProgress {
            label: self.label.clone(),
            state: self.state(),
            completed_steps: self.completed_steps(),
            total_steps: self.total_steps(),
            fraction: self.completion_fraction(),
            in_progress: self.in_progress(),
            success: self.was_successful(),
            status: self.status_string(),
        }
    }

    /// Hand the results to the caller once the run has finished successfully.
    ///
    /// Returns `None` while the run is in progress, after it was aborted, or
    /// if the results were already taken.
    pub fn take_results(&self) -> Option<RunResults> {
        if self.in_progress() || !self.was_successful() {
            return None;
        }
        self.lock_inner().results.take()
    }
}

/// Increments left across all queued steps. Every queued step needs at least one more call.
fn remaining_estimate(steps: &VecDeque<Box<dyn RunStep>>) -> i64 {
    steps
        .iter()
        .map(|step| step.remaining_steps().max(1) as i64)
        .sum()
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .field("completed_steps", &self.completed_steps())
            .field("total_steps", &self.total_steps())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Patch, PatchEnvironment, Species, SpeciesTraits};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    struct CountdownStep {
        left: usize,
    }

    impl RunStep for CountdownStep {
        fn advance(&mut self, _results: &mut RunResults) -> Result<bool, AutoEvoError> {
            self.left = self.left.saturating_sub(1);
            Ok(self.left == 0)
        }

        fn remaining_steps(&self) -> usize {
            self.left
        }
    }

    struct FailingStep;

    impl RunStep for FailingStep {
        fn advance(&mut self, _results: &mut RunResults) -> Result<bool, AutoEvoError> {
            Err(AutoEvoError::StepFailed("always".into()))
        }

        fn remaining_steps(&self) -> usize {
            1
        }
    }

    /// Signals when entered, then blocks until released.
    struct GateStep {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl RunStep for GateStep {
        fn advance(&mut self, _results: &mut RunResults) -> Result<bool, AutoEvoError> {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            Ok(false)
        }

        fn remaining_steps(&self) -> usize {
            5
        }
    }

    fn empty_map() -> Arc<PatchMap> {
        Arc::new(PatchMap::new())
    }

    #[test]
    fn test_run_state_machine() {
        let run = Run::new(
            empty_map(),
            vec![
                Box::new(CountdownStep { left: 2 }),
                Box::new(CountdownStep { left: 1 }),
            ],
        );
        assert_eq!(run.state(), RunState::GatheringInfo);
        assert_eq!(run.total_steps(), -1);
        assert!(run.in_progress());
        assert!(run.take_results().is_none());

        assert!(!run.step().unwrap());
        assert_eq!(run.state(), RunState::Stepping);
        assert_eq!(run.total_steps(), 3);
        assert_eq!(run.completed_steps(), 1);
        assert!(run.status_string().starts_with("Step 1 of 3"));

        assert!(!run.step().unwrap());
        assert!(run.step().unwrap());
        assert_eq!(run.state(), RunState::Ended);
        assert!(!run.in_progress());
        assert!(run.was_successful());
        assert_eq!(run.completion_fraction(), 1.0);
        assert_eq!(run.status_string(), "Finished");

        // Stepping an ended run is a no-op.
        assert!(run.step().unwrap());
        assert_eq!(run.completed_steps(), 3);

        assert!(run.take_results().is_some());
        assert!(run.take_results().is_none());
    }

    #[test]
    fn test_empty_run_ends_successfully() {
        let run = Run::new(empty_map(), Vec::new());
        assert!(run.step().unwrap());
        assert!(run.was_successful());
        assert_eq!(run.total_steps(), 0);
    }

    #[test]
    fn test_abort_after_success_is_ignored() {
        let run = Run::new(empty_map(), vec![Box::new(CountdownStep { left: 1 })]);
        assert!(run.step().unwrap());

        run.abort();
        assert!(run.was_successful());
        assert_eq!(run.status_string(), "Finished");
        assert!(run.take_results().is_some());
    }

    #[test]
    fn test_abort_before_start() {
        let run = Run::new(empty_map(), vec![Box::new(CountdownStep { left: 3 })]);
        run.abort();

        assert!(!run.in_progress());
        assert!(!run.was_successful());
        assert_eq!(run.state(), RunState::Ended);
        assert_eq!(run.status_string(), "Aborted");
        assert!(run.step().unwrap());
        assert_eq!(run.completed_steps(), 0);
        assert!(run.take_results().is_none());
    }

    #[test]
    fn test_step_error_keeps_progress() {
        let run = Run::new(empty_map(), vec![Box::new(FailingStep)]);
        assert!(run.step().is_err());
        assert!(run.step().is_err());
        assert_eq!(run.completed_steps(), 0);
        assert_eq!(run.state(), RunState::Stepping);
        assert!(run.in_progress());
    }

    #[test]
    fn test_abort_waits_for_increment() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let run = Arc::new(Run::new(
            empty_map(),
            vec![Box::new(GateStep {
                entered: entered_tx,
                release: release_rx,
            })],
        ));

        let stepper = {
            let run = Arc::clone(&run);
            thread::spawn(move || run.step())
        };
        entered_rx.recv().unwrap();

        let (aborted_tx, aborted_rx) = mpsc::channel();
        let aborter = {
            let run = Arc::clone(&run);
            thread::spawn(move || {
                run.abort();
                aborted_tx.send(()).unwrap();
            })
        };

        // Abort must not complete while the increment is still running.
        assert!(aborted_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(run.in_progress());

        release_tx.send(()).unwrap();
        aborted_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        aborter.join().unwrap();
        assert!(!stepper.join().unwrap().unwrap());

        assert!(!run.in_progress());
        assert!(!run.was_successful());
        assert!(run.step().unwrap());
    }

    #[test]
    fn test_standard_run_composition() {
        let species = Species::new("S", SpeciesTraits::default(), 100);
        let mut map = PatchMap::new();
        map.add_patch(Patch::new(0, "P0", PatchEnvironment::default()));
        map.add_patch(Patch::new(1, "P1", PatchEnvironment::default()));
        map.connect(0, 1);
        map.patch(0).unwrap().add_species(species.clone(), 100);
        let map = Arc::new(map);

        let config = AutoEvoConfig {
            random_seed: Some(7),
            mutations_per_species: 2,
            migrations_per_species: 1,
            ..Default::default()
        };
        let collaborators = Collaborators::with_defaults(&config);
        let run = Run::standard(Arc::clone(&map), &collaborators, &config).with_label("test");
        assert_eq!(run.label(), "test");

        let mut calls = 0;
        while !run.step().unwrap() {
            calls += 1;
            assert!(calls < 100);
        }
        // mutation (1 + 2) + migration (1 + 1) + two patches + summary
        assert_eq!(run.completed_steps(), 8);

        let results = run.take_results().unwrap();
        assert!(results.population_in_patch(&species, 0).is_ok());
        assert!(results.get(&species).is_some());
    }
}
