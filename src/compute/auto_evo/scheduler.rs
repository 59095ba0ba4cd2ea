//! The auto-evo scheduler: one worker thread driving a FIFO queue of runs.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::schema::{AutoEvoConfig, RunState};

use super::{AutoEvoError, Run};

/// Status reported while no run is queued or executing.
pub const IDLE_STATUS: &str = "Finished";

struct Shared {
    queue: Mutex<VecDeque<Arc<Run>>>,
    wake: Condvar,
    stop: AtomicBool,
    running: AtomicBool,
    max_step_failures: u32,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Arc<Run>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs queued auto-evo runs one at a time on a background thread.
///
/// Runs execute strictly in the order they were enqueued and never overlap.
/// Dropping the scheduler aborts every queued run and joins the worker, which
/// blocks for at most one in-flight increment.
pub struct AutoEvo {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl AutoEvo {
    /// Start the worker thread.
    pub fn new(config: &AutoEvoConfig) -> Result<Self, AutoEvoError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            max_step_failures: config.max_step_failures.max(1),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("auto-evo-worker".into())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|err| {
                AutoEvoError::Worker(format!("failed to spawn worker thread: {err}"))
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queue a run for execution.
    ///
    /// Fails if the run has already started, ended or been aborted, or if the
    /// scheduler is shutting down.
    pub fn enqueue(&self, run: Arc<Run>) -> Result<(), AutoEvoError> {
        if self.shared.stop.load(Ordering::Acquire) {
            return Err(AutoEvoError::InvalidArgument(
                "auto-evo is shutting down".into(),
            ));
        }
        if run.state() != RunState::GatheringInfo || !run.in_progress() {
            return Err(AutoEvoError::InvalidArgument(format!(
                "{} cannot be queued in state {:?}",
                run.label(),
                run.state()
            )));
        }

        let mut queue = self.shared.lock_queue();
        if queue.iter().any(|queued| Arc::ptr_eq(queued, &run)) {
            return Err(AutoEvoError::InvalidArgument(format!(
                "{} is already queued",
                run.label()
            )));
        }
        log::debug!("Queued auto-evo {}", run.label());
        queue.push_back(run);
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Abort every queued run, including the one executing, and clear the queue.
    pub fn abort_all(&self) {
        let mut queue = self.shared.lock_queue();
        for run in queue.iter() {
            run.abort();
        }
        queue.clear();
        self.shared.wake.notify_all();
    }

    /// Whether the worker is currently driving a run.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Runs queued, including the executing one.
    pub fn queued_runs(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Status of the front run, or [`IDLE_STATUS`] when there is nothing to do.
    pub fn status_string(&self) -> String {
        let queue = self.shared.lock_queue();
        let Some(front) = queue.front() else {
            return IDLE_STATUS.to_string();
        };

        let mut status = front.status_string();
        if queue.len() > 1 {
            status.push_str(&format!(" ({} more queued)", queue.len() - 1));
        }
        status
    }
}

impl Drop for AutoEvo {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.abort_all();
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("auto-evo worker thread panicked");
        }
    }
}

fn worker_loop(shared: &Shared) {
    log::debug!("auto-evo worker started");
    loop {
        let run = {
            let mut queue = shared.lock_queue();
            loop {
                if shared.stop.load(Ordering::Acquire) {
                    log::debug!("auto-evo worker stopping");
                    return;
                }
                if let Some(front) = queue.front() {
                    break Arc::clone(front);
                }
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        shared.running.store(true, Ordering::Release);
        drive(&run, shared.max_step_failures);
        shared.running.store(false, Ordering::Release);

        let mut queue = shared.lock_queue();
        if queue.front().is_some_and(|front| Arc::ptr_eq(front, &run)) {
            queue.pop_front();
        }
    }
}

/// Step `run` until it ends, aborting it after too many consecutive failures.
fn drive(run: &Run, max_step_failures: u32) {
    run.on_begin_executing();

    let mut failures = 0;
    loop {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run.step()));
        match outcome {
            Ok(Ok(true)) => break,
            Ok(Ok(false)) => failures = 0,
            Ok(Err(err)) => {
                failures += 1;
                log::warn!(
                    "auto-evo {} step failed ({failures}/{max_step_failures}): {err}",
                    run.label()
                );
            }
            Err(_) => {
                failures += 1;
                log::warn!(
                    "auto-evo {} step panicked ({failures}/{max_step_failures})",
                    run.label()
                );
            }
        }

        if failures >= max_step_failures {
            log::error!(
                "auto-evo {} failed {failures} times in a row, aborting",
                run.label()
            );
            run.abort();
            break;
        }
    }
}
