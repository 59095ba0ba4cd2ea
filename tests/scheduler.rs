//! Ordering and cancellation of runs on the background worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use auto_evo::compute::auto_evo::AutoEvoError;
use auto_evo::schema::AutoEvoConfig;
use auto_evo::world::PatchMap;
use auto_evo::{AutoEvo, Run, RunResults, RunStep};

/// Shared log of `(run, increment sequence number)` pairs.
#[derive(Default)]
struct Trace {
    counter: AtomicUsize,
    entries: Mutex<Vec<(&'static str, usize)>>,
}

impl Trace {
    fn record(&self, run: &'static str) {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().push((run, sequence));
    }
}

/// Records every increment, finishing after `increments` of them.
struct TracedStep {
    run: &'static str,
    trace: Arc<Trace>,
    left: usize,
}

impl RunStep for TracedStep {
    fn advance(&mut self, _results: &mut RunResults) -> Result<bool, AutoEvoError> {
        self.trace.record(self.run);
        thread::sleep(Duration::from_millis(1));
        self.left -= 1;
        Ok(self.left == 0)
    }

    fn remaining_steps(&self) -> usize {
        self.left
    }
}

/// Never finishes on its own.
struct EndlessStep {
    increments: Arc<AtomicUsize>,
}

impl RunStep for EndlessStep {
    fn advance(&mut self, _results: &mut RunResults) -> Result<bool, AutoEvoError> {
        thread::sleep(Duration::from_millis(20));
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    fn remaining_steps(&self) -> usize {
        1
    }
}

fn traced_run(label: &'static str, trace: &Arc<Trace>) -> Arc<Run> {
    let steps: Vec<Box<dyn RunStep>> = (0..3)
        .map(|_| {
            Box::new(TracedStep {
                run: label,
                trace: Arc::clone(trace),
                left: 2,
            }) as Box<dyn RunStep>
        })
        .collect();
    Arc::new(Run::new(Arc::new(PatchMap::new()), steps).with_label(label))
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_runs_execute_in_fifo_order_one_at_a_time() {
    let scheduler = AutoEvo::new(&AutoEvoConfig::default()).unwrap();
    let trace = Arc::new(Trace::default());
    let first = traced_run("first", &trace);
    let second = traced_run("second", &trace);

    scheduler.enqueue(Arc::clone(&first)).unwrap();
    scheduler.enqueue(Arc::clone(&second)).unwrap();
    wait_until(|| !first.in_progress() && !second.in_progress());

    assert!(first.was_successful());
    assert!(second.was_successful());
    assert_eq!(first.completed_steps(), 6);
    assert_eq!(second.completed_steps(), 6);

    let entries = trace.entries.lock().unwrap();
    assert_eq!(entries.len(), 12);
    let last_first = entries
        .iter()
        .filter(|(run, _)| *run == "first")
        .map(|(_, sequence)| *sequence)
        .max()
        .unwrap();
    let first_second = entries
        .iter()
        .filter(|(run, _)| *run == "second")
        .map(|(_, sequence)| *sequence)
        .min()
        .unwrap();
    assert!(last_first < first_second);

    wait_until(|| !scheduler.is_running());
    assert_eq!(scheduler.status_string(), auto_evo::compute::auto_evo::IDLE_STATUS);
}

#[test]
fn test_abort_returns_after_in_flight_increment() {
    let scheduler = AutoEvo::new(&AutoEvoConfig::default()).unwrap();
    let increments = Arc::new(AtomicUsize::new(0));
    let steps: Vec<Box<dyn RunStep>> = vec![Box::new(EndlessStep {
        increments: Arc::clone(&increments),
    })];
    let run = Arc::new(Run::new(Arc::new(PatchMap::new()), steps));

    scheduler.enqueue(Arc::clone(&run)).unwrap();
    wait_until(|| increments.load(Ordering::SeqCst) > 0);

    run.abort();
    assert!(!run.in_progress());
    assert!(!run.was_successful());

    let after_abort = increments.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(increments.load(Ordering::SeqCst), after_abort);
    assert!(run.take_results().is_none());
}

#[test]
fn test_abort_all_cancels_queued_runs() {
    let scheduler = AutoEvo::new(&AutoEvoConfig::default()).unwrap();
    let increments = Arc::new(AtomicUsize::new(0));
    let endless: Vec<Box<dyn RunStep>> = vec![Box::new(EndlessStep {
        increments: Arc::clone(&increments),
    })];
    let running = Arc::new(Run::new(Arc::new(PatchMap::new()), endless));
    let trace = Arc::new(Trace::default());
    let queued = traced_run("queued", &trace);

    scheduler.enqueue(Arc::clone(&running)).unwrap();
    scheduler.enqueue(Arc::clone(&queued)).unwrap();
    wait_until(|| increments.load(Ordering::SeqCst) > 0);

    scheduler.abort_all();
    wait_until(|| !scheduler.is_running());

    assert!(!running.was_successful());
    assert!(!queued.was_successful());
    assert!(!queued.in_progress());
    assert!(trace.entries.lock().unwrap().is_empty());
}
