//! Strategies for dispatching a batch of task units.
//!
//! Every strategy returns one result per dispatched unit, in no particular
//! order; callers key results by their embedded indices. A task failure never
//! aborts the batch.

use crossbeam_channel::{unbounded, Receiver, Select};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use ps_types::{ExecutionStrategy, RunConfig, TaskFailure, TaskKey, TaskResult, TaskUnit};

use crate::cancel::AbortHandle;
use crate::executor::TaskRunner;
use crate::progress::ProgressTracker;

pub trait Scheduler: Send + Sync {
    fn strategy(&self) -> ExecutionStrategy;

    /// Run `units` and collect their results.
    ///
    /// After an abort no further unit is started; units already running
    /// still report.
    fn run(
        &self,
        units: Vec<TaskUnit>,
        runner: &Arc<TaskRunner>,
        abort: &AbortHandle,
        progress: &ProgressTracker,
    ) -> Vec<TaskResult>;
}

/// Scheduler for the strategy selected in `config`.
pub fn scheduler_for(config: &RunConfig) -> Box<dyn Scheduler> {
    match config.execution {
        ExecutionStrategy::Sequential => Box::new(SequentialScheduler),
        ExecutionStrategy::ParallelProcesses => Box::new(IsolatedScheduler {
            concurrency_limit: config.concurrency_limit,
            timeout: config.task_timeout(),
        }),
        ExecutionStrategy::WorkerPool => Box::new(PoolScheduler {
            concurrency_limit: config.concurrency_limit,
        }),
    }
}

fn hardware_parallelism() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// One task at a time on the calling thread, in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Sequential
    }

    fn run(
        &self,
        units: Vec<TaskUnit>,
        runner: &Arc<TaskRunner>,
        abort: &AbortHandle,
        progress: &ProgressTracker,
    ) -> Vec<TaskResult> {
        let total = units.len();
        let mut results = Vec::with_capacity(total);
        for unit in &units {
            if abort.is_aborted() {
                info!("Abort requested, {} of {} tasks not started", total - results.len(), total);
                break;
            }
            let result = runner.run(unit);
            progress.record(&result);
            results.push(result);
        }
        results
    }
}

/// Each task on its own named worker thread with a private result channel.
///
/// Workers own their unit and share nothing mutable with the collector. A
/// worker that misses its deadline is abandoned, not joined; its late
/// result is discarded when its channel is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolatedScheduler {
    /// Maximum simultaneous workers; `None` starts one per task.
    pub concurrency_limit: Option<usize>,
    pub timeout: Option<Duration>,
}

struct InFlight {
    key: TaskKey,
    started: Instant,
    deadline: Option<Instant>,
    rx: Receiver<TaskResult>,
}

enum Event {
    Reported(usize, Result<TaskResult, crossbeam_channel::RecvError>),
    DeadlinePassed,
}

impl IsolatedScheduler {
    fn spawn(&self, serial: usize, unit: TaskUnit, runner: &Arc<TaskRunner>) -> Result<InFlight, TaskResult> {
        let key = unit.key();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let runner = Arc::clone(runner);
        let started = Instant::now();

        let spawned = thread::Builder::new()
            .name(format!("predsweep-task-{serial}"))
            .spawn(move || {
                let result = runner.run(&unit);
                // The collector may have given up on this task already.
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => Ok(InFlight {
                key,
                started,
                deadline: self.timeout.map(|t| started + t),
                rx,
            }),
            Err(e) => Err(TaskResult::failed(
                key,
                TaskFailure::execution(format!("could not start worker: {e}")),
                0.0,
            )),
        }
    }

    fn wait(in_flight: &[InFlight]) -> Event {
        let mut select = Select::new();
        for flight in in_flight {
            select.recv(&flight.rx);
        }
        let deadline = in_flight.iter().filter_map(|f| f.deadline).min();
        let selected = match deadline {
            Some(deadline) => match select.select_deadline(deadline) {
                Ok(op) => op,
                Err(_) => return Event::DeadlinePassed,
            },
            None => select.select(),
        };
        let index = selected.index();
        Event::Reported(index, selected.recv(&in_flight[index].rx))
    }
}

impl Scheduler for IsolatedScheduler {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::ParallelProcesses
    }

    fn run(
        &self,
        units: Vec<TaskUnit>,
        runner: &Arc<TaskRunner>,
        abort: &AbortHandle,
        progress: &ProgressTracker,
    ) -> Vec<TaskResult> {
        let total = units.len();
        let limit = self.concurrency_limit.unwrap_or(total).max(1);
        if self.concurrency_limit.is_none() && total > hardware_parallelism() {
            warn!(
                "Starting one worker per task: {} workers on {} cores",
                total,
                hardware_parallelism()
            );
        }
        info!("Dispatching {} tasks to isolated workers (limit {})", total, limit);

        let mut pending = units.into_iter().enumerate();
        let mut in_flight: Vec<InFlight> = Vec::new();
        let mut results = Vec::with_capacity(total);
        let finish = |result: TaskResult, results: &mut Vec<TaskResult>| {
            progress.record(&result);
            results.push(result);
        };

        loop {
            while in_flight.len() < limit && !abort.is_aborted() {
                let Some((serial, unit)) = pending.next() else {
                    break;
                };
                match self.spawn(serial, unit, runner) {
                    Ok(flight) => in_flight.push(flight),
                    Err(failed) => finish(failed, &mut results),
                }
            }
            if in_flight.is_empty() {
                break;
            }

            match Self::wait(&in_flight) {
                Event::Reported(index, received) => {
                    let flight = in_flight.swap_remove(index);
                    let result = received.unwrap_or_else(|_| {
                        TaskResult::failed(
                            flight.key,
                            TaskFailure::execution("worker exited without reporting a result"),
                            flight.started.elapsed().as_secs_f64(),
                        )
                    });
                    finish(result, &mut results);
                }
                Event::DeadlinePassed => {
                    let now = Instant::now();
                    let (expired, running): (Vec<_>, Vec<_>) = in_flight
                        .drain(..)
                        .partition(|f| f.deadline.is_some_and(|d| d <= now));
                    in_flight = running;
                    for flight in expired {
                        let waited = flight.started.elapsed().as_secs_f64();
                        warn!("Abandoning {} after {:.3}s without a result", flight.key, waited);
                        finish(
                            TaskResult::failed(
                                flight.key,
                                TaskFailure::timeout(format!("no result after {waited:.3}s")),
                                waited,
                            ),
                            &mut results,
                        );
                    }
                }
            }
        }

        if abort.is_aborted() {
            info!("Abort requested, {} of {} tasks not started", total - results.len(), total);
        }
        results
    }
}

/// Bounded rayon pool whose workers pull units from a shared queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolScheduler {
    /// Pool size; `None` uses all hardware parallelism.
    pub concurrency_limit: Option<usize>,
}

impl Scheduler for PoolScheduler {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::WorkerPool
    }

    fn run(
        &self,
        units: Vec<TaskUnit>,
        runner: &Arc<TaskRunner>,
        abort: &AbortHandle,
        progress: &ProgressTracker,
    ) -> Vec<TaskResult> {
        let total = units.len();
        let workers = self
            .concurrency_limit
            .unwrap_or_else(hardware_parallelism)
            .clamp(1, total.max(1));

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("predsweep-pool-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Could not build worker pool ({}), running sequentially", e);
                return SequentialScheduler.run(units, runner, abort, progress);
            }
        };
        info!("Dispatching {} tasks to a pool of {} workers", total, workers);

        let (queue_tx, queue_rx) = unbounded::<TaskUnit>();
        for unit in units {
            // The receiver is alive until the end of this function.
            let _ = queue_tx.send(unit);
        }
        drop(queue_tx);

        let (done_tx, done_rx) = unbounded::<TaskResult>();
        pool.scope(|scope| {
            for _ in 0..workers {
                let queue_rx = queue_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move |_| {
                    while !abort.is_aborted() {
                        let Ok(unit) = queue_rx.recv() else {
                            break;
                        };
                        let result = runner.run(&unit);
                        progress.record(&result);
                        if done_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let results: Vec<TaskResult> = done_rx.iter().collect();
        if results.len() < total {
            info!("Abort requested, {} of {} tasks not started", total - results.len(), total);
        } else {
            debug!("Pool finished all {} tasks", total);
        }
        results
    }
}
