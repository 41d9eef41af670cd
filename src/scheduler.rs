//! Background sweep scheduler.
//!
//! `SweepScheduler` owns one worker thread that runs the sweeper whenever
//! the schedule comes due or a caller triggers it. Every sweep runs on that
//! worker, so sweeps never overlap. A tick that comes due while a sweep is
//! running is not queued: once the sweep ends the next fire time is computed
//! from the current clock, which folds missed ticks into the next one.
//!
//! Sweep failures are logged and counted; they never stop the worker.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{after, bounded, never, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info};

use crate::error::{LeadsweepResult, SchedulerError};
use crate::schedule::Schedule;
use crate::sweep::{SweepOutcome, SweepReport, SweepStage, Sweeper};

/// Maximum number of pending manual triggers.
pub const TRIGGER_QUEUE_CAPACITY: usize = 8;

/// Result of the most recent sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastRun {
    /// The sweep finished.
    Completed {
        finished_at: DateTime<Utc>,
        deleted: usize,
    },
    /// The sweep aborted.
    Failed {
        at: DateTime<Utc>,
        stage: SweepStage,
        error: String,
    },
}

/// Counters kept by the scheduler worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Sweeps that finished.
    pub runs_completed: u64,
    /// Sweeps that aborted.
    pub runs_failed: u64,
    /// Leads deleted across all completed sweeps.
    pub leads_deleted: u64,
    /// Result of the most recent sweep.
    pub last_run: Option<LastRun>,
    /// When the schedule next fires, if it fires on its own.
    pub next_run: Option<DateTime<Utc>>,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &SweepOutcome) {
        match outcome {
            Ok(report) => {
                self.runs_completed += 1;
                self.leads_deleted += report.deleted as u64;
                self.last_run = Some(LastRun::Completed {
                    finished_at: report.finished_at,
                    deleted: report.deleted,
                });
            }
            Err(e) => {
                self.runs_failed += 1;
                self.last_run = Some(LastRun::Failed {
                    at: Utc::now(),
                    stage: e.stage,
                    error: e.source.to_string(),
                });
            }
        }
    }
}

type SharedStats = Arc<Mutex<SchedulerStats>>;

fn with_stats<T>(stats: &SharedStats, f: impl FnOnce(&mut SchedulerStats) -> T) -> T {
    // Stats are plain counters; a panic mid-update cannot leave them unusable.
    let mut guard = stats.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

enum Command {
    Trigger { reply: Sender<SweepOutcome> },
}

/// Handle returned by [`SweepScheduler::trigger`].
pub struct SweepHandle {
    rx: Receiver<SweepOutcome>,
}

impl SweepHandle {
    /// Waits for the triggered sweep to finish.
    ///
    /// # Errors
    /// `Sweep` if the sweep aborted, `Scheduler(Stopped)` if the worker
    /// went away before replying.
    pub fn join(self) -> LeadsweepResult<SweepReport> {
        let outcome = self.rx.recv().map_err(|_| SchedulerError::Stopped)?;
        Ok(outcome?)
    }

    /// Waits for the triggered sweep with a timeout.
    ///
    /// # Errors
    /// As [`Self::join`], plus `Scheduler(Timeout)` if the sweep has not
    /// finished in time.
    pub fn join_timeout(self, timeout: Duration) -> LeadsweepResult<SweepReport> {
        let outcome = self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SchedulerError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => SchedulerError::Stopped,
        })?;
        Ok(outcome?)
    }
}

fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

fn run_sweep(sweeper: &Sweeper, stats: &SharedStats, cause: &'static str) -> SweepOutcome {
    debug!(cause, "starting sweep");
    let outcome = sweeper.run();
    with_stats(stats, |s| s.record(&outcome));
    outcome
}

fn worker_loop(sweeper: &Sweeper, schedule: &Schedule, rx: &Receiver<Command>, stats: &SharedStats) {
    let mut next = schedule.next_after(Utc::now());
    with_stats(stats, |s| s.next_run = next);

    loop {
        let timer = next.map_or_else(never, |at| after(until(at)));

        select! {
            recv(rx) -> msg => match msg {
                Ok(Command::Trigger { reply }) => {
                    let outcome = run_sweep(sweeper, stats, "trigger");
                    let _ = reply.send(outcome);
                }
                Err(_) => break,
            },
            recv(timer) -> _ => {
                let _ = run_sweep(sweeper, stats, "schedule");
                next = schedule.next_after(Utc::now());
                with_stats(stats, |s| s.next_run = next);
                if let Some(at) = next {
                    debug!(next_run = %at, "next sweep scheduled");
                }
            }
        }
    }
}

/// Owned background worker that runs sweeps on a schedule.
///
/// Dropping the scheduler stops it, waiting for an in-flight sweep.
pub struct SweepScheduler {
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    stats: SharedStats,
    schedule: Schedule,
}

impl SweepScheduler {
    /// Spawns the worker thread.
    ///
    /// # Errors
    /// `Spawn` if the OS refuses to create the thread.
    pub fn start(sweeper: Sweeper, schedule: Schedule) -> Result<Self, SchedulerError> {
        let (tx, rx) = bounded::<Command>(TRIGGER_QUEUE_CAPACITY);
        let stats: SharedStats = Arc::default();

        let worker_stats = Arc::clone(&stats);
        let worker_schedule = schedule.clone();
        let worker = thread::Builder::new()
            .name("leadsweep-scheduler".to_string())
            .spawn(move || worker_loop(&sweeper, &worker_schedule, &rx, &worker_stats))
            .map_err(|e| SchedulerError::Spawn { message: e.to_string() })?;

        info!(schedule = %schedule, "sweep scheduler started");

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            stats,
            schedule,
        })
    }

    /// Queues a sweep to run now on the worker.
    ///
    /// # Errors
    /// `QueueFull` if too many triggers are pending, `Stopped` if the worker
    /// is gone.
    pub fn trigger(&self) -> Result<SweepHandle, SchedulerError> {
        let tx = self.tx.as_ref().ok_or(SchedulerError::Stopped)?;
        let (reply, rx) = bounded::<SweepOutcome>(1);
        match tx.try_send(Command::Trigger { reply }) {
            Ok(()) => Ok(SweepHandle { rx }),
            Err(TrySendError::Full(_)) => Err(SchedulerError::QueueFull {
                capacity: TRIGGER_QUEUE_CAPACITY,
            }),
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Stopped),
        }
    }

    /// Triggers a sweep and waits for it.
    ///
    /// # Errors
    /// See [`Self::trigger`] and [`SweepHandle::join`].
    pub fn run_now(&self) -> LeadsweepResult<SweepReport> {
        self.trigger()?.join()
    }

    /// A snapshot of the worker's counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        with_stats(&self.stats, |s| s.clone())
    }

    /// The schedule the worker follows.
    #[must_use]
    pub const fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Stops the worker. Pending triggers run first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Closing the channel ends the worker loop once the queue drains.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("sweep scheduler stopped");
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
