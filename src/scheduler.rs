//! Single-flight polling loop.
//!
//! The [`Scheduler`] starts one cycle immediately, then one per timer tick.
//! While a cycle is in flight, ticks are dropped rather than queued, so at
//! most one cycle ever runs at a time. Shutdown stops the timer first and
//! then waits for the in-flight cycle to finish on its own.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// One unit of periodic work.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    type Output: fmt::Debug + Send + 'static;
    type Error: fmt::Display + Send + 'static;

    async fn run_cycle(&self) -> Result<Self::Output, Self::Error>;
}

/// Counters collected over the lifetime of a scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    /// Includes cycles that panicked
    pub cycles_failed: u64,
    /// Ticks dropped because a cycle was still running
    pub ticks_skipped: u64,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler task ended abnormally: {0}")]
    Join(#[from] JoinError),
}

/// Cloneable one-shot trigger for stopping a scheduler.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Request shutdown. Returns `true` only for the call that actually
    /// flipped the signal; later calls are no-ops.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Handle to a scheduler running on its own task.
pub struct SchedulerHandle {
    signal: ShutdownSignal,
    task: JoinHandle<SchedulerReport>,
}

impl SchedulerHandle {
    /// Stop starting new cycles. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.signal.trigger();
    }

    /// A trigger that can be moved into another task, e.g. a signal listener.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Wait until the scheduler has stopped and drained its in-flight cycle.
    pub async fn wait(self) -> Result<SchedulerReport, SchedulerError> {
        // Keep the sender alive until the loop has exited
        let _signal = self.signal;
        Ok(self.task.await?)
    }
}

type CycleResult<R> = Result<<R as CycleRunner>::Output, <R as CycleRunner>::Error>;

pub struct Scheduler<R: CycleRunner> {
    runner: Arc<R>,
    interval: Duration,
    /// The single-flight slot
    current_cycle: Option<JoinHandle<CycleResult<R>>>,
    report: SchedulerReport,
}

impl<R: CycleRunner> Scheduler<R> {
    /// `interval` is clamped to at least 1ms.
    pub fn new(runner: Arc<R>, interval: Duration) -> Self {
        Self {
            runner,
            interval: interval.max(Duration::from_millis(1)),
            current_cycle: None,
            report: SchedulerReport::default(),
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self) -> SchedulerHandle {
        let (signal, rx) = ShutdownSignal::new();
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { signal, task }
    }

    /// Run the loop on the current task until `shutdown` flips to `true`
    /// (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerReport {
        if *shutdown.borrow() {
            tracing::debug!("Shutdown requested before first cycle");
            return self.report;
        }

        tracing::info!(interval = ?self.interval, "Collecting feeds");
        self.start_cycle();

        // First tick one full period after the immediate cycle
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut shutdown) => {
                    tracing::info!("Shutdown requested, timer stopped");
                    break;
                }

                result = wait_for_cycle(&mut self.current_cycle) => {
                    self.current_cycle = None;
                    self.record(result);
                }

                _ = ticker.tick() => {
                    if self.current_cycle.is_some() {
                        self.report.ticks_skipped += 1;
                        tracing::debug!("Previous cycle still running, skipping tick");
                    } else {
                        self.start_cycle();
                    }
                }
            }
        }

        drop(ticker);

        if let Some(cycle) = self.current_cycle.take() {
            tracing::info!("Waiting for in-flight cycle to finish");
            let result = cycle.await;
            self.record(result);
        }

        tracing::info!(
            started = self.report.cycles_started,
            succeeded = self.report.cycles_succeeded,
            failed = self.report.cycles_failed,
            skipped_ticks = self.report.ticks_skipped,
            "Scheduler stopped"
        );
        self.report
    }

    fn start_cycle(&mut self) {
        let runner = Arc::clone(&self.runner);
        self.report.cycles_started += 1;
        self.current_cycle = Some(tokio::spawn(async move { runner.run_cycle().await }));
    }

    fn record(&mut self, result: Result<CycleResult<R>, JoinError>) {
        match result {
            Ok(Ok(output)) => {
                self.report.cycles_succeeded += 1;
                tracing::debug!(?output, "Cycle complete");
            }
            Ok(Err(e)) => {
                self.report.cycles_failed += 1;
                tracing::error!(error = %e, "Cycle failed");
            }
            Err(e) if e.is_panic() => {
                self.report.cycles_failed += 1;
                tracing::error!("Cycle panicked");
            }
            Err(e) => {
                self.report.cycles_failed += 1;
                tracing::error!(error = %e, "Cycle task cancelled");
            }
        }
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    // A closed channel means nobody is left to stop us; treat it as a stop
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

async fn wait_for_cycle<T>(slot: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Trigger `shutdown` on SIGINT or SIGTERM.
///
/// Only the first signal starts shutdown; repeats are logged and ignored
/// while the in-flight cycle drains. The listener runs until the returned
/// task is aborted.
pub fn listen_for_termination(shutdown: ShutdownSignal) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let sigterm_fut = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_fut = std::future::pending::<Option<()>>();

            let name = tokio::select! {
                biased;
                Some(_) = sigterm_fut => "SIGTERM",
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for SIGINT");
                        return;
                    }
                    "SIGINT"
                }
            };

            if shutdown.trigger() {
                tracing::info!(signal = name, "Received {name}, finishing current cycle");
            } else {
                tracing::warn!(signal = name, "Shutdown already in progress, ignoring {name}");
            }
        }
    }))
}
