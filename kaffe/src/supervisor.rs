//! Observer supervision.
//!
//! The [`Supervisor`] owns the observer set for the lifetime of the process.
//! It moves through four states:
//!
//! ```text
//! Initializing ──> Running ──> Draining ──> Stopped
//! ```
//!
//! - **Initializing**: every observer's descriptor is registered. A duplicate
//!   or invalid metric name aborts startup before any task exists.
//! - **Running**: each observer gets a worker task driving
//!   [`Observer::run`] and a poll task calling [`Observer::observe`] on a
//!   fixed cadence. Poll ticks that are missed while `observe()` is still
//!   running are skipped, so calls on one observer never overlap. Any task
//!   error is reported to a capacity-one [`FailureSignal`].
//! - **Draining**: entered on a termination signal or the first failure,
//!   whichever comes first. All tasks are told to shut down, `stop()` is
//!   called on every observer in registration order, and tasks still alive
//!   after the drain timeout are aborted.
//! - **Stopped**: [`Supervisor::run`] returns a [`DrainReport`]. There is no
//!   restart.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kaffe_exporter::{MetricRegistry, RegistryError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ObserverError;
use crate::observer::Observer;

/// Default time to wait for tasks after all observers were stopped.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle states of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// What a supervised task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// An observer's long-lived `run()`.
    Worker,
    /// An observer's periodic `observe()`.
    Poller,
    /// A process service whose failure is fatal (the metrics server).
    Service,
    /// A task whose failure is only logged (the alert watcher).
    Peripheral,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "worker"),
            TaskKind::Poller => write!(f, "poller"),
            TaskKind::Service => write!(f, "service"),
            TaskKind::Peripheral => write!(f, "peripheral"),
        }
    }
}

/// A runtime error attributed to the task that raised it.
#[derive(Debug, Error)]
#[error("{task} '{name}' failed: {error}")]
pub struct TaskFailure {
    pub name: String,
    pub task: TaskKind,
    pub error: anyhow::Error,
}

impl TaskFailure {
    pub fn new(name: impl Into<String>, task: TaskKind, error: impl Into<anyhow::Error>) -> Self {
        Self {
            name: name.into(),
            task,
            error: error.into(),
        }
    }
}

/// Single-slot conduit for the first runtime failure.
///
/// Reports never block. Once the slot holds a failure every later report is
/// discarded, so the supervisor only ever sees the first one.
#[derive(Debug, Clone)]
pub struct FailureSignal {
    tx: mpsc::Sender<TaskFailure>,
}

impl FailureSignal {
    /// Create the signal and its receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<TaskFailure>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Report a failure. Returns `false` if it was discarded.
    pub fn report(&self, failure: TaskFailure) -> bool {
        match self.tx.try_send(failure) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(failure))
            | Err(mpsc::error::TrySendError::Closed(failure)) => {
                debug!(
                    name = %failure.name,
                    task = %failure.task,
                    "Failure discarded, shutdown already triggered"
                );
                false
            }
        }
    }
}

/// Why the supervisor left `Running`.
#[derive(Debug)]
pub enum ShutdownCause {
    /// SIGINT, SIGTERM or the caller's shutdown future.
    Signal,
    /// The first task failure.
    Failure(TaskFailure),
}

/// An observer whose `stop()` returned an error.
#[derive(Debug)]
pub struct StopFailure {
    pub name: String,
    pub error: ObserverError,
}

/// Outcome of a completed drain.
#[derive(Debug)]
pub struct DrainReport {
    pub cause: ShutdownCause,
    /// Observers `stop()` was called on, in call order.
    pub stopped: Vec<String>,
    pub stop_failures: Vec<StopFailure>,
    /// Tasks still running at the drain timeout.
    pub aborted: usize,
}

impl DrainReport {
    /// The failure that triggered the drain, if any.
    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.cause {
            ShutdownCause::Failure(failure) => Some(failure),
            ShutdownCause::Signal => None,
        }
    }

    /// Consume the report into a process result.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.cause {
            ShutdownCause::Signal => Ok(()),
            ShutdownCause::Failure(failure) => Err(anyhow::Error::new(failure)),
        }
    }
}

struct TrackedTask {
    name: String,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Runs the observer set until a termination signal or the first failure.
pub struct Supervisor<O: Observer> {
    observers: Vec<Arc<O>>,
    poll_interval: Duration,
    drain_timeout: Duration,
    signal: FailureSignal,
    failures: mpsc::Receiver<TaskFailure>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<TrackedTask>,
    state: SupervisorState,
}

impl<O: Observer> Supervisor<O> {
    /// Register every observer's descriptor and prepare the supervisor.
    ///
    /// Observers keep the order given here for polling and for `stop()`.
    pub fn new(
        observers: Vec<O>,
        registry: &mut MetricRegistry,
        poll_interval: Duration,
    ) -> Result<Self, RegistryError> {
        for observer in &observers {
            let descriptor = observer.descriptor();
            registry.register(&descriptor)?;
            info!(
                observer = %observer.name(),
                metric = %descriptor.name(),
                "Registered observer"
            );
        }

        let (signal, failures) = FailureSignal::channel();
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            observers: observers.into_iter().map(Arc::new).collect(),
            poll_interval,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            signal,
            failures,
            shutdown,
            tasks: Vec::new(),
            state: SupervisorState::Initializing,
        })
    }

    /// Set how long draining waits for tasks before aborting them.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn observers(&self) -> &[Arc<O>] {
        &self.observers
    }

    /// Receiver flipped to `true` when draining starts.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawn a service whose error triggers a drain.
    pub fn spawn_service<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let signal = self.signal.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            match future.await {
                Ok(()) => debug!(service = %task_name, "Service stopped"),
                Err(e) => {
                    error!(service = %task_name, error = %e, "Service failed");
                    signal.report(TaskFailure::new(task_name, TaskKind::Service, e));
                }
            }
        });

        self.track(name, TaskKind::Service, handle);
    }

    /// Spawn a task whose outcome is only logged.
    pub fn spawn_peripheral<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            match future.await {
                Ok(()) => debug!(task = %task_name, "Peripheral task stopped"),
                Err(e) => warn!(task = %task_name, error = %e, "Peripheral task failed"),
            }
        });

        self.track(name, TaskKind::Peripheral, handle);
    }

    fn track(&mut self, name: String, kind: TaskKind, handle: JoinHandle<()>) {
        self.tasks.push(TrackedTask { name, kind, handle });
    }

    fn transition(&mut self, to: SupervisorState) {
        debug!(from = ?self.state, to = ?to, "Supervisor state change");
        self.state = to;
    }

    /// Run until SIGINT, SIGTERM or the first failure, then drain.
    pub async fn run(self) -> DrainReport {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or the first failure, then drain.
    pub async fn run_until<F>(mut self, shutdown: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        self.transition(SupervisorState::Running);

        for observer in self.observers.clone() {
            self.spawn_observer(observer);
        }

        info!(
            observers = self.observers.len(),
            tasks = self.tasks.len(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "Supervisor running"
        );

        let cause = tokio::select! {
            _ = shutdown => {
                info!("Termination requested, draining");
                ShutdownCause::Signal
            }
            Some(failure) = self.failures.recv() => {
                error!(
                    name = %failure.name,
                    task = %failure.task,
                    error = %failure.error,
                    "Task failed, draining"
                );
                ShutdownCause::Failure(failure)
            }
        };

        self.drain(cause).await
    }

    fn spawn_observer(&mut self, observer: Arc<O>) {
        let name = observer.name().to_string();

        let worker = {
            let observer = observer.clone();
            let signal = self.signal.clone();
            let name = name.clone();
            tokio::spawn(async move {
                debug!(observer = %name, "Starting observer worker");
                match observer.run().await {
                    Ok(()) => debug!(observer = %name, "Observer worker stopped"),
                    Err(e) => {
                        error!(observer = %name, error = %e, "Observer worker failed");
                        signal.report(TaskFailure::new(name, TaskKind::Worker, e));
                    }
                }
            })
        };
        self.track(name.clone(), TaskKind::Worker, worker);

        let poller = tokio::spawn(poll_loop(
            observer,
            self.poll_interval,
            self.signal.clone(),
            self.shutdown.subscribe(),
        ));
        self.track(name, TaskKind::Poller, poller);
    }

    async fn drain(mut self, cause: ShutdownCause) -> DrainReport {
        self.transition(SupervisorState::Draining);
        self.shutdown.send_replace(true);

        let mut stopped = Vec::with_capacity(self.observers.len());
        let mut stop_failures = Vec::new();

        for observer in &self.observers {
            let name = observer.name().to_string();
            match observer.stop() {
                Ok(()) => debug!(observer = %name, "Observer stopped"),
                Err(e) => {
                    error!(observer = %name, error = %e, "Could not stop observer");
                    stop_failures.push(StopFailure {
                        name: name.clone(),
                        error: e,
                    });
                }
            }
            stopped.push(name);
        }

        let tasks = std::mem::take(&mut self.tasks);
        let abort_handles: Vec<_> = tasks
            .iter()
            .map(|t| (t.name.clone(), t.kind, t.handle.abort_handle()))
            .collect();

        let joined = tokio::time::timeout(self.drain_timeout, async move {
            for task in tasks {
                if let Err(e) = task.handle.await {
                    warn!(task = %task.name, kind = %task.kind, error = %e, "Task panicked");
                }
            }
        })
        .await;

        let mut aborted = 0;
        if joined.is_err() {
            for (name, kind, handle) in &abort_handles {
                if !handle.is_finished() {
                    warn!(
                        task = %name,
                        kind = %kind,
                        "Task still running at drain timeout, aborting"
                    );
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        self.transition(SupervisorState::Stopped);
        info!(
            stopped = stopped.len(),
            stop_failures = stop_failures.len(),
            aborted,
            "Supervisor stopped"
        );

        DrainReport {
            cause,
            stopped,
            stop_failures,
            aborted,
        }
    }
}

/// Call `observe()` on a fixed cadence until shutdown.
///
/// The first call happens immediately and later calls are due on multiples
/// of `interval` from the start. `observe()` is awaited in place, so a call
/// longer than the interval skips every grid point it ran past and the next
/// call waits for the following one.
async fn poll_loop<O: Observer>(
    observer: Arc<O>,
    interval: Duration,
    signal: FailureSignal,
    mut shutdown: watch::Receiver<bool>,
) {
    // A zero period would never advance the grid.
    let interval = interval.max(Duration::from_millis(1));
    let mut next = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next) => {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = observer.observe().await {
                    error!(observer = %observer.name(), error = %e, "Observe failed");
                    signal.report(TaskFailure::new(observer.name(), TaskKind::Poller, e));
                }
                next = next_tick(next, interval, Instant::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!(observer = %observer.name(), "Poller stopped");
}

/// First grid point after `now`, stepping from `last` by `interval`.
fn next_tick(last: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = last + interval;
    while next <= now {
        next += interval;
    }
    next
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
