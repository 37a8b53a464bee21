//! Concurrent batch decompilation.
//!
//! [`BatchExecutor::start`] fans one task per class name out over a rayon pool and
//! schedules a timeout for each on a [`TimeoutTimer`]. The worker and the timeout of
//! a task race on the task's [`SettleFlag`]: the first one to flip it records the
//! result (real source, failure stub or timeout stub) and reports progress, the
//! other does nothing. A worker still running when its timeout fires is asked to
//! stop through its [`CancelToken`]; if the backend ignores that, the thread runs
//! to completion in the background and its result is dropped.
//!
//! The batch finishes once every name has settled. The pool and the timer are torn
//! down on every exit path, including [`BatchHandle::abort`].

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendFactory, CancelToken, DecompilerBackend};
use crate::error::{BatchError, DecompileError};
use crate::progress::Progress;
use crate::source::{failure_stub, timeout_stub, unescape_unicode};
use crate::state::{BatchReport, BatchSnapshot, BatchState, SettleFlag, TaskResult};
use crate::timer::TimeoutTimer;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

// Upper bound on waiting for a batch; past it the batch counts as aborted.
const MAX_BATCH_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BatchConfig {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self { workers, timeout }.clamped()
    }

    /// Workers in `1..=available_parallelism()`, timeout at least [`MIN_TIMEOUT`].
    pub fn clamped(self) -> Self {
        Self {
            workers: self.workers.clamp(1, available_parallelism()),
            timeout: self.timeout.max(MIN_TIMEOUT),
        }
    }
}

pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Pending,
    Running,
    Completed,
    Aborted,
}

/// Final state of a batch that ran to completion.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub snapshot: BatchSnapshot,
    pub elapsed: Duration,
}

impl BatchOutcome {
    pub fn report(&self) -> BatchReport {
        self.snapshot.report(self.elapsed)
    }
}

struct Task {
    name: String,
    submitted: Instant,
    settled: SettleFlag,
    cancel: CancelToken,
}

impl Task {
    fn new(name: String) -> Self {
        Self {
            name,
            submitted: Instant::now(),
            settled: SettleFlag::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Records `result` if this is the first settlement of the task.
    fn settle(&self, state: &BatchState, result: TaskResult, duration: Duration) -> Option<Progress> {
        if !self.settled.try_settle() {
            return None;
        }
        state.record(&self.name, result, duration)
    }
}

#[derive(Clone)]
enum BackendSource {
    Shared(Arc<dyn DecompilerBackend>),
    PerTask(Arc<dyn BackendFactory>),
}

impl BackendSource {
    fn acquire(&self) -> Result<Arc<dyn DecompilerBackend>, DecompileError> {
        match self {
            Self::Shared(backend) => Ok(Arc::clone(backend)),
            Self::PerTask(factory) => factory.create().map(Arc::from),
        }
    }
}

type ProgressCallback = dyn Fn(Progress) + Send + Sync;

struct Shared {
    state: BatchState,
    config: BatchConfig,
    tasks: Vec<Arc<Task>>,
    on_progress: Box<ProgressCallback>,
    delivery: Mutex<()>,
    phase: Mutex<BatchPhase>,
    signal: Condvar,
    abort_requested: AtomicBool,
}

impl Shared {
    fn settle(&self, task: &Task, result: TaskResult, duration: Duration) -> bool {
        // Held from record to callback so reports reach the caller in completion order.
        let delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let Some(progress) = task.settle(&self.state, result, duration) else {
            return false;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| (self.on_progress)(progress))).is_err() {
            error!(class = %task.name, "progress callback panicked");
        }
        drop(delivery);
        self.notify();
        true
    }

    fn notify(&self) {
        let _phase = self.lock_phase();
        self.signal.notify_all();
    }

    fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
        self.notify();
    }

    fn lock_phase(&self) -> MutexGuard<'_, BatchPhase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn phase(&self) -> BatchPhase {
        *self.lock_phase()
    }

    fn set_phase(&self, phase: BatchPhase) {
        *self.lock_phase() = phase;
    }

    /// Blocks until every task settled, an abort was requested, or the wait bound ran out.
    fn wait_settled(&self) -> BatchPhase {
        let deadline = Instant::now() + MAX_BATCH_WAIT;
        let mut phase = self.lock_phase();
        loop {
            if self.abort_requested.load(Ordering::Acquire) {
                *phase = BatchPhase::Aborted;
                break;
            }
            if self.state.is_complete() {
                *phase = BatchPhase::Completed;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                error!("batch did not settle within {MAX_BATCH_WAIT:?}");
                *phase = BatchPhase::Aborted;
                break;
            }
            phase = match self.signal.wait_timeout(phase, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *phase
    }

    fn cancel_outstanding(&self) {
        for task in &self.tasks {
            if !task.settled.is_settled() {
                task.cancel.cancel();
            }
        }
    }
}

/// Runs batches of decompilation tasks with one backend configuration.
#[derive(Clone)]
pub struct BatchExecutor {
    config: BatchConfig,
    factory: Arc<dyn BackendFactory>,
}

impl BatchExecutor {
    pub fn new(config: BatchConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            config: config.clamped(),
            factory,
        }
    }

    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Submits one task per name (in sorted order) and returns without waiting.
    ///
    /// `on_progress` is called from worker and timer threads after each settlement.
    /// `on_complete` is called once, from the batch thread, when every name has
    /// settled; it is never called for an aborted batch.
    pub fn start<P, C>(
        &self,
        names: impl IntoIterator<Item = String>,
        on_progress: P,
        on_complete: C,
    ) -> Result<BatchHandle, BatchError>
    where
        P: Fn(Progress) + Send + Sync + 'static,
        C: FnOnce(&BatchOutcome) + Send + 'static,
    {
        let config = self.config;
        let names: BTreeSet<String> = names.into_iter().collect();

        let probe = self.factory.create().map_err(BatchError::Backend)?;
        let backend = if probe.requires_fresh_instance_per_task() {
            BackendSource::PerTask(Arc::clone(&self.factory))
        } else {
            BackendSource::Shared(Arc::from(probe))
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("decompile-worker-{i}"))
            .panic_handler(|_| error!("decompile worker panicked"))
            .build()?;
        let timer = TimeoutTimer::new().map_err(BatchError::Spawn)?;

        let tasks: Vec<Arc<Task>> = names.into_iter().map(|n| Arc::new(Task::new(n))).collect();
        let shared = Arc::new(Shared {
            state: BatchState::new(tasks.len()),
            config,
            tasks,
            on_progress: Box::new(on_progress),
            delivery: Mutex::new(()),
            phase: Mutex::new(BatchPhase::Pending),
            signal: Condvar::new(),
            abort_requested: AtomicBool::new(false),
        });

        info!(
            classes = shared.tasks.len(),
            workers = config.workers,
            timeout_secs = config.timeout.as_secs(),
            fresh_instance_per_task = matches!(backend, BackendSource::PerTask(_)),
            "starting batch decompile"
        );

        let started = Instant::now();
        for task in &shared.tasks {
            submit(&pool, &timer, &shared, task, &backend);
        }
        shared.set_phase(BatchPhase::Running);

        let batch = Arc::clone(&shared);
        let orchestrator = std::thread::Builder::new()
            .name("batch-orchestrator".to_string())
            .spawn(move || orchestrate(batch, pool, timer, started, on_complete))
            .map_err(|e| {
                shared.request_abort();
                shared.cancel_outstanding();
                BatchError::Spawn(e)
            })?;

        Ok(BatchHandle {
            shared,
            orchestrator,
        })
    }

    /// [`start`](Self::start) followed by [`BatchHandle::wait`].
    pub fn run<P>(&self, names: impl IntoIterator<Item = String>, on_progress: P) -> Result<BatchOutcome, BatchError>
    where
        P: Fn(Progress) + Send + Sync + 'static,
    {
        self.start(names, on_progress, |_| {})?.wait()
    }
}

fn submit(
    pool: &ThreadPool,
    timer: &TimeoutTimer,
    shared: &Arc<Shared>,
    task: &Arc<Task>,
    backend: &BackendSource,
) {
    {
        let shared = Arc::clone(shared);
        let task = Arc::clone(task);
        let backend = backend.clone();
        pool.spawn(move || run_task(&shared, &task, &backend));
    }

    let shared = Arc::clone(shared);
    let task = Arc::clone(task);
    let deadline = task.submitted + shared.config.timeout;
    timer.schedule(deadline, move || expire_task(&shared, &task));
}

fn run_task(shared: &Shared, task: &Task, backend: &BackendSource) {
    if task.settled.is_settled() || task.cancel.is_cancelled() {
        debug!(class = %task.name, "skipping task that settled before it started");
        return;
    }

    debug!(class = %task.name, "decompiling");
    let started = Instant::now();
    let result = match backend.acquire().and_then(|b| invoke(&*b, task)) {
        Ok(source) => TaskResult::Success(unescape_unicode(&source)),
        Err(err) => {
            if task.cancel.is_cancelled() {
                debug!(class = %task.name, error = %err, "worker stopped after cancellation");
            } else {
                warn!(class = %task.name, error = %err, "class failed to decompile");
            }
            TaskResult::Failure {
                placeholder: failure_stub(&task.name),
                cause: err.to_string(),
            }
        }
    };

    if !shared.settle(task, result, started.elapsed()) {
        debug!(class = %task.name, "discarding result of a task that already timed out");
    }
}

fn invoke(backend: &dyn DecompilerBackend, task: &Task) -> Result<String, DecompileError> {
    panic::catch_unwind(AssertUnwindSafe(|| backend.decompile(&task.name, &task.cancel)))
        .unwrap_or_else(|payload| Err(DecompileError::Panicked(panic_message(&*payload))))
}

fn expire_task(shared: &Shared, task: &Task) {
    let timeout = shared.config.timeout;
    if shared.settle(task, TaskResult::TimedOut(timeout_stub(&task.name)), timeout) {
        task.cancel.cancel();
        warn!(
            class = %task.name,
            timeout_secs = timeout.as_secs(),
            "class took too long to decompile"
        );
    }
}

fn orchestrate<C>(
    shared: Arc<Shared>,
    pool: ThreadPool,
    mut timer: TimeoutTimer,
    started: Instant,
    on_complete: C,
) -> Result<BatchOutcome, BatchError>
where
    C: FnOnce(&BatchOutcome),
{
    let phase = shared.wait_settled();

    shared.cancel_outstanding();
    timer.shutdown();
    drop(pool);

    if phase != BatchPhase::Completed {
        warn!(
            settled = shared.state.completed(),
            total = shared.state.total(),
            "batch decompile aborted"
        );
        return Err(BatchError::Aborted);
    }

    let outcome = BatchOutcome {
        snapshot: shared.state.snapshot(),
        elapsed: started.elapsed(),
    };
    info!(
        classes = outcome.snapshot.total,
        failed = outcome.snapshot.failed.len(),
        elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        "batch decompile finished"
    );
    on_complete(&outcome);
    Ok(outcome)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

/// Running batch. Dropping it detaches the batch, which still runs to completion.
pub struct BatchHandle {
    shared: Arc<Shared>,
    orchestrator: JoinHandle<Result<BatchOutcome, BatchError>>,
}

impl BatchHandle {
    pub fn progress(&self) -> Progress {
        self.shared.state.progress()
    }

    pub fn phase(&self) -> BatchPhase {
        self.shared.phase()
    }

    /// Interrupts the wait for outstanding tasks and asks them to stop.
    /// [`wait`](Self::wait) then returns [`BatchError::Aborted`].
    pub fn abort(&self) {
        self.shared.request_abort();
    }

    pub fn wait(self) -> Result<BatchOutcome, BatchError> {
        match self.orchestrator.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
