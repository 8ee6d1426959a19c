//! Worker thread controller and timeout supervisor

use super::config::ControllerConfig;
use super::worker::{WorkerOptions, WorkerSnapshot, WorkerState, WorkerThread};
use crate::core::{
    CancellationReason, CancellationToken, Job, JobCallback, Result, ThreadError, TimeoutPolicy,
    WorkFn,
};
use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// State shared between the controller handle and its supervisor thread
struct Shared<P> {
    config: ControllerConfig,
    workers: RwLock<Vec<Arc<WorkerThread<P>>>>,
    queue: Arc<JobQueue<P>>,
    started: AtomicBool,
    stop_requested: AtomicBool,
    supervisor_running: AtomicBool,
    token: CancellationToken,
    next_worker_id: AtomicUsize,
    timeouts: AtomicU64,
}

impl<P: Send + Sync + 'static> Shared<P> {
    fn workers(&self) -> Vec<Arc<WorkerThread<P>>> {
        self.workers.read().clone()
    }

    fn all_children_done(&self) -> bool {
        self.workers.read().iter().all(|w| w.is_done())
    }
}

/// Owns a set of worker threads sharing one job queue and supervises their
/// per-job running time
///
/// ```rust
/// use supervised_thread_pool::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> Result<()> {
/// let controller = WorkerThreadController::with_config(
///     ControllerConfig::new("doc").with_wait_for_jobs(false),
/// )?;
/// for _ in 0..2 {
///     controller.add_worker_thread(WorkerOptions::new(|_job: &std::sync::Arc<Job<u32>>| Ok(())))?;
/// }
/// let job = controller.submit(7);
/// controller.start()?;
///
/// while controller.is_running() {
///     std::thread::sleep(Duration::from_millis(10));
/// }
/// assert_eq!(job.state(), JobState::Done);
/// controller.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct WorkerThreadController<P: Send + Sync + 'static> {
    shared: Arc<Shared<P>>,
    supervisor: Mutex<Option<thread::JoinHandle<()>>>,
    wake: Mutex<Option<Sender<()>>>,
}

impl<P: Send + Sync + 'static> std::fmt::Debug for WorkerThreadController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThreadController")
            .field("name", &self.shared.config.name)
            .field("workers", &self.worker_count())
            .field("pending", &self.shared.queue.len())
            .field("started", &self.shared.started.load(Ordering::Relaxed))
            .field("stop_requested", &self.shared.stop_requested.load(Ordering::Relaxed))
            .finish()
    }
}

impl<P: Send + Sync + 'static> Default for WorkerThreadController<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> WorkerThreadController<P> {
    /// Create a controller with the default configuration
    pub fn new() -> Self {
        Self::build(ControllerConfig::default())
    }

    /// Create a controller with a custom configuration
    ///
    /// # Errors
    ///
    /// `ThreadError::InvalidConfig` if the configuration does not validate.
    pub fn with_config(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ControllerConfig) -> Self {
        let queue = Arc::new(JobQueue::with_block_size(config.queue_block_size));
        Self {
            shared: Arc::new(Shared {
                config,
                workers: RwLock::new(Vec::new()),
                queue,
                started: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                supervisor_running: AtomicBool::new(false),
                token: CancellationToken::new(),
                next_worker_id: AtomicUsize::new(0),
                timeouts: AtomicU64::new(0),
            }),
            supervisor: Mutex::new(None),
            wake: Mutex::new(None),
        }
    }

    /// Register a worker thread
    ///
    /// The worker stays `Initialised` until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// `ThreadError::AlreadyRunning` once the controller has been started, and
    /// `ThreadError::InvalidConfig` for an `Explicit` timeout of zero.
    pub fn add_worker_thread(&self, options: WorkerOptions<P>) -> Result<Arc<WorkerThread<P>>> {
        options.validate()?;
        let mut workers = self.shared.workers.write();
        if self.shared.started.load(Ordering::Acquire) {
            return Err(ThreadError::already_running(
                &self.shared.config.name,
                workers.len(),
            ));
        }

        let id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.shared.config.thread_name_prefix, id);
        let worker = WorkerThread::new(
            id,
            name,
            options,
            self.shared.token.child(),
            self.shared.config.wait_for_jobs,
        );
        workers.push(Arc::clone(&worker));
        debug!(
            "controller '{}': registered worker {} ({})",
            self.shared.config.name,
            id,
            worker.timeout()
        );
        Ok(worker)
    }

    /// Register a worker from a work function, optional callbacks and a policy
    ///
    /// # Errors
    ///
    /// Same as [`add_worker_thread`](Self::add_worker_thread).
    pub fn add_worker(
        &self,
        work: WorkFn<P>,
        on_success: Option<JobCallback<P>>,
        on_failure: Option<JobCallback<P>>,
        timeout: TimeoutPolicy,
    ) -> Result<Arc<WorkerThread<P>>> {
        self.add_worker_thread(WorkerOptions::from_parts(
            work, on_success, on_failure, timeout,
        ))
    }

    /// Enqueue a job; allowed before and after start
    pub fn submit(&self, payload: P) -> Arc<Job<P>> {
        let job = self.shared.queue.enqueue(payload);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_submission(self.shared.queue.len());

        job
    }

    /// Launch every registered worker and the supervisor
    ///
    /// Workers that are no longer `Initialised` (for example killed before
    /// start) are marked `Killed` and skipped.
    ///
    /// # Errors
    ///
    /// - `ThreadError::NoWorkers` if no worker is registered
    /// - `ThreadError::AlreadyRunning` if already started
    /// - `ThreadError::SpawnError` if an OS thread cannot be created; the
    ///   workers launched so far are stopped
    pub fn start(&self) -> Result<()> {
        let workers = {
            let workers = self.shared.workers.write();
            if workers.is_empty() {
                return Err(ThreadError::no_workers(&self.shared.config.name));
            }
            if self
                .shared
                .started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(ThreadError::already_running(
                    &self.shared.config.name,
                    workers.len(),
                ));
            }
            workers.clone()
        };

        let poll_interval = self.shared.config.worker_poll_interval;
        for worker in &workers {
            if worker.state() != WorkerState::Initialised {
                warn!(
                    "controller '{}': worker {} is {}, skipping",
                    self.shared.config.name,
                    worker.id(),
                    worker.state()
                );
                worker.mark_killed();
                continue;
            }
            if let Err(e) = worker.launch(Arc::clone(&self.shared.queue), poll_interval) {
                error!("controller '{}': {}", self.shared.config.name, e);
                self.abort_start();
                return Err(e);
            }
        }

        let (tx, rx) = channel::bounded(1);
        *self.wake.lock() = Some(tx);
        self.shared.supervisor_running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-supervisor", self.shared.config.name))
            .spawn(move || supervise(shared, rx));
        match spawned {
            Ok(handle) => *self.supervisor.lock() = Some(handle),
            Err(e) => {
                self.shared.supervisor_running.store(false, Ordering::Release);
                let err = ThreadError::spawn_with_source(
                    workers.len(),
                    "cannot spawn supervisor thread",
                    e,
                );
                error!("controller '{}': {}", self.shared.config.name, err);
                self.abort_start();
                return Err(err);
            }
        }

        info!(
            "controller '{}' started with {} workers",
            self.shared.config.name,
            workers.len()
        );

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_controller_start(workers.len());

        Ok(())
    }

    fn abort_start(&self) {
        for worker in self.shared.workers() {
            if worker.state() == WorkerState::Initialised {
                worker.mark_killed();
            }
        }
        if let Err(e) = self.stop() {
            error!(
                "controller '{}': failed to stop after aborted start: {}",
                self.shared.config.name, e
            );
        }
    }

    /// Graceful shutdown
    ///
    /// Wakes the supervisor, cancels the workers' tokens and asks every running
    /// worker to stop after its current job, then waits up to the configured
    /// grace period. A supervisor that has not exited by then is abandoned.
    /// In-flight jobs are never force-killed here; a worker still busy after
    /// the grace period exits once its job returns.
    ///
    /// Calling `stop` on a controller that was never started is a no-op.
    ///
    /// # Errors
    ///
    /// `ThreadError::JoinError` if the supervisor thread panicked. Shutdown
    /// still completes.
    pub fn stop(&self) -> Result<()> {
        if !self.shared.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let name = &self.shared.config.name;
        info!("controller '{}' stopping", name);

        self.shared.stop_requested.store(true, Ordering::Release);
        if let Some(wake) = self.wake.lock().take() {
            let _ = wake.try_send(());
        }
        self.shared
            .token
            .cancel_with_reason(CancellationReason::Shutdown);

        let workers = self.shared.workers();
        for worker in &workers {
            worker.request_stop();
        }

        let grace = self.shared.config.stop_grace_period;
        let step = self.shared.config.supervisor_tick.min(Duration::from_millis(5));
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.shared.supervisor_running.load(Ordering::Acquire)
                && self.shared.all_children_done()
            {
                break;
            }
            thread::sleep(step);
        }

        let mut outcome = Ok(());
        if let Some(handle) = self.supervisor.lock().take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("controller '{}': supervisor thread panicked", name);
                    outcome = Err(ThreadError::join(
                        workers.len(),
                        "supervisor thread panicked",
                    ));
                }
            } else {
                warn!(
                    "controller '{}': supervisor did not exit within {:?}, abandoning it",
                    name, grace
                );
                self.shared.supervisor_running.store(false, Ordering::Release);
            }
        }

        for worker in &workers {
            worker.reap();
        }

        let busy = workers.iter().filter(|w| !w.is_done()).count();
        if busy > 0 {
            warn!(
                "controller '{}': {} workers still busy after {:?}, they exit after their current job",
                name, busy, grace
            );
        }

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_controller_stop(
            workers.iter().map(|w| w.jobs_run()).sum(),
            workers.iter().map(|w| w.jobs_failed()).sum(),
            self.timeouts(),
        );

        info!("controller '{}' stopped", name);
        outcome
    }

    /// Started and at least one worker not yet terminal
    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.shared.all_children_done()
    }

    /// Every registered worker is terminal; true with no workers
    pub fn all_children_done(&self) -> bool {
        self.shared.all_children_done()
    }

    /// Request a kill of a single worker
    ///
    /// The worker exits as `Killed` after its current job; the job itself
    /// sees the cancellation through its token.
    ///
    /// # Errors
    ///
    /// `ThreadError::WorkerNotFound` for an unknown id,
    /// `ThreadError::InvalidWorkerState` if the worker already finished.
    pub fn kill_worker(&self, worker_id: usize) -> Result<()> {
        let worker = self
            .worker(worker_id)
            .ok_or_else(|| ThreadError::worker_not_found(worker_id))?;
        worker.request_kill()?;
        info!(
            "controller '{}': kill requested for worker {}",
            self.shared.config.name, worker_id
        );
        Ok(())
    }

    /// Remove every unclaimed job, marking each `Stopped`
    pub fn discard_pending(&self) -> Vec<Arc<Job<P>>> {
        let discarded = self.shared.queue.drain_pending();
        if !discarded.is_empty() {
            debug!(
                "controller '{}': discarded {} pending jobs",
                self.shared.config.name,
                discarded.len()
            );
        }
        discarded
    }

    /// Switch every worker between idling on an empty queue and finishing
    pub fn set_wait_for_jobs(&self, wait: bool) {
        for worker in self.shared.workers.read().iter() {
            worker.set_wait_for_jobs(wait);
        }
    }

    /// Worker by id
    pub fn worker(&self, worker_id: usize) -> Option<Arc<WorkerThread<P>>> {
        self.shared
            .workers
            .read()
            .iter()
            .find(|w| w.id() == worker_id)
            .cloned()
    }

    /// All registered workers in registration order
    pub fn workers(&self) -> Vec<Arc<WorkerThread<P>>> {
        self.shared.workers()
    }

    /// Number of registered workers
    pub fn worker_count(&self) -> usize {
        self.shared.workers.read().len()
    }

    /// The shared job queue
    pub fn queue(&self) -> &Arc<JobQueue<P>> {
        &self.shared.queue
    }

    /// Active configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Workers killed by the supervisor for exceeding their budget
    pub fn timeouts(&self) -> u64 {
        self.shared.timeouts.load(Ordering::Relaxed)
    }

    /// Point-in-time view of the controller and its workers
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            name: self.shared.config.name.clone(),
            started: self.shared.started.load(Ordering::Acquire),
            stop_requested: self.shared.stop_requested.load(Ordering::Acquire),
            supervisor_running: self.shared.supervisor_running.load(Ordering::Acquire),
            pending_jobs: self.shared.queue.len(),
            total_enqueued: self.shared.queue.total_enqueued(),
            total_claimed: self.shared.queue.total_claimed(),
            timeouts: self.timeouts(),
            workers: self.shared.workers().iter().map(|w| w.snapshot()).collect(),
            taken_at: Utc::now(),
        }
    }
}

impl<P: Send + Sync + 'static> Drop for WorkerThreadController<P> {
    fn drop(&mut self) {
        if self.shared.started.load(Ordering::Acquire)
            && !self.shared.stop_requested.load(Ordering::Acquire)
        {
            if let Err(e) = self.stop() {
                error!(
                    "controller '{}': failed to stop during drop: {}",
                    self.shared.config.name, e
                );
            }
        }
    }
}

/// Supervisor loop: one timeout pass per tick until stop or all workers finish
fn supervise<P: Send + Sync + 'static>(shared: Arc<Shared<P>>, wake: Receiver<()>) {
    #[cfg(feature = "tracing")]
    let supervisor_span = span!(Level::DEBUG, "supervisor", controller = %shared.config.name);
    #[cfg(feature = "tracing")]
    let _guard = supervisor_span.enter();

    let limits = shared.config.smart_limits();
    let tick = shared.config.supervisor_tick;
    debug!("supervisor for '{}' started, tick {:?}", shared.config.name, tick);

    loop {
        match wake.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if shared.stop_requested.load(Ordering::Acquire) {
            break;
        }

        let workers = shared.workers();
        for worker in &workers {
            if let Some(job) = worker.enforce_timeout(&limits) {
                shared.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "supervisor for '{}': job {} failed by timeout on worker {}",
                    shared.config.name,
                    job.id(),
                    worker.id()
                );
            }
            worker.reap();
        }

        if workers.iter().all(|w| w.is_done()) {
            debug!("supervisor for '{}': all workers finished", shared.config.name);
            break;
        }
    }

    shared.supervisor_running.store(false, Ordering::Release);
    debug!("supervisor for '{}' exited", shared.config.name);
}

/// Serializable view of a controller
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    /// Controller name
    pub name: String,
    /// Whether `start` succeeded
    pub started: bool,
    /// Whether `stop` has been called
    pub stop_requested: bool,
    /// Whether the supervisor loop is still ticking
    pub supervisor_running: bool,
    /// Unclaimed jobs
    pub pending_jobs: usize,
    /// Jobs enqueued over the controller's lifetime
    pub total_enqueued: u64,
    /// Jobs claimed over the controller's lifetime
    pub total_claimed: u64,
    /// Timeout kills
    pub timeouts: u64,
    /// Per-worker views
    pub workers: Vec<WorkerSnapshot>,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobState;

    fn noop() -> WorkerOptions<u32> {
        WorkerOptions::new(|_job| Ok(()))
    }

    fn fast_config(name: &str) -> ControllerConfig {
        ControllerConfig::new(name)
            .with_worker_poll_interval(Duration::from_millis(1))
            .with_supervisor_tick(Duration::from_millis(5))
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_empty_controller() {
        let controller: WorkerThreadController<u32> = WorkerThreadController::new();
        assert!(controller.all_children_done());
        assert!(!controller.is_running());
        // is_running has no side effects
        assert!(!controller.is_running());
        assert!(controller.all_children_done());

        let err = controller.start().unwrap_err();
        assert!(matches!(err, ThreadError::NoWorkers { .. }));
    }

    #[test]
    fn test_with_config_validates() {
        let config = ControllerConfig::default().with_worker_poll_interval(Duration::ZERO);
        assert!(WorkerThreadController::<u32>::with_config(config).is_err());
    }

    #[test]
    fn test_worker_ids_and_names() {
        let controller = WorkerThreadController::with_config(
            ControllerConfig::new("ids").with_thread_name_prefix("ingest"),
        )
        .unwrap();
        let a = controller.add_worker_thread(noop()).unwrap();
        let b = controller.add_worker_thread(noop()).unwrap();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(b.name(), "ingest-1");
        assert_eq!(a.state(), WorkerState::Initialised);
        assert!(!controller.all_children_done());
        assert!(!controller.is_running());
        assert!(controller.worker(1).is_some());
        assert!(controller.worker(7).is_none());
    }

    #[test]
    fn test_add_after_start_and_double_start_rejected() {
        let controller = WorkerThreadController::with_config(fast_config("frozen")).unwrap();
        controller.add_worker_thread(noop()).unwrap();
        controller.start().expect("Failed to start controller");

        let err = controller.add_worker_thread(noop()).unwrap_err();
        assert!(matches!(err, ThreadError::AlreadyRunning { worker_count: 1, .. }));
        assert!(matches!(
            controller.start().unwrap_err(),
            ThreadError::AlreadyRunning { .. }
        ));

        controller.stop().expect("Failed to stop controller");
    }

    #[test]
    fn test_runs_jobs_and_finishes_when_not_waiting() {
        let controller =
            WorkerThreadController::with_config(fast_config("drain").with_wait_for_jobs(false))
                .unwrap();
        for _ in 0..3 {
            controller.add_worker_thread(noop()).unwrap();
        }
        let jobs: Vec<_> = (0..30).map(|i| controller.submit(i)).collect();
        controller.start().expect("Failed to start controller");

        assert!(wait_until(Duration::from_secs(5), || !controller.is_running()));
        assert!(controller.all_children_done());
        for job in &jobs {
            assert_eq!(job.state(), JobState::Done);
        }
        let total: u64 = controller.workers().iter().map(|w| w.jobs_run()).sum();
        assert_eq!(total, 30);
        controller.stop().expect("Failed to stop controller");
    }

    #[test]
    fn test_stop_waiting_workers() {
        let controller = WorkerThreadController::with_config(fast_config("idle")).unwrap();
        controller.add_worker_thread(noop()).unwrap();
        controller.add_worker_thread(noop()).unwrap();
        controller.start().expect("Failed to start controller");

        thread::sleep(Duration::from_millis(30));
        assert!(controller.is_running());

        controller.stop().expect("Failed to stop controller");
        assert!(!controller.is_running());
        assert!(controller.all_children_done());
        for worker in controller.workers() {
            assert_eq!(worker.state(), WorkerState::Stopped);
            assert!(worker.cancellation_token().is_cancelled());
        }
        assert!(!controller.snapshot().supervisor_running);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let controller: WorkerThreadController<u32> = WorkerThreadController::new();
        controller.stop().expect("stop on idle controller");
        assert!(!controller.is_running());
    }

    #[test]
    fn test_worker_killed_before_start_is_skipped() {
        let controller = WorkerThreadController::with_config(fast_config("skip")).unwrap();
        let skipped = controller.add_worker_thread(noop()).unwrap();
        let kept = controller.add_worker_thread(noop()).unwrap();
        controller.kill_worker(skipped.id()).unwrap();
        controller.start().expect("Failed to start controller");

        assert_eq!(skipped.state(), WorkerState::Killed);
        assert!(wait_until(Duration::from_secs(1), || kept.state() == WorkerState::Running));
        controller.stop().expect("Failed to stop controller");
    }

    #[test]
    fn test_zero_explicit_timeout_rejected_at_registration() {
        let controller: WorkerThreadController<u32> = WorkerThreadController::new();

        let err = controller
            .add_worker_thread(noop().timeout(TimeoutPolicy::Explicit(Duration::ZERO)))
            .unwrap_err();
        assert!(matches!(err, ThreadError::InvalidConfig { .. }));

        let work: WorkFn<u32> = Arc::new(|_job| Ok(()));
        let decoded: TimeoutPolicy =
            serde_json::from_str(r#"{"Explicit":{"secs":0,"nanos":0}}"#).unwrap();
        let err = controller.add_worker(work, None, None, decoded).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidConfig { .. }));

        assert_eq!(controller.worker_count(), 0);
        assert!(controller
            .add_worker_thread(noop().timeout(TimeoutPolicy::Explicit(Duration::from_millis(1))))
            .is_ok());
        assert_eq!(controller.worker(0).map(|w| w.id()), Some(0));
    }

    #[test]
    fn test_kill_unknown_worker() {
        let controller: WorkerThreadController<u32> = WorkerThreadController::new();
        assert!(matches!(
            controller.kill_worker(3).unwrap_err(),
            ThreadError::WorkerNotFound { worker_id: 3 }
        ));
    }

    #[test]
    fn test_discard_pending() {
        let controller: WorkerThreadController<u32> = WorkerThreadController::new();
        let jobs: Vec<_> = (0..4).map(|i| controller.submit(i)).collect();
        let discarded = controller.discard_pending();
        assert_eq!(discarded.len(), 4);
        assert!(jobs.iter().all(|j| j.state() == JobState::Stopped));
        assert!(controller.queue().is_empty());
    }

    #[test]
    fn test_supervisor_kills_stuck_worker() {
        let controller = WorkerThreadController::with_config(fast_config("stuck")).unwrap();
        let stuck = controller
            .add_worker_thread(
                WorkerOptions::new(|job: &Arc<Job<u32>>| {
                    if let Some(token) = job.cancellation_token() {
                        while !token.is_cancelled() {
                            thread::sleep(Duration::from_millis(5));
                        }
                    }
                    Ok(())
                })
                .timeout(TimeoutPolicy::Explicit(Duration::from_millis(40)))
                .wait_for_jobs(false),
            )
            .unwrap();
        let job = controller.submit(1);
        controller.start().expect("Failed to start controller");

        assert!(wait_until(Duration::from_secs(5), || job.is_terminal()));
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(stuck.state(), WorkerState::KilledNoResponse);
        assert_eq!(controller.timeouts(), 1);
        assert!(wait_until(Duration::from_secs(1), || !controller.is_running()));
        controller.stop().expect("Failed to stop controller");
    }

    #[test]
    fn test_snapshot_serializes() {
        let controller = WorkerThreadController::with_config(fast_config("snap")).unwrap();
        controller.add_worker_thread(noop()).unwrap();
        controller.submit(5);

        let json = serde_json::to_value(controller.snapshot()).unwrap();
        assert_eq!(json["name"], "snap");
        assert_eq!(json["pending_jobs"], 1);
        assert_eq!(json["workers"][0]["state"], "Initialised");
        assert_eq!(json["workers"][0]["timeout"], "None");
    }

    #[test]
    fn test_drop_stops_running_controller() {
        let worker = {
            let controller = WorkerThreadController::with_config(fast_config("dropped")).unwrap();
            let worker = controller.add_worker_thread(noop()).unwrap();
            controller.start().expect("Failed to start controller");
            worker
        };
        assert!(worker.is_done());
    }
}
