//! Worker thread implementation

use crate::core::job::JobOwner;
use crate::core::{
    CancellationReason, CancellationToken, Job, JobCallback, JobState, Result, SmartLimits,
    ThreadError, ThreadPriority, TimeoutPolicy, WorkFn,
};
use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Number of durations kept for the rolling average
pub const HISTORY_SLOTS: usize = 10;

/// Lifecycle state of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    /// Not usable; failed to launch or torn down
    Unusable,
    /// Built, not yet launched
    Initialised,
    /// Claiming and running jobs
    Running,
    /// Will stop after the current job
    StopRequested,
    /// Stopped on request
    Stopped,
    /// Will exit after the current job, its token is cancelled
    KillRequested,
    /// Exited on an explicit kill request
    Killed,
    /// Abandoned by the supervisor after a timeout
    KilledNoResponse,
    /// Ran out of work
    Done,
}

impl WorkerState {
    /// States from which the worker will never run another job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Unusable
                | WorkerState::Stopped
                | WorkerState::Killed
                | WorkerState::KilledNoResponse
                | WorkerState::Done
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Unusable => "unusable",
            WorkerState::Initialised => "initialised",
            WorkerState::Running => "running",
            WorkerState::StopRequested => "stop requested",
            WorkerState::Stopped => "stopped",
            WorkerState::KillRequested => "kill requested",
            WorkerState::Killed => "killed",
            WorkerState::KilledNoResponse => "killed (no response)",
            WorkerState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Fixed-size ring of recent job durations
#[derive(Debug, Clone, Default)]
pub struct JobHistory {
    slots: [Duration; HISTORY_SLOTS],
    jobs_run: u64,
}

impl JobHistory {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished job, overwriting the oldest slot once full
    pub fn record(&mut self, duration: Duration) {
        let slot = (self.jobs_run % HISTORY_SLOTS as u64) as usize;
        self.slots[slot] = duration;
        self.jobs_run += 1;
    }

    /// Jobs recorded so far
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run
    }

    /// Mean of the last `min(jobs_run, 10)` durations
    pub fn average(&self) -> Duration {
        let samples = (self.jobs_run as usize).min(HISTORY_SLOTS);
        if samples == 0 {
            return Duration::ZERO;
        }
        self.slots[..samples].iter().sum::<Duration>() / samples as u32
    }
}

/// How a worker runs jobs: the work function, callbacks, policy and priority
///
/// ```rust
/// use supervised_thread_pool::prelude::*;
///
/// let options = WorkerOptions::new(|job: &std::sync::Arc<Job<u32>>| {
///     println!("processing {}", job.payload());
///     Ok(())
/// })
/// .on_failure(|job| eprintln!("job {} failed", job.id()))
/// .timeout(TimeoutPolicy::Smart)
/// .priority(ThreadPriority::High);
/// # let _ = options;
/// ```
pub struct WorkerOptions<P> {
    work: WorkFn<P>,
    on_success: Option<JobCallback<P>>,
    on_failure: Option<JobCallback<P>>,
    timeout: TimeoutPolicy,
    priority: ThreadPriority,
    wait_for_jobs: Option<bool>,
}

impl<P> std::fmt::Debug for WorkerOptions<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .field("wait_for_jobs", &self.wait_for_jobs)
            .finish()
    }
}

impl<P: Send + Sync + 'static> WorkerOptions<P> {
    /// Options running `work` for every claimed job
    pub fn new<F>(work: F) -> Self
    where
        F: Fn(&Arc<Job<P>>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            work: Arc::new(work),
            on_success: None,
            on_failure: None,
            timeout: TimeoutPolicy::None,
            priority: ThreadPriority::Normal,
            wait_for_jobs: None,
        }
    }

    /// Callback for jobs that finish `Done`
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Job<P>>) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Callback for jobs that end `Failed`, including timeout kills
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Job<P>>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    /// Timeout policy enforced by the supervisor
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = policy;
        self
    }

    /// Jobs claimed per tick
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the controller's default for idling on an empty queue
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn wait_for_jobs(mut self, wait: bool) -> Self {
        self.wait_for_jobs = Some(wait);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.timeout.validate()
    }

    pub(crate) fn from_parts(
        work: WorkFn<P>,
        on_success: Option<JobCallback<P>>,
        on_failure: Option<JobCallback<P>>,
        timeout: TimeoutPolicy,
    ) -> Self {
        Self {
            work,
            on_success,
            on_failure,
            timeout,
            priority: ThreadPriority::Normal,
            wait_for_jobs: None,
        }
    }
}

enum JobFlow {
    Continue,
    Abandoned,
}

/// A worker that claims jobs from the shared queue on its own OS thread
pub struct WorkerThread<P> {
    id: usize,
    name: String,
    priority: ThreadPriority,
    timeout: TimeoutPolicy,
    state: Mutex<WorkerState>,
    wait_for_jobs: AtomicBool,
    history: Mutex<JobHistory>,
    jobs_failed: AtomicU64,
    current_job: RwLock<Option<Weak<Job<P>>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    token: CancellationToken,
    work: WorkFn<P>,
    on_success: Option<JobCallback<P>>,
    on_failure: Option<JobCallback<P>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    self_ref: Weak<WorkerThread<P>>,
}

impl<P: Send + Sync + 'static> std::fmt::Debug for WorkerThread<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("jobs_run", &self.jobs_run())
            .finish()
    }
}

impl<P: Send + Sync + 'static> WorkerThread<P> {
    pub(crate) fn new(
        id: usize,
        name: String,
        options: WorkerOptions<P>,
        token: CancellationToken,
        default_wait_for_jobs: bool,
    ) -> Arc<Self> {
        let wait = options.wait_for_jobs.unwrap_or(default_wait_for_jobs);
        Arc::new_cyclic(|self_ref| Self {
            id,
            name,
            priority: options.priority,
            timeout: options.timeout,
            state: Mutex::new(WorkerState::Initialised),
            wait_for_jobs: AtomicBool::new(wait),
            history: Mutex::new(JobHistory::new()),
            jobs_failed: AtomicU64::new(0),
            current_job: RwLock::new(None),
            handle: Mutex::new(None),
            token,
            work: options.work,
            on_success: options.on_success,
            on_failure: options.on_failure,
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Worker id, unique within its controller
    pub fn id(&self) -> usize {
        self.id
    }

    /// OS thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Batch priority
    pub fn priority(&self) -> ThreadPriority {
        self.priority
    }

    /// Timeout policy
    pub fn timeout(&self) -> TimeoutPolicy {
        self.timeout
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Whether the worker can no longer run jobs
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Jobs this worker has finished, successfully or not
    pub fn jobs_run(&self) -> u64 {
        self.history.lock().jobs_run()
    }

    /// Jobs that ended `Failed`
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Copy of the duration history
    pub fn history(&self) -> JobHistory {
        self.history.lock().clone()
    }

    /// Mean recent job duration; zero unless `Running` with history
    pub fn average_job_time(&self) -> Duration {
        if self.state() != WorkerState::Running {
            return Duration::ZERO;
        }
        self.history.lock().average()
    }

    /// The job being run right now
    pub fn current_job(&self) -> Option<Arc<Job<P>>> {
        self.current_job.read().as_ref().and_then(Weak::upgrade)
    }

    /// The worker's cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the worker idles on an empty queue
    pub fn waits_for_jobs(&self) -> bool {
        self.wait_for_jobs.load(Ordering::Acquire)
    }

    /// Switch between idling on an empty queue and finishing `Done`
    pub fn set_wait_for_jobs(&self, wait: bool) {
        self.wait_for_jobs.store(wait, Ordering::Release);
    }

    /// Ask the worker to stop after its current job
    ///
    /// Returns `false` if the worker was not running.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        if *state != WorkerState::Running {
            return false;
        }
        *state = WorkerState::StopRequested;
        true
    }

    /// Ask the worker to exit as `Killed` and cancel its token
    ///
    /// The in-flight job is not interrupted, but a work function polling
    /// [`Job::cancellation_token`] sees the cancellation. A worker that was
    /// never launched becomes `Killed` immediately.
    ///
    /// # Errors
    ///
    /// `ThreadError::InvalidWorkerState` if the worker already finished.
    pub fn request_kill(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                WorkerState::Running | WorkerState::StopRequested => {
                    *state = WorkerState::KillRequested;
                }
                WorkerState::Initialised => {
                    *state = WorkerState::Killed;
                }
                WorkerState::KillRequested => return Ok(()),
                other => return Err(ThreadError::invalid_worker_state(self.id, "be killed", other)),
            }
        }
        self.token.cancel_with_reason(CancellationReason::Killed);
        Ok(())
    }

    /// Point-in-time view of the worker
    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.state();
        let history = self.history();
        WorkerSnapshot {
            id: self.id,
            name: self.name.clone(),
            state,
            priority: self.priority,
            timeout: self.timeout,
            jobs_run: history.jobs_run(),
            jobs_failed: self.jobs_failed(),
            average_job_time_ms: history.average().as_millis() as u64,
            current_job: self.current_job().map(|j| j.id()),
            waits_for_jobs: self.waits_for_jobs(),
            started_at: *self.started_at.lock(),
            finished_at: *self.finished_at.lock(),
        }
    }

    /// Launch the main loop on a new OS thread
    pub(crate) fn launch(
        self: &Arc<Self>,
        queue: Arc<JobQueue<P>>,
        poll_interval: Duration,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != WorkerState::Initialised {
                return Err(ThreadError::invalid_worker_state(self.id, "start", *state));
            }
            *state = WorkerState::Running;
        }
        *self.started_at.lock() = Some(Utc::now());

        let worker = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker.run(queue, poll_interval))
            .map_err(|e| {
                *self.state.lock() = WorkerState::Unusable;
                ThreadError::spawn_with_source(self.id, "cannot spawn worker thread", e)
            })?;

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Mark a worker that cannot be launched as `Killed`
    pub(crate) fn mark_killed(&self) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = WorkerState::Killed;
        }
    }

    /// Kill the worker if its in-flight job has exceeded the policy budget
    ///
    /// Returns the failed job when a kill happened. A job that reached `Done`
    /// before the kill took the worker's state lock is left untouched.
    pub(crate) fn enforce_timeout(&self, limits: &SmartLimits) -> Option<Arc<Job<P>>> {
        let job = self.current_job()?;
        let elapsed = job.running_for()?;
        let (jobs_run, average) = {
            let history = self.history.lock();
            (history.jobs_run(), history.average())
        };
        let budget = self.timeout.budget(jobs_run, average, limits)?;
        if elapsed <= budget {
            return None;
        }

        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return None;
            }
            let diagnostic = ThreadError::job_timeout(job.id(), self.id, elapsed, budget);
            if !job.try_fail(diagnostic.to_string()) {
                debug!(
                    "worker {}: job {} finished before timeout kill, kill discarded",
                    self.id,
                    job.id()
                );
                return None;
            }
            *state = WorkerState::KilledNoResponse;
        }

        self.force_terminate(budget);
        warn!(
            "worker {}: job {} exceeded {:?} budget after {:?}, worker killed",
            self.id,
            job.id(),
            budget,
            elapsed
        );
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        job.notify_failure();

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_kill(self.id, elapsed);

        Some(job)
    }

    /// Join the OS thread if it already exited
    pub(crate) fn reap(&self) {
        let mut slot = self.handle.lock();
        if !slot.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        if let Some(handle) = slot.take() {
            if let Err(panic) = handle.join() {
                error!(
                    "worker {} thread panicked: {}",
                    self.id,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    /// Abandon the OS thread
    ///
    /// Safe Rust cannot interrupt a running thread, so the handle is detached
    /// and the worker's token cancelled. When the work function eventually
    /// returns, the loop sees `KilledNoResponse` and exits without touching the
    /// job or the history.
    fn force_terminate(&self, budget: Duration) {
        self.token
            .cancel_with_reason(CancellationReason::Timeout(budget));
        drop(self.handle.lock().take());
        *self.finished_at.lock() = Some(Utc::now());
    }

    fn run(self: Arc<Self>, queue: Arc<JobQueue<P>>, poll_interval: Duration) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = self.id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        debug!(
            "worker {} ({}) started: priority {}, timeout {}",
            self.id, self.name, self.priority, self.timeout
        );

        loop {
            if self.state() != WorkerState::Running {
                break;
            }
            if !queue.has_pending() && !self.waits_for_jobs() {
                break;
            }

            for _ in 0..self.priority.batch_size() {
                if self.state() != WorkerState::Running {
                    break;
                }
                let Some(job) = queue.claim_next() else {
                    break;
                };
                if let JobFlow::Abandoned = self.execute(job) {
                    debug!("worker {} abandoned after timeout kill, exiting", self.id);
                    return;
                }
            }

            thread::sleep(poll_interval);
        }

        self.finish();
    }

    fn execute(&self, job: Arc<Job<P>>) -> JobFlow {
        if job.state() != JobState::Initialised {
            debug!(
                "worker {}: skipping job {} in state {}",
                self.id,
                job.id(),
                job.state()
            );
            return JobFlow::Continue;
        }
        let owner: Weak<dyn JobOwner<P>> = self.self_ref.clone();
        job.attach(owner);
        *self.current_job.write() = Some(Arc::downgrade(&job));
        if !job.mark_running() {
            *self.current_job.write() = None;
            return JobFlow::Continue;
        }

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_claim(self.id, job.id());

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.work)(&job)));

        let (completed, failed_here) = {
            let state = self.state.lock();
            if *state == WorkerState::KilledNoResponse {
                return JobFlow::Abandoned;
            }
            match outcome {
                Ok(Ok(())) => (job.mark_done(), false),
                Ok(Err(e)) => {
                    warn!("worker {}: job {} failed: {}", self.id, job.id(), e);
                    (false, job.try_fail(e.to_string()))
                }
                Err(panic) => {
                    let err = ThreadError::worker_panic(self.id, panic_message(panic.as_ref()));
                    error!("worker {}: job {} panicked: {}", self.id, job.id(), err);
                    (false, job.try_fail(err.to_string()))
                }
            }
        };

        *self.current_job.write() = None;
        let elapsed = job.elapsed();
        self.history.lock().record(elapsed);

        if job.state() == JobState::Failed {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_completion(elapsed, completed);

        if completed {
            if let Some(callback) = &self.on_success {
                self.run_callback("success", callback, &job);
            }
        } else if failed_here {
            job.notify_failure();
        }

        JobFlow::Continue
    }

    fn finish(&self) {
        let final_state = {
            let mut state = self.state.lock();
            *state = match *state {
                WorkerState::StopRequested => WorkerState::Stopped,
                WorkerState::KillRequested => WorkerState::Killed,
                WorkerState::Running => WorkerState::Done,
                other => other,
            };
            *state
        };
        *self.finished_at.lock() = Some(Utc::now());
        debug!(
            "worker {} exited as {} after {} jobs ({} failed)",
            self.id,
            final_state,
            self.jobs_run(),
            self.jobs_failed()
        );
    }

    fn run_callback(&self, kind: &str, callback: &JobCallback<P>, job: &Arc<Job<P>>) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(job))) {
            error!(
                "worker {}: {} callback for job {} panicked: {}",
                self.id,
                kind,
                job.id(),
                panic_message(panic.as_ref())
            );
        }
    }
}

impl<P: Send + Sync + 'static> JobOwner<P> for WorkerThread<P> {
    fn owner_id(&self) -> usize {
        self.id
    }

    fn owner_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn on_job_failed(&self, job: &Arc<Job<P>>) {
        if let Some(callback) = &self.on_failure {
            self.run_callback("failure", callback, job);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Serializable view of a worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    /// Worker id
    pub id: usize,
    /// OS thread name
    pub name: String,
    /// State at snapshot time
    pub state: WorkerState,
    /// Batch priority
    pub priority: ThreadPriority,
    /// Timeout policy
    pub timeout: TimeoutPolicy,
    /// Jobs finished
    pub jobs_run: u64,
    /// Jobs that ended `Failed`
    pub jobs_failed: u64,
    /// Rolling average job duration
    pub average_job_time_ms: u64,
    /// Id of the in-flight job
    pub current_job: Option<u64>,
    /// Whether the worker idles on an empty queue
    pub waits_for_jobs: bool,
    /// When the worker was launched
    pub started_at: Option<DateTime<Utc>>,
    /// When the worker finished or was abandoned
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn worker(options: WorkerOptions<u32>) -> Arc<WorkerThread<u32>> {
        WorkerThread::new(0, "worker-0".to_string(), options, CancellationToken::new(), false)
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
    fn test_history_average_uses_last_ten() {
        let mut history = JobHistory::new();
        assert_eq!(history.average(), Duration::ZERO);

        for secs in 1..=12 {
            history.record(Duration::from_secs(secs));
        }
        assert_eq!(history.jobs_run(), 12);
        assert_eq!(history.average(), Duration::from_millis(7_500));
    }

    #[test]
    fn test_history_average_before_full() {
        let mut history = JobHistory::new();
        history.record(Duration::from_secs(2));
        history.record(Duration::from_secs(4));
        assert_eq!(history.average(), Duration::from_secs(3));
    }

    #[test]
    fn test_worker_runs_queue_to_completion() {
        let queue = Arc::new(JobQueue::new());
        let jobs: Vec<_> = (0..5).map(|i| queue.enqueue(i)).collect();
        let successes = Arc::new(AtomicUsize::new(0));
        let successes_clone = Arc::clone(&successes);

        let w = worker(
            WorkerOptions::new(|_job| Ok(())).on_success(move |_job| {
                successes_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        assert!(wait_until(Duration::from_secs(5), || w.is_done()));
        assert_eq!(w.state(), WorkerState::Done);
        assert_eq!(w.jobs_run(), 5);
        assert_eq!(successes.load(Ordering::SeqCst), 5);
        for job in &jobs {
            assert_eq!(job.state(), JobState::Done);
            assert_eq!(job.worker_id(), Some(0));
        }
        // History is kept after the worker finishes, the reported average is not
        assert_eq!(w.average_job_time(), Duration::ZERO);
    }

    #[test]
    fn test_worker_survives_failing_and_panicking_jobs() {
        let queue = Arc::new(JobQueue::new());
        let failing = queue.enqueue(1);
        let panicking = queue.enqueue(2);
        let fine = queue.enqueue(3);
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = Arc::clone(&failures);

        let w = worker(
            WorkerOptions::new(|job: &Arc<Job<u32>>| match *job.payload() {
                1 => Err(ThreadError::execution(job.id(), "bad payload")),
                2 => panic!("Intentional panic for testing"),
                _ => Ok(()),
            })
            .on_failure(move |_job| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        assert!(wait_until(Duration::from_secs(5), || w.is_done()));
        assert_eq!(failing.state(), JobState::Failed);
        assert!(failing.failure_message().unwrap().contains("bad payload"));
        assert_eq!(panicking.state(), JobState::Failed);
        assert!(panicking
            .failure_message()
            .unwrap()
            .contains("Intentional panic"));
        assert_eq!(fine.state(), JobState::Done);
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(w.jobs_run(), 3);
        assert_eq!(w.jobs_failed(), 2);
    }

    #[test]
    fn test_work_function_can_fail_job_directly() {
        let queue = Arc::new(JobQueue::new());
        let job = queue.enqueue(7);
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = Arc::clone(&failures);

        let w = worker(
            WorkerOptions::new(|job: &Arc<Job<u32>>| {
                job.mark_failed("rejected by work function");
                Ok(())
            })
            .on_failure(move |_job| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        assert!(wait_until(Duration::from_secs(5), || w.is_done()));
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(w.jobs_failed(), 1);
    }

    #[test]
    fn test_stop_request_while_waiting() {
        let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new());
        let w = WorkerThread::new(
            1,
            "worker-1".to_string(),
            WorkerOptions::new(|_job| Ok(())),
            CancellationToken::new(),
            true,
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        thread::sleep(Duration::from_millis(20));
        assert_eq!(w.state(), WorkerState::Running);

        assert!(w.request_stop());
        assert!(wait_until(Duration::from_secs(5), || w.is_done()));
        assert_eq!(w.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_kill_request_cancels_token() {
        let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new());
        let w = WorkerThread::new(
            2,
            "worker-2".to_string(),
            WorkerOptions::new(|_job| Ok(())),
            CancellationToken::new(),
            true,
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        w.request_kill().expect("Failed to kill worker");
        assert!(w.cancellation_token().is_cancelled());
        assert!(wait_until(Duration::from_secs(5), || w.is_done()));
        assert_eq!(w.state(), WorkerState::Killed);
        assert!(w.request_kill().is_err());
    }

    #[test]
    fn test_launch_twice_is_rejected() {
        let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new());
        let w = worker(WorkerOptions::new(|_job| Ok(())));
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");
        let err = w.launch(queue, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidWorkerState { .. }));
    }

    #[test]
    fn test_timeout_kill_fails_job_and_abandons_worker() {
        let queue = Arc::new(JobQueue::new());
        let stuck = queue.enqueue(0);
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = Arc::clone(&failures);

        let w = worker(
            WorkerOptions::new(|job: &Arc<Job<u32>>| {
                let token = job.cancellation_token().expect("job has an owner");
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            })
            .on_failure(move |_job| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            })
            .timeout(TimeoutPolicy::Explicit(Duration::from_millis(50))),
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        let limits = SmartLimits::default();
        assert!(wait_until(Duration::from_secs(5), || stuck.state() == JobState::Running));

        assert!(wait_until(Duration::from_secs(5), || {
            w.enforce_timeout(&limits).is_some() || w.state() == WorkerState::KilledNoResponse
        }));
        assert_eq!(w.state(), WorkerState::KilledNoResponse);
        assert_eq!(stuck.state(), JobState::Failed);
        assert!(stuck.failure_message().unwrap().contains("killed due to timeout"));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(w.cancellation_token().is_cancelled());

        // The abandoned loop must not overwrite the failure when the work function returns
        thread::sleep(Duration::from_millis(50));
        assert_eq!(stuck.state(), JobState::Failed);
        assert_eq!(w.jobs_run(), 0);
    }

    #[test]
    fn test_completed_job_is_not_killed() {
        let queue = Arc::new(JobQueue::new());
        let job = queue.enqueue(0);
        let w = worker(
            WorkerOptions::new(|_job| Ok(()))
                .timeout(TimeoutPolicy::Explicit(Duration::from_nanos(1))),
        );
        w.launch(Arc::clone(&queue), Duration::from_millis(1))
            .expect("Failed to launch worker");

        assert!(wait_until(Duration::from_secs(5), || job.is_terminal()));
        // Once Done, no supervisor pass can turn the job into Failed
        assert!(w.enforce_timeout(&SmartLimits::default()).is_none());
        if job.state() == JobState::Done {
            assert!(!job.mark_failed("late kill"));
        }
    }
}
