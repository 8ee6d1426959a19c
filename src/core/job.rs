//! Jobs and their lifecycle

use crate::core::cancellation::CancellationToken;
use crate::core::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Work function run by a worker for each job it claims
///
/// Returning an error marks the job `Failed` with the error's message.
pub type WorkFn<P> = Arc<dyn Fn(&Arc<Job<P>>) -> Result<()> + Send + Sync>;

/// Callback invoked with a job after it completes or fails
pub type JobCallback<P> = Arc<dyn Fn(&Arc<Job<P>>) + Send + Sync>;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Enqueued, not yet claimed
    Initialised,
    /// Claimed and executing
    Running,
    /// Claimed, execution suspended by the work function
    Paused,
    /// Finished successfully
    Done,
    /// Finished with an error, a panic, or a timeout kill
    Failed,
    /// Discarded before it was claimed
    Stopped,
}

impl JobState {
    /// Terminal states are sticky
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Stopped)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Initialised => "initialised",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// The worker side of a job's back-reference
pub(crate) trait JobOwner<P>: Send + Sync {
    fn owner_id(&self) -> usize;
    fn owner_token(&self) -> CancellationToken;
    fn on_job_failed(&self, job: &Arc<Job<P>>);
}

#[derive(Debug)]
struct JobStatus {
    state: JobState,
    started: Option<Instant>,
    finished: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

impl JobStatus {
    fn finish(&mut self, state: JobState) {
        self.state = state;
        self.finished = Some(Instant::now());
        self.finished_at = Some(Utc::now());
    }
}

/// A unit of work carrying an opaque payload
///
/// Jobs are shared between the queue, the worker running them and the caller
/// that submitted them. State transitions are serialized by an internal lock,
/// and once a job reaches `Done`, `Failed` or `Stopped` it never changes again.
pub struct Job<P> {
    id: u64,
    payload: P,
    status: Mutex<JobStatus>,
    owner: RwLock<Option<Weak<dyn JobOwner<P>>>>,
}

impl<P: Send + Sync + 'static> fmt::Debug for Job<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("worker_id", &self.worker_id())
            .finish()
    }
}

impl<P: Send + Sync + 'static> Job<P> {
    /// Create a job in the `Initialised` state
    pub fn new(id: u64, payload: P) -> Self {
        Self {
            id,
            payload,
            status: Mutex::new(JobStatus {
                state: JobState::Initialised,
                started: None,
                finished: None,
                paused_at: None,
                paused_total: Duration::ZERO,
                started_at: None,
                finished_at: None,
                failure: None,
            }),
            owner: RwLock::new(None),
        }
    }

    /// Job id, unique within its controller
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The opaque payload
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.status.lock().state
    }

    /// Whether the job reached `Done`, `Failed` or `Stopped`
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Diagnostic recorded when the job failed
    pub fn failure_message(&self) -> Option<String> {
        self.status.lock().failure.clone()
    }

    /// Id of the worker that claimed the job, while that worker exists
    pub fn worker_id(&self) -> Option<usize> {
        self.owner().map(|o| o.owner_id())
    }

    /// Cancellation token of the claiming worker
    ///
    /// Cancelled when the controller stops or the worker is killed. Long
    /// running work functions can poll it to exit early.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.owner().map(|o| o.owner_token())
    }

    /// Wall-clock time the job started running
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.status.lock().started_at
    }

    /// Wall-clock time the job reached a terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.status.lock().finished_at
    }

    /// Time between start and end, zero until the job has finished
    pub fn elapsed(&self) -> Duration {
        let status = self.status.lock();
        match (status.started, status.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Active time since the job started, only while it is `Running`
    ///
    /// Time spent paused is not counted.
    pub fn running_for(&self) -> Option<Duration> {
        let status = self.status.lock();
        match (status.state, status.started) {
            (JobState::Running, Some(start)) => {
                Some(start.elapsed().saturating_sub(status.paused_total))
            }
            _ => None,
        }
    }

    /// `Initialised` → `Running`
    pub fn mark_running(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Initialised {
            return false;
        }
        status.state = JobState::Running;
        status.started = Some(Instant::now());
        status.started_at = Some(Utc::now());
        true
    }

    /// `Running`/`Paused` → `Done`; no-op once terminal
    pub fn mark_done(&self) -> bool {
        let mut status = self.status.lock();
        match status.state {
            JobState::Running | JobState::Paused => {
                status.finish(JobState::Done);
                true
            }
            _ => false,
        }
    }

    /// `Running`/`Paused` → `Failed`, then runs the owner's failure callback
    ///
    /// Any other state makes this a no-op, so a failure racing a completion
    /// cannot overwrite `Done`.
    pub fn mark_failed(self: &Arc<Self>, message: impl Into<String>) -> bool {
        if !self.try_fail(message) {
            return false;
        }
        self.notify_failure();
        true
    }

    /// `Running` → `Paused`; paused jobs are not subject to timeouts
    pub fn pause(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Running {
            return false;
        }
        status.state = JobState::Paused;
        status.paused_at = Some(Instant::now());
        true
    }

    /// `Paused` → `Running`
    pub fn resume(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Paused {
            return false;
        }
        status.state = JobState::Running;
        if let Some(paused_at) = status.paused_at.take() {
            status.paused_total += paused_at.elapsed();
        }
        true
    }

    /// `Initialised` → `Stopped`, for jobs discarded before being claimed
    pub fn mark_stopped(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Initialised {
            return false;
        }
        status.finish(JobState::Stopped);
        true
    }

    /// Point-in-time view of the job
    pub fn snapshot(&self) -> JobSnapshot {
        let worker_id = self.worker_id();
        let status = self.status.lock();
        let elapsed = match (status.started, status.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => {
                let paused = status.paused_total
                    + status.paused_at.map_or(Duration::ZERO, |at| at.elapsed());
                start.elapsed().saturating_sub(paused)
            }
            _ => Duration::ZERO,
        };
        JobSnapshot {
            id: self.id,
            state: status.state,
            worker_id,
            started_at: status.started_at,
            finished_at: status.finished_at,
            elapsed_ms: elapsed.as_millis() as u64,
            failure: status.failure.clone(),
        }
    }

    pub(crate) fn attach(&self, owner: Weak<dyn JobOwner<P>>) {
        *self.owner.write() = Some(owner);
    }

    /// Fails the job without running callbacks
    pub(crate) fn try_fail(&self, message: impl Into<String>) -> bool {
        let mut status = self.status.lock();
        match status.state {
            JobState::Running | JobState::Paused => {
                status.failure = Some(message.into());
                status.finish(JobState::Failed);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn notify_failure(self: &Arc<Self>) {
        if let Some(owner) = self.owner() {
            owner.on_job_failed(self);
        }
    }

    fn owner(&self) -> Option<Arc<dyn JobOwner<P>>> {
        self.owner.read().as_ref().and_then(Weak::upgrade)
    }
}

/// Serializable view of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    /// Job id
    pub id: u64,
    /// State at snapshot time
    pub state: JobState,
    /// Claiming worker, if still alive
    pub worker_id: Option<usize>,
    /// Wall-clock start time
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock end time
    pub finished_at: Option<DateTime<Utc>>,
    /// Running time so far, or total running time once finished
    pub elapsed_ms: u64,
    /// Failure diagnostic
    pub failure: Option<String>,
}
