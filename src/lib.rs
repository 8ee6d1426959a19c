//! # Supervised Thread Pool
//!
//! A worker thread pool whose controller supervises how long each job runs and
//! kills workers that exceed their budget.
//!
//! ## Features
//!
//! - **Shared Job Queue**: FIFO, claim-once queue shared by every worker
//! - **Per-Worker Timeouts**: none, a fixed budget, or a smart budget derived
//!   from the worker's recent job durations
//! - **Priorities**: a worker's priority is the number of jobs it claims per tick
//! - **Race-Safe Kills**: a job that completes before the kill lands stays `Done`
//! - **Layered Shutdown**: cooperative stop with a grace period, then forced
//! - **Introspection**: serializable snapshots of jobs, workers and controllers
//!
//! ## Quick Start
//!
//! ```rust
//! use supervised_thread_pool::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let controller = WorkerThreadController::with_config(
//!     ControllerConfig::new("quick-start").with_wait_for_jobs(false),
//! )?;
//!
//! for _ in 0..4 {
//!     controller.add_worker_thread(
//!         WorkerOptions::new(|job: &Arc<Job<String>>| {
//!             println!("processing {}", job.payload());
//!             Ok(())
//!         })
//!         .timeout(TimeoutPolicy::explicit_secs(10)?),
//!     )?;
//! }
//!
//! let jobs: Vec<_> = (0..10)
//!     .map(|i| controller.submit(format!("record-{}", i)))
//!     .collect();
//!
//! controller.start()?;
//! while controller.is_running() {
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! controller.stop()?;
//!
//! assert!(jobs.iter().all(|job| job.state() == JobState::Done));
//! # Ok(())
//! # }
//! ```
//!
//! ## Smart Timeouts and Callbacks
//!
//! ```rust
//! use supervised_thread_pool::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! # fn main() -> Result<()> {
//! let failures = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&failures);
//!
//! let controller = WorkerThreadController::new();
//! controller.add_worker_thread(
//!     WorkerOptions::new(|job: &Arc<Job<u64>>| {
//!         if *job.payload() == 0 {
//!             return Err(ThreadError::execution(job.id(), "zero is not allowed"));
//!         }
//!         Ok(())
//!     })
//!     .on_failure(move |_job| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .timeout(TimeoutPolicy::Smart)
//!     .priority(ThreadPriority::Highest),
//! )?;
//! # controller.submit(0);
//! # controller.start()?;
//! # controller.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cooperative Cancellation
//!
//! Every worker carries a [`CancellationToken`] that is cancelled when the
//! controller stops or the worker is killed. Long running work functions can
//! poll it through the job:
//!
//! ```rust
//! use supervised_thread_pool::prelude::*;
//!
//! let options = WorkerOptions::new(|job: &Arc<Job<Vec<u8>>>| {
//!     let token = job.cancellation_token();
//!     for _chunk in job.payload().chunks(64) {
//!         if let Some(token) = &token {
//!             token.check(job.id())?;
//!         }
//!         // Do work...
//!     }
//!     Ok(())
//! });
//! # let _ = options;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
#[cfg(feature = "tracing")]
pub mod tracing;

pub use crate::core::{
    CancellationReason, CancellationToken, Job, JobSnapshot, JobState, Result, ThreadError,
    ThreadPriority, TimeoutPolicy,
};
pub use crate::pool::{
    ControllerConfig, ControllerSnapshot, WorkerOptions, WorkerSnapshot, WorkerState,
    WorkerThread, WorkerThreadController,
};
