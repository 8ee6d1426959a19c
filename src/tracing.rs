//! Tracing integration for observability.
//!
//! Enabled by the `tracing` feature. Workers and the supervisor open a span
//! each, and the functions in [`metrics`] emit trace-level events that a
//! metrics layer (for example tracing-opentelemetry) can turn into counters,
//! gauges and histograms.
//!
//! # Example
//!
//! ```rust,ignore
//! use supervised_thread_pool::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("supervised_thread_pool=trace".parse().unwrap()))
//!     .init();
//!
//! let controller = WorkerThreadController::new();
//! controller.add_worker_thread(WorkerOptions::new(|_job: &Arc<Job<u32>>| Ok(())))?;
//! controller.start()?;
//! ```

/// Metrics recording functions.
///
/// Field names follow the `counter.` / `gauge.` / `histogram.` prefix
/// convention understood by tracing metrics layers.
pub mod metrics {
    use std::time::Duration;

    /// Records a job submission.
    #[inline]
    pub fn record_submission(queue_depth: usize) {
        tracing::trace!(
            counter.jobs_submitted = 1,
            gauge.queue_depth = queue_depth as i64,
            "job submitted"
        );
    }

    /// Records a worker claiming a job.
    #[inline]
    pub fn record_claim(worker_id: usize, job_id: u64) {
        tracing::trace!(
            counter.jobs_claimed = 1,
            worker_id = worker_id,
            job_id = job_id,
            "job claimed"
        );
    }

    /// Records job completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            tracing::trace!(
                counter.jobs_completed = 1,
                histogram.job_duration_ms = duration_ms,
                "job completed successfully"
            );
        } else {
            tracing::trace!(
                counter.jobs_failed = 1,
                histogram.job_duration_ms = duration_ms,
                "job failed"
            );
        }
    }

    /// Records a worker killed for exceeding its timeout budget.
    #[inline]
    pub fn record_kill(worker_id: usize, elapsed: Duration) {
        tracing::warn!(
            counter.workers_killed = 1,
            worker_id = worker_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "worker killed by supervisor"
        );
    }

    /// Records controller startup.
    #[inline]
    pub fn record_controller_start(num_workers: usize) {
        tracing::info!(workers = num_workers, "controller started");
    }

    /// Records controller shutdown.
    #[inline]
    pub fn record_controller_stop(jobs_run: u64, jobs_failed: u64, timeouts: u64) {
        tracing::info!(
            jobs_run = jobs_run,
            jobs_failed = jobs_failed,
            timeouts = timeouts,
            "controller stopped"
        );
    }
}
