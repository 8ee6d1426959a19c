//! Core types: jobs, errors, cancellation and scheduling policies

pub mod cancellation;
pub mod error;
pub mod job;
pub mod priority;
pub mod timeout;

pub use cancellation::{CancellationReason, CancellationToken};
pub use error::{Result, ThreadError};
pub use job::{Job, JobCallback, JobSnapshot, JobState, WorkFn};
pub use priority::ThreadPriority;
pub use timeout::{SmartLimits, TimeoutPolicy};
