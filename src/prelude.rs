//! Convenient re-exports for common types and traits

pub use crate::core::{
    CancellationReason, CancellationToken, Job, JobCallback, JobState, Result, ThreadError,
    ThreadPriority, TimeoutPolicy, WorkFn,
};
pub use crate::pool::{
    ControllerConfig, WorkerOptions, WorkerState, WorkerThread, WorkerThreadController,
};
pub use std::sync::Arc;
