//! Controller configuration

use crate::core::{Result, SmartLimits, ThreadError};
use crate::core::timeout::{DEFAULT_SMART_FLOOR, DEFAULT_SMART_MIN_BUDGET, DEFAULT_SMART_WARMUP_JOBS};
use crate::queue::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`WorkerThreadController`](crate::WorkerThreadController)
///
/// Every field has a default, so partial JSON documents deserialize:
///
/// ```rust
/// use supervised_thread_pool::ControllerConfig;
/// use std::time::Duration;
///
/// let config = ControllerConfig::from_json(r#"{ "name": "ingest", "wait_for_jobs": false }"#).unwrap();
/// assert_eq!(config.name, "ingest");
/// assert!(!config.wait_for_jobs);
/// assert_eq!(config.supervisor_tick, Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller name used in errors and logs
    pub name: String,
    /// Prefix for worker OS thread names
    pub thread_name_prefix: String,
    /// Pause between a worker's batches.
    /// Default: 20ms
    pub worker_poll_interval: Duration,
    /// Interval between supervisor timeout checks. Bounds detection latency.
    /// Default: 20ms
    pub supervisor_tick: Duration,
    /// How long `stop()` waits for cooperative exit before abandoning the
    /// supervisor thread.
    /// Default: 5s
    pub stop_grace_period: Duration,
    /// `Smart` budget while a worker has fewer than `smart_warmup_jobs` jobs.
    /// Default: 30s
    pub smart_floor: Duration,
    /// Jobs a `Smart` worker must complete before its history is used.
    /// Default: 3
    pub smart_warmup_jobs: u64,
    /// Lower bound for the history-based `Smart` budget.
    /// Default: 1s
    pub smart_min_budget: Duration,
    /// Whether new workers idle on an empty queue instead of finishing.
    /// Default: true
    pub wait_for_jobs: bool,
    /// Jobs per queue storage block.
    /// Default: 256
    pub queue_block_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "controller".to_string(),
            thread_name_prefix: "worker".to_string(),
            worker_poll_interval: Duration::from_millis(20),
            supervisor_tick: Duration::from_millis(20),
            stop_grace_period: Duration::from_secs(5),
            smart_floor: DEFAULT_SMART_FLOOR,
            smart_warmup_jobs: DEFAULT_SMART_WARMUP_JOBS,
            smart_min_budget: DEFAULT_SMART_MIN_BUDGET,
            wait_for_jobs: true,
            queue_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ControllerConfig {
    /// Create a default configuration with the given controller name
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON document and validate it
    ///
    /// # Errors
    ///
    /// `ThreadError::ConfigParse` for malformed JSON, `ThreadError::InvalidConfig`
    /// for values that fail [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set worker thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the pause between worker batches
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    /// Set the supervisor tick
    ///
    /// Shorter ticks detect timeouts sooner at the cost of more wake-ups.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_supervisor_tick(mut self, tick: Duration) -> Self {
        self.supervisor_tick = tick;
        self
    }

    /// Set the grace period `stop()` waits before escalating
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }

    /// Set the `Smart` warm-up budget
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_smart_floor(mut self, floor: Duration) -> Self {
        self.smart_floor = floor;
        self
    }

    /// Set the number of jobs before `Smart` trusts the history
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_smart_warmup_jobs(mut self, jobs: u64) -> Self {
        self.smart_warmup_jobs = jobs;
        self
    }

    /// Set the lower bound of the history-based `Smart` budget
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_smart_min_budget(mut self, budget: Duration) -> Self {
        self.smart_min_budget = budget;
        self
    }

    /// Set whether workers idle on an empty queue
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_wait_for_jobs(mut self, wait: bool) -> Self {
        self.wait_for_jobs = wait;
        self
    }

    /// Set the queue growth block size
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_block_size(mut self, size: usize) -> Self {
        self.queue_block_size = size;
        self
    }

    /// The `Smart` policy tunables
    pub fn smart_limits(&self) -> SmartLimits {
        SmartLimits {
            floor: self.smart_floor,
            warmup_jobs: self.smart_warmup_jobs,
            min_budget: self.smart_min_budget,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_poll_interval.is_zero() {
            return Err(ThreadError::invalid_config(
                "worker_poll_interval",
                "poll interval must be non-zero",
            ));
        }
        if self.supervisor_tick.is_zero() {
            return Err(ThreadError::invalid_config(
                "supervisor_tick",
                "supervisor tick must be non-zero",
            ));
        }
        if self.smart_floor.is_zero() {
            return Err(ThreadError::invalid_config(
                "smart_floor",
                "smart floor must be non-zero",
            ));
        }
        if self.queue_block_size == 0 {
            return Err(ThreadError::invalid_config(
                "queue_block_size",
                "queue block size must be greater than 0",
            ));
        }
        Ok(())
    }
}
