//! Error types for the supervised thread pool

/// Result type for controller and worker operations
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Errors that can occur in the supervised thread pool
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ThreadError {
    /// Controller is already running, so its worker set is frozen
    #[error("Controller '{controller}' is already running with {worker_count} workers")]
    AlreadyRunning {
        /// Name of the controller
        controller: String,
        /// Number of registered worker threads
        worker_count: usize,
    },

    /// Controller was started without any registered worker threads
    #[error("Controller '{controller}' has no worker threads to start")]
    NoWorkers {
        /// Name of the controller
        controller: String,
    },

    /// No worker with the given id is registered
    #[error("Worker thread #{worker_id} is not registered")]
    WorkerNotFound {
        /// Requested worker id
        worker_id: usize,
    },

    /// Worker is in a state that does not allow the requested operation
    #[error("Worker thread #{worker_id} cannot {operation} while {state}")]
    InvalidWorkerState {
        /// Worker id
        worker_id: usize,
        /// Operation that was attempted
        operation: &'static str,
        /// Current worker state
        state: String,
    },

    /// Failed to spawn a worker or supervisor thread
    #[error("Failed to spawn thread #{thread_id}: {message}")]
    SpawnError {
        /// ID of the thread that failed to spawn
        thread_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a thread
    #[error("Failed to join thread #{thread_id}: {message}")]
    JoinError {
        /// ID of the thread that failed to join
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Work function reported a failure
    #[error("Job execution failed (job_id: {job_id}): {message}")]
    ExecutionError {
        /// ID of the failed job
        job_id: u64,
        /// Error message
        message: String,
    },

    /// Job was cancelled before it finished
    #[error("Job cancelled (job_id: {job_id}): {reason}")]
    Cancelled {
        /// ID of the cancelled job
        job_id: u64,
        /// Reason for cancellation
        reason: String,
    },

    /// Job exceeded its worker's timeout budget and the worker was killed
    #[error(
        "Processing thread #{worker_id} killed due to timeout after {elapsed_ms}ms \
         (budget {budget_ms}ms, job_id: {job_id})"
    )]
    JobTimeout {
        /// ID of the timed out job
        job_id: u64,
        /// Worker that was running it
        worker_id: usize,
        /// Time the job had been running
        elapsed_ms: u64,
        /// Budget the worker's policy allowed
        budget_ms: u64,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Work function panicked
    #[error("Worker thread #{thread_id} panicked: {message}")]
    WorkerPanic {
        /// ID of the panicked thread
        thread_id: usize,
        /// Panic message
        message: String,
    },

    /// Configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    Other(String),
}

impl ThreadError {
    /// Create an already running error
    pub fn already_running(controller: impl Into<String>, worker_count: usize) -> Self {
        ThreadError::AlreadyRunning {
            controller: controller.into(),
            worker_count,
        }
    }

    /// Create a no workers error
    pub fn no_workers(controller: impl Into<String>) -> Self {
        ThreadError::NoWorkers {
            controller: controller.into(),
        }
    }

    /// Create a worker not found error
    pub fn worker_not_found(worker_id: usize) -> Self {
        ThreadError::WorkerNotFound { worker_id }
    }

    /// Create an invalid worker state error
    pub fn invalid_worker_state(
        worker_id: usize,
        operation: &'static str,
        state: impl std::fmt::Display,
    ) -> Self {
        ThreadError::InvalidWorkerState {
            worker_id,
            operation,
            state: state.to_string(),
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        ThreadError::SpawnError {
            thread_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(thread_id: usize, message: impl Into<String>) -> Self {
        ThreadError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(job_id: u64, message: impl Into<String>) -> Self {
        ThreadError::ExecutionError {
            job_id,
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(job_id: u64, reason: impl Into<String>) -> Self {
        ThreadError::Cancelled {
            job_id,
            reason: reason.into(),
        }
    }

    /// Create a job timeout error
    pub fn job_timeout(
        job_id: u64,
        worker_id: usize,
        elapsed: std::time::Duration,
        budget: std::time::Duration,
    ) -> Self {
        ThreadError::JobTimeout {
            job_id,
            worker_id,
            elapsed_ms: elapsed.as_millis() as u64,
            budget_ms: budget.as_millis() as u64,
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a worker panic error
    pub fn worker_panic(thread_id: usize, message: impl Into<String>) -> Self {
        ThreadError::WorkerPanic {
            thread_id,
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ThreadError::Other(msg.into())
    }
}
