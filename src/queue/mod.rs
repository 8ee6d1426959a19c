//! The shared job queue
//!
//! [`JobQueue`] is the only structure that every worker mutates. Producers
//! append jobs in arrival order; workers claim them from the front. A single
//! lock covers both ends, so a job handed to one claimant can never be handed
//! to another.
//!
//! Storage grows in fixed-size blocks to amortize allocation when producers
//! enqueue faster than workers drain.
//!
//! ```rust
//! use supervised_thread_pool::queue::JobQueue;
//!
//! let queue = JobQueue::new();
//! let first = queue.enqueue("a");
//! queue.enqueue("b");
//!
//! let claimed = queue.claim_next().unwrap();
//! assert_eq!(claimed.id(), first.id());
//! assert!(queue.has_pending());
//! ```

use crate::core::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Jobs per storage block
pub const DEFAULT_BLOCK_SIZE: usize = 256;

struct QueueInner<P> {
    pending: VecDeque<Arc<Job<P>>>,
    next_id: u64,
}

/// Ordered, claim-once collection of pending jobs
pub struct JobQueue<P> {
    inner: Mutex<QueueInner<P>>,
    block_size: usize,
    total_enqueued: AtomicU64,
    total_claimed: AtomicU64,
}

impl<P: Send + Sync + 'static> std::fmt::Debug for JobQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.len())
            .field("block_size", &self.block_size)
            .field("total_enqueued", &self.total_enqueued())
            .field("total_claimed", &self.total_claimed())
            .finish()
    }
}

impl<P: Send + Sync + 'static> Default for JobQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> JobQueue<P> {
    /// Creates an empty queue with the default block size
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates an empty queue growing `block_size` jobs at a time
    pub fn with_block_size(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::with_capacity(block_size),
                next_id: 1,
            }),
            block_size,
            total_enqueued: AtomicU64::new(0),
            total_claimed: AtomicU64::new(0),
        }
    }

    /// Wraps `payload` in a new job and appends it
    ///
    /// The returned handle is the caller's way to observe the job; the queue
    /// drops its own reference once the job is claimed.
    pub fn enqueue(&self, payload: P) -> Arc<Job<P>> {
        let mut inner = self.inner.lock();
        if inner.pending.len() == inner.pending.capacity() {
            inner.pending.reserve_exact(self.block_size);
        }
        let id = inner.next_id;
        inner.next_id += 1;

        let job = Arc::new(Job::new(id, payload));
        inner.pending.push_back(Arc::clone(&job));
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        job
    }

    /// True iff an unclaimed job remains
    pub fn has_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Removes and returns the earliest unclaimed job
    pub fn claim_next(&self) -> Option<Arc<Job<P>>> {
        let job = self.inner.lock().pending.pop_front()?;
        self.total_claimed.fetch_add(1, Ordering::Relaxed);
        Some(job)
    }

    /// Removes every unclaimed job, marking each `Stopped`
    pub fn drain_pending(&self) -> Vec<Arc<Job<P>>> {
        let drained: Vec<_> = self.inner.lock().pending.drain(..).collect();
        for job in &drained {
            job.mark_stopped();
        }
        drained
    }

    /// Number of unclaimed jobs
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// True iff no job is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots currently allocated
    pub fn capacity(&self) -> usize {
        self.inner.lock().pending.capacity()
    }

    /// Jobs enqueued over the queue's lifetime
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued.load(Ordering::Relaxed)
    }

    /// Jobs claimed over the queue's lifetime
    pub fn total_claimed(&self) -> u64 {
        self.total_claimed.load(Ordering::Relaxed)
    }
}
