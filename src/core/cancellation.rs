//! Cooperative cancellation
//!
//! A [`CancellationToken`] is the cooperative half of the pool's two
//! cancellation signals. The controller owns a root token; every worker gets a
//! child of it, and the jobs a worker runs can observe that child through
//! [`Job::cancellation_token`](crate::Job::cancellation_token).
//!
//! Cancelling a token never interrupts anything by itself. Work functions that
//! poll the token can bail out early; the forced half (abandoning a worker that
//! exceeded its timeout) is handled by the supervisor.
//!
//! # Example
//!
//! ```rust
//! use supervised_thread_pool::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child1 = parent.child();
//! let child2 = parent.child();
//!
//! parent.cancel();
//!
//! assert!(child1.is_cancelled());
//! assert!(child2.is_cancelled());
//! ```

use crate::core::{Result, ThreadError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Reason for cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()`
    Manual,
    /// The controller is shutting down
    Shutdown,
    /// The worker was asked to terminate by an explicit kill
    Killed,
    /// The worker exceeded its timeout budget
    Timeout(Duration),
    /// Cancelled because the parent token was cancelled
    ParentCancelled,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Shutdown => write!(f, "controller shutting down"),
            CancellationReason::Killed => write!(f, "worker killed"),
            CancellationReason::Timeout(d) => write!(f, "timeout after {:?}", d),
            CancellationReason::ParentCancelled => write!(f, "parent was cancelled"),
        }
    }
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    /// Child tokens (weak references to avoid cycles)
    children: RwLock<Vec<Weak<CancellationTokenInner>>>,
    reason: RwLock<Option<CancellationReason>>,
}

impl CancellationTokenInner {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            children: RwLock::new(Vec::new()),
            reason: RwLock::new(None),
        }
    }
}

/// A thread-safe, hierarchical cancellation flag
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner::new()),
        }
    }

    /// Creates a child token linked to this parent
    ///
    /// The child is cancelled when the parent is cancelled. If the parent is
    /// already cancelled, the child is created cancelled.
    pub fn child(&self) -> Self {
        let child = CancellationToken {
            inner: Arc::new(CancellationTokenInner::new()),
        };

        {
            let mut children = self.inner.children.write();
            // Drop entries for children that no longer exist
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        if self.is_cancelled() {
            child.cancel_with_reason(CancellationReason::ParentCancelled);
        }

        child
    }

    /// Cancel this token with the `Manual` reason
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel this token and its children
    ///
    /// Only the first cancellation records a reason; later calls are no-ops.
    /// Returns `true` if this call performed the cancellation.
    pub fn cancel_with_reason(&self, reason: CancellationReason) -> bool {
        {
            // The reason is visible before the flag
            let mut slot = self.inner.reason.write();
            if self.inner.cancelled.load(Ordering::Acquire) {
                return false;
            }
            *slot = Some(reason);
            self.inner.cancelled.store(true, Ordering::Release);
        }

        let children: Vec<_> = self
            .inner
            .children
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for child_inner in children {
            CancellationToken { inner: child_inner }
                .cancel_with_reason(CancellationReason::ParentCancelled);
        }
        true
    }

    /// Check if this token has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason (if cancelled)
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// Returns `ThreadError::Cancelled` for `job_id` if cancelled
    ///
    /// Lets work functions bail out with `?`:
    ///
    /// ```rust
    /// use supervised_thread_pool::{CancellationToken, Result};
    ///
    /// fn process(token: &CancellationToken, job_id: u64) -> Result<()> {
    ///     for _chunk in 0..100 {
    ///         token.check(job_id)?;
    ///         // Do work...
    ///     }
    ///     Ok(())
    /// }
    ///
    /// let token = CancellationToken::new();
    /// assert!(process(&token, 1).is_ok());
    /// token.cancel();
    /// assert!(process(&token, 1).is_err());
    /// ```
    pub fn check(&self, job_id: u64) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(ThreadError::cancelled(job_id, reason))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        assert!(token.cancel_with_reason(CancellationReason::Shutdown));
        assert!(!token.cancel_with_reason(CancellationReason::Killed));
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancellationReason::Shutdown));
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.cancel_with_reason(CancellationReason::Shutdown);
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert_eq!(child.reason(), Some(CancellationReason::ParentCancelled));
    }

    #[test]
    fn test_child_cancellation_does_not_reach_parent() {
        let parent = CancellationToken::new();
        let child1 = parent.child();
        let child2 = parent.child();

        child1.cancel_with_reason(CancellationReason::Timeout(Duration::from_secs(3)));
        assert!(child1.is_cancelled());
        assert!(!child2.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn test_check_reports_reason() {
        let token = CancellationToken::new();
        assert!(token.check(7).is_ok());

        token.cancel_with_reason(CancellationReason::Killed);
        let err = token.check(7).unwrap_err();
        assert!(matches!(err, ThreadError::Cancelled { job_id: 7, .. }));
        assert!(err.to_string().contains("worker killed"));
    }

    #[test]
    fn test_concurrent_cancellation() {
        let token = CancellationToken::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = token.clone();
                thread::spawn(move || t.cancel_with_reason(CancellationReason::Manual))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
