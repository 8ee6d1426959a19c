//! Per-worker timeout policies
//!
//! The supervisor evaluates a worker's [`TimeoutPolicy`] against the running
//! time of its in-flight job on every tick. The evaluation itself is a pure
//! function of the elapsed time and the worker's job history, which keeps it
//! testable without real clocks.

use crate::core::{Result, ThreadError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default budget for `Smart` workers that have not finished enough jobs yet
pub const DEFAULT_SMART_FLOOR: Duration = Duration::from_secs(30);

/// Jobs a `Smart` worker must finish before its history is trusted
pub const DEFAULT_SMART_WARMUP_JOBS: u64 = 3;

/// Lower bound for the adaptive `Smart` budget
pub const DEFAULT_SMART_MIN_BUDGET: Duration = Duration::from_secs(1);

/// How long a worker may spend on a single job before it is killed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    /// Jobs may run forever
    #[default]
    None,
    /// Jobs may run for at most the given (non-zero) duration
    Explicit(Duration),
    /// Budget derived from the worker's recent job durations
    ///
    /// Until the worker has finished `warmup_jobs` jobs the budget is the
    /// configured floor. After that it is twice the average job time, clamped
    /// from below by the smart minimum budget (one second by default), so a
    /// sub-second workload is not flagged until it passes that minimum.
    /// Configuring [`with_smart_min_budget(Duration::ZERO)`] removes the clamp
    /// and a job is flagged exactly when it runs longer than twice the average.
    ///
    /// [`with_smart_min_budget(Duration::ZERO)`]: crate::ControllerConfig::with_smart_min_budget
    Smart,
}

impl TimeoutPolicy {
    /// Fixed budget of `secs` seconds
    ///
    /// # Errors
    ///
    /// Returns `ThreadError::InvalidConfig` if `secs` is zero.
    pub fn explicit_secs(secs: u64) -> Result<Self> {
        Self::explicit(Duration::from_secs(secs))
    }

    /// Fixed budget
    ///
    /// # Errors
    ///
    /// Returns `ThreadError::InvalidConfig` if `budget` is zero.
    pub fn explicit(budget: Duration) -> Result<Self> {
        let policy = TimeoutPolicy::Explicit(budget);
        policy.validate()?;
        Ok(policy)
    }

    /// Check a policy built directly from the variants or deserialized
    ///
    /// # Errors
    ///
    /// Returns `ThreadError::InvalidConfig` for an `Explicit` zero budget.
    pub fn validate(&self) -> Result<()> {
        match self {
            TimeoutPolicy::Explicit(budget) if budget.is_zero() => Err(
                ThreadError::invalid_config("timeout", "explicit timeout must be greater than zero"),
            ),
            _ => Ok(()),
        }
    }

    /// Decode the classic integer encoding: `0` none, negative smart,
    /// positive seconds
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => TimeoutPolicy::None,
            r if r < 0 => TimeoutPolicy::Smart,
            secs => TimeoutPolicy::Explicit(Duration::from_secs(secs as u64)),
        }
    }

    /// Budget for the current job, or `None` if the job may run forever
    pub fn budget(&self, jobs_run: u64, average: Duration, limits: &SmartLimits) -> Option<Duration> {
        match self {
            TimeoutPolicy::None => None,
            TimeoutPolicy::Explicit(budget) => Some(*budget),
            TimeoutPolicy::Smart => {
                if jobs_run < limits.warmup_jobs {
                    Some(limits.floor)
                } else {
                    Some(average.saturating_mul(2).max(limits.min_budget))
                }
            }
        }
    }

    /// Whether a job running for `elapsed` has blown its budget
    pub fn is_exceeded(
        &self,
        elapsed: Duration,
        jobs_run: u64,
        average: Duration,
        limits: &SmartLimits,
    ) -> bool {
        self.budget(jobs_run, average, limits)
            .is_some_and(|budget| elapsed > budget)
    }
}

impl std::fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutPolicy::None => write!(f, "none"),
            TimeoutPolicy::Explicit(d) => write!(f, "explicit({:?})", d),
            TimeoutPolicy::Smart => write!(f, "smart"),
        }
    }
}

/// Tunables for the `Smart` policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartLimits {
    /// Budget used while fewer than `warmup_jobs` jobs have run
    pub floor: Duration,
    /// Jobs required before the history-based budget applies
    pub warmup_jobs: u64,
    /// The history-based budget never drops below this
    pub min_budget: Duration,
}

impl Default for SmartLimits {
    fn default() -> Self {
        Self {
            floor: DEFAULT_SMART_FLOOR,
            warmup_jobs: DEFAULT_SMART_WARMUP_JOBS,
            min_budget: DEFAULT_SMART_MIN_BUDGET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_none_never_flags() {
        let limits = SmartLimits::default();
        assert!(!TimeoutPolicy::None.is_exceeded(secs(100_000), 50, secs(1), &limits));
    }

    #[test]
    fn test_explicit_budget() {
        let limits = SmartLimits::default();
        let policy = TimeoutPolicy::explicit_secs(10).unwrap();
        assert!(policy.is_exceeded(secs(11), 0, Duration::ZERO, &limits));
        assert!(!policy.is_exceeded(secs(9), 0, Duration::ZERO, &limits));
        assert!(!policy.is_exceeded(secs(10), 0, Duration::ZERO, &limits));
    }

    #[test]
    fn test_explicit_rejects_zero() {
        let err = TimeoutPolicy::explicit_secs(0).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidConfig { .. }));
    }

    #[test]
    fn test_smart_uses_floor_during_warmup() {
        let limits = SmartLimits::default();
        assert!(TimeoutPolicy::Smart.is_exceeded(secs(31), 2, Duration::ZERO, &limits));
        assert!(!TimeoutPolicy::Smart.is_exceeded(secs(29), 2, secs(1), &limits));
    }

    #[test]
    fn test_smart_uses_twice_the_average() {
        let limits = SmartLimits::default();
        assert!(TimeoutPolicy::Smart.is_exceeded(secs(9), 5, secs(4), &limits));
        assert!(!TimeoutPolicy::Smart.is_exceeded(secs(7), 5, secs(4), &limits));
    }

    #[test]
    fn test_smart_budget_has_lower_bound() {
        let limits = SmartLimits::default();
        let budget = TimeoutPolicy::Smart.budget(10, Duration::from_millis(2), &limits);
        assert_eq!(budget, Some(DEFAULT_SMART_MIN_BUDGET));
    }

    #[test]
    fn test_validate_catches_zero_explicit_variant() {
        assert!(TimeoutPolicy::None.validate().is_ok());
        assert!(TimeoutPolicy::Smart.validate().is_ok());
        assert!(TimeoutPolicy::Explicit(Duration::from_millis(1)).validate().is_ok());

        let err = TimeoutPolicy::Explicit(Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, ThreadError::InvalidConfig { .. }));

        let decoded: TimeoutPolicy =
            serde_json::from_str(r#"{"Explicit":{"secs":0,"nanos":0}}"#).unwrap();
        assert!(decoded.validate().is_err());
    }

    #[test]
    fn test_smart_without_lower_bound_is_twice_the_average() {
        let limits = SmartLimits {
            min_budget: Duration::ZERO,
            ..SmartLimits::default()
        };
        let average = Duration::from_millis(100);
        assert!(TimeoutPolicy::Smart.is_exceeded(Duration::from_millis(500), 5, average, &limits));
        assert!(TimeoutPolicy::Smart.is_exceeded(Duration::from_millis(201), 5, average, &limits));
        assert!(!TimeoutPolicy::Smart.is_exceeded(Duration::from_millis(200), 5, average, &limits));

        let clamped = SmartLimits::default();
        assert!(!TimeoutPolicy::Smart.is_exceeded(Duration::from_millis(500), 5, average, &clamped));
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(TimeoutPolicy::from_raw(0), TimeoutPolicy::None);
        assert_eq!(TimeoutPolicy::from_raw(-1), TimeoutPolicy::Smart);
        assert_eq!(TimeoutPolicy::from_raw(15), TimeoutPolicy::Explicit(secs(15)));
    }
}
