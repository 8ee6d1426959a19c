//! Worker priority levels
//!
//! A worker's priority is the number of jobs it claims per tick before
//! yielding, so a `Highest` worker drains the shared queue three times as fast
//! as a `Normal` one running jobs of the same length.

use serde::{Deserialize, Serialize};

/// Worker priority (batch size per tick)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ThreadPriority {
    /// One job per tick
    #[default]
    Normal = 1,
    /// Two jobs per tick
    High = 2,
    /// Three jobs per tick
    Highest = 3,
}

impl ThreadPriority {
    /// Number of jobs claimed per tick
    pub fn batch_size(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadPriority::Normal => write!(f, "normal"),
            ThreadPriority::High => write!(f, "high"),
            ThreadPriority::Highest => write!(f, "highest"),
        }
    }
}
