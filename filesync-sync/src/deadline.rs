//! Per-run deadline, checked between pipeline phases.

use std::time::{Duration, Instant};

use thiserror::Error;

/// The run went past its time budget.
#[derive(Debug, Clone, Copy, Error)]
#[error("run exceeded its {limit:?} deadline during {phase}")]
pub struct Elapsed {
    pub limit: Duration,
    pub phase: &'static str,
}

/// Wall-clock budget for one run. There is no mid-operation cancellation;
/// callers check at phase boundaries so a late run never reaches `push`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// A deadline that never fires.
    pub fn unbounded() -> Self {
        Self::new(Duration::MAX)
    }

    pub fn check(&self, phase: &'static str) -> Result<(), Elapsed> {
        if self.started.elapsed() > self.limit {
            tracing::warn!("deadline of {:?} exceeded before {phase}", self.limit);
            return Err(Elapsed {
                limit: self.limit,
                phase,
            });
        }
        Ok(())
    }
}
