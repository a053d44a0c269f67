use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_CALL_BUDGET: Duration = Duration::from_secs(3);

/// Caller-supplied deadline, threaded verbatim through every gateway call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    deadline: Option<Instant>,
}

/// Returned when a bounded call runs past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

impl CallContext {
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Earliest of the caller deadline and `now + budget`.
    pub fn effective_deadline(&self, budget: Duration) -> Instant {
        let local = Instant::now() + budget;
        match self.deadline {
            Some(deadline) if deadline < local => deadline,
            _ => local,
        }
    }

    pub async fn run<F, T>(&self, budget: Duration, fut: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.effective_deadline(budget), fut)
            .await
            .map_err(|_| Elapsed)
    }
}
