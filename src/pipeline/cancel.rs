//! Cooperative cancellation and deadlines for transfers and analysis runs.
//!
//! A `CancelSignal` wraps a `CancellationToken` plus an optional deadline.
//! Every await on a collaborator goes through `guard`, so a caller can stop
//! a batch or a run at any suspension point.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a guarded operation was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for Interruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Handle for wiring external triggers (Ctrl-C, shutdown) to this signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check, used before starting new work.
    pub fn check(&self) -> Result<(), Interruption> {
        if self.token.is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interruption::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless cancellation or the deadline fires
    /// first. The losing future is dropped.
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interruption::Cancelled),
            _ = deadline => Err(Interruption::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_passes_through_output() {
        let signal = CancelSignal::new();
        let out = signal.guard(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_polls() {
        let signal = CancelSignal::new();
        signal.cancel();
        let polled = std::sync::atomic::AtomicBool::new(false);
        let out = signal
            .guard(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
            })
            .await;
        assert_eq!(out, Err(Interruption::Cancelled));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let signal = CancelSignal::new();
        let token = signal.token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let out = signal.guard(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interruption::Cancelled));
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_future() {
        let signal = CancelSignal::new().with_timeout(Duration::from_millis(10));
        let out = signal.guard(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interruption::DeadlineExceeded));
        assert_eq!(signal.check(), Err(Interruption::DeadlineExceeded));
    }

    #[test]
    fn interruption_display() {
        assert_eq!(Interruption::DeadlineExceeded.to_string(), "deadline exceeded");
    }
}
