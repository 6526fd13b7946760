use std::pin::pin;
use std::time::Duration;

use futures_util::future::{Either, select};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::CancelCause;

/// Deadline plus imperative cancel, handed to every blocking connection
/// operation.
///
/// A token is cheap to clone; clones share the cancel signal, so one task
/// can hold a clone and cancel a `recv` blocked in another. Deadlines are
/// fixed at construction and travel with the clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CancelToken {
    /// A token that never fires.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// A token that fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> CancelToken {
        CancelToken {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// A token that fires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> CancelToken {
        CancelToken::with_deadline(Instant::now() + timeout)
    }

    /// Signal the token. Every operation blocked on this token (or a
    /// clone) returns promptly with [`CancelCause::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cause this token currently reports, if it has fired.
    ///
    /// An imperative cancel takes precedence over an elapsed deadline.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.cancel.is_cancelled() {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the token fires; pends forever on a token that never
    /// will.
    pub async fn fired(&self) -> CancelCause {
        match self.deadline {
            None => {
                self.cancel.cancelled().await;
                CancelCause::Cancelled
            }
            Some(deadline) => {
                let cancelled = pin!(self.cancel.cancelled());
                let expired = pin!(sleep_until(deadline));
                match select(cancelled, expired).await {
                    Either::Left(_) => CancelCause::Cancelled,
                    Either::Right(_) => CancelCause::DeadlineExceeded,
                }
            }
        }
    }

    /// Race a future against this token; the token firing first wins with
    /// its cause.
    pub(crate) async fn guard<T>(&self, fut: impl Future<Output = T>) -> Result<T, CancelCause> {
        let fut = pin!(fut);
        let fired = pin!(self.fired());
        match select(fired, fut).await {
            Either::Left((cause, _)) => Err(cause),
            Either::Right((value, _)) => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio_test_lite::test]
    async fn fresh_token_reports_nothing() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.cause(), None);
    }

    #[tokio_test_lite::test]
    async fn cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.cause(), Some(CancelCause::Cancelled));
        assert_eq!(clone.fired().await, CancelCause::Cancelled);
    }

    #[tokio_test_lite::test]
    async fn deadline_fires_with_deadline_cause() {
        let token = CancelToken::with_timeout(Duration::from_millis(5));
        assert_eq!(token.fired().await, CancelCause::DeadlineExceeded);
        assert_eq!(token.cause(), Some(CancelCause::DeadlineExceeded));
    }

    #[tokio_test_lite::test]
    async fn cancel_wins_over_elapsed_deadline() {
        let token = CancelToken::with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        assert_eq!(token.cause(), Some(CancelCause::Cancelled));
    }

    #[tokio_test_lite::test]
    async fn guard_returns_cause_when_already_fired() {
        let token = CancelToken::new();
        token.cancel();
        let result = token.guard(std::future::pending::<()>()).await;
        assert_eq!(result.unwrap_err(), CancelCause::Cancelled);
    }

    #[tokio_test_lite::test]
    async fn guard_passes_through_completion() {
        let token = CancelToken::new();
        let result = token.guard(async { 7u32 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
