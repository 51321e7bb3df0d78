//! Per-call cancellation and deadline.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AuthError, CancelReason};

/// Caller context for one authentication attempt.
///
/// Every network-bound step runs under [`RequestContext::guard`], so
/// cancelling the token or passing the deadline stops the step and
/// yields [`AuthError::Canceled`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `fut`, abandoning it if the caller cancels or the deadline passes.
    pub(crate) async fn guard<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(AuthError::Canceled {
                operation,
                reason: CancelReason::Canceled,
            });
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(operation, "Operation canceled by caller");
                Err(AuthError::Canceled { operation, reason: CancelReason::Canceled })
            }
            _ = deadline => {
                debug!(operation, "Operation deadline exceeded");
                Err(AuthError::Canceled { operation, reason: CancelReason::DeadlineExceeded })
            }
            result = fut => result,
        }
    }
}
