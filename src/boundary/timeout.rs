//! Caller-side bounded waits.
//!
//! # Responsibilities
//! - Pair a `Completion` with a waitable `PendingOutcome`
//! - Bound the wait; a timeout becomes a `timeout` reason
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timing out does not cancel the operation. The late outcome is
//!   discarded with a debug event; a late socket or acceptor is dropped,
//!   which releases it once no other handle clone exists

use std::time::Duration;

use tokio::sync::oneshot;

use crate::boundary::Completion;
use crate::engine::Operation;
use crate::error::{ErrorKind, EtlsError, Reason};

/// Receiving side of a channel-backed `Completion`.
#[derive(Debug)]
pub struct PendingOutcome<T> {
    operation: Operation,
    outcome: oneshot::Receiver<Result<T, Reason>>,
}

/// A completion whose outcome can be awaited with a deadline.
pub fn channel<T>(operation: Operation) -> (Completion<T>, PendingOutcome<T>) {
    let (reply, outcome) = oneshot::channel();
    (Completion::channel(reply), PendingOutcome { operation, outcome })
}

impl<T> PendingOutcome<T> {
    /// Wait at most `limit` for the outcome.
    pub async fn wait(self, limit: Duration) -> Result<T, Reason> {
        match tokio::time::timeout(limit, self.outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Reason::new(
                ErrorKind::Internal,
                format!("{} completion vanished without an outcome", self.operation),
            )),
            Err(_) => {
                tracing::warn!(
                    operation = %self.operation,
                    limit_ms = limit.as_millis() as u64,
                    "Operation timed out; a late outcome will be discarded"
                );
                Err(Reason::from(EtlsError::Timeout {
                    operation: self.operation,
                    elapsed: limit,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn outcome_within_limit_is_returned() {
        let (completion, pending) = channel::<u32>(Operation::Receive);
        completion.deliver_on(&Handle::current(), async { Ok(5) });
        assert_eq!(pending.wait(Duration::from_secs(1)).await, Ok(5));
    }

    #[tokio::test]
    async fn slow_outcome_times_out_and_is_discarded() {
        let (completion, pending) = channel::<u32>(Operation::Accept);
        completion.deliver_on(&Handle::current(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(1)
        });

        let reason = pending.wait(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(reason.kind, ErrorKind::Timeout);
        // Let the late delivery happen against the dropped receiver.
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let (completion, pending) = channel::<u32>(Operation::Send);
        completion.complete(Err(EtlsError::Closed));
        let reason = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(reason.kind, ErrorKind::Closed);
    }
}
