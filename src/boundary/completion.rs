//! Exactly-once completion delivery.
//!
//! # Responsibilities
//! - Carry a success continuation and an error continuation for one operation
//! - Fire exactly one of them exactly once
//! - Never fire before the initiating call has returned
//!
//! # Design Decisions
//! - `complete` consumes the value, so a second delivery cannot compile
//! - A completion dropped without firing reports `closed`; the caller is
//!   never left waiting forever
//! - Errors cross the boundary as `Reason`, not as `EtlsError`

use std::fmt;
use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{ErrorKind, EtlsResult, Reason};

type OnSuccess<T> = Box<dyn FnOnce(T) + Send>;
type OnError = Box<dyn FnOnce(Reason) + Send>;

enum Continuation<T> {
    Callbacks {
        on_success: OnSuccess<T>,
        on_error: OnError,
    },
    Channel(oneshot::Sender<Result<T, Reason>>),
}

impl<T> Continuation<T> {
    fn fire(self, outcome: Result<T, Reason>) {
        match self {
            Continuation::Callbacks {
                on_success,
                on_error,
            } => match outcome {
                Ok(value) => on_success(value),
                Err(reason) => on_error(reason),
            },
            Continuation::Channel(reply) => {
                if let Err(late) = reply.send(outcome) {
                    tracing::debug!(
                        succeeded = late.is_ok(),
                        "Outcome arrived after the caller stopped waiting; discarded"
                    );
                }
            }
        }
    }
}

/// Continuation pair for one asynchronous operation.
pub struct Completion<T> {
    continuation: Option<Continuation<T>>,
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.continuation {
            Some(Continuation::Callbacks { .. }) => "callbacks",
            Some(Continuation::Channel(_)) => "channel",
            None => "fired",
        };
        f.debug_struct("Completion").field("continuation", &kind).finish()
    }
}

impl<T> Completion<T> {
    pub fn new(
        on_success: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(Reason) + Send + 'static,
    ) -> Self {
        Self {
            continuation: Some(Continuation::Callbacks {
                on_success: Box::new(on_success),
                on_error: Box::new(on_error),
            }),
        }
    }

    pub(crate) fn channel(reply: oneshot::Sender<Result<T, Reason>>) -> Self {
        Self {
            continuation: Some(Continuation::Channel(reply)),
        }
    }

    /// Deliver the outcome. Errors become a `Reason`.
    pub fn complete(mut self, result: EtlsResult<T>) {
        if let Some(continuation) = self.continuation.take() {
            continuation.fire(result.map_err(Reason::from));
        }
    }
}

impl<T: Send + 'static> Completion<T> {
    /// Run `operation` on `runtime` and complete with its result.
    pub(crate) fn deliver_on<F>(self, runtime: &Handle, operation: F)
    where
        F: Future<Output = EtlsResult<T>> + Send + 'static,
    {
        runtime.spawn(async move {
            let result = operation.await;
            self.complete(result);
        });
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(continuation) = self.continuation.take() {
            tracing::debug!("Completion dropped before the operation finished");
            continuation.fire(Err(Reason::new(
                ErrorKind::Closed,
                "engine stopped before the operation completed",
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recording<T: Send + 'static>() -> (Completion<T>, Arc<Mutex<Vec<Result<T, Reason>>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok_log = Arc::clone(&log);
        let err_log = Arc::clone(&log);
        let completion = Completion::new(
            move |value| ok_log.lock().unwrap().push(Ok(value)),
            move |reason| err_log.lock().unwrap().push(Err(reason)),
        );
        (completion, log)
    }

    #[test]
    fn success_fires_only_the_success_continuation() {
        let (completion, log) = recording::<u32>();
        completion.complete(Ok(7));
        assert_eq!(*log.lock().unwrap(), vec![Ok(7)]);
    }

    #[test]
    fn errors_arrive_as_reasons() {
        let (completion, log) = recording::<u32>();
        completion.complete(Err(EtlsError::Closed));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        let reason = log[0].as_ref().unwrap_err();
        assert_eq!(reason.kind, ErrorKind::Closed);
    }

    #[test]
    fn dropping_unfired_completion_reports_closed() {
        let (completion, log) = recording::<u32>();
        drop(completion);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].as_ref().unwrap_err().kind, ErrorKind::Closed);
    }

    #[tokio::test]
    async fn deliver_on_fires_after_the_call_returns() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let completion = {
            let fired = Arc::clone(&fired);
            Completion::new(
                move |value: u32| {
                    fired.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(value);
                },
                |_| panic!("unexpected error"),
            )
        };

        completion.deliver_on(&Handle::current(), async { Ok(3) });
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(rx.await.unwrap(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_channel_delivery_is_discarded() {
        let (tx, rx) = oneshot::channel::<Result<u32, Reason>>();
        drop(rx);
        Completion::channel(tx).complete(Ok(1));
    }
}
