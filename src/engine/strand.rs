//! Per-handle serialized execution context.
//!
//! # Responsibilities
//! - Own a handle's mutable state inside one actor task
//! - Run submitted jobs one at a time, in submission order
//! - Turn panics inside a job into an internal error for that job only
//! - Stop immediately on close, dropping the running job and the state
//!
//! # Design Decisions
//! - No lock around live state: only the actor ever touches it
//! - Close is a watch flag checked before and during every job, so it
//!   preempts in-flight work instead of queueing behind it
//! - Dropping the state is the teardown; state types release their
//!   resources in `Drop`
//!
//! ```text
//! run(op, f) ──job──→ mpsc queue ──→ actor: f(&mut state).await
//!     ↑                                  │ (catch_unwind)
//!     └──────────── oneshot ←────────────┘
//! close() → watch flag → actor exits → state dropped
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::engine::state::Operation;
use crate::error::{EtlsError, EtlsResult};
use crate::observability::metrics;

type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

fn into_job<S, F>(f: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Sending side of a handle's actor. Clones share the same actor.
pub(crate) struct Strand<S> {
    jobs: mpsc::UnboundedSender<Job<S>>,
    closed: Arc<watch::Sender<bool>>,
}

impl<S> Clone for Strand<S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<S: Send + 'static> Strand<S> {
    /// Start the actor for `state` on `runtime`.
    pub(crate) fn spawn(runtime: &Handle, state: S, span: tracing::Span) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let (closed, closed_rx) = watch::channel(false);
        runtime.spawn(drive(state, queue, closed_rx).instrument(span));
        Self {
            jobs,
            closed: Arc::new(closed),
        }
    }

    /// Run `f` against the state after every previously submitted job.
    ///
    /// Resolves to `Closed` when the strand is closed before or while `f` runs.
    pub(crate) async fn run<T, F>(&self, operation: Operation, f: F) -> EtlsResult<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, EtlsResult<T>> + Send + 'static,
    {
        let result = self.submit(operation, f).await;
        if let Err(e) = &result {
            tracing::debug!(operation = %operation, error = %e, "Operation failed");
        }
        metrics::record_operation(operation, result.as_ref().map(|_| ()).map_err(EtlsError::kind));
        result
    }

    async fn submit<T, F>(&self, operation: Operation, f: F) -> EtlsResult<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, EtlsResult<T>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(EtlsError::Closed);
        }

        let (reply, outcome) = oneshot::channel();
        let job = into_job(move |state: &mut S| {
            let step = f(state);
            Box::pin(async move {
                let result = match AssertUnwindSafe(step).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let err = EtlsError::from_panic(operation, panic);
                        tracing::error!(operation = %operation, error = %err, "Operation panicked");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            })
        });

        self.jobs.send(job).map_err(|_| EtlsError::Closed)?;
        outcome.await.unwrap_or(Err(EtlsError::Closed))
    }

    /// Stop the actor. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn drive<S>(
    mut state: S,
    mut queue: mpsc::UnboundedReceiver<Job<S>>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            () = job(&mut state) => {}
        }
    }

    // Pending jobs are dropped with the queue; their callers see Closed.
    drop(queue);
    drop(state);
    tracing::trace!("Strand stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn strand(state: Vec<u32>) -> Strand<Vec<u32>> {
        Strand::spawn(&Handle::current(), state, tracing::Span::none())
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let strand = strand(Vec::new());
        let runs = (0..16u32).map(|i| {
            strand.run(Operation::Send, move |log| {
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    log.push(i);
                    Ok(log.len())
                })
            })
        });
        let lens: Vec<usize> = futures_util::future::join_all(runs)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(lens, (1..=16).collect::<Vec<_>>());

        let log = strand
            .run(Operation::Query, |log| Box::pin(async move { Ok(log.clone()) }))
            .await
            .unwrap();
        assert_eq!(log, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panics_fail_only_their_job() {
        let strand = strand(vec![1]);
        let err = strand
            .run(Operation::Receive, |state| Box::pin(async move { Ok(state[5]) }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let len = strand
            .run(Operation::Query, |state| Box::pin(async move { Ok(state.len()) }))
            .await
            .unwrap();
        assert_eq!(len, 1);
    }

    #[tokio::test]
    async fn close_preempts_the_running_job() {
        let strand = strand(Vec::new());
        let blocked = {
            let strand = strand.clone();
            tokio::spawn(async move {
                strand
                    .run(Operation::Receive, |_| {
                        Box::pin(async move {
                            futures_util::future::pending::<()>().await;
                            Ok(())
                        })
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(strand.close());
        assert!(!strand.close());
        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(EtlsError::Closed)));

        let after = strand
            .run(Operation::Send, |_| Box::pin(async move { Ok(()) }))
            .await;
        assert!(matches!(after, Err(EtlsError::Closed)));
    }
}
