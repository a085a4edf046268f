//! Continuation queue for trigger work.
//!
//! Source handlers run synchronously inside `set_source`, so they cannot render on
//! the spot. Instead they enqueue a job here, and the host drives the queue.

use crate::error::{RuntimeError, RuntimeResult};
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::{debug, error};

type Job = LocalBoxFuture<'static, RuntimeResult<()>>;

#[derive(Default)]
struct DispatcherInner {
    queue: RefCell<VecDeque<Job>>,
    notify: Notify,
    closed: Cell<bool>,
}

/// Shared handle to the job queue of one runtime
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, job: impl Future<Output = RuntimeResult<()>> + 'static) {
        if self.inner.closed.get() {
            return;
        }
        self.inner.queue.borrow_mut().push_back(job.boxed_local());
        self.inner.notify.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    fn take(&self) -> Option<Job> {
        self.inner.queue.borrow_mut().pop_front()
    }

    /// Run queued jobs concurrently until the queue is empty and nothing is in flight.
    ///
    /// Jobs enqueued while others are suspended are admitted immediately. Every job
    /// runs to completion; the first error is returned afterwards.
    pub async fn drain(&self) -> RuntimeResult<()> {
        let mut running = FuturesUnordered::new();
        let mut first_error: Option<RuntimeError> = None;
        let mut completed = 0usize;

        loop {
            while let Some(job) = self.take() {
                running.push(job);
            }
            if running.is_empty() {
                break;
            }
            tokio::select! {
                Some(result) = running.next() => {
                    completed += 1;
                    if let Err(err) = result {
                        error!(error = %err, "Triggered job failed");
                        first_error.get_or_insert(err);
                    }
                }
                _ = self.inner.notify.notified() => {}
            }
        }

        if completed > 0 {
            debug!(jobs = completed, "Dispatcher drained");
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drain forever until [`Dispatcher::close`] is called; job errors are logged.
    pub async fn run(&self) {
        while !self.inner.closed.get() {
            if let Err(err) = self.drain().await {
                error!(error = %err, "Dispatcher pass finished with errors");
            }
            if self.inner.closed.get() {
                break;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Drop queued jobs and stop accepting new ones
    pub fn close(&self) {
        self.inner.closed.set(true);
        self.inner.queue.borrow_mut().clear();
        self.inner.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_runs_jobs_enqueued_by_jobs() {
        let dispatcher = Dispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let (inner_dispatcher, inner_log) = (dispatcher.clone(), log.clone());
        dispatcher.enqueue(async move {
            inner_log.borrow_mut().push("first");
            let nested_log = inner_log.clone();
            inner_dispatcher.enqueue(async move {
                nested_log.borrow_mut().push("second");
                Ok(())
            });
            Ok(())
        });

        dispatcher.drain().await.unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_suspended_job_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let log = Rc::new(RefCell::new(Vec::new()));

        let waiting_log = log.clone();
        dispatcher.enqueue(async move {
            let _ = rx.await;
            waiting_log.borrow_mut().push("waited");
            Ok(())
        });
        let sending_log = log.clone();
        dispatcher.enqueue(async move {
            sending_log.borrow_mut().push("sent");
            let _ = tx.send(());
            Ok(())
        });

        dispatcher.drain().await.unwrap();
        assert_eq!(*log.borrow(), vec!["sent", "waited"]);
    }

    #[tokio::test]
    async fn test_first_error_reported_after_all_jobs() {
        let dispatcher = Dispatcher::new();
        let ran = Rc::new(Cell::new(0));
        for fail in [true, false, true] {
            let ran = ran.clone();
            dispatcher.enqueue(async move {
                ran.set(ran.get() + 1);
                if fail {
                    Err(RuntimeError::Provider("boom".into()))
                } else {
                    Ok(())
                }
            });
        }

        assert!(dispatcher.drain().await.is_err());
        assert_eq!(ran.get(), 3);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_ignores_jobs() {
        let dispatcher = Dispatcher::new();
        dispatcher.close();
        dispatcher.enqueue(async { Err(RuntimeError::Disposed) });
        assert_eq!(dispatcher.pending(), 0);
        dispatcher.run().await;
    }
}
