//! Bridges between deferred values and whatever actually runs the work.
//!
//! Nothing here owns threads. A [`Scheduler`] is supplied by the caller: either
//! [`Inline`], or the caller's tokio runtime through its [`Handle`].

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::Deferred;
use crate::error::Abandoned;

/// Runs a job somewhere, now or later.
pub trait Scheduler {
    fn schedule(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Runs the job on the calling thread before `schedule` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Scheduler for Inline {
    fn schedule(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        job();
    }
}

/// Runs the job on the runtime's blocking pool.
impl Scheduler for Handle {
    fn schedule(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        drop(self.spawn_blocking(job));
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Run an eager producer through `scheduler` and settle with its result.
    pub fn scheduled<S, F>(scheduler: &S, produce: F) -> Self
    where
        S: Scheduler + ?Sized,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (deferred, resolver) = Self::pending();
        scheduler.schedule(Box::new(move || {
            let _ = resolver.settle(produce());
        }));
        deferred
    }

    /// Spawn `future` on `handle` and settle with its output.
    ///
    /// If the task panics or the runtime shuts down first, the value never settles.
    pub fn from_async<F>(handle: &Handle, future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (deferred, resolver) = Self::pending();
        drop(handle.spawn(async move {
            let _ = resolver.settle(future.await);
        }));
        deferred
    }

    /// Await settlement.
    ///
    /// Resolves to [`Abandoned`] if the value is dropped while still pending. The
    /// returned future does not borrow `self`.
    pub fn wait(
        &self,
    ) -> impl Future<Output = Result<Result<T, E>, Abandoned>> + Send + use<T, E> {
        let (tx, rx) = oneshot::channel();
        self.subscribe(Box::new(move |result| {
            let _ = tx.send(result.clone());
        }));
        async move { rx.await.map_err(|_| Abandoned) }
    }
}
