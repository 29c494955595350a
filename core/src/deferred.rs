//! The deferred value state machine.
//!
//! A [`Deferred`] is a cheap handle around shared, mutex-guarded state:
//!
//! ```text
//! Pending(listeners) --settle--> Settled { result, backlog: Some(drainer) }
//!                                    | drain listeners, then backlog
//!                                    v
//!                               Settled { result, backlog: None }
//! ```
//!
//! `subscribe` is the only way to observe a value. It appends while pending, or
//! while the current thread is still delivering this value's listeners, and runs
//! the listener on the spot otherwise. Listeners never run with the lock held.
//!
//! Delivery and teardown both go through the per-thread [`trampoline`], so
//! settling or dropping a long chain does not grow the native stack.
//!
//! [`trampoline`]: crate::trampoline

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::State;
use crate::error::SettleError;
use crate::policy::{Policy, policy};
use crate::producer::{Fulfill, Producer, Reject, Resolver};
use crate::trampoline;

pub(crate) type Listener<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;

enum Phase<T, E> {
    Pending(Vec<Listener<T, E>>),
    Settled {
        result: Result<T, E>,
        /// `Some` until every listener has been delivered.
        backlog: Option<Backlog<T, E>>,
    },
}

/// Listeners attached on the delivering thread after delivery started.
struct Backlog<T, E> {
    drainer: ThreadId,
    queued: Vec<Listener<T, E>>,
}

struct Inner<T, E> {
    phase: Phase<T, E>,
    handled: bool,
}

impl<T, E> Inner<T, E> {
    fn take_listeners(&mut self) -> Vec<Listener<T, E>> {
        match &mut self.phase {
            Phase::Pending(listeners) => mem::take(listeners),
            Phase::Settled { backlog, .. } => backlog
                .take()
                .map(|backlog| backlog.queued)
                .unwrap_or_default(),
        }
    }

    fn is_unhandled_rejection(&self) -> bool {
        !self.handled
            && matches!(
                self.phase,
                Phase::Settled {
                    result: Err(_),
                    ..
                }
            )
    }
}

struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
    /// Hands leftover listeners to the trampoline. Fixed at construction, where
    /// `T` and `E` are known to be `'static`.
    discard: fn(Vec<Listener<T, E>>),
}

impl<T, E> Drop for Shared<T, E> {
    fn drop(&mut self) {
        let discard = self.discard;
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let listeners = inner.take_listeners();
        if !listeners.is_empty() {
            discard(listeners);
        }
        if inner.is_unhandled_rejection() {
            report_unhandled_rejection(policy());
        }
    }
}

fn discard<T: 'static, E: 'static>(listeners: Vec<Listener<T, E>>) {
    trampoline::run(Box::new(move || drop(listeners)));
}

pub(crate) fn report_unhandled_rejection(policy: Policy) {
    policy.unhandled_rejection.emit(format_args!(
        "rejected deferred value dropped without a failure handler"
    ));
}

pub(crate) fn report_late_settlement(policy: Policy, err: SettleError) {
    policy.late_settlement.emit(format_args!(
        "ignored settlement of a deferred value that is already {}",
        err.state()
    ));
}

/// A value that settles exactly once, to `Ok(T)` or `Err(E)`.
///
/// Cloning yields another handle to the same value.
///
/// # Example
///
/// ```
/// use deferral_core::{Deferred, State};
///
/// let doubled = Deferred::<i32, String>::fulfilled(21)
///     .then(|v| Ok(Some(v * 2)), |_| Ok(None))
///     .then(|_| Ok(None), |_| Ok(None));
///
/// assert_eq!(doubled.state(), State::Fulfilled);
/// assert_eq!(doubled.result(), Some(Ok(42)));
/// ```
pub struct Deferred<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .field("handled", &self.is_handled())
            .finish()
    }
}

impl<T, E> Deferred<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> State {
        match &self.lock().phase {
            Phase::Pending(_) => State::Pending,
            Phase::Settled { result, .. } => State::of(result),
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// Whether any listener was ever attached.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.lock().handled
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Build a value from one of the [`Producer`] shapes.
    ///
    /// Eager and resolver producers run synchronously, before this returns. A
    /// producer error before settlement rejects the value.
    pub fn new(producer: Producer<T, E>) -> Self {
        tracing::trace!(arity = producer.arity(), "building deferred value");
        match producer {
            Producer::Value(value) => Self::from_result(Ok(value)),
            Producer::Eager(produce) => Self::from_result(produce()),
            Producer::Resolve(resolve) => {
                let deferred = Self::unsettled();
                let outcome = resolve(Fulfill::new(deferred.clone()));
                deferred.absorb_producer_error(outcome);
                deferred
            }
            Producer::ResolveOrReject(resolve) => {
                let deferred = Self::unsettled();
                let outcome = resolve(
                    Fulfill::new(deferred.clone()),
                    Reject::new(deferred.clone()),
                );
                deferred.absorb_producer_error(outcome);
                deferred
            }
        }
    }

    #[must_use]
    pub fn fulfilled(value: T) -> Self {
        Self::new(Producer::Value(value))
    }

    #[must_use]
    pub fn rejected(error: E) -> Self {
        Self::from_result(Err(error))
    }

    pub fn eager<F>(produce: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'static,
    {
        Self::new(Producer::eager(produce))
    }

    pub fn with_resolver<F>(resolve: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>) -> Result<(), E> + 'static,
    {
        Self::new(Producer::resolve(resolve))
    }

    pub fn with_resolvers<F>(resolve: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>, Reject<T, E>) -> Result<(), E> + 'static,
    {
        Self::new(Producer::resolve_or_reject(resolve))
    }

    /// A pending value together with the handle that settles it.
    #[must_use]
    pub fn pending() -> (Self, Resolver<T, E>) {
        let deferred = Self::unsettled();
        let resolver = Resolver::new(deferred.clone());
        (deferred, resolver)
    }

    pub(crate) fn unsettled() -> Self {
        Self::with_phase(Phase::Pending(Vec::new()))
    }

    fn from_result(result: Result<T, E>) -> Self {
        Self::with_phase(Phase::Settled {
            result,
            backlog: None,
        })
    }

    fn with_phase(phase: Phase<T, E>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    phase,
                    handled: false,
                }),
                discard: discard::<T, E>,
            }),
        }
    }

    fn absorb_producer_error(&self, outcome: Result<(), E>) {
        if let Err(error) = outcome
            && self.settle(Err(error)).is_err()
        {
            tracing::debug!("resolver failed after settling; error ignored");
        }
    }

    /// Clone of the settled result, or `None` while pending.
    ///
    /// Peeking does not count as handling a rejection.
    #[must_use]
    pub fn result(&self) -> Option<Result<T, E>> {
        match &self.lock().phase {
            Phase::Pending(_) => None,
            Phase::Settled { result, .. } => Some(result.clone()),
        }
    }

    /// Attach a continuation pair and return the value it produces.
    ///
    /// Both handlers return `Result<Option<T>, E>`:
    ///
    /// | returns       | success handler          | failure handler             |
    /// |---------------|--------------------------|-----------------------------|
    /// | `Ok(Some(v))` | child fulfills with `v`  | child recovers with `v`     |
    /// | `Ok(None)`    | child gets parent value  | child gets parent error     |
    /// | `Err(e)`      | child rejects with `e`   | child rejects with `e`      |
    ///
    /// If `self` already settled, the matching handler runs before this returns.
    /// The one exception is a `then` made on the thread that is still delivering
    /// this value's listeners: the pair is queued behind them and runs before that
    /// delivery finishes.
    pub fn then<S, F>(&self, on_success: S, on_failure: F) -> Deferred<T, E>
    where
        S: FnOnce(&T) -> Result<Option<T>, E> + Send + 'static,
        F: FnOnce(&E) -> Result<Option<T>, E> + Send + 'static,
    {
        let child = Self::unsettled();
        let link = child.clone();
        self.subscribe(Box::new(move |result| {
            let next = match result {
                Ok(value) => on_success(value)
                    .map(|produced| produced.unwrap_or_else(|| value.clone())),
                Err(error) => match on_failure(error) {
                    Ok(Some(recovered)) => Ok(recovered),
                    Ok(None) => Err(error.clone()),
                    Err(raised) => Err(raised),
                },
            };
            link.forward(next);
        }));
        child
    }

    /// Transform the success value into another type. Rejections pass through.
    pub fn map<U, F>(&self, transform: F) -> Deferred<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Result<U, E> + Send + 'static,
    {
        let child: Deferred<U, E> = Deferred::unsettled();
        let link = child.clone();
        self.subscribe(Box::new(move |result| {
            let next = match result {
                Ok(value) => transform(value),
                Err(error) => Err(error.clone()),
            };
            link.forward(next);
        }));
        child
    }

    /// `then` with a pass-through success handler.
    pub fn catch<F>(&self, on_failure: F) -> Deferred<T, E>
    where
        F: FnOnce(&E) -> Result<Option<T>, E> + Send + 'static,
    {
        self.then(|_| Ok(None), on_failure)
    }

    /// Run `listener` once this value settles: later if pending, now otherwise.
    ///
    /// While the current thread is delivering this value's listeners, `listener`
    /// joins the backlog so delivery stays in registration order. Other threads
    /// never wait on that delivery and run `listener` themselves.
    pub(crate) fn subscribe(&self, listener: Listener<T, E>) {
        let me = thread::current().id();
        let ready = {
            let mut inner = self.lock();
            inner.handled = true;
            match &mut inner.phase {
                Phase::Pending(listeners) => {
                    listeners.push(listener);
                    return;
                }
                Phase::Settled {
                    backlog: Some(backlog),
                    ..
                } if backlog.drainer == me => {
                    backlog.queued.push(listener);
                    return;
                }
                Phase::Settled { result, .. } => result.clone(),
            }
        };
        listener(&ready);
    }

    pub(crate) fn settle(&self, result: Result<T, E>) -> Result<(), SettleError> {
        let listeners = {
            let mut inner = self.lock();
            let listeners = match &mut inner.phase {
                Phase::Settled {
                    result: existing, ..
                } => {
                    return Err(SettleError::AlreadySettled {
                        state: State::of(existing),
                    });
                }
                Phase::Pending(listeners) => mem::take(listeners),
            };
            inner.phase = Phase::Settled {
                result: result.clone(),
                backlog: Some(Backlog {
                    drainer: thread::current().id(),
                    queued: Vec::new(),
                }),
            };
            listeners
        };

        tracing::trace!(
            state = %State::of(&result),
            listeners = listeners.len(),
            "deferred value settled"
        );
        let target = self.clone();
        trampoline::run(Box::new(move || target.drain(listeners, &result)));
        Ok(())
    }

    /// Settlement requested through a public handle; conflicts go through policy.
    pub(crate) fn settle_by_handle(&self, result: Result<T, E>) -> Result<(), SettleError> {
        self.settle(result)
            .inspect_err(|err| report_late_settlement(policy(), *err))
    }

    /// Settlement driven by a parent or aggregator, which settle a child only once.
    pub(crate) fn forward(&self, result: Result<T, E>) {
        if let Err(err) = self.settle(result) {
            tracing::debug!(%err, "dropped duplicate forwarded settlement");
        }
    }

    /// Deliver `batch`, then whatever joined the backlog meanwhile, until the
    /// backlog is empty and closed.
    ///
    /// A panicking listener does not stop delivery; the first panic is resumed
    /// once the backlog is closed.
    fn drain(&self, mut batch: Vec<Listener<T, E>>, result: &Result<T, E>) {
        let mut panicked = None;
        loop {
            for listener in batch.drain(..) {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(result)));
                if let Err(payload) = delivered
                    && panicked.is_none()
                {
                    panicked = Some(payload);
                }
            }

            let mut inner = self.lock();
            let Phase::Settled { backlog, .. } = &mut inner.phase else {
                break;
            };
            let more = match backlog.as_mut() {
                Some(open) if !open.queued.is_empty() => Some(mem::take(&mut open.queued)),
                _ => None,
            };
            if let Some(queued) = more {
                batch = queued;
            } else {
                *backlog = None;
                break;
            }
        }

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
    }
}
