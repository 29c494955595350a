//! Producer shapes and the settlement handles given to resolvers.

use crate::Deferred;
use crate::error::SettleError;

/// The ways a [`Deferred`] can be produced.
///
/// The shape is chosen once, when the value is built. Producers of any other shape,
/// such as a resolver taking three handles, do not type-check:
///
/// ```compile_fail
/// use deferral_core::Deferred;
///
/// let _ = Deferred::<i32, String>::with_resolvers(|fulfill, reject, extra| Ok(()));
/// ```
pub enum Producer<T, E> {
    /// An already computed value.
    Value(T),
    /// Called immediately; its result settles the value.
    Eager(Box<dyn FnOnce() -> Result<T, E>>),
    /// Called immediately with a fulfill handle, settles whenever it likes.
    Resolve(Box<dyn FnOnce(Fulfill<T, E>) -> Result<(), E>>),
    /// Called immediately with fulfill and reject handles.
    ResolveOrReject(Box<dyn FnOnce(Fulfill<T, E>, Reject<T, E>) -> Result<(), E>>),
}

impl<T, E> Producer<T, E> {
    pub fn eager<F>(produce: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'static,
    {
        Producer::Eager(Box::new(produce))
    }

    pub fn resolve<F>(resolve: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>) -> Result<(), E> + 'static,
    {
        Producer::Resolve(Box::new(resolve))
    }

    pub fn resolve_or_reject<F>(resolve: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>, Reject<T, E>) -> Result<(), E> + 'static,
    {
        Producer::ResolveOrReject(Box::new(resolve))
    }

    /// Number of settlement handles the producer receives.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Producer::Value(_) | Producer::Eager(_) => 0,
            Producer::Resolve(_) => 1,
            Producer::ResolveOrReject(_) => 2,
        }
    }
}

/// Success half of a resolver. Cheap to clone and safe to move to other threads.
pub struct Fulfill<T, E> {
    target: Deferred<T, E>,
}

/// Failure half of a resolver.
pub struct Reject<T, E> {
    target: Deferred<T, E>,
}

/// Both settlement handles of a value created with [`Deferred::pending`].
pub struct Resolver<T, E> {
    target: Deferred<T, E>,
}

impl<T, E> Fulfill<T, E> {
    pub(crate) fn new(target: Deferred<T, E>) -> Self {
        Self { target }
    }
}

impl<T, E> Reject<T, E> {
    pub(crate) fn new(target: Deferred<T, E>) -> Self {
        Self { target }
    }
}

impl<T, E> Resolver<T, E> {
    pub(crate) fn new(target: Deferred<T, E>) -> Self {
        Self { target }
    }
}

impl<T, E> Fulfill<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn fulfill(&self, value: T) -> Result<(), SettleError> {
        self.target.settle_by_handle(Ok(value))
    }
}

impl<T, E> Reject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn reject(&self, error: E) -> Result<(), SettleError> {
        self.target.settle_by_handle(Err(error))
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn fulfill(&self, value: T) -> Result<(), SettleError> {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: E) -> Result<(), SettleError> {
        self.settle(Err(error))
    }

    pub fn settle(&self, result: Result<T, E>) -> Result<(), SettleError> {
        self.target.settle_by_handle(result)
    }

    /// Split into the two single-purpose handles.
    #[must_use]
    pub fn split(self) -> (Fulfill<T, E>, Reject<T, E>) {
        (
            Fulfill::new(self.target.clone()),
            Reject::new(self.target),
        )
    }
}

impl<T, E> Clone for Fulfill<T, E> {
    fn clone(&self) -> Self {
        Self::new(self.target.clone())
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self::new(self.target.clone())
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self::new(self.target.clone())
    }
}
