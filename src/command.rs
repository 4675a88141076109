//! The closures a breaker guards and falls back to.
//!
//! Each trait has a blanket impl for the matching closure shape, so callers
//! normally pass plain `async` closures and never name these traits.

use crate::{error::BreakerError, invocation::Invocation};
use std::{future::Future, pin::Pin};

/// Boxed, sendable future used at the command seams.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Error type a direct command may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A guarded operation that reports its outcome by returning.
///
/// `Err(_)` counts as a failure, the same as running past the timeout.
pub trait Command<A, B>: Send + Sync + 'static {
    fn call(&self, args: A) -> BoxFuture<Result<B, BoxError>>;
}

impl<A, B, E, F, Fut> Command<A, B> for F
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self, args: A) -> BoxFuture<Result<B, BoxError>> {
        let fut = self(args);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// A guarded operation that reports its own outcome through the
/// [`Invocation`] it receives. Its return value is discarded.
pub trait ContextCommand<A, B>: Send + Sync + 'static {
    fn call(&self, invocation: Invocation<A>) -> BoxFuture<B>;
}

impl<A, B, F, Fut> ContextCommand<A, B> for F
where
    F: Fn(Invocation<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = B> + Send + 'static,
{
    fn call(&self, invocation: Invocation<A>) -> BoxFuture<B> {
        Box::pin(self(invocation))
    }
}

/// Degraded path, run on fast-fail or timeout and never on success.
pub trait Fallback<C>: Send + Sync + 'static {
    fn call(&self, error: BreakerError, args: C);
}

impl<C, F> Fallback<C> for F
where
    F: Fn(BreakerError, C) + Send + Sync + 'static,
{
    fn call(&self, error: BreakerError, args: C) {
        self(error, args)
    }
}
