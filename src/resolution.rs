//! Results that are either ready now or still pending.
//!
//! Resolution stays synchronous as long as every step is synchronous. The
//! first step that hands back a future turns the whole chain into
//! [`ValueOrFuture::Pending`]; callers then choose between awaiting it
//! ([`ValueOrFuture::into_future`]) and failing fast
//! ([`ValueOrFuture::into_sync`]).

use std::fmt;
use std::future::Future;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::{Error, Result};

/// A value that may still be computing.
pub enum ValueOrFuture<T> {
    Ready(Result<T>),
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T: Send + 'static> ValueOrFuture<T> {
    pub fn ready(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    pub fn err(err: Error) -> Self {
        Self::Ready(Err(err))
    }

    /// Wraps a future.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Transforms the value once it is available.
    pub fn map<U, F>(self, f: F) -> ValueOrFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Self::Ready(r) => ValueOrFuture::Ready(r.map(f)),
            Self::Pending(fut) => ValueOrFuture::Pending(fut.map(|r| r.map(f)).boxed()),
        }
    }

    /// Chains a step that may itself be pending.
    ///
    /// Stays synchronous when both `self` and the result of `f` are ready.
    pub fn and_then<U, F>(self, f: F) -> ValueOrFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> ValueOrFuture<U> + Send + 'static,
    {
        match self {
            Self::Ready(Ok(value)) => f(value),
            Self::Ready(Err(err)) => ValueOrFuture::Ready(Err(err)),
            Self::Pending(fut) => {
                ValueOrFuture::Pending(async move { f(fut.await?).into_future().await }.boxed())
            }
        }
    }

    /// Converts into a future, ready immediately if the value is.
    pub fn into_future(self) -> BoxFuture<'static, Result<T>> {
        match self {
            Self::Ready(r) => future::ready(r).boxed(),
            Self::Pending(fut) => fut,
        }
    }

    /// Returns the value, failing with [`Error::AsyncResolution`] if it is pending.
    pub fn into_sync(self, key: &str) -> Result<T> {
        match self {
            Self::Ready(r) => r,
            Self::Pending(_) => Err(Error::AsyncResolution {
                key: key.to_string(),
            }),
        }
    }

    /// Joins values in order.
    ///
    /// Ready when every input is ready; otherwise the pending inputs are
    /// driven concurrently. A synchronous failure short-circuits at once.
    pub fn join_all(items: Vec<ValueOrFuture<T>>) -> ValueOrFuture<Vec<T>> {
        let mut slots: Vec<Option<T>> = Vec::with_capacity(items.len());
        let mut pending = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            match item {
                Self::Ready(Ok(value)) => slots.push(Some(value)),
                Self::Ready(Err(err)) => return ValueOrFuture::Ready(Err(err)),
                Self::Pending(fut) => {
                    slots.push(None);
                    pending.push(fut.map(move |r| r.map(|value| (index, value))));
                }
            }
        }

        if pending.is_empty() {
            return ValueOrFuture::Ready(Ok(slots.into_iter().flatten().collect()));
        }

        ValueOrFuture::Pending(
            async move {
                for (index, value) in future::try_join_all(pending).await? {
                    slots[index] = Some(value);
                }
                Ok(slots.into_iter().flatten().collect())
            }
            .boxed(),
        )
    }
}

impl<T: Send + 'static> From<Result<T>> for ValueOrFuture<T> {
    fn from(result: Result<T>) -> Self {
        Self::Ready(result)
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueOrFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(r) => f.debug_tuple("Ready").field(r).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
