use crate::Error;
use futures::channel::oneshot;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// The outcome of a ledger operation.
///
/// Resolves exactly once, to either the value or the error that prevented it.
/// If the ledger drops the operation without resolving it, the outcome is
/// [Error::Dropped].
pub struct Pending<T> {
    receiver: oneshot::Receiver<Result<T, Error>>,
}

/// Resolves a [Pending] operation.
pub struct Resolver<T> {
    sender: oneshot::Sender<Result<T, Error>>,
}

impl<T> Pending<T> {
    /// Returns an unresolved operation and the handle that resolves it.
    pub fn new() -> (Resolver<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (Resolver { sender }, Self { receiver })
    }

    /// Returns an operation that has already resolved.
    pub fn ready(result: Result<T, Error>) -> Self {
        let (resolver, pending) = Self::new();
        resolver.resolve(result);
        pending
    }
}

impl<T> Resolver<T> {
    /// Resolves the operation, consuming the handle.
    ///
    /// Nothing happens if the [Pending] side was dropped.
    pub fn resolve(self, result: Result<T, Error>) {
        let _ = self.sender.send(result);
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::Dropped).and_then(|r| r))
    }
}
