//! One-shot completions.
//!
//! ## Overview
//!
//! Bridges a single callback-style completion ("call me back once when
//! done") into an awaitable value. The producing side holds a [`Completer`]
//! and the consuming side awaits the paired [`Completion`]. Dropping the
//! completer without resolving it resolves the completion to
//! [`Abandoned`] instead of hanging forever.
//!
//! ## Usage
//!
//! ```rust
//! use core_async::completion::from_callback;
//!
//! async fn example() {
//!     let value = from_callback(|done| done.complete(42)).await;
//!     assert_eq!(value.ok(), Some(42));
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// The producing half of a completion was dropped before resolving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("completion abandoned before it was resolved")
    }
}

impl std::error::Error for Abandoned {}

/// Resolves the paired [`Completion`] exactly once.
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Completer<T> {
    /// Resolve the completion. A completion nobody awaits anymore is ignored.
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Whether the awaiting side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T, E> Completer<Result<T, E>> {
    /// Resolve a fallible completion from the `(error, value)` pair a
    /// callback typically receives.
    pub fn settle(self, error: Option<E>, value: T) {
        match error {
            Some(error) => self.complete(Err(error)),
            None => self.complete(Ok(value)),
        }
    }
}

/// Awaitable side of a completion.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Abandoned>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| Abandoned))
    }
}

/// Create a connected completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Completion { rx })
}

/// Start a callback-driven operation and return its awaitable result.
///
/// `start` runs immediately; it may resolve the completer synchronously or
/// hand it to whatever will eventually call back.
pub fn from_callback<T, F>(start: F) -> Completion<T>
where
    F: FnOnce(Completer<T>),
{
    let (completer, completion) = completion();
    start(completer);
    completion
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::test]
    async fn test_resolves_synchronously() {
        let value = from_callback(|done| done.complete("ready")).await;
        assert_eq!(value, Ok("ready"));
    }

    #[crate::test]
    async fn test_dropped_completer_is_abandoned() {
        let value: Result<u8, Abandoned> = from_callback(|done| drop(done)).await;
        assert_eq!(value, Err(Abandoned));
    }

    #[crate::test]
    async fn test_settle_maps_error_first_callbacks() {
        let failed: Result<Result<u8, &str>, Abandoned> =
            from_callback(|done| done.settle(Some("boom"), 0)).await;
        assert_eq!(failed, Ok(Err("boom")));

        let ok: Result<Result<u8, &str>, Abandoned> =
            from_callback(|done| done.settle(None, 9)).await;
        assert_eq!(ok, Ok(Ok(9)));
    }

    #[crate::test]
    async fn test_resolves_from_another_task() {
        let completion = from_callback(|done| {
            crate::task::spawn(async move {
                crate::time::sleep(crate::time::Duration::from_millis(5)).await;
                done.complete(7u32);
            });
        });
        assert_eq!(completion.await, Ok(7));
    }
}
