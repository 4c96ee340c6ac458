//! Lazy, restartable sequences.
//!
//! ## Overview
//!
//! Storage cursors and paginated remote listings both *push* items at a
//! visitor. This module turns such a producer into a pull-based
//! [`futures::Stream`]:
//!
//! - The producer receives a [`Sink`] and pushes items into it.
//! - The producer future is only polled when the consumer asks for the next
//!   item and nothing is buffered, so a producer that uses [`Sink::send`]
//!   does no work ahead of the consumer.
//! - Stopping the stream (explicitly via [`SequenceStream::stop`] or by
//!   dropping it) makes every following `push`/`send` return
//!   [`ControlFlow::Break`] and drops the producer. Cancellation is never
//!   reported as an error.
//! - A producer error is yielded once, after the items pushed before it, and
//!   ends the stream.
//!
//! [`LazySequence`] keeps the producer factory around so the same sequence
//! can be walked any number of times; each call to
//! [`LazySequence::stream`] starts a fresh producer.
//!
//! ## Usage
//!
//! ```rust
//! use core_async::sequence::LazySequence;
//! use futures::StreamExt;
//!
//! async fn example() {
//!     let numbers = LazySequence::<u32, ()>::new(|sink| async move {
//!         for n in 0..10 {
//!             if sink.send(n).await.is_break() {
//!                 break;
//!             }
//!         }
//!         Ok(())
//!     });
//!
//!     let first_three: Vec<_> = numbers.stream().take(3).collect().await;
//!     assert_eq!(first_three.len(), 3);
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};

// ============================================================================
// Sink
// ============================================================================

struct Shared<T> {
    buffer: Mutex<VecDeque<T>>,
    stopped: AtomicBool,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<T>> {
        // The lock is never held across user code, so poisoning cannot leave
        // the queue in a torn state.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Producer-side handle of a sequence.
pub struct Sink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("stopped", &self.shared.is_stopped())
            .finish()
    }
}

impl<T> Sink<T> {
    /// Buffer an item for the consumer without waiting.
    ///
    /// Suitable inside synchronous visitors (storage cursors). Returns
    /// `Break` once the consumer has stopped, in which case the item is
    /// discarded and the producer should stop.
    pub fn push(&self, item: T) -> ControlFlow<()> {
        if self.shared.is_stopped() {
            return ControlFlow::Break(());
        }
        self.shared.buffer().push_back(item);
        ControlFlow::Continue(())
    }

    /// Hand an item to the consumer and wait until it has been taken.
    pub async fn send(&self, item: T) -> ControlFlow<()> {
        if self.push(item).is_break() {
            return ControlFlow::Break(());
        }
        Drained {
            shared: &self.shared,
        }
        .await;
        if self.shared.is_stopped() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Whether the consumer has stopped pulling.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// Pending until the consumer has taken every buffered item.
///
/// Only [`SequenceStream`] polls producers, and it re-polls the producer
/// whenever the buffer runs dry, so no waker needs to be stored here.
struct Drained<'a, T> {
    shared: &'a Shared<T>,
}

impl<T> Future for Drained<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.shared.is_stopped() || self.shared.buffer().is_empty() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

// ============================================================================
// Stream
// ============================================================================

/// Pull side of a running sequence.
pub struct SequenceStream<T, E> {
    shared: Arc<Shared<T>>,
    producer: Option<BoxFuture<'static, Result<(), E>>>,
    error: Option<E>,
}

// No field is ever structurally pinned.
impl<T, E> Unpin for SequenceStream<T, E> {}

impl<T, E> SequenceStream<T, E> {
    fn start<Fut>(shared: Arc<Shared<T>>, producer: Fut) -> Self
    where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self {
            shared,
            producer: Some(producer.boxed()),
            error: None,
        }
    }

    /// Stop the producer. Buffered items are discarded and the stream ends.
    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.buffer().clear();
        self.producer = None;
        self.error = None;
    }

    /// Whether the producer has not finished yet.
    pub fn is_running(&self) -> bool {
        self.producer.is_some()
    }
}

impl<T, E> Drop for SequenceStream<T, E> {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
    }
}

impl<T, E> Stream for SequenceStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.shared.buffer().pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            let Some(producer) = this.producer.as_mut() else {
                return Poll::Ready(this.error.take().map(Err));
            };

            match producer.as_mut().poll(cx) {
                Poll::Pending => {
                    if this.shared.buffer().is_empty() {
                        return Poll::Pending;
                    }
                }
                Poll::Ready(result) => {
                    this.producer = None;
                    if let Err(error) = result {
                        this.error = Some(error);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Restartable sequence
// ============================================================================

type Factory<T, E> = dyn Fn(Sink<T>) -> BoxFuture<'static, Result<(), E>> + Send + Sync;

/// A restartable lazy sequence: every [`stream`](Self::stream) call runs the
/// producer from the beginning.
pub struct LazySequence<T, E> {
    factory: Arc<Factory<T, E>>,
}

impl<T, E> Clone for LazySequence<T, E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T, E> fmt::Debug for LazySequence<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence").finish_non_exhaustive()
    }
}

impl<T, E> LazySequence<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn(Sink<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move |sink| producer(sink).boxed()),
        }
    }

    /// Start a fresh walk.
    pub fn stream(&self) -> SequenceStream<T, E> {
        let shared = Arc::new(Shared::new());
        let sink = Sink {
            shared: Arc::clone(&shared),
        };
        SequenceStream::start(shared, (self.factory)(sink))
    }

    /// Walk the sequence, handing each item and its index to `visitor` until
    /// it breaks. Returns how many items were visited.
    pub async fn for_each_until<F>(&self, mut visitor: F) -> Result<usize, E>
    where
        F: FnMut(T, usize) -> ControlFlow<()>,
    {
        let mut stream = self.stream();
        let mut index = 0;
        while let Some(item) = stream.next().await {
            let flow = visitor(item?, index);
            index += 1;
            if flow.is_break() {
                stream.stop();
                break;
            }
        }
        Ok(index)
    }

    /// Walk the whole sequence into a vector.
    pub async fn collect(&self) -> Result<Vec<T>, E> {
        let mut items = Vec::new();
        self.for_each_until(|item, _| {
            items.push(item);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(items)
    }
}

/// One-shot form of [`LazySequence`]: run `producer` once as a stream.
pub fn sequence<T, E, F, Fut>(producer: F) -> SequenceStream<T, E>
where
    T: Send + 'static,
    F: FnOnce(Sink<T>) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let shared = Arc::new(Shared::new());
    let sink = Sink {
        shared: Arc::clone(&shared),
    };
    SequenceStream::start(shared, producer(sink))
}
