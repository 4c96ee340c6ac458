//! # Remote Page Walker
//!
//! Turns an offset/limit listing of the remote catalog into a lazy sequence
//! of items.
//!
//! ## Paging policy
//!
//! Every request asks for one item more than the page size. A page that
//! comes back shorter than `limit + 1` is the last one, so the end of a
//! collection is detected without an extra empty request and without
//! trusting the reported `total`. Only `limit` items of a full page are
//! yielded; the extra item is fetched again as the head of the next page.
//!
//! ```text
//! 45 items, page size 20:
//!   fetch(0, 21)  -> 21 items, yield 20, offset 20, bound 21
//!   fetch(20, 21) -> 21 items, yield 20, offset 40, bound 41
//!   fetch(40, 21) ->  5 items, yield 5,  offset 45, bound 45  (done)
//! ```
//!
//! Pages are requested only as the consumer pulls, and a consumer that
//! stops early stops the fetching.

use std::future::Future;
use std::sync::Arc;

use bridge_traits::catalog::Paging;
use bridge_traits::error::Result as BridgeResult;
use core_async::sequence::LazySequence;
use tracing::debug;

use crate::error::SyncError;

/// Offset bookkeeping for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageCursor {
    limit: u32,
    offset: u32,
    /// Scanning bound; unknown until the first page arrives.
    bound: Option<u32>,
}

impl PageCursor {
    pub(crate) fn new(limit: u32) -> Self {
        Self {
            limit,
            offset: 0,
            bound: None,
        }
    }

    /// Offset of the next request, or `None` once the walk is over.
    pub(crate) fn next_offset(&self) -> Option<u32> {
        match self.bound {
            Some(bound) if self.offset >= bound => None,
            _ => Some(self.offset),
        }
    }

    /// Number of items to request per page.
    pub(crate) fn request_size(&self) -> u32 {
        self.limit.saturating_add(1)
    }

    /// Account for a received page and keep the items to yield.
    pub(crate) fn advance<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        let received = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let step = received.min(self.limit);
        self.bound = Some(self.offset.saturating_add(received.min(self.request_size())));
        self.offset = self.offset.saturating_add(step);
        items.truncate(step as usize);
        items
    }
}

/// Walks remote listings with a fixed page size.
#[derive(Debug, Clone, Copy)]
pub struct PageWalker {
    page_size: u32,
}

impl PageWalker {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Lazy sequence over every item of a listing.
    ///
    /// `fetch(offset, limit)` performs one remote request. `operation` names
    /// the listing in errors and logs. Each [`LazySequence::stream`] call
    /// walks the listing again from offset 0.
    ///
    /// # Errors
    ///
    /// The first failed fetch is yielded as [`SyncError::Remote`] and ends
    /// the sequence.
    pub fn walk<T, F, Fut>(&self, operation: &'static str, fetch: F) -> LazySequence<T, SyncError>
    where
        T: Send + 'static,
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Paging<T>>> + Send + 'static,
    {
        let limit = self.page_size;
        let fetch = Arc::new(fetch);

        LazySequence::new(move |sink| {
            let fetch = Arc::clone(&fetch);
            async move {
                let mut cursor = PageCursor::new(limit);
                while let Some(offset) = cursor.next_offset() {
                    let page = fetch(offset, cursor.request_size())
                        .await
                        .map_err(|e| SyncError::remote(operation, e))?;
                    let received = page.items.len();
                    let items = cursor.advance(page.items);
                    debug!(operation, offset, received, yielded = items.len(), "Fetched page");

                    for item in items {
                        if sink.send(item).await.is_break() {
                            return Ok(());
                        }
                    }
                }
                Ok(())
            }
        })
    }
}
