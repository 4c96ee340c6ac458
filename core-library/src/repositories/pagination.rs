//! Offset pagination for repository listings

use serde::{Deserialize, Serialize};

/// A window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Rows to skip.
    pub offset: u32,
    /// Maximum rows to return.
    pub limit: u32,
}

impl PageRequest {
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(40, 20);
    /// assert_eq!(request.next().offset, 60);
    /// ```
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: u32) -> Self {
        Self::new(0, limit)
    }

    /// The window directly after this one.
    pub fn next(&self) -> Self {
        Self::new(self.offset.saturating_add(self.limit), self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(50)
    }
}

/// One window of results plus the size of the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows in the whole listing.
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            offset: request.offset,
            limit: request.limit,
        }
    }

    /// Whether rows remain past this window.
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }

    pub fn next_request(&self) -> Option<PageRequest> {
        self.has_more()
            .then(|| PageRequest::new(self.offset, self.limit).next())
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}
