//! Store sessions
//!
//! Every use case runs inside one session: it is opened before the first
//! store call and finished after the last one, on success and failure alike.
//! Beginning calls [`ObjectStore::begin`](bridge_traits::store::ObjectStore::begin)
//! and finishing calls [`ObjectStore::complete`](bridge_traits::store::ObjectStore::complete).
//! The embedded backend closes its pool once the last open session
//! finishes, so a query finishing mid-sync leaves the sync's pool alone.
//! The memory backend starts its release debounce.
//!
//! `complete` is async and cannot run from `Drop`. A session dropped without
//! [`finish`](StoreSession::finish) (an early `?` or a cancelled future)
//! schedules the release on the current runtime instead.

use std::sync::Arc;

use core_async::runtime::Handle;
use core_library::Catalog;
use tracing::{trace, warn};

use crate::error::Result;

pub struct StoreSession {
    catalog: Catalog,
    operation: &'static str,
    open: bool,
}

impl StoreSession {
    pub fn begin(catalog: &Catalog, operation: &'static str) -> Self {
        catalog.store().begin();
        trace!(operation, "Store session opened");
        Self {
            catalog: catalog.clone(),
            operation,
            open: true,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Release the store.
    pub async fn release(mut self) -> Result<()> {
        self.open = false;
        self.catalog.store().complete().await?;
        trace!(operation = self.operation, "Store session released");
        Ok(())
    }

    /// Release the store and hand back the use case's result.
    ///
    /// A failed release only surfaces when the use case itself succeeded.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        let operation = self.operation;
        match (result, self.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release)) => Err(release),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(release)) => {
                warn!(operation, error = %release, "Store release failed after an error");
                Err(error)
            }
        }
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        warn!(operation = self.operation, "Store session dropped before finishing");
        let store = Arc::clone(self.catalog.store());
        let operation = self.operation;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = store.complete().await {
                        warn!(operation, error = %error, "Deferred store release failed");
                    }
                });
            }
            Err(_) => warn!(operation, "No runtime to release the store on"),
        }
    }
}
