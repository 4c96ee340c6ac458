//! Synchronization primitives.
//!
//! All primitives are the async-aware `tokio::sync` types: `Send + Sync`,
//! and locking never blocks the executor.
//!
//! ```rust
//! use core_async::sync::Mutex;
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     let mut guard = mutex.lock().await;
//!     *guard += 1;
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore,
};
