//! Time-related abstractions.
//!
//! Re-exports `tokio::time` for timers and timeouts together with the std
//! duration/instant types, so the storage layer can time-box operations
//! without naming Tokio.
//!
//! ```rust
//! use core_async::time::{timeout, Duration};
//!
//! async fn example() {
//!     let value = timeout(Duration::from_millis(50), async { 7 }).await;
//!     assert_eq!(value.ok(), Some(7));
//! }
//! ```

pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
