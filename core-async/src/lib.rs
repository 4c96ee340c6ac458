//! Async runtime layer for the catalog mirror.
//!
//! Every other crate in the workspace depends on this crate instead of
//! naming Tokio directly. Besides thin re-exports of the runtime, timers,
//! locks and task spawning, it hosts the bridging utilities that turn
//! callback-shaped APIs into awaitable values:
//!
//! - [`completion`]: a single callback completion as a future.
//! - [`sequence`]: a pushing producer (cursor walk, paginated listing) as a
//!   restartable, pull-based stream with early termination.
//!
//! # Modules
//!
//! - `runtime`: `block_on` and runtime builders
//! - `task`: task spawning
//! - `time`: sleep, timeout, durations
//! - `sync`: async-aware locks and channels

// Lets `#[core_async::test]` expand inside this crate's own tests.
extern crate self as core_async;

pub use core_async_macros::{main, test};

pub mod completion;
pub mod runtime;
pub mod sequence;
pub mod sync;
pub mod task;
pub mod time;

pub use completion::{completion, from_callback, Abandoned, Completer, Completion};
pub use sequence::{sequence, LazySequence, SequenceStream, Sink};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
