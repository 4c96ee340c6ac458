//! # Catalog Sync
//!
//! Mirrors the user's remote library into the local catalog store.
//!
//! ## Overview
//!
//! - **Page walker** (`pager`): lazy, fetch-on-demand walks over the
//!   offset/limit listings of the remote catalog
//! - **Run state machine** (`state`): the phases of a run and their valid
//!   transitions
//! - **Sync service** (`service`): the run itself, using playlist change
//!   markers so unchanged playlists cost one comparison instead of a
//!   re-import
//!
//! A run never throws: it ends in [`SyncOutcome::Completed`] with counters or
//! [`SyncOutcome::Failed`] with the phase and cause.

pub mod error;
pub mod pager;
pub mod service;
pub mod state;

pub use error::{Result, SyncError};
pub use pager::PageWalker;
pub use service::{SyncFailure, SyncOutcome, SyncReport, SyncService};
pub use state::{SyncPhase, SyncStateMachine};
