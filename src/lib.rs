//! Host-facing entry point of the catalog mirror.
//!
//! Hosts depend on this crate alone: it re-exports the [`CoreService`]
//! facade, its configuration builder, the event types and the data model
//! returned by the queries.

pub use core_service::*;
