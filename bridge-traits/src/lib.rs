//! # Host Bridge Traits
//!
//! Contracts between the catalog core and the things it does not own.
//!
//! ## Overview
//!
//! The core mirrors a remote music catalog into a local object store. Three
//! capabilities come from outside:
//!
//! - [`ObjectStore`](store::ObjectStore) - the storage engine. The core ships
//!   an embedded SQLite backend, an in-memory backend and a pass-through sink
//!   in `core-library`; hosts may provide their own.
//! - [`CatalogClient`](catalog::CatalogClient) - paginated access to the
//!   user's remote playlists and saved tracks.
//! - [`DeviceControl`](playback::DeviceControl) - the list of playback
//!   devices.
//!
//! Plus two utilities:
//!
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability
//! is missing:
//!
//! ```ignore
//! let catalog = config.catalog
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "CatalogClient".to_string(),
//!         message: "Inject the host's web API client.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert backend-specific errors into it and keep the context (table, id,
//! operation) in the variant.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; implementations are shared as
//! `Arc<dyn Trait>` across async tasks.

pub mod catalog;
pub mod error;
pub mod playback;
pub mod store;
pub mod time;

pub use error::BridgeError;

pub use catalog::{
    CatalogClient, Paging, PlaylistItem, RemoteAlbum, RemoteArtist, RemoteImage, RemoteOwner,
    RemotePlaylist, RemoteTrack, SavedTrack,
};
pub use playback::{DeviceControl, RemoteDevice};
pub use store::{
    IndexSchema, ObjectStore, Predicate, Record, SortDirection, SortOrder, StoreConfig, StoreKind,
    TableSchema, Visitor,
};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
