//! # Event Bus System
//!
//! Typed progress and change notifications for hosts, over
//! `core_async::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: `SyncEvent` for synchronization runs and `LibraryEvent`
//!   for user-initiated catalog edits, wrapped in [`CoreEvent`]
//! - **EventBus**: broadcast channel every publisher clones
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Sync Service ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               │ EventBus  │                  └────────────┘
//! ┌──────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Core Service ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
//!
//! let bus = EventBus::new(100);
//! let mut sync_only = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(_)));
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     run_id: "run-1".to_string(),
//! }))
//! .ok();
//!
//! assert!(sync_only.try_recv().is_some());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and can
//!   keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat it as shutdown.
//!
//! Emitting with no subscriber returns `Err`; publishers ignore it with
//! `.ok()` because nobody listening is not a failure.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Started { .. })
            | CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Library(LibraryEvent::PlaylistDeleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Progress of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        /// Identifier shared by every event of the run.
        run_id: String,
    },
    /// The run entered a new phase.
    PhaseChanged {
        run_id: String,
        /// Phase name, e.g. `"SyncingPlaylistTracks"`.
        phase: String,
        /// 1-based index of the playlist being imported, when the phase
        /// walks playlists.
        current: Option<u32>,
        total: Option<u32>,
    },
    /// The stored change marker matched the remote one; the playlist's
    /// tracks were not fetched.
    PlaylistSkipped {
        run_id: String,
        playlist_id: String,
        snapshot_id: Option<String>,
    },
    Completed {
        run_id: String,
        tracks_imported: u64,
        playlists_imported: u64,
        playlists_skipped: u64,
        playlists_deleted: u64,
        entries_removed: u64,
        duration_ms: u64,
    },
    Failed {
        run_id: String,
        /// Phase the run was in when it failed.
        phase: String,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PhaseChanged { .. } => "Sync phase changed",
            SyncEvent::PlaylistSkipped { .. } => "Playlist unchanged, skipped",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }

    /// Run the event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            SyncEvent::Started { run_id }
            | SyncEvent::PhaseChanged { run_id, .. }
            | SyncEvent::PlaylistSkipped { run_id, .. }
            | SyncEvent::Completed { run_id, .. }
            | SyncEvent::Failed { run_id, .. } => run_id,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Catalog edits made through the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    TrackLiked {
        track_id: String,
    },
    TrackUnliked {
        track_id: String,
    },
    PlaylistTrackAdded {
        playlist_id: String,
        track_id: String,
        position: u32,
    },
    PlaylistTrackRemoved {
        playlist_id: String,
        track_id: String,
    },
    PlaylistTrackMoved {
        playlist_id: String,
        track_id: String,
        position: u32,
    },
    PlaylistDeleted {
        playlist_id: String,
    },
    DevicesRefreshed {
        count: usize,
        active_device_id: Option<String>,
    },
    RecommendationsStored {
        count: usize,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::TrackLiked { .. } => "Track saved to library",
            LibraryEvent::TrackUnliked { .. } => "Track removed from library",
            LibraryEvent::PlaylistTrackAdded { .. } => "Track added to playlist",
            LibraryEvent::PlaylistTrackRemoved { .. } => "Track removed from playlist",
            LibraryEvent::PlaylistTrackMoved { .. } => "Playlist track moved",
            LibraryEvent::PlaylistDeleted { .. } => "Playlist deleted",
            LibraryEvent::DevicesRefreshed { .. } => "Device list refreshed",
            LibraryEvent::RecommendationsStored { .. } => "Recommendations stored",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every publisher. Cloning is cheap; all
/// clones feed the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    /// A subscriber that falls further behind gets `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// # Returns
    ///
    /// The number of subscribers the event reached.
    ///
    /// # Errors
    ///
    /// `SendError` when there is no active subscriber.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New receiver for future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` that can skip events a subscriber does not care
/// about.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from now on.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Waits for the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
