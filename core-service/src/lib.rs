//! Core service facade.
//!
//! [`CoreService`] is the one handle a host application holds. Built from a
//! validated [`CoreConfig`], it opens the configured store backend, runs the
//! catalog structure initialization, and wires the sync service and the
//! event bus together.
//!
//! Every use case runs inside its own [`StoreSession`], so the store is
//! released after each call no matter how the call ends.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .embedded("/data/catalog.db")
//!     .catalog_client(client)
//!     .build()?;
//! let core = CoreService::new(config).await?;
//!
//! let outcome = core.sync_data().await;
//! let entries = core.tracks_in_playlist("p1").await?;
//! ```

pub mod error;
pub mod session;

pub use error::{CoreError, Result};
pub use session::StoreSession;

pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, StoreBackend};
pub use core_runtime::events::{CoreEvent, EventBus, EventStream, LibraryEvent, SyncEvent};
pub use core_library::models;
pub use core_sync::{SyncOutcome, SyncPhase, SyncReport};

use std::sync::Arc;

use bridge_traits::catalog::RemoteTrack;
use bridge_traits::playback::DeviceControl;
use bridge_traits::store::{ObjectStore, StoreConfig};
use bridge_traits::time::Clock;
use core_library::adapters::{MemoryObjectStore, RemoteObjectStore, SqliteObjectStore};
use core_library::models::{
    Device, Playlist, PlaylistEntry, PlaylistTrack, Recommendation, TrackView,
    MY_TRACKS_PLAYLIST_ID,
};
use core_library::{Catalog, LibraryError, STORE_VERSION};
use core_sync::{PageWalker, SyncService};
use tracing::{info, instrument, warn};

/// Primary facade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    catalog: Catalog,
    sync: Arc<SyncService>,
    events: EventBus,
    device_control: Option<Arc<dyn DeviceControl>>,
    clock: Arc<dyn Clock>,
}

impl CoreService {
    /// Open the configured store and wire the service together.
    ///
    /// # Errors
    ///
    /// `Runtime` when the configuration does not validate,
    /// `InitializationFailed` when the store cannot be opened or its
    /// structure cannot be created.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let store = open_store(&config)?;
        let version = config.store_version.unwrap_or(STORE_VERSION);
        let catalog = Catalog::open(Arc::clone(&store), version)
            .await
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        if let Err(error) = store.complete().await {
            warn!(error = %error, "Store release after initialization failed");
        }

        let events = EventBus::new(config.event_buffer_size);
        let sync = SyncService::new(
            catalog.clone(),
            Arc::clone(&config.catalog_client),
            PageWalker::new(config.sync_page_size),
        )
        .with_event_bus(events.clone());

        info!(
            store = ?store.kind(),
            version,
            page_size = config.sync_page_size,
            "Core service initialized"
        );

        Ok(Self {
            catalog,
            sync: Arc::new(sync),
            events,
            device_control: config.device_control,
            clock: config.clock,
        })
    }

    /// Direct access to every repository.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub async fn sync_phase(&self) -> SyncPhase {
        self.sync.phase().await
    }

    fn session(&self, operation: &'static str) -> StoreSession {
        StoreSession::begin(&self.catalog, operation)
    }

    fn emit(&self, event: LibraryEvent) {
        // No subscribers is not an error.
        self.events.emit(CoreEvent::Library(event)).ok();
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Mirror the remote catalog into the store.
    ///
    /// Never returns an error: failures come back as
    /// [`SyncOutcome::Failed`] with the phase the run reached.
    pub async fn sync_data(&self) -> SyncOutcome {
        let session = self.session("sync_data");
        let outcome = self.sync.sync_data().await;
        if let Err(error) = session.release().await {
            warn!(error = %error, "Store release after sync failed");
        }
        outcome
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
        let session = self.session("tracks_in_playlist");
        let result = session.catalog().tracks_in_playlist(playlist_id).await;
        session.finish(result.map_err(CoreError::from)).await
    }

    pub async fn playlists_containing_track(&self, track_id: &str) -> Result<Vec<Playlist>> {
        let session = self.session("playlists_containing_track");
        let result = session.catalog().playlists_containing_track(track_id).await;
        session.finish(result.map_err(CoreError::from)).await
    }

    pub async fn is_track_liked(&self, track_id: &str) -> Result<bool> {
        let session = self.session("is_track_liked");
        let result = session.catalog().is_track_liked(track_id).await;
        session.finish(result.map_err(CoreError::from)).await
    }

    /// User playlists ordered by name. The saved-tracks playlist is not
    /// listed.
    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        let session = self.session("playlists");
        let result = session.catalog().playlists().user_playlists().await;
        session.finish(result.map_err(CoreError::from)).await
    }

    // =========================================================================
    // Edits
    // =========================================================================

    #[instrument(skip(self, track), fields(track_id = %track.id))]
    pub async fn like_track(&self, track: &RemoteTrack) -> Result<PlaylistTrack> {
        let session = self.session("like_track");
        let result = session
            .catalog()
            .like_track(track, self.clock.unix_timestamp_millis())
            .await;
        let row = session.finish(result.map_err(CoreError::from)).await?;
        self.emit(LibraryEvent::TrackLiked {
            track_id: row.track_id.clone(),
        });
        Ok(row)
    }

    /// Returns whether the track was liked.
    #[instrument(skip(self))]
    pub async fn unlike_track(&self, track_id: &str) -> Result<bool> {
        let session = self.session("unlike_track");
        let result = session.catalog().unlike_track(track_id).await;
        let removed = session.finish(result.map_err(CoreError::from)).await?;
        if removed {
            self.emit(LibraryEvent::TrackUnliked {
                track_id: track_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Append a track to a stored playlist.
    #[instrument(skip(self, track), fields(track_id = %track.id))]
    pub async fn add_track_to_playlist(
        &self,
        playlist_id: &str,
        track: &RemoteTrack,
    ) -> Result<PlaylistTrack> {
        let session = self.session("add_track_to_playlist");
        let result = session
            .catalog()
            .add_track(playlist_id, track, Some(self.clock.unix_timestamp_millis()))
            .await;
        let row = session.finish(result.map_err(CoreError::from)).await?;
        self.emit(LibraryEvent::PlaylistTrackAdded {
            playlist_id: row.playlist_id.clone(),
            track_id: row.track_id.clone(),
            position: row.position,
        });
        Ok(row)
    }

    /// Returns whether the track was in the playlist.
    #[instrument(skip(self))]
    pub async fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<bool> {
        let session = self.session("remove_track_from_playlist");
        let result = session.catalog().playlist_tracks().remove(playlist_id, track_id).await;
        let removed = session.finish(result.map_err(CoreError::from)).await?;
        if removed {
            self.emit(LibraryEvent::PlaylistTrackRemoved {
                playlist_id: playlist_id.to_string(),
                track_id: track_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Move a track within its playlist and return the renumbered rows.
    #[instrument(skip(self))]
    pub async fn move_track(
        &self,
        playlist_id: &str,
        track_id: &str,
        position: u32,
    ) -> Result<Vec<PlaylistTrack>> {
        let session = self.session("move_track");
        let result = session
            .catalog()
            .playlist_tracks()
            .move_to(playlist_id, track_id, position)
            .await;
        let rows = session.finish(result.map_err(CoreError::from)).await?;
        if let Some(row) = rows.iter().find(|row| row.track_id == track_id) {
            self.emit(LibraryEvent::PlaylistTrackMoved {
                playlist_id: playlist_id.to_string(),
                track_id: track_id.to_string(),
                position: row.position,
            });
        }
        Ok(rows)
    }

    /// Delete a user playlist and whatever only it referenced.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for the saved-tracks playlist; unlike tracks one by
    /// one instead.
    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<bool> {
        if playlist_id == MY_TRACKS_PLAYLIST_ID {
            return Err(LibraryError::InvalidInput {
                field: "playlist_id".to_string(),
                message: "the saved-tracks playlist cannot be deleted".to_string(),
            }
            .into());
        }

        let session = self.session("delete_playlist");
        let result = session.catalog().playlists().delete(playlist_id).await;
        let deleted = session.finish(result.map_err(CoreError::from)).await?;
        if deleted {
            self.emit(LibraryEvent::PlaylistDeleted {
                playlist_id: playlist_id.to_string(),
            });
        }
        Ok(deleted)
    }

    // =========================================================================
    // Devices and recommendations
    // =========================================================================

    /// Replace the stored device list with what the service reports now.
    ///
    /// # Errors
    ///
    /// `CapabilityMissing` when the host configured no device control.
    pub async fn refresh_devices(&self) -> Result<Vec<Device>> {
        let control = self.device_control.as_ref().ok_or_else(|| {
            CoreError::capability_missing(
                "DeviceControl",
                "configure a device control to list playback devices",
            )
        })?;
        let remote = control.devices().await?;
        let devices: Vec<Device> = remote.iter().map(Device::from).collect();

        let session = self.session("refresh_devices");
        let result = session.catalog().devices().replace_all(&devices).await;
        let stored = session.finish(result.map_err(CoreError::from)).await?;

        let active_device_id = stored
            .iter()
            .find(|device| device.is_active)
            .map(|device| device.id.clone());
        self.emit(LibraryEvent::DevicesRefreshed {
            count: stored.len(),
            active_device_id,
        });
        Ok(stored)
    }

    /// Cache `tracks` as the current recommendations, ranked in order.
    pub async fn store_recommendations(
        &self,
        tracks: &[RemoteTrack],
    ) -> Result<Vec<Recommendation>> {
        let session = self.session("store_recommendations");
        let result = replace_recommendations(
            session.catalog(),
            tracks,
            self.clock.unix_timestamp_millis(),
        )
        .await;
        let stored = session.finish(result).await?;
        self.emit(LibraryEvent::RecommendationsStored {
            count: stored.len(),
        });
        Ok(stored)
    }

    /// Cached recommendations in rank order.
    pub async fn recommendations(&self) -> Result<Vec<TrackView>> {
        let session = self.session("recommendations");
        let result = ranked_tracks(session.catalog()).await;
        session.finish(result).await
    }
}

fn open_store(config: &CoreConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match &config.store {
        StoreBackend::Embedded { path } => {
            let store_config = StoreConfig::new(path).with_operation_timeout(config.operation_timeout);
            let store = SqliteObjectStore::new(store_config)
                .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
            Arc::new(store)
        }
        StoreBackend::InMemory => Arc::new(MemoryObjectStore::with_debounce(config.memory_debounce)),
        StoreBackend::Disabled => Arc::new(RemoteObjectStore::new()),
    };
    Ok(store)
}

async fn replace_recommendations(
    catalog: &Catalog,
    tracks: &[RemoteTrack],
    generated_at: i64,
) -> Result<Vec<Recommendation>> {
    let mut ids = Vec::with_capacity(tracks.len());
    for track in tracks.iter().filter(|track| !track.id.is_empty()) {
        if ids.contains(&track.id) {
            continue;
        }
        catalog.import_track(track).await?;
        ids.push(track.id.clone());
    }
    Ok(catalog.recommendations().replace(&ids, generated_at).await?)
}

async fn ranked_tracks(catalog: &Catalog) -> Result<Vec<TrackView>> {
    let tracks = catalog.tracks();
    let mut views = Vec::new();
    for recommendation in catalog.recommendations().ranked().await? {
        if let Some(view) = tracks.view(&recommendation.id).await? {
            views.push(view);
        }
    }
    Ok(views)
}
