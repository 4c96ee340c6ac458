//! Remote Catalog Boundary
//!
//! The music service's web API is owned by the host. The core only needs the
//! three paginated listings that feed synchronization, expressed through
//! [`CatalogClient`], and the payload shapes those listings return.
//!
//! All listings use offset/limit paging. `total` is optional because some
//! hosts proxy the API and drop it; the sync page walker never relies on it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One page of a remote listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub offset: u32,
    pub limit: u32,
    #[serde(default)]
    pub total: Option<u32>,
}

impl<T> Paging<T> {
    pub fn new(items: Vec<T>, offset: u32, limit: u32) -> Self {
        Self {
            items,
            offset,
            limit,
            total: None,
        }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl RemoteImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: BTreeMap<String, String>,
    /// Only present on full artist objects.
    #[serde(default)]
    pub images: Vec<RemoteImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album_type: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub total_tracks: u32,
    #[serde(default)]
    pub images: Vec<RemoteImage>,
    #[serde(default)]
    pub artists: Vec<RemoteArtist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub album: Option<RemoteAlbum>,
    #[serde(default)]
    pub artists: Vec<RemoteArtist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteOwner {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub owner: RemoteOwner,
    /// Change marker: differs whenever the playlist contents change.
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub images: Vec<RemoteImage>,
    #[serde(default)]
    pub tracks_total: u32,
}

/// Entry of the saved-tracks listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    pub track: RemoteTrack,
}

/// Entry of a playlist's track listing. `track` is absent for items the
/// service can no longer resolve (removed or local-only files).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub track: Option<RemoteTrack>,
}

/// Paginated read access to the user's remote library.
///
/// Implementations surface transport and API failures as
/// [`BridgeError::Remote`](crate::error::BridgeError::Remote).
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Playlists followed or owned by the user.
    async fn my_playlists(&self, offset: u32, limit: u32) -> Result<Paging<RemotePlaylist>>;

    /// Items of one playlist, in playlist order.
    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<PlaylistItem>>;

    /// The user's saved ("liked") tracks.
    async fn my_tracks(&self, offset: u32, limit: u32) -> Result<Paging<SavedTrack>>;
}
