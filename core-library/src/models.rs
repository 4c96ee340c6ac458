//! Domain models for the catalog mirror
//!
//! Entities are stored as JSON documents keyed by their remote id. Every
//! struct is `#[serde(default)]` so that a row created by a partial refresh
//! is always readable, and optional fields are skipped when absent so a
//! partial never erases a stored value.

use std::collections::BTreeMap;

use bridge_traits::catalog::{
    PlaylistItem, RemoteAlbum, RemoteArtist, RemoteImage, RemotePlaylist, RemoteTrack, SavedTrack,
};
use bridge_traits::playback::RemoteDevice;
use serde::{Deserialize, Serialize};

/// Reserved id of the synthetic playlist holding the user's saved tracks.
///
/// Remote ids never start with `__`, so this cannot collide.
pub const MY_TRACKS_PLAYLIST_ID: &str = "__my_tracks__";

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub duration_ms: u64,
    pub track_number: u32,
    pub disc_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
}

impl From<&RemoteTrack> for Track {
    fn from(remote: &RemoteTrack) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            uri: remote.uri.clone(),
            duration_ms: remote.duration_ms,
            track_number: remote.track_number,
            disc_number: remote.disc_number,
            album_id: remote.album.as_ref().map(|album| album.id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    pub total_tracks: u32,
}

impl From<&RemoteAlbum> for Album {
    fn from(remote: &RemoteAlbum) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            album_type: remote.album_type.clone(),
            uri: remote.uri.clone(),
            release_date: remote.release_date.clone(),
            total_tracks: remote.total_tracks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub external_urls: BTreeMap<String, String>,
}

impl From<&RemoteArtist> for Artist {
    fn from(remote: &RemoteArtist) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            uri: remote.uri.clone(),
            external_urls: remote.external_urls.clone(),
        }
    }
}

/// Artwork, deduplicated by URL and shared across albums, artists and
/// playlists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl From<&RemoteImage> for Image {
    fn from(remote: &RemoteImage) -> Self {
        Self {
            url: remote.url.clone(),
            width: remote.width,
            height: remote.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uri: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Change marker of the last fully imported version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub tracks_total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

impl Playlist {
    /// The synthetic playlist standing for the user's saved tracks.
    pub fn my_tracks() -> Self {
        Self {
            id: MY_TRACKS_PLAYLIST_ID.to_string(),
            name: "Liked Songs".to_string(),
            ..Self::default()
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id == MY_TRACKS_PLAYLIST_ID
    }
}

/// Playlist metadata from a listing. The change marker is deliberately left
/// out: it is only stored once the playlist's tracks are imported.
impl From<&RemotePlaylist> for Playlist {
    fn from(remote: &RemotePlaylist) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            description: remote.description.clone(),
            uri: remote.uri.clone(),
            owner_id: remote.owner.id.clone(),
            owner_name: remote.owner.display_name.clone(),
            snapshot_id: None,
            tracks_total: remote.tracks_total,
            public: remote.public,
        }
    }
}

/// A playback target. Transient: replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub is_active: bool,
    pub is_restricted: bool,
    pub is_private_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_percent: Option<u8>,
    pub supports_volume: bool,
}

impl From<&RemoteDevice> for Device {
    fn from(remote: &RemoteDevice) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            device_type: remote.device_type.clone(),
            is_active: remote.is_active,
            is_restricted: remote.is_restricted,
            is_private_session: remote.is_private_session,
            volume_percent: remote.volume_percent,
            supports_volume: remote.supports_volume,
        }
    }
}

/// Cached recommendation; `id` is the recommended track's id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    pub id: String,
    pub rank: u32,
    /// Unix milliseconds.
    pub generated_at: i64,
}

// =============================================================================
// Join rows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumImage {
    pub album_id: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistAlbum {
    pub artist_id: String,
    pub album_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistTrack {
    pub artist_id: String,
    pub track_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistImage {
    pub artist_id: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistImage {
    pub playlist_id: String,
    pub image_url: String,
}

/// Membership of a track in a playlist. `position` is the stable sort key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistTrack {
    pub playlist_id: String,
    pub track_id: String,
    pub position: u32,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
}

impl PlaylistTrack {
    pub fn new(playlist_id: impl Into<String>, track_id: impl Into<String>, position: u32) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            track_id: track_id.into(),
            position,
            added_at: None,
        }
    }

    pub fn added_at(mut self, added_at: Option<i64>) -> Self {
        self.added_at = added_at;
        self
    }
}

// =============================================================================
// Import payloads
// =============================================================================

/// A track together with everything it references, ready to be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackImport {
    pub track: RemoteTrack,
    /// Unix milliseconds, when the source listing reports it.
    pub added_at: Option<i64>,
}

impl From<&SavedTrack> for TrackImport {
    fn from(saved: &SavedTrack) -> Self {
        Self {
            track: saved.track.clone(),
            added_at: saved.added_at.map(|at| at.timestamp_millis()),
        }
    }
}

impl TrackImport {
    /// `None` for playlist items the service can no longer resolve.
    pub fn from_item(item: &PlaylistItem) -> Option<Self> {
        item.track.as_ref().map(|track| Self {
            track: track.clone(),
            added_at: item.added_at.map(|at| at.timestamp_millis()),
        })
    }
}

// =============================================================================
// Read models
// =============================================================================

/// A track with its album and artists resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackView {
    pub track: Track,
    pub album: Option<Album>,
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumView {
    pub album: Album,
    pub images: Vec<Image>,
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistView {
    pub artist: Artist,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistView {
    pub playlist: Playlist,
    pub images: Vec<Image>,
}

/// One row of a playlist, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub position: u32,
    pub added_at: Option<i64>,
    pub track: TrackView,
}
