//! Catalog aggregate
//!
//! ## Overview
//!
//! [`Catalog`] bundles every repository over one store and adds the
//! operations that span several tables:
//!
//! - importing remote payloads (a track brings its album, artists and
//!   artwork along, each joined to the track)
//! - the targeted read queries hosts need (a playlist's tracks, the
//!   playlists holding a track, whether a track is liked)
//! - membership edits on the saved-tracks playlist and user playlists
//!
//! ## Usage
//!
//! ```ignore
//! let catalog = Catalog::open(store, STORE_VERSION).await?;
//! catalog.import_track(&remote_track).await?;
//! let entries = catalog.tracks_in_playlist("p1").await?;
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;

use bridge_traits::catalog::{RemoteAlbum, RemoteArtist, RemoteImage, RemotePlaylist, RemoteTrack};
use bridge_traits::store::ObjectStore;
use tracing::debug;

use crate::error::Result;
use crate::models::{
    Album, AlbumImage, Artist, ArtistAlbum, ArtistImage, ArtistTrack, Image, Playlist,
    PlaylistEntry, PlaylistImage, PlaylistTrack, Track, TrackImport, MY_TRACKS_PLAYLIST_ID,
};
use crate::repositories::{
    AlbumRepository, ArtistRepository, DeviceRepository, ImageRepository, PlaylistRepository,
    PlaylistTrackRepository, RecommendationRepository, Tables, TrackRepository,
};
use crate::relation::Relation;
use crate::schema::{all_schemas, Join};

/// Every repository over one store, plus cross-table operations.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    tables: Arc<Tables>,
}

impl Catalog {
    /// Wrap a store whose structure is already initialized.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let tables = Arc::new(Tables::new(Arc::clone(&store)));
        Self { store, tables }
    }

    /// Initialize the store structure for `version` and wrap it.
    pub async fn open(store: Arc<dyn ObjectStore>, version: u32) -> Result<Self> {
        store.initialize_structure(&all_schemas(), version).await?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn tracks(&self) -> TrackRepository {
        TrackRepository::new(Arc::clone(&self.tables))
    }

    pub fn albums(&self) -> AlbumRepository {
        AlbumRepository::new(Arc::clone(&self.tables))
    }

    pub fn artists(&self) -> ArtistRepository {
        ArtistRepository::new(Arc::clone(&self.tables))
    }

    pub fn images(&self) -> ImageRepository {
        ImageRepository::new(Arc::clone(&self.tables))
    }

    pub fn playlists(&self) -> PlaylistRepository {
        PlaylistRepository::new(Arc::clone(&self.tables))
    }

    pub fn playlist_tracks(&self) -> PlaylistTrackRepository {
        PlaylistTrackRepository::new(Arc::clone(&self.tables))
    }

    pub fn devices(&self) -> DeviceRepository {
        DeviceRepository::new(Arc::clone(&self.tables))
    }

    pub fn recommendations(&self) -> RecommendationRepository {
        RecommendationRepository::new(Arc::clone(&self.tables))
    }

    // =========================================================================
    // Import
    // =========================================================================

    async fn import_images(&self, images: &[RemoteImage]) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(images.len());
        for image in images.iter().filter(|image| !image.url.is_empty()) {
            self.tables.images.save(&Image::from(image)).await?;
            urls.push(image.url.clone());
        }
        Ok(urls)
    }

    /// Drop the image joins of `owner` missing from `keep`, then each image
    /// nothing else points at.
    async fn prune_images<J: Join>(
        &self,
        joins: &Relation<J>,
        owner: &str,
        keep: &[String],
        url_of: fn(&J) -> &str,
    ) -> Result<()> {
        let images = self.images();
        for join in joins.where_key(J::LEFT, owner).await? {
            let url = url_of(&join);
            if keep.iter().any(|kept| kept == url) {
                continue;
            }
            joins.delete(owner, url).await?;
            images.delete(url).await?;
        }
        Ok(())
    }

    /// Store an artist with its artwork. Images the payload no longer
    /// lists are unlinked.
    pub async fn import_artist(&self, remote: &RemoteArtist) -> Result<Artist> {
        let artist = self.tables.artists.save(&Artist::from(remote)).await?;
        let urls = self.import_images(&remote.images).await?;
        for image_url in &urls {
            self.tables
                .artist_images
                .refresh(&ArtistImage {
                    artist_id: artist.id.clone(),
                    image_url: image_url.clone(),
                })
                .await?;
        }
        self.prune_images(&self.tables.artist_images, &artist.id, &urls, |join| {
            join.image_url.as_str()
        })
        .await?;
        Ok(artist)
    }

    /// Store an album with its artwork and credited artists.
    ///
    /// Credits and images the payload no longer lists are removed, and the
    /// artists and images they pointed at go once orphaned.
    pub async fn import_album(&self, remote: &RemoteAlbum) -> Result<Album> {
        let album = self.tables.albums.save(&Album::from(remote)).await?;
        let urls = self.import_images(&remote.images).await?;
        for image_url in &urls {
            self.tables
                .album_images
                .refresh(&AlbumImage {
                    album_id: album.id.clone(),
                    image_url: image_url.clone(),
                })
                .await?;
        }
        self.prune_images(&self.tables.album_images, &album.id, &urls, |join| {
            join.image_url.as_str()
        })
        .await?;

        let previous = self.tables.artist_albums.where_key("album_id", &album.id).await?;
        for artist in &remote.artists {
            let artist = self.import_artist(artist).await?;
            self.tables
                .artist_albums
                .refresh(&ArtistAlbum {
                    artist_id: artist.id,
                    album_id: album.id.clone(),
                })
                .await?;
        }
        let artists = self.artists();
        for join in previous {
            if remote.artists.iter().any(|a| a.id == join.artist_id) {
                continue;
            }
            self.tables
                .artist_albums
                .delete(&join.artist_id, &album.id)
                .await?;
            artists.delete(&join.artist_id).await?;
        }
        Ok(album)
    }

    /// Store a track with its album, artists and artwork.
    ///
    /// A re-import replaces the stored credits: artists the payload no
    /// longer credits are unlinked, and an album the track moved away from
    /// goes with them once no track belongs to it.
    pub async fn import_track(&self, remote: &RemoteTrack) -> Result<Track> {
        let previous_album = self
            .tables
            .tracks
            .get(&remote.id)
            .await?
            .and_then(|track| track.album_id);
        let previous_credits = self.tables.artist_tracks.where_key("track_id", &remote.id).await?;

        if let Some(album) = &remote.album {
            self.import_album(album).await?;
        }
        let track = self.tables.tracks.save(&Track::from(remote)).await?;
        for artist in &remote.artists {
            let artist = self.import_artist(artist).await?;
            self.tables
                .artist_tracks
                .refresh(&ArtistTrack {
                    artist_id: artist.id,
                    track_id: track.id.clone(),
                })
                .await?;
        }

        let dropped: Vec<String> = previous_credits
            .into_iter()
            .map(|credit| credit.artist_id)
            .filter(|artist_id| !remote.artists.iter().any(|a| &a.id == artist_id))
            .collect();
        for artist_id in &dropped {
            self.tables.artist_tracks.delete(artist_id, &track.id).await?;
        }
        if let Some(album_id) = previous_album.filter(|id| track.album_id.as_ref() != Some(id)) {
            debug!(track_id = %track.id, album_id = %album_id, "Track moved off album");
            self.albums().delete(&album_id).await?;
        }
        let artists = self.artists();
        for artist_id in &dropped {
            artists.delete(artist_id).await?;
        }

        debug!(track_id = %track.id, "Imported track");
        Ok(track)
    }

    /// Store playlist metadata and artwork. The change marker is left as
    /// it was; see [`PlaylistRepository::mark_synced`].
    pub async fn import_playlist(&self, remote: &RemotePlaylist) -> Result<Playlist> {
        let playlist = self.tables.playlists.save(&Playlist::from(remote)).await?;
        let urls = self.import_images(&remote.images).await?;
        for image_url in &urls {
            self.tables
                .playlist_images
                .refresh(&PlaylistImage {
                    playlist_id: playlist.id.clone(),
                    image_url: image_url.clone(),
                })
                .await?;
        }
        self.prune_images(&self.tables.playlist_images, &playlist.id, &urls, |join| {
            join.image_url.as_str()
        })
        .await?;
        Ok(playlist)
    }

    /// Import a track and place it at `position` in a playlist.
    pub async fn import_entry(
        &self,
        playlist_id: &str,
        position: u32,
        entry: &TrackImport,
    ) -> Result<PlaylistTrack> {
        let track = self.import_track(&entry.track).await?;
        self.tables
            .playlist_tracks
            .refresh(&PlaylistTrack::new(playlist_id, track.id, position).added_at(entry.added_at))
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// A playlist's rows in position order, with tracks materialised.
    pub async fn tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
        let mut entries = Vec::new();
        self.tracks()
            .each_by_playlist(playlist_id, |entry, _| {
                entries.push(entry);
                ControlFlow::Continue(())
            })
            .await?;
        Ok(entries)
    }

    pub async fn playlists_containing_track(&self, track_id: &str) -> Result<Vec<Playlist>> {
        self.playlists().containing_track(track_id).await
    }

    pub async fn is_track_liked(&self, track_id: &str) -> Result<bool> {
        self.playlist_tracks()
            .contains(MY_TRACKS_PLAYLIST_ID, track_id)
            .await
    }

    // =========================================================================
    // Membership edits
    // =========================================================================

    /// Save a track to the user's library.
    pub async fn like_track(&self, remote: &RemoteTrack, added_at: i64) -> Result<PlaylistTrack> {
        self.playlists().ensure_my_tracks().await?;
        self.add_track(MY_TRACKS_PLAYLIST_ID, remote, Some(added_at))
            .await
    }

    pub async fn unlike_track(&self, track_id: &str) -> Result<bool> {
        self.playlist_tracks()
            .remove(MY_TRACKS_PLAYLIST_ID, track_id)
            .await
    }

    /// Append a track to an existing playlist.
    ///
    /// # Errors
    /// `NotFound` when the playlist is not stored.
    pub async fn add_track(
        &self,
        playlist_id: &str,
        remote: &RemoteTrack,
        added_at: Option<i64>,
    ) -> Result<PlaylistTrack> {
        self.tables.playlists.require(playlist_id).await?;
        let track = self.import_track(remote).await?;
        self.playlist_tracks()
            .append(playlist_id, &track.id, added_at)
            .await
    }
}
