//! Track repository

use std::ops::{ControlFlow, Deref};
use std::sync::Arc;

use bridge_traits::store::predicate;
use core_async::sequence::LazySequence;
use futures::StreamExt;
use tracing::debug;

use super::{AlbumRepository, ArtistRepository, EntityRepository, Tables};
use crate::error::{LibraryError, Result};
use crate::models::{PlaylistEntry, Track, TrackView};

#[derive(Clone)]
pub struct TrackRepository {
    tables: Arc<Tables>,
}

impl TrackRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// A track is referenced while it sits in any playlist (the saved-tracks
    /// one included) or in the recommendation cache.
    pub async fn is_referenced(&self, id: &str) -> Result<bool> {
        Ok(self.tables.playlist_tracks.exists_for("track_id", id).await?
            || self.tables.recommendations.get(id).await?.is_some())
    }

    /// Delete the track once nothing references it.
    ///
    /// Removes its artist credits, then lets its album and artists go if
    /// this was their last track.
    ///
    /// # Returns
    /// - `Ok(true)` if the track was removed
    /// - `Ok(false)` if it is still referenced or did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if self.is_referenced(id).await? {
            debug!(track_id = id, "Track still referenced, kept");
            return Ok(false);
        }
        let Some(track) = self.tables.tracks.get(id).await? else {
            return Ok(false);
        };

        let credits = self.tables.artist_tracks.where_key("track_id", id).await?;
        for credit in &credits {
            self.tables
                .artist_tracks
                .delete(&credit.artist_id, &credit.track_id)
                .await?;
        }
        self.tables.tracks.delete_row(id).await?;

        if let Some(album_id) = &track.album_id {
            AlbumRepository::new(Arc::clone(&self.tables))
                .delete(album_id)
                .await?;
        }
        let artists = ArtistRepository::new(Arc::clone(&self.tables));
        for credit in credits {
            artists.delete(&credit.artist_id).await?;
        }
        Ok(true)
    }

    /// Attach album and artists to a stored track.
    pub async fn view_of(&self, track: Track) -> Result<TrackView> {
        let album = match &track.album_id {
            Some(album_id) => self.tables.albums.get(album_id).await?,
            None => None,
        };
        let artists = ArtistRepository::new(Arc::clone(&self.tables))
            .for_track(&track.id)
            .await?;
        Ok(TrackView {
            track,
            album,
            artists,
        })
    }

    pub async fn view(&self, id: &str) -> Result<Option<TrackView>> {
        match self.tables.tracks.get(id).await? {
            Some(track) => Ok(Some(self.view_of(track).await?)),
            None => Ok(None),
        }
    }

    /// Visit every track as a [`TrackView`], in name order.
    pub async fn each_view<F>(&self, visitor: F) -> Result<usize>
    where
        F: FnMut(TrackView, usize) -> ControlFlow<()> + Send,
    {
        self.visit_views(self.tables.tracks.stream(), visitor).await
    }

    /// Visit the tracks of one album as [`TrackView`]s.
    pub async fn each_by_album<F>(&self, album_id: &str, visitor: F) -> Result<usize>
    where
        F: FnMut(TrackView, usize) -> ControlFlow<()> + Send,
    {
        let tracks = self.tables.tracks.stream_where(predicate("album_id", album_id));
        self.visit_views(tracks, visitor).await
    }

    /// Visit one playlist's rows in position order.
    ///
    /// Rows whose track is missing are skipped and not counted.
    pub async fn each_by_playlist<F>(&self, playlist_id: &str, mut visitor: F) -> Result<usize>
    where
        F: FnMut(PlaylistEntry, usize) -> ControlFlow<()> + Send,
    {
        let mut rows = self
            .tables
            .playlist_tracks
            .stream_where("playlist_id", playlist_id)?
            .stream();
        let mut visited = 0;
        while let Some(row) = rows.next().await {
            let row = row?;
            let Some(track) = self.tables.tracks.get(&row.track_id).await? else {
                continue;
            };
            let entry = PlaylistEntry {
                position: row.position,
                added_at: row.added_at,
                track: self.view_of(track).await?,
            };
            visited += 1;
            if visitor(entry, visited - 1).is_break() {
                break;
            }
        }
        Ok(visited)
    }

    async fn visit_views<F>(
        &self,
        tracks: LazySequence<Track, LibraryError>,
        mut visitor: F,
    ) -> Result<usize>
    where
        F: FnMut(TrackView, usize) -> ControlFlow<()> + Send,
    {
        let mut tracks = tracks.stream();
        let mut visited = 0;
        while let Some(track) = tracks.next().await {
            let view = self.view_of(track?).await?;
            visited += 1;
            if visitor(view, visited - 1).is_break() {
                break;
            }
        }
        Ok(visited)
    }
}

impl Deref for TrackRepository {
    type Target = EntityRepository<Track>;

    fn deref(&self) -> &Self::Target {
        &self.tables.tracks
    }
}
