//! Playlist and playlist membership repositories

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use super::{EntityRepository, ImageRepository, Tables, TrackRepository};
use crate::error::{LibraryError, Result};
use crate::models::{Playlist, PlaylistImage, PlaylistTrack, PlaylistView, MY_TRACKS_PLAYLIST_ID};
use crate::relation::Relation;

#[derive(Clone)]
pub struct PlaylistRepository {
    tables: Arc<Tables>,
}

impl PlaylistRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Stored change marker of a playlist, if it was ever fully imported.
    pub async fn snapshot_of(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .tables
            .playlists
            .get(id)
            .await?
            .and_then(|playlist| playlist.snapshot_id))
    }

    /// Record that the playlist's tracks for `snapshot_id` are all stored.
    pub async fn mark_synced(&self, id: &str, snapshot_id: &str) -> Result<Playlist> {
        self.tables
            .playlists
            .update(id, &json!({ "snapshot_id": snapshot_id }))
            .await
    }

    /// Make sure the synthetic saved-tracks playlist exists.
    pub async fn ensure_my_tracks(&self) -> Result<Playlist> {
        match self.tables.playlists.get(MY_TRACKS_PLAYLIST_ID).await? {
            Some(playlist) => Ok(playlist),
            None => self.tables.playlists.save(&Playlist::my_tracks()).await,
        }
    }

    /// Remote playlists in name order, without the synthetic one.
    pub async fn user_playlists(&self) -> Result<Vec<Playlist>> {
        let mut playlists = self.tables.playlists.all().await?;
        playlists.retain(|playlist| !playlist.is_synthetic());
        Ok(playlists)
    }

    /// Remote playlists a track belongs to, in name order.
    pub async fn containing_track(&self, track_id: &str) -> Result<Vec<Playlist>> {
        let ids: HashSet<String> = self
            .tables
            .playlist_tracks
            .where_key("track_id", track_id)
            .await?
            .into_iter()
            .map(|row| row.playlist_id)
            .collect();
        let mut playlists = self.user_playlists().await?;
        playlists.retain(|playlist| ids.contains(&playlist.id));
        Ok(playlists)
    }

    pub async fn images_of(&self, id: &str) -> Result<Vec<PlaylistImage>> {
        self.tables.playlist_images.where_key("playlist_id", id).await
    }

    pub async fn view(&self, id: &str) -> Result<Option<PlaylistView>> {
        let Some(playlist) = self.tables.playlists.get(id).await? else {
            return Ok(None);
        };
        let urls = self.images_of(id).await?.into_iter().map(|join| join.image_url);
        let images = ImageRepository::new(Arc::clone(&self.tables))
            .resolve(urls)
            .await?;
        Ok(Some(PlaylistView { playlist, images }))
    }

    /// Remove the playlist with its image and track joins.
    ///
    /// Unlike the other entity deletes this is unconditional; tracks and
    /// images it leaves orphaned are removed too.
    ///
    /// # Returns
    /// Whether the playlist row existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.tables.playlists.delete_row(id).await?;

        let images = self.images_of(id).await?;
        for join in &images {
            self.tables
                .playlist_images
                .delete(&join.playlist_id, &join.image_url)
                .await?;
        }
        let rows = self.tables.playlist_tracks.where_key("playlist_id", id).await?;
        for row in &rows {
            self.tables
                .playlist_tracks
                .delete(&row.playlist_id, &row.track_id)
                .await?;
        }

        let image_repository = ImageRepository::new(Arc::clone(&self.tables));
        for join in images {
            image_repository.delete(&join.image_url).await?;
        }
        let track_repository = TrackRepository::new(Arc::clone(&self.tables));
        for row in &rows {
            track_repository.delete(&row.track_id).await?;
        }

        if existed {
            info!(playlist_id = id, tracks = rows.len(), "Deleted playlist");
        }
        Ok(existed)
    }
}

impl Deref for PlaylistRepository {
    type Target = EntityRepository<Playlist>;

    fn deref(&self) -> &Self::Target {
        &self.tables.playlists
    }
}

/// Ordered membership of tracks in playlists.
#[derive(Clone)]
pub struct PlaylistTrackRepository {
    tables: Arc<Tables>,
}

impl PlaylistTrackRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Rows of one playlist in position order.
    pub async fn entries(&self, playlist_id: &str) -> Result<Vec<PlaylistTrack>> {
        self.tables
            .playlist_tracks
            .where_key("playlist_id", playlist_id)
            .await
    }

    pub async fn contains(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        Ok(self
            .tables
            .playlist_tracks
            .get(playlist_id, track_id)
            .await?
            .is_some())
    }

    /// Add a track after the playlist's last row. A track already in the
    /// playlist keeps its row.
    pub async fn append(
        &self,
        playlist_id: &str,
        track_id: &str,
        added_at: Option<i64>,
    ) -> Result<PlaylistTrack> {
        if let Some(existing) = self.tables.playlist_tracks.get(playlist_id, track_id).await? {
            return Ok(existing);
        }
        let position = self
            .entries(playlist_id)
            .await?
            .last()
            .map_or(0, |row| row.position + 1);
        let row = PlaylistTrack::new(playlist_id, track_id, position).added_at(added_at);
        self.tables.playlist_tracks.refresh(&row).await
    }

    /// Remove a track from a playlist, deleting the track itself when this
    /// was its last reference.
    ///
    /// # Returns
    /// Whether the track was in the playlist.
    pub async fn remove(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        let removed = self
            .tables
            .playlist_tracks
            .delete(playlist_id, track_id)
            .await?;
        if removed {
            debug!(playlist_id, track_id, "Removed track from playlist");
            TrackRepository::new(Arc::clone(&self.tables))
                .delete(track_id)
                .await?;
        }
        Ok(removed)
    }

    /// Move a track to `position` (clamped to the playlist length) and
    /// renumber the playlist densely from zero.
    ///
    /// # Errors
    /// `NotFound` when the track is not in the playlist.
    pub async fn move_to(
        &self,
        playlist_id: &str,
        track_id: &str,
        position: u32,
    ) -> Result<Vec<PlaylistTrack>> {
        let mut rows = self.entries(playlist_id).await?;
        let from = rows
            .iter()
            .position(|row| row.track_id == track_id)
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "PlaylistTrack".to_string(),
                id: self.tables.playlist_tracks.id_of(playlist_id, track_id),
            })?;

        let moving = rows.remove(from);
        let to = (position as usize).min(rows.len());
        rows.insert(to, moving);

        for (index, row) in rows.iter_mut().enumerate() {
            let index = index as u32;
            if row.position != index {
                row.position = index;
                self.tables.playlist_tracks.update(row).await?;
            }
        }
        Ok(rows)
    }

    /// Drop every row of the playlist whose track is not in `keep`,
    /// cascading into the tracks.
    ///
    /// # Returns
    /// Number of rows removed.
    pub async fn retain(&self, playlist_id: &str, keep: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for row in self.entries(playlist_id).await? {
            if !keep.contains(&row.track_id) && self.remove(playlist_id, &row.track_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Deref for PlaylistTrackRepository {
    type Target = Relation<PlaylistTrack>;

    fn deref(&self) -> &Self::Target {
        &self.tables.playlist_tracks
    }
}
