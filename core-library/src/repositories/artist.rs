//! Artist repository

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use super::{EntityRepository, ImageRepository, Tables};
use crate::error::Result;
use crate::models::{Artist, ArtistImage, ArtistView};

#[derive(Clone)]
pub struct ArtistRepository {
    tables: Arc<Tables>,
}

impl ArtistRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// An artist is referenced while any track or album credits it.
    pub async fn is_referenced(&self, id: &str) -> Result<bool> {
        Ok(self.tables.artist_tracks.exists_for("artist_id", id).await?
            || self.tables.artist_albums.exists_for("artist_id", id).await?)
    }

    /// Delete the artist unless still referenced, then its image joins and
    /// any image left orphaned.
    ///
    /// # Returns
    /// - `Ok(true)` if the artist was removed
    /// - `Ok(false)` if it is still referenced or did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if self.is_referenced(id).await? {
            debug!(artist_id = id, "Artist still referenced, kept");
            return Ok(false);
        }
        if !self.tables.artists.delete_row(id).await? {
            return Ok(false);
        }

        let joins = self.tables.artist_images.where_key("artist_id", id).await?;
        for join in &joins {
            self.tables
                .artist_images
                .delete(&join.artist_id, &join.image_url)
                .await?;
        }
        let images = ImageRepository::new(Arc::clone(&self.tables));
        for join in joins {
            images.delete(&join.image_url).await?;
        }
        Ok(true)
    }

    pub async fn images_of(&self, id: &str) -> Result<Vec<ArtistImage>> {
        self.tables.artist_images.where_key("artist_id", id).await
    }

    pub async fn view(&self, id: &str) -> Result<Option<ArtistView>> {
        let Some(artist) = self.tables.artists.get(id).await? else {
            return Ok(None);
        };
        let urls = self
            .images_of(id)
            .await?
            .into_iter()
            .map(|join| join.image_url);
        let images = ImageRepository::new(Arc::clone(&self.tables))
            .resolve(urls)
            .await?;
        Ok(Some(ArtistView { artist, images }))
    }

    /// Artists credited on a track, in artist id order.
    pub async fn for_track(&self, track_id: &str) -> Result<Vec<Artist>> {
        let joins = self.tables.artist_tracks.where_key("track_id", track_id).await?;
        self.resolve(joins.into_iter().map(|join| join.artist_id)).await
    }

    pub async fn for_album(&self, album_id: &str) -> Result<Vec<Artist>> {
        let joins = self.tables.artist_albums.where_key("album_id", album_id).await?;
        self.resolve(joins.into_iter().map(|join| join.artist_id)).await
    }

    async fn resolve<I>(&self, ids: I) -> Result<Vec<Artist>>
    where
        I: IntoIterator<Item = String> + Send,
        I::IntoIter: Send,
    {
        let mut artists = Vec::new();
        for id in ids {
            if let Some(artist) = self.tables.artists.get(&id).await? {
                artists.push(artist);
            }
        }
        Ok(artists)
    }
}

impl Deref for ArtistRepository {
    type Target = EntityRepository<Artist>;

    fn deref(&self) -> &Self::Target {
        &self.tables.artists
    }
}
