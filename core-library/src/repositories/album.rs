//! Album repository

use std::ops::Deref;
use std::sync::Arc;

use bridge_traits::store::predicate;
use tracing::debug;

use super::{ArtistRepository, EntityRepository, ImageRepository, Tables};
use crate::error::Result;
use crate::models::{Album, AlbumView, Track};

#[derive(Clone)]
pub struct AlbumRepository {
    tables: Arc<Tables>,
}

impl AlbumRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// An album is referenced while any stored track belongs to it.
    pub async fn is_referenced(&self, id: &str) -> Result<bool> {
        self.tables
            .tracks
            .exists_where(&predicate("album_id", id))
            .await
    }

    pub async fn tracks_of(&self, id: &str) -> Result<Vec<Track>> {
        self.tables.tracks.find_where(&predicate("album_id", id)).await
    }

    /// Delete the album once no track belongs to it.
    ///
    /// Removes the album's image and artist joins, then gives the images
    /// and artists the same chance to go.
    ///
    /// # Returns
    /// - `Ok(true)` if the album was removed
    /// - `Ok(false)` if a track still belongs to it or it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if self.is_referenced(id).await? {
            debug!(album_id = id, "Album still has tracks, kept");
            return Ok(false);
        }
        if !self.tables.albums.delete_row(id).await? {
            return Ok(false);
        }

        let images = self.tables.album_images.where_key("album_id", id).await?;
        for join in &images {
            self.tables
                .album_images
                .delete(&join.album_id, &join.image_url)
                .await?;
        }
        let artists = self.tables.artist_albums.where_key("album_id", id).await?;
        for join in &artists {
            self.tables
                .artist_albums
                .delete(&join.artist_id, &join.album_id)
                .await?;
        }

        let image_repository = ImageRepository::new(Arc::clone(&self.tables));
        for join in images {
            image_repository.delete(&join.image_url).await?;
        }
        let artist_repository = ArtistRepository::new(Arc::clone(&self.tables));
        for join in artists {
            artist_repository.delete(&join.artist_id).await?;
        }
        Ok(true)
    }

    pub async fn view(&self, id: &str) -> Result<Option<AlbumView>> {
        let Some(album) = self.tables.albums.get(id).await? else {
            return Ok(None);
        };
        let urls = self
            .tables
            .album_images
            .where_key("album_id", id)
            .await?
            .into_iter()
            .map(|join| join.image_url);
        let images = ImageRepository::new(Arc::clone(&self.tables))
            .resolve(urls)
            .await?;
        let artists = ArtistRepository::new(Arc::clone(&self.tables))
            .for_album(id)
            .await?;
        Ok(Some(AlbumView {
            album,
            images,
            artists,
        }))
    }
}

impl Deref for AlbumRepository {
    type Target = EntityRepository<Album>;

    fn deref(&self) -> &Self::Target {
        &self.tables.albums
    }
}
