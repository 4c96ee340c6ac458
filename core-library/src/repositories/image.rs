//! Image repository

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use super::{EntityRepository, Tables};
use crate::error::Result;
use crate::models::Image;

/// Artwork shared by albums, artists and playlists.
#[derive(Clone)]
pub struct ImageRepository {
    tables: Arc<Tables>,
}

impl ImageRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Whether any album, artist or playlist still points at `url`.
    pub async fn is_referenced(&self, url: &str) -> Result<bool> {
        Ok(self.tables.album_images.exists_for("image_url", url).await?
            || self.tables.artist_images.exists_for("image_url", url).await?
            || self.tables.playlist_images.exists_for("image_url", url).await?)
    }

    /// Delete the image unless something still references it.
    ///
    /// # Returns
    /// - `Ok(true)` if the image was removed
    /// - `Ok(false)` if it is still referenced or did not exist
    pub async fn delete(&self, url: &str) -> Result<bool> {
        if self.is_referenced(url).await? {
            debug!(url, "Image still referenced, kept");
            return Ok(false);
        }
        self.tables.images.delete_row(url).await
    }

    /// Resolve join targets, skipping urls whose image row is gone.
    pub(crate) async fn resolve<I>(&self, urls: I) -> Result<Vec<Image>>
    where
        I: IntoIterator<Item = String> + Send,
        I::IntoIter: Send,
    {
        let mut images = Vec::new();
        for url in urls {
            if let Some(image) = self.tables.images.get(&url).await? {
                images.push(image);
            }
        }
        Ok(images)
    }
}

impl Deref for ImageRepository {
    type Target = EntityRepository<Image>;

    fn deref(&self) -> &Self::Target {
        &self.tables.images
    }
}
