//! Recommendation cache repository

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use super::{EntityRepository, Tables, TrackRepository};
use crate::error::Result;
use crate::models::Recommendation;

/// Disposable, ranked list of recommended tracks.
#[derive(Clone)]
pub struct RecommendationRepository {
    tables: Arc<Tables>,
}

impl RecommendationRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Swap the cache for `track_ids`, ranked by their order.
    ///
    /// Tracks that drop out of the cache are deleted when nothing else
    /// references them. The tracks themselves must already be stored.
    pub async fn replace(
        &self,
        track_ids: &[String],
        generated_at: i64,
    ) -> Result<Vec<Recommendation>> {
        let next: HashSet<&str> = track_ids.iter().map(String::as_str).collect();
        let tracks = TrackRepository::new(Arc::clone(&self.tables));
        let mut dropped = 0;
        for stale in self.tables.recommendations.all().await? {
            if !next.contains(stale.id.as_str()) {
                self.tables.recommendations.delete_row(&stale.id).await?;
                tracks.delete(&stale.id).await?;
                dropped += 1;
            }
        }

        let mut stored = Vec::with_capacity(track_ids.len());
        for (rank, id) in track_ids.iter().enumerate() {
            let recommendation = Recommendation {
                id: id.clone(),
                rank: rank as u32,
                generated_at,
            };
            stored.push(self.tables.recommendations.save(&recommendation).await?);
        }
        debug!(count = stored.len(), dropped, "Replaced recommendations");
        Ok(stored)
    }

    /// Cached recommendations in rank order.
    pub async fn ranked(&self) -> Result<Vec<Recommendation>> {
        self.tables.recommendations.all().await
    }
}

impl Deref for RecommendationRepository {
    type Target = EntityRepository<Recommendation>;

    fn deref(&self) -> &Self::Target {
        &self.tables.recommendations
    }
}
