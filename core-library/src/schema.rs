//! Table layout of the catalog store
//!
//! Every persisted type declares its table here, either as an [`Entity`]
//! (keyed by its own id) or as a [`Join`] (keyed by the pair it links).
//! [`all_schemas`] is what gets handed to
//! [`ObjectStore::initialize_structure`] when the store is opened.

use std::sync::Arc;

use bridge_traits::store::{ObjectStore, Record, SortOrder, TableSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LibraryError, Result};
use crate::models::{
    Album, AlbumImage, Artist, ArtistAlbum, ArtistImage, ArtistTrack, Device, Image, Playlist,
    PlaylistImage, PlaylistTrack, Recommendation, Track,
};
use crate::relation::{Relation, RelationShape};

/// Bump whenever a table or index is added. Stores created with an older
/// version get the missing structures on the next open.
pub const STORE_VERSION: u32 = 1;

/// A document type with its own table.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;

    fn schema() -> TableSchema;

    /// Primary key value of this instance.
    fn key(&self) -> &str;
}

/// A two-key association row.
pub trait Join: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const LEFT: &'static str;
    const RIGHT: &'static str;

    fn order() -> Option<SortOrder> {
        None
    }

    fn shape() -> RelationShape {
        let shape = RelationShape::new(Self::LEFT, Self::RIGHT);
        match Self::order() {
            Some(order) => shape.ordered_by(order),
            None => shape,
        }
    }

    fn relation(store: Arc<dyn ObjectStore>) -> Relation<Self> {
        let relation = Relation::new(store, Self::LEFT, Self::RIGHT);
        match Self::order() {
            Some(order) => relation.with_order(order),
            None => relation,
        }
    }
}

impl Entity for Track {
    const KIND: &'static str = "Track";

    fn schema() -> TableSchema {
        TableSchema::new("tracks", "id")
            .index("album_id")
            .order_by_asc("name")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Album {
    const KIND: &'static str = "Album";

    fn schema() -> TableSchema {
        TableSchema::new("albums", "id").order_by_asc("name")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Artist {
    const KIND: &'static str = "Artist";

    fn schema() -> TableSchema {
        TableSchema::new("artists", "id").order_by_asc("name")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Image {
    const KIND: &'static str = "Image";

    fn schema() -> TableSchema {
        TableSchema::new("images", "url")
    }

    fn key(&self) -> &str {
        &self.url
    }
}

impl Entity for Playlist {
    const KIND: &'static str = "Playlist";

    fn schema() -> TableSchema {
        TableSchema::new("playlists", "id")
            .index("owner_id")
            .order_by_asc("name")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Device {
    const KIND: &'static str = "Device";

    fn schema() -> TableSchema {
        TableSchema::new("devices", "id")
            .index("is_active")
            .order_by_asc("name")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Recommendation {
    const KIND: &'static str = "Recommendation";

    fn schema() -> TableSchema {
        TableSchema::new("recommendations", "id").order_by_asc("rank")
    }

    fn key(&self) -> &str {
        &self.id
    }
}

impl Join for AlbumImage {
    const LEFT: &'static str = "album_id";
    const RIGHT: &'static str = "image_url";
}

impl Join for ArtistAlbum {
    const LEFT: &'static str = "artist_id";
    const RIGHT: &'static str = "album_id";
}

impl Join for ArtistTrack {
    const LEFT: &'static str = "artist_id";
    const RIGHT: &'static str = "track_id";
}

impl Join for ArtistImage {
    const LEFT: &'static str = "artist_id";
    const RIGHT: &'static str = "image_url";
}

impl Join for PlaylistImage {
    const LEFT: &'static str = "playlist_id";
    const RIGHT: &'static str = "image_url";
}

impl Join for PlaylistTrack {
    const LEFT: &'static str = "playlist_id";
    const RIGHT: &'static str = "track_id";

    fn order() -> Option<SortOrder> {
        Some(SortOrder::ascending("position"))
    }
}

/// Every table the catalog needs.
pub fn all_schemas() -> Vec<TableSchema> {
    vec![
        Track::schema(),
        Album::schema(),
        Artist::schema(),
        Image::schema(),
        Playlist::schema(),
        Device::schema(),
        Recommendation::schema(),
        AlbumImage::shape().schema(),
        ArtistAlbum::shape().schema(),
        ArtistTrack::shape().schema(),
        ArtistImage::shape().schema(),
        PlaylistImage::shape().schema(),
        PlaylistTrack::shape().schema(),
    ]
}

// =============================================================================
// Record conversion
// =============================================================================

pub(crate) fn to_record<T: Serialize + ?Sized>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        other => Err(LibraryError::InvalidInput {
            field: "record".to_string(),
            message: format!("expected a JSON object, got {}", other),
        }),
    }
}

pub(crate) fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}
