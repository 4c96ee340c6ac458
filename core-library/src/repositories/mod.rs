//! # Repository Pattern Implementation
//!
//! Typed access to every catalog table, built on [`EntityRepository`] for
//! entities and [`Relation`](crate::relation::Relation) for joins.
//!
//! ## Architecture
//!
//! - [`Tables`] holds one handle per physical table over a shared
//!   `Arc<dyn ObjectStore>`; every repository is a thin view over it
//! - Entity repositories deref to their [`EntityRepository`] for plain CRUD
//!   and add lookups, read models and delete rules on top
//! - Deletes of tracks, albums, artists and images are conditional: a row
//!   that is still referenced is kept and `delete` returns `false`
//! - Deleting a playlist is unconditional and cascades through its joins
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - tracks, with `TrackView` materialisation
//! - `AlbumRepository` / `ArtistRepository` / `ImageRepository`
//! - `PlaylistRepository` - playlists, including the synthetic saved-tracks one
//! - `PlaylistTrackRepository` - ordered playlist membership
//! - `DeviceRepository` / `RecommendationRepository` - replaceable snapshots
//! - `*ImageRepository`, `ArtistAlbumRepository`, `ArtistTrackRepository` -
//!   plain join tables

use std::sync::Arc;

use bridge_traits::store::ObjectStore;

use crate::models::{
    Album, AlbumImage, Artist, ArtistAlbum, ArtistImage, ArtistTrack, Device, Image, Playlist,
    PlaylistImage, PlaylistTrack, Recommendation, Track,
};
use crate::relation::Relation;
use crate::schema::Join;

pub mod album;
pub mod artist;
pub mod base;
pub mod device;
pub mod image;
pub mod pagination;
pub mod playlist;
pub mod recommendation;
pub mod track;

pub use album::AlbumRepository;
pub use artist::ArtistRepository;
pub use base::EntityRepository;
pub use device::DeviceRepository;
pub use image::ImageRepository;
pub use pagination::{Page, PageRequest};
pub use playlist::{PlaylistRepository, PlaylistTrackRepository};
pub use recommendation::RecommendationRepository;
pub use track::TrackRepository;

pub type AlbumImageRepository = Relation<AlbumImage>;
pub type ArtistAlbumRepository = Relation<ArtistAlbum>;
pub type ArtistTrackRepository = Relation<ArtistTrack>;
pub type ArtistImageRepository = Relation<ArtistImage>;
pub type PlaylistImageRepository = Relation<PlaylistImage>;

/// One handle per catalog table, all over the same store.
#[derive(Clone)]
pub struct Tables {
    pub tracks: EntityRepository<Track>,
    pub albums: EntityRepository<Album>,
    pub artists: EntityRepository<Artist>,
    pub images: EntityRepository<Image>,
    pub playlists: EntityRepository<Playlist>,
    pub devices: EntityRepository<Device>,
    pub recommendations: EntityRepository<Recommendation>,
    pub album_images: AlbumImageRepository,
    pub artist_albums: ArtistAlbumRepository,
    pub artist_tracks: ArtistTrackRepository,
    pub artist_images: ArtistImageRepository,
    pub playlist_images: PlaylistImageRepository,
    pub playlist_tracks: Relation<PlaylistTrack>,
}

impl Tables {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            tracks: EntityRepository::new(Arc::clone(&store)),
            albums: EntityRepository::new(Arc::clone(&store)),
            artists: EntityRepository::new(Arc::clone(&store)),
            images: EntityRepository::new(Arc::clone(&store)),
            playlists: EntityRepository::new(Arc::clone(&store)),
            devices: EntityRepository::new(Arc::clone(&store)),
            recommendations: EntityRepository::new(Arc::clone(&store)),
            album_images: AlbumImage::relation(Arc::clone(&store)),
            artist_albums: ArtistAlbum::relation(Arc::clone(&store)),
            artist_tracks: ArtistTrack::relation(Arc::clone(&store)),
            artist_images: ArtistImage::relation(Arc::clone(&store)),
            playlist_images: PlaylistImage::relation(Arc::clone(&store)),
            playlist_tracks: PlaylistTrack::relation(store),
        }
    }
}
