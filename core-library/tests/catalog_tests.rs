//! Catalog behaviour over both real backends: imports, cascades, joins.

use std::collections::HashSet;
use std::sync::Arc;

use bridge_traits::catalog::{RemoteAlbum, RemoteArtist, RemoteImage, RemotePlaylist, RemoteTrack};
use bridge_traits::store::{ObjectStore, StoreConfig};
use core_library::adapters::{MemoryObjectStore, SqliteObjectStore};
use core_library::models::{Device, PlaylistTrack, MY_TRACKS_PLAYLIST_ID};
use core_library::relation::Relation;
use core_library::{Catalog, LibraryError, STORE_VERSION};

async fn catalogs() -> Vec<(&'static str, Catalog)> {
    let sqlite = SqliteObjectStore::open(StoreConfig::in_memory())
        .await
        .expect("open sqlite");
    let stores: Vec<(&'static str, Arc<dyn ObjectStore>)> = vec![
        ("memory", Arc::new(MemoryObjectStore::new())),
        ("sqlite", Arc::new(sqlite)),
    ];
    let mut catalogs = Vec::new();
    for (label, store) in stores {
        catalogs.push((label, Catalog::open(store, STORE_VERSION).await.unwrap()));
    }
    catalogs
}

fn artist(id: &str) -> RemoteArtist {
    RemoteArtist {
        id: id.into(),
        name: format!("Artist {id}"),
        images: vec![RemoteImage::new(format!("https://img/{id}"))],
        ..RemoteArtist::default()
    }
}

fn album(id: &str, artist_id: &str) -> RemoteAlbum {
    RemoteAlbum {
        id: id.into(),
        name: format!("Album {id}"),
        images: vec![RemoteImage::new(format!("https://img/{id}"))],
        artists: vec![artist(artist_id)],
        ..RemoteAlbum::default()
    }
}

fn track(id: &str, album_id: &str, artist_id: &str) -> RemoteTrack {
    RemoteTrack {
        id: id.into(),
        name: format!("Track {id}"),
        album: Some(album(album_id, artist_id)),
        artists: vec![artist(artist_id)],
        ..RemoteTrack::default()
    }
}

fn playlist(id: &str, snapshot: &str) -> RemotePlaylist {
    RemotePlaylist {
        id: id.into(),
        name: format!("Playlist {id}"),
        snapshot_id: Some(snapshot.into()),
        images: vec![RemoteImage::new(format!("https://img/{id}"))],
        ..RemotePlaylist::default()
    }
}

#[core_async::test]
async fn test_import_track_brings_its_graph() {
    for (label, catalog) in catalogs().await {
        catalog.import_track(&track("t1", "al1", "ar1")).await.unwrap();

        let view = catalog.tracks().view("t1").await.unwrap().unwrap();
        assert_eq!(view.album.map(|a| a.id), Some("al1".to_string()), "{label}");
        assert_eq!(view.artists.len(), 1, "{label}");

        let album = catalog.albums().view("al1").await.unwrap().unwrap();
        assert_eq!(album.images.len(), 1, "{label}");
        assert_eq!(album.artists[0].id, "ar1", "{label}");

        let artist = catalog.artists().view("ar1").await.unwrap().unwrap();
        assert_eq!(artist.images[0].url, "https://img/ar1", "{label}");
    }
}

#[core_async::test]
async fn test_reimport_is_idempotent() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        let entry = core_library::models::TrackImport {
            track: track("t1", "al1", "ar1"),
            added_at: Some(10),
        };
        catalog.import_entry("p1", 0, &entry).await.unwrap();
        let tables = catalog.tables();
        let before = (
            tables.tracks.count().await.unwrap(),
            tables.artist_tracks.count().await.unwrap(),
            tables.playlist_tracks.count().await.unwrap(),
            tables.images.count().await.unwrap(),
        );

        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        catalog.import_entry("p1", 0, &entry).await.unwrap();
        let after = (
            tables.tracks.count().await.unwrap(),
            tables.artist_tracks.count().await.unwrap(),
            tables.playlist_tracks.count().await.unwrap(),
            tables.images.count().await.unwrap(),
        );
        assert_eq!(before, after, "{label}");
    }
}

#[core_async::test]
async fn test_reimport_replaces_stale_credits() {
    for (label, catalog) in catalogs().await {
        catalog.like_track(&track("t1", "al1", "ar1"), 1).await.unwrap();
        catalog.import_track(&track("t1", "al2", "ar2")).await.unwrap();

        let view = catalog.tracks().view("t1").await.unwrap().unwrap();
        let artists: Vec<_> = view.artists.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(artists, vec!["ar2"], "{label}");
        assert_eq!(view.album.map(|a| a.id), Some("al2".to_string()), "{label}");
        assert!(catalog.albums().get("al1").await.unwrap().is_none(), "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_none(), "{label}");
        assert!(catalog.images().get("https://img/al1").await.unwrap().is_none(), "{label}");
        assert!(catalog.images().get("https://img/ar1").await.unwrap().is_none(), "{label}");

        assert!(catalog.unlike_track("t1").await.unwrap(), "{label}");
        assert!(catalog.albums().get("al2").await.unwrap().is_none(), "{label}");
        assert!(catalog.artists().get("ar2").await.unwrap().is_none(), "{label}");
    }
}

#[core_async::test]
async fn test_reimport_keeps_credits_shared_elsewhere() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        catalog.add_track("p1", &track("t1", "al1", "ar1"), None).await.unwrap();
        catalog.add_track("p1", &track("t2", "al1", "ar1"), None).await.unwrap();

        catalog.import_track(&track("t1", "al2", "ar2")).await.unwrap();
        // t2 still holds al1 and ar1
        assert!(catalog.albums().get("al1").await.unwrap().is_some(), "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_some(), "{label}");
        let credited: Vec<_> = catalog
            .artists()
            .for_track("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(credited, vec!["ar2"], "{label}");
    }
}

#[core_async::test]
async fn test_reimport_drops_replaced_artwork() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        let mut renamed = playlist("p1", "s2");
        renamed.images = vec![RemoteImage::new("https://img/p1-v2")];
        catalog.import_playlist(&renamed).await.unwrap();

        let joins = catalog.tables().playlist_images.where_key("playlist_id", "p1").await.unwrap();
        let urls: Vec<_> = joins.iter().map(|j| j.image_url.as_str()).collect();
        assert_eq!(urls, vec!["https://img/p1-v2"], "{label}");
        assert!(catalog.images().get("https://img/p1").await.unwrap().is_none(), "{label}");

        let mut reissued = album("al1", "ar1");
        catalog.import_album(&reissued).await.unwrap();
        reissued.images.clear();
        reissued.artists = vec![artist("ar2")];
        catalog.import_album(&reissued).await.unwrap();
        let view = catalog.albums().view("al1").await.unwrap().unwrap();
        assert!(view.images.is_empty(), "{label}");
        assert_eq!(view.artists.len(), 1, "{label}");
        assert_eq!(view.artists[0].id, "ar2", "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_none(), "{label}");
    }
}

#[core_async::test]
async fn test_removing_last_reference_cascades() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        catalog
            .add_track("p1", &track("t1", "al1", "ar1"), None)
            .await
            .unwrap();
        catalog
            .add_track("p1", &track("t2", "al1", "ar1"), None)
            .await
            .unwrap();

        let memberships = catalog.playlist_tracks();
        assert!(memberships.remove("p1", "t1").await.unwrap(), "{label}");
        assert!(catalog.tracks().get("t1").await.unwrap().is_none(), "{label}");
        assert!(catalog.albums().get("al1").await.unwrap().is_some(), "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_some(), "{label}");

        assert!(memberships.remove("p1", "t2").await.unwrap(), "{label}");
        assert!(catalog.tracks().get("t2").await.unwrap().is_none(), "{label}");
        assert!(catalog.albums().get("al1").await.unwrap().is_none(), "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_none(), "{label}");
        assert!(catalog.images().get("https://img/al1").await.unwrap().is_none(), "{label}");
        assert!(catalog.images().get("https://img/ar1").await.unwrap().is_none(), "{label}");
        // the playlist's own artwork is untouched
        assert!(catalog.images().get("https://img/p1").await.unwrap().is_some(), "{label}");
    }
}

#[core_async::test]
async fn test_referenced_rows_survive_delete() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        catalog.import_playlist(&playlist("p2", "s1")).await.unwrap();
        let shared = track("t1", "al1", "ar1");
        catalog.add_track("p1", &shared, None).await.unwrap();
        catalog.add_track("p2", &shared, None).await.unwrap();

        assert!(!catalog.tracks().delete("t1").await.unwrap(), "{label}");
        assert!(!catalog.albums().delete("al1").await.unwrap(), "{label}");
        assert!(!catalog.artists().delete("ar1").await.unwrap(), "{label}");
        assert!(!catalog.images().delete("https://img/al1").await.unwrap(), "{label}");

        catalog.playlist_tracks().remove("p1", "t1").await.unwrap();
        assert!(catalog.tracks().get("t1").await.unwrap().is_some(), "{label}");

        let containing = catalog.playlists_containing_track("t1").await.unwrap();
        let ids: Vec<_> = containing.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2"], "{label}");
    }
}

#[core_async::test]
async fn test_recommendation_keeps_track_alive() {
    for (label, catalog) in catalogs().await {
        catalog.import_track(&track("t1", "al1", "ar1")).await.unwrap();
        let recommendations = catalog.recommendations();
        recommendations.replace(&["t1".to_string()], 1).await.unwrap();

        assert!(!catalog.tracks().delete("t1").await.unwrap(), "{label}");

        recommendations.replace(&[], 2).await.unwrap();
        assert!(catalog.tracks().get("t1").await.unwrap().is_none(), "{label}");
        assert!(recommendations.ranked().await.unwrap().is_empty(), "{label}");
    }
}

#[core_async::test]
async fn test_delete_playlist_is_unconditional() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        catalog.like_track(&track("t1", "al1", "ar1"), 5).await.unwrap();
        catalog
            .add_track("p1", &track("t1", "al1", "ar1"), None)
            .await
            .unwrap();
        catalog
            .add_track("p1", &track("t2", "al2", "ar2"), None)
            .await
            .unwrap();

        assert!(catalog.playlists().delete("p1").await.unwrap(), "{label}");
        assert!(catalog.playlists().get("p1").await.unwrap().is_none(), "{label}");
        assert!(catalog.images().get("https://img/p1").await.unwrap().is_none(), "{label}");
        // liked track stays, the other one goes
        assert!(catalog.tracks().get("t1").await.unwrap().is_some(), "{label}");
        assert!(catalog.tracks().get("t2").await.unwrap().is_none(), "{label}");
        assert!(catalog.albums().get("al2").await.unwrap().is_none(), "{label}");
        assert!(!catalog.playlists().delete("p1").await.unwrap(), "{label}");
    }
}

#[core_async::test]
async fn test_like_and_unlike() {
    for (label, catalog) in catalogs().await {
        let remote = track("t1", "al1", "ar1");
        catalog.like_track(&remote, 100).await.unwrap();
        assert!(catalog.is_track_liked("t1").await.unwrap(), "{label}");
        assert!(
            catalog.playlists().get(MY_TRACKS_PLAYLIST_ID).await.unwrap().is_some(),
            "{label}"
        );
        assert!(catalog.playlists().user_playlists().await.unwrap().is_empty(), "{label}");

        assert!(catalog.unlike_track("t1").await.unwrap(), "{label}");
        assert!(!catalog.is_track_liked("t1").await.unwrap(), "{label}");
        assert!(catalog.tracks().get("t1").await.unwrap().is_none(), "{label}");
    }
}

#[core_async::test]
async fn test_add_track_requires_playlist() {
    for (label, catalog) in catalogs().await {
        let result = catalog.add_track("nope", &track("t1", "al1", "ar1"), None).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })), "{label}");
    }
}

#[core_async::test]
async fn test_move_track_renumbers() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        for id in ["t1", "t2", "t3"] {
            catalog.add_track("p1", &track(id, "al1", "ar1"), None).await.unwrap();
        }

        let rows = catalog.playlist_tracks().move_to("p1", "t3", 0).await.unwrap();
        let order: Vec<_> = rows.iter().map(|r| (r.track_id.as_str(), r.position)).collect();
        assert_eq!(order, vec![("t3", 0), ("t1", 1), ("t2", 2)], "{label}");

        let entries = catalog.tracks_in_playlist("p1").await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.track.track.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1", "t2"], "{label}");

        let clamped = catalog.playlist_tracks().move_to("p1", "t3", 99).await.unwrap();
        assert_eq!(clamped.last().map(|r| r.track_id.as_str()), Some("t3"), "{label}");

        let missing = catalog.playlist_tracks().move_to("p1", "t9", 0).await;
        assert!(matches!(missing, Err(LibraryError::NotFound { .. })), "{label}");
    }
}

#[core_async::test]
async fn test_retain_prunes_unobserved_rows() {
    for (label, catalog) in catalogs().await {
        catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
        for id in ["t1", "t2"] {
            catalog.add_track("p1", &track(id, id, id), None).await.unwrap();
        }

        let keep: HashSet<String> = ["t2".to_string()].into();
        let removed = catalog.playlist_tracks().retain("p1", &keep).await.unwrap();
        assert_eq!(removed, 1, "{label}");
        assert!(catalog.tracks().get("t1").await.unwrap().is_none(), "{label}");
        assert!(catalog.tracks().get("t2").await.unwrap().is_some(), "{label}");
    }
}

#[core_async::test]
async fn test_join_ids_do_not_depend_on_declaration_order() {
    for (label, catalog) in catalogs().await {
        let forward: Relation<PlaylistTrack> =
            Relation::new(Arc::clone(catalog.store()), "playlist_id", "track_id");
        let backward: Relation<PlaylistTrack> =
            Relation::new(Arc::clone(catalog.store()), "track_id", "playlist_id");

        assert_eq!(forward.table_name(), backward.table_name(), "{label}");
        forward.refresh(&PlaylistTrack::new("p1", "t1", 0)).await.unwrap();
        backward.refresh(&PlaylistTrack::new("p1", "t1", 4)).await.unwrap();

        assert_eq!(forward.count().await.unwrap(), 1, "{label}");
        let row = forward.get("p1", "t1").await.unwrap().unwrap();
        assert_eq!(row.position, 4, "{label}");
    }
}

#[core_async::test]
async fn test_device_snapshot_replacement() {
    for (label, catalog) in catalogs().await {
        let device = |id: &str, active: bool| Device {
            id: id.into(),
            name: id.to_uppercase(),
            is_active: active,
            ..Device::default()
        };
        let devices = catalog.devices();
        devices
            .replace_all(&[device("d1", false), device("d2", true)])
            .await
            .unwrap();
        assert_eq!(devices.active().await.unwrap().map(|d| d.id), Some("d2".into()), "{label}");

        devices.replace_all(&[device("d3", false)]).await.unwrap();
        assert_eq!(devices.count().await.unwrap(), 1, "{label}");
        assert!(devices.active().await.unwrap().is_none(), "{label}");
    }
}
