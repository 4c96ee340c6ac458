//! Integration tests for the core service facade

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogClient, Paging, PlaylistItem, RemoteAlbum, RemoteArtist, RemotePlaylist, RemoteTrack,
    SavedTrack,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::playback::{DeviceControl, RemoteDevice};
use bridge_traits::time::FixedClock;
use chrono::{TimeZone, Utc};
use core_library::models::MY_TRACKS_PLAYLIST_ID;
use core_library::LibraryError;
use core_service::{CoreConfig, CoreError, CoreEvent, CoreService, EventStream, LibraryEvent};
use mockall::mock;

const NOW_MS: i64 = 1_700_000_000_000;

struct StaticCatalog {
    saved: Vec<SavedTrack>,
    playlists: Vec<(RemotePlaylist, Vec<RemoteTrack>)>,
}

fn page<T: Clone>(items: &[T], offset: u32, limit: u32) -> Paging<T> {
    let start = (offset as usize).min(items.len());
    let end = (start + limit as usize).min(items.len());
    Paging::new(items[start..end].to_vec(), offset, limit)
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn my_playlists(&self, offset: u32, limit: u32) -> BridgeResult<Paging<RemotePlaylist>> {
        let playlists: Vec<_> = self.playlists.iter().map(|(p, _)| p.clone()).collect();
        Ok(page(&playlists, offset, limit))
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<Paging<PlaylistItem>> {
        let items: Vec<_> = self
            .playlists
            .iter()
            .filter(|(p, _)| p.id == playlist_id)
            .flat_map(|(_, tracks)| tracks.iter().cloned())
            .map(|track| PlaylistItem {
                added_at: None,
                track: Some(track),
            })
            .collect();
        Ok(page(&items, offset, limit))
    }

    async fn my_tracks(&self, offset: u32, limit: u32) -> BridgeResult<Paging<SavedTrack>> {
        Ok(page(&self.saved, offset, limit))
    }
}

mock! {
    pub Devices {}

    #[async_trait]
    impl DeviceControl for Devices {
        async fn devices(&self) -> BridgeResult<Vec<RemoteDevice>>;
    }
}

fn track(id: &str, album_id: &str) -> RemoteTrack {
    let artist = RemoteArtist {
        id: format!("ar-{album_id}"),
        name: "Artist".into(),
        ..RemoteArtist::default()
    };
    RemoteTrack {
        id: id.into(),
        name: format!("Track {id}"),
        album: Some(RemoteAlbum {
            id: album_id.into(),
            name: format!("Album {album_id}"),
            artists: vec![artist.clone()],
            ..RemoteAlbum::default()
        }),
        artists: vec![artist],
        ..RemoteTrack::default()
    }
}

fn remote_playlist(id: &str, name: &str) -> RemotePlaylist {
    RemotePlaylist {
        id: id.into(),
        name: name.into(),
        snapshot_id: Some("s1".into()),
        ..RemotePlaylist::default()
    }
}

fn device(id: &str, active: bool) -> RemoteDevice {
    RemoteDevice {
        id: id.into(),
        name: format!("Device {id}"),
        device_type: "Speaker".into(),
        is_active: active,
        ..RemoteDevice::default()
    }
}

fn client() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog {
        saved: vec![SavedTrack {
            added_at: None,
            track: track("t1", "al1"),
        }],
        playlists: vec![
            (
                remote_playlist("p1", "Zeta"),
                vec![track("t1", "al1"), track("t2", "al1")],
            ),
            (remote_playlist("p2", "Alpha"), vec![track("t3", "al2")]),
        ],
    })
}

fn config() -> core_service::CoreConfigBuilder {
    CoreConfig::builder()
        .catalog_client(client())
        .clock(Arc::new(FixedClock::new(
            Utc.timestamp_millis_opt(NOW_MS).unwrap(),
        )))
        .sync_page_size(10)
}

async fn synced_core() -> CoreService {
    let core = CoreService::new(config().in_memory().build().unwrap())
        .await
        .unwrap();
    assert!(core.sync_data().await.is_completed());
    core
}

fn library_events(stream: &mut EventStream) -> Vec<LibraryEvent> {
    std::iter::from_fn(|| stream.try_recv())
        .filter_map(|event| match event {
            Ok(CoreEvent::Library(event)) => Some(event),
            _ => None,
        })
        .collect()
}

#[core_async::test]
async fn test_queries_after_sync() {
    let core = synced_core().await;

    let names: Vec<_> = core
        .playlists()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Alpha", "Zeta"]);

    let entries = core.tracks_in_playlist("p1").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].track.track.id, "t2");
    assert_eq!(entries[1].track.album.as_ref().map(|a| a.id.as_str()), Some("al1"));

    let holding: Vec<_> = core
        .playlists_containing_track("t1")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    // The saved-tracks playlist also holds t1 but is never listed.
    assert_eq!(holding, vec!["p1"]);

    assert!(core.is_track_liked("t1").await.unwrap());
    assert!(!core.is_track_liked("t3").await.unwrap());
}

#[core_async::test]
async fn test_like_and_unlike() {
    let core = synced_core().await;
    let mut events = core.subscribe();

    let row = core.like_track(&track("t9", "al9")).await.unwrap();
    assert_eq!(row.playlist_id, MY_TRACKS_PLAYLIST_ID);
    assert_eq!(row.added_at, Some(NOW_MS));
    assert!(core.is_track_liked("t9").await.unwrap());

    assert!(core.unlike_track("t9").await.unwrap());
    assert!(!core.unlike_track("t9").await.unwrap());
    assert!(core.catalog().tracks().get("t9").await.unwrap().is_none());

    assert_eq!(
        library_events(&mut events),
        vec![
            LibraryEvent::TrackLiked {
                track_id: "t9".into()
            },
            LibraryEvent::TrackUnliked {
                track_id: "t9".into()
            },
        ]
    );
}

#[core_async::test]
async fn test_playlist_edits() {
    let core = synced_core().await;
    let mut events = core.subscribe();

    let added = core
        .add_track_to_playlist("p2", &track("t4", "al2"))
        .await
        .unwrap();
    assert_eq!(added.position, 1);

    let rows = core.move_track("p2", "t4", 0).await.unwrap();
    let order: Vec<_> = rows.iter().map(|r| r.track_id.as_str()).collect();
    assert_eq!(order, vec!["t4", "t3"]);

    assert!(core.remove_track_from_playlist("p2", "t3").await.unwrap());
    let remaining: Vec<_> = core
        .tracks_in_playlist("p2")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.track.track.id)
        .collect();
    assert_eq!(remaining, vec!["t4"]);

    let missing = core.add_track_to_playlist("nope", &track("t5", "al5")).await;
    assert!(matches!(missing, Err(CoreError::Library(ref e)) if e.is_not_found()));

    let events = library_events(&mut events);
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[1],
        LibraryEvent::PlaylistTrackMoved { track_id, position: 0, .. } if track_id == "t4"
    ));
}

#[core_async::test]
async fn test_delete_playlist() {
    let core = synced_core().await;

    let refused = core.delete_playlist(MY_TRACKS_PLAYLIST_ID).await;
    assert!(matches!(
        refused,
        Err(CoreError::Library(LibraryError::InvalidInput { .. }))
    ));

    assert!(core.delete_playlist("p2").await.unwrap());
    assert!(!core.delete_playlist("p2").await.unwrap());
    assert!(core.catalog().tracks().get("t3").await.unwrap().is_none());
    assert!(core.catalog().albums().get("al2").await.unwrap().is_none());
    // Still held by p1 and the saved tracks.
    assert!(core.catalog().tracks().get("t1").await.unwrap().is_some());
}

#[core_async::test]
async fn test_refresh_devices() {
    let core = synced_core().await;
    let missing = core.refresh_devices().await;
    assert!(matches!(
        missing,
        Err(CoreError::CapabilityMissing { ref capability, .. }) if capability == "DeviceControl"
    ));

    let mut control = MockDevices::new();
    let mut calls = 0;
    control.expect_devices().times(2).returning(move || {
        calls += 1;
        if calls == 1 {
            Ok(vec![device("d1", false), device("d2", true)])
        } else {
            Ok(vec![device("d1", true)])
        }
    });
    let core = CoreService::new(
        config()
            .in_memory()
            .device_control(Arc::new(control))
            .build()
            .unwrap(),
    )
    .await
    .unwrap();
    let mut events = core.subscribe();

    assert_eq!(core.refresh_devices().await.unwrap().len(), 2);
    assert_eq!(
        core.catalog().devices().active().await.unwrap().map(|d| d.id),
        Some("d2".to_string())
    );

    assert_eq!(core.refresh_devices().await.unwrap().len(), 1);
    assert!(core.catalog().devices().get("d2").await.unwrap().is_none());

    assert_eq!(
        library_events(&mut events).last(),
        Some(&LibraryEvent::DevicesRefreshed {
            count: 1,
            active_device_id: Some("d1".into())
        })
    );
}

#[core_async::test]
async fn test_recommendations_replace_and_rank() {
    let core = synced_core().await;

    let stored = core
        .store_recommendations(&[track("r2", "al8"), track("r1", "al8"), track("t3", "al2")])
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|r| r.generated_at == NOW_MS));

    let ids: Vec<_> = core
        .recommendations()
        .await
        .unwrap()
        .into_iter()
        .map(|view| view.track.id)
        .collect();
    assert_eq!(ids, vec!["r2", "r1", "t3"]);

    core.store_recommendations(&[track("r3", "al9")]).await.unwrap();
    assert!(core.catalog().tracks().get("r1").await.unwrap().is_none());
    assert!(core.catalog().albums().get("al8").await.unwrap().is_none());
    // Also in p2, so it outlives the cache.
    assert!(core.catalog().tracks().get("t3").await.unwrap().is_some());
}

#[core_async::test]
async fn test_disabled_store_runs_without_persisting() {
    let core = CoreService::new(config().disabled().build().unwrap())
        .await
        .unwrap();

    assert!(core.sync_data().await.is_completed());
    assert!(core.playlists().await.unwrap().is_empty());
    assert!(!core.is_track_liked("t1").await.unwrap());
}

#[core_async::test]
async fn test_embedded_store_persists_between_services() {
    let path = std::env::temp_dir().join(format!("catalog-{}.db", uuid::Uuid::new_v4()));

    {
        let core = CoreService::new(config().embedded(&path).build().unwrap())
            .await
            .unwrap();
        let report = core.sync_data().await.into_result().unwrap();
        assert_eq!(report.playlists_imported, 2);
    }

    let core = CoreService::new(config().embedded(&path).build().unwrap())
        .await
        .unwrap();
    assert_eq!(core.tracks_in_playlist("p1").await.unwrap().len(), 2);
    let report = core.sync_data().await.into_result().unwrap();
    assert_eq!(report.playlists_skipped, 2);

    drop(core);
    let _ = std::fs::remove_file(&path);
}

#[core_async::test]
async fn test_queries_finishing_mid_sync_leave_the_store_open() {
    let path = std::env::temp_dir().join(format!("catalog-{}.db", uuid::Uuid::new_v4()));
    let core = CoreService::new(config().embedded(&path).build().unwrap())
        .await
        .unwrap();

    let sync = {
        let core = core.clone();
        core_async::spawn(async move { core.sync_data().await })
    };
    for _ in 0..20 {
        core.playlists().await.unwrap();
        core.is_track_liked("t1").await.unwrap();
        core_async::task::yield_now().await;
    }

    let report = sync.await.unwrap().into_result().unwrap();
    assert_eq!(report.playlists_imported, 2);
    assert_eq!(core.tracks_in_playlist("p1").await.unwrap().len(), 2);

    drop(core);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
