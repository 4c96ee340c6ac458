//! Integration tests for the sync service
//!
//! These tests drive whole runs against an in-process fake of the remote
//! catalog and check:
//! - page walking of the saved-tracks listing
//! - the change-marker short-circuit
//! - pruning of removed entries and cascades into shared rows
//! - deletion of playlists that vanished remotely
//! - failure reporting and recovery on the next run
//! - rejection of concurrent runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogClient, Paging, PlaylistItem, RemoteAlbum, RemoteArtist, RemotePlaylist, RemoteTrack,
    SavedTrack,
};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::store::{ObjectStore, StoreConfig};
use chrono::{TimeZone, Utc};
use core_async::sync::Notify;
use core_library::adapters::{MemoryObjectStore, SqliteObjectStore};
use core_library::models::MY_TRACKS_PLAYLIST_ID;
use core_library::{Catalog, STORE_VERSION};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{PageWalker, SyncError, SyncOutcome, SyncPhase, SyncService};
use mockall::mock;

// ============================================================================
// Fake remote catalog
// ============================================================================

#[derive(Default)]
struct Remote {
    saved: Vec<SavedTrack>,
    playlists: Vec<RemotePlaylist>,
    tracks: HashMap<String, Vec<PlaylistItem>>,
    failing_playlist: Option<String>,
    requests: Vec<(String, u32, u32)>,
}

#[derive(Default)]
struct FakeCatalog {
    remote: Mutex<Remote>,
}

fn window<T: Clone>(items: &[T], offset: u32, limit: u32) -> Paging<T> {
    let start = (offset as usize).min(items.len());
    let end = start.saturating_add(limit as usize).min(items.len());
    Paging::new(items[start..end].to_vec(), offset, limit).with_total(items.len() as u32)
}

impl FakeCatalog {
    fn set_saved(&self, tracks: Vec<RemoteTrack>) {
        self.remote.lock().unwrap().saved = tracks
            .into_iter()
            .map(|track| SavedTrack {
                added_at: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
                track,
            })
            .collect();
    }

    fn set_playlist(&self, playlist: RemotePlaylist, tracks: Vec<RemoteTrack>) {
        let mut remote = self.remote.lock().unwrap();
        remote.playlists.retain(|p| p.id != playlist.id);
        remote.tracks.insert(
            playlist.id.clone(),
            tracks
                .into_iter()
                .map(|track| PlaylistItem {
                    added_at: None,
                    track: Some(track),
                })
                .collect(),
        );
        remote.playlists.push(playlist);
    }

    fn drop_playlist(&self, id: &str) {
        let mut remote = self.remote.lock().unwrap();
        remote.playlists.retain(|p| p.id != id);
        remote.tracks.remove(id);
    }

    fn fail_tracks_of(&self, id: Option<&str>) {
        self.remote.lock().unwrap().failing_playlist = id.map(str::to_string);
    }

    fn requests_for(&self, endpoint: &str) -> Vec<(u32, u32)> {
        self.remote
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(name, _, _)| name == endpoint)
            .map(|(_, offset, limit)| (*offset, *limit))
            .collect()
    }

    fn clear_requests(&self) {
        self.remote.lock().unwrap().requests.clear();
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn my_playlists(&self, offset: u32, limit: u32) -> BridgeResult<Paging<RemotePlaylist>> {
        let mut remote = self.remote.lock().unwrap();
        remote.requests.push(("my_playlists".into(), offset, limit));
        Ok(window(&remote.playlists, offset, limit))
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<Paging<PlaylistItem>> {
        let mut remote = self.remote.lock().unwrap();
        remote
            .requests
            .push((format!("playlist_tracks:{playlist_id}"), offset, limit));
        if remote.failing_playlist.as_deref() == Some(playlist_id) {
            return Err(BridgeError::Remote("502 Bad Gateway".into()));
        }
        let items = remote.tracks.get(playlist_id).cloned().unwrap_or_default();
        Ok(window(&items, offset, limit))
    }

    async fn my_tracks(&self, offset: u32, limit: u32) -> BridgeResult<Paging<SavedTrack>> {
        let mut remote = self.remote.lock().unwrap();
        remote.requests.push(("my_tracks".into(), offset, limit));
        Ok(window(&remote.saved, offset, limit))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn artist(id: &str) -> RemoteArtist {
    RemoteArtist {
        id: id.into(),
        name: format!("Artist {id}"),
        ..RemoteArtist::default()
    }
}

fn track(id: &str, album_id: &str, artist_id: &str) -> RemoteTrack {
    RemoteTrack {
        id: id.into(),
        name: format!("Track {id}"),
        duration_ms: 180_000,
        album: Some(RemoteAlbum {
            id: album_id.into(),
            name: format!("Album {album_id}"),
            artists: vec![artist(artist_id)],
            ..RemoteAlbum::default()
        }),
        artists: vec![artist(artist_id)],
        ..RemoteTrack::default()
    }
}

fn playlist(id: &str, snapshot: &str) -> RemotePlaylist {
    RemotePlaylist {
        id: id.into(),
        name: format!("Playlist {id}"),
        snapshot_id: Some(snapshot.into()),
        ..RemotePlaylist::default()
    }
}

async fn memory_catalog() -> Catalog {
    Catalog::open(Arc::new(MemoryObjectStore::new()), STORE_VERSION)
        .await
        .unwrap()
}

async fn catalogs() -> Vec<(&'static str, Catalog)> {
    let sqlite = SqliteObjectStore::open(StoreConfig::in_memory())
        .await
        .unwrap();
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

fn service(catalog: &Catalog, remote: &Arc<FakeCatalog>, page_size: u32) -> SyncService {
    let client: Arc<dyn CatalogClient> = remote.clone();
    SyncService::new(catalog.clone(), client, PageWalker::new(page_size))
}

async fn entry_ids(catalog: &Catalog, playlist_id: &str) -> Vec<String> {
    catalog
        .tracks_in_playlist(playlist_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.track.track.id)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[core_async::test]
async fn test_saved_tracks_walk_in_three_pages() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_saved(
        (0..45)
            .map(|i| track(&format!("t{i:02}"), "al1", "ar1"))
            .collect(),
    );

    let report = service(&catalog, &remote, 20)
        .sync_data()
        .await
        .into_result()
        .unwrap();

    assert_eq!(
        remote.requests_for("my_tracks"),
        vec![(0, 21), (20, 21), (40, 21)]
    );
    assert_eq!(report.tracks_imported, 45);

    let entries = catalog.tracks_in_playlist(MY_TRACKS_PLAYLIST_ID).await.unwrap();
    assert_eq!(entries.len(), 45);
    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.position, index as u32);
        assert_eq!(entry.track.track.id, format!("t{index:02}"));
    }
    assert!(catalog.is_track_liked("t07").await.unwrap());
}

#[core_async::test]
async fn test_unchanged_change_marker_skips_playlist() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_playlist(playlist("p1", "s1"), vec![track("t1", "al1", "ar1")]);
    let sync = service(&catalog, &remote, 20);

    let first = sync.sync_data().await.into_result().unwrap();
    assert_eq!(first.playlists_imported, 1);
    assert_eq!(
        catalog.playlists().snapshot_of("p1").await.unwrap().as_deref(),
        Some("s1")
    );

    remote.clear_requests();
    let second = sync.sync_data().await.into_result().unwrap();
    assert_eq!(second.playlists_imported, 0);
    assert_eq!(second.playlists_skipped, 1);
    assert!(remote.requests_for("playlist_tracks:p1").is_empty());

    remote.set_playlist(
        playlist("p1", "s2"),
        vec![track("t2", "al1", "ar1"), track("t1", "al1", "ar1")],
    );
    remote.clear_requests();
    let third = sync.sync_data().await.into_result().unwrap();
    assert_eq!(third.playlists_imported, 1);
    assert_eq!(remote.requests_for("playlist_tracks:p1").len(), 1);
    assert_eq!(entry_ids(&catalog, "p1").await, vec!["t2", "t1"]);
}

#[core_async::test]
async fn test_end_to_end_removal_cascades() {
    for (label, catalog) in catalogs().await {
        let remote = Arc::new(FakeCatalog::default());
        remote.set_playlist(
            playlist("p1", "s1"),
            vec![track("t1", "al1", "ar1"), track("t2", "al1", "ar1")],
        );
        remote.set_playlist(playlist("p2", "s9"), vec![track("t3", "al2", "ar2")]);
        let sync = service(&catalog, &remote, 20);

        sync.sync_data().await.into_result().unwrap();
        assert_eq!(entry_ids(&catalog, "p1").await, vec!["t1", "t2"], "{label}");

        remote.set_playlist(playlist("p1", "s2"), Vec::new());
        let report = sync.sync_data().await.into_result().unwrap();

        assert_eq!(report.entries_removed, 2, "{label}");
        assert_eq!(report.playlists_skipped, 1, "{label}");
        assert!(entry_ids(&catalog, "p1").await.is_empty(), "{label}");
        assert!(catalog.tracks().get("t1").await.unwrap().is_none(), "{label}");
        assert!(catalog.albums().get("al1").await.unwrap().is_none(), "{label}");
        assert!(catalog.artists().get("ar1").await.unwrap().is_none(), "{label}");

        assert_eq!(entry_ids(&catalog, "p2").await, vec!["t3"], "{label}");
        assert!(catalog.albums().get("al2").await.unwrap().is_some(), "{label}");

        remote.clear_requests();
        let again = sync.sync_data().await.into_result().unwrap();
        assert_eq!(again.playlists_imported, 0, "{label}");
        assert_eq!(again.entries_removed, 0, "{label}");
        assert!(remote.requests_for("playlist_tracks:p2").is_empty(), "{label}");
    }
}

#[core_async::test]
async fn test_vanished_playlist_is_deleted() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_saved(vec![track("t9", "al9", "ar9")]);
    remote.set_playlist(playlist("p1", "s1"), vec![track("t1", "al1", "ar1")]);
    remote.set_playlist(playlist("p2", "s1"), vec![track("t9", "al9", "ar9")]);
    let sync = service(&catalog, &remote, 20);
    sync.sync_data().await.into_result().unwrap();

    remote.drop_playlist("p1");
    remote.drop_playlist("p2");
    let report = sync.sync_data().await.into_result().unwrap();

    assert_eq!(report.playlists_deleted, 2);
    assert!(catalog.playlists().get("p1").await.unwrap().is_none());
    assert!(catalog.tracks().get("t1").await.unwrap().is_none());
    // Still saved, so it survives its playlist.
    assert!(catalog.tracks().get("t9").await.unwrap().is_some());
    assert!(catalog
        .playlists()
        .get(MY_TRACKS_PLAYLIST_ID)
        .await
        .unwrap()
        .is_some());
}

#[core_async::test]
async fn test_unliked_remotely_is_pruned() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_saved(vec![track("t1", "al1", "ar1"), track("t2", "al2", "ar2")]);
    let sync = service(&catalog, &remote, 50);
    sync.sync_data().await.into_result().unwrap();

    remote.set_saved(vec![track("t2", "al2", "ar2")]);
    let report = sync.sync_data().await.into_result().unwrap();

    assert_eq!(report.entries_removed, 1);
    assert!(!catalog.is_track_liked("t1").await.unwrap());
    assert!(catalog.tracks().get("t1").await.unwrap().is_none());
    assert_eq!(entry_ids(&catalog, MY_TRACKS_PLAYLIST_ID).await, vec!["t2"]);
}

#[core_async::test]
async fn test_remote_failure_is_reported_and_retried() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_playlist(playlist("p1", "s1"), vec![track("t1", "al1", "ar1")]);
    remote.fail_tracks_of(Some("p1"));
    let sync = service(&catalog, &remote, 20);

    let outcome = sync.sync_data().await;
    let failure = outcome.failure().expect("run should fail");
    assert_eq!(
        failure.phase,
        SyncPhase::SyncingPlaylistTracks { current: 1, total: 1 }
    );
    assert!(failure.error.is_remote());
    assert_eq!(sync.phase().await, SyncPhase::Idle);
    assert!(!sync.is_running());

    // The playlist row was written, but not its change marker.
    assert!(catalog.playlists().get("p1").await.unwrap().is_some());
    assert_eq!(catalog.playlists().snapshot_of("p1").await.unwrap(), None);

    remote.fail_tracks_of(None);
    let report = sync.sync_data().await.into_result().unwrap();
    assert_eq!(report.playlists_imported, 1);
    assert_eq!(entry_ids(&catalog, "p1").await, vec!["t1"]);
}

#[core_async::test]
async fn test_events_follow_the_run() {
    let catalog = memory_catalog().await;
    let remote = Arc::new(FakeCatalog::default());
    remote.set_playlist(playlist("p1", "s1"), vec![track("t1", "al1", "ar1")]);
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let sync = service(&catalog, &remote, 20).with_event_bus(bus.clone());

    sync.sync_data().await.into_result().unwrap();

    let mut phases = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::Sync(SyncEvent::PhaseChanged { phase, .. }) => phases.push(phase),
            CoreEvent::Sync(SyncEvent::Completed { playlists_imported, .. }) => {
                assert_eq!(playlists_imported, 1);
                completed = true;
            }
            _ => {}
        }
    }
    assert_eq!(
        phases,
        vec![
            "SyncingMyTracks",
            "SyncingPlaylists",
            "SyncingPlaylistTracks",
            "CleaningUp"
        ]
    );
    assert!(completed);

    sync.sync_data().await.into_result().unwrap();
    let skipped = std::iter::from_fn(|| events.try_recv().ok()).any(|event| {
        matches!(
            event,
            CoreEvent::Sync(SyncEvent::PlaylistSkipped { ref playlist_id, .. }) if playlist_id == "p1"
        )
    });
    assert!(skipped);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Saved-tracks listing that parks until released.
struct GatedCatalog {
    entered: Notify,
    gate: Notify,
}

#[async_trait]
impl CatalogClient for GatedCatalog {
    async fn my_playlists(&self, offset: u32, limit: u32) -> BridgeResult<Paging<RemotePlaylist>> {
        Ok(Paging::new(Vec::new(), offset, limit))
    }

    async fn playlist_tracks(
        &self,
        _playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<Paging<PlaylistItem>> {
        Ok(Paging::new(Vec::new(), offset, limit))
    }

    async fn my_tracks(&self, offset: u32, limit: u32) -> BridgeResult<Paging<SavedTrack>> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Paging::new(Vec::new(), offset, limit))
    }
}

#[core_async::test]
async fn test_concurrent_run_is_rejected() {
    let catalog = memory_catalog().await;
    let client = Arc::new(GatedCatalog {
        entered: Notify::new(),
        gate: Notify::new(),
    });
    let sync = Arc::new(SyncService::new(
        catalog,
        client.clone(),
        PageWalker::new(20),
    ));

    let background = Arc::clone(&sync);
    let first = core_async::spawn(async move { background.sync_data().await });
    client.entered.notified().await;

    assert!(sync.is_running());
    match sync.sync_data().await {
        SyncOutcome::Failed(failure) => {
            assert!(matches!(failure.error, SyncError::SyncInProgress));
            assert_eq!(failure.phase, SyncPhase::SyncingMyTracks);
        }
        SyncOutcome::Completed(_) => panic!("second run should be rejected"),
    }

    client.gate.notify_one();
    assert!(first.await.unwrap().is_completed());
    assert!(!sync.is_running());
}

// ============================================================================
// Call-count expectations
// ============================================================================

mock! {
    pub Client {}

    #[async_trait]
    impl CatalogClient for Client {
        async fn my_playlists(&self, offset: u32, limit: u32) -> BridgeResult<Paging<RemotePlaylist>>;
        async fn playlist_tracks(
            &self,
            playlist_id: &str,
            offset: u32,
            limit: u32,
        ) -> BridgeResult<Paging<PlaylistItem>>;
        async fn my_tracks(&self, offset: u32, limit: u32) -> BridgeResult<Paging<SavedTrack>>;
    }
}

#[core_async::test]
async fn test_synced_playlist_fetches_no_tracks() {
    let catalog = memory_catalog().await;
    catalog.import_playlist(&playlist("p1", "s1")).await.unwrap();
    catalog.playlists().mark_synced("p1", "s1").await.unwrap();

    let mut client = MockClient::new();
    client
        .expect_my_tracks()
        .times(1)
        .returning(|offset, limit| Ok(Paging::new(Vec::new(), offset, limit)));
    client
        .expect_my_playlists()
        .times(1)
        .returning(|offset, limit| Ok(Paging::new(vec![playlist("p1", "s1")], offset, limit)));
    client.expect_playlist_tracks().never();

    let sync = SyncService::new(catalog.clone(), Arc::new(client), PageWalker::new(50));
    let report = sync.sync_data().await.into_result().unwrap();

    assert_eq!(report.playlists_skipped, 1);
    assert_eq!(report.playlists_deleted, 0);
    assert!(catalog.playlists().get("p1").await.unwrap().is_some());
}
