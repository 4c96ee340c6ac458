//! # Sync Service
//!
//! Reconciles the user's remote library into the local catalog.
//!
//! ## Overview
//!
//! One call to [`SyncService::sync_data`] is one run:
//!
//! 1. **SyncingMyTracks**: the saved-tracks listing has no change marker,
//!    so it is walked in full every run and written into the synthetic
//!    saved-tracks playlist.
//! 2. **SyncingPlaylists**: the user's playlists are walked and each remote
//!    `snapshot_id` is compared with the stored one. Equal markers skip the
//!    playlist entirely; a new or different marker refreshes the playlist
//!    row and queues it.
//! 3. **SyncingPlaylistTracks**: every queued playlist's tracks are walked
//!    and written with their position.
//! 4. **CleaningUp**: entries that were not observed in this run are
//!    removed from re-imported playlists, playlists that disappeared
//!    remotely are deleted, and only then are the new change markers
//!    stored. A run that fails earlier leaves the old markers, so the next
//!    run re-imports the same playlists.
//!
//! Every write is a refresh, so a failed run is repaired by running again.
//! Writes from a failed run are not rolled back.
//!
//! ## Usage
//!
//! ```ignore
//! let service = SyncService::new(catalog, client, PageWalker::new(50))
//!     .with_event_bus(bus.clone());
//!
//! match service.sync_data().await {
//!     SyncOutcome::Completed(report) => info!(tracks = report.tracks_imported, "done"),
//!     SyncOutcome::Failed(failure) => warn!(phase = %failure.phase, "{}", failure.error),
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::catalog::{CatalogClient, PlaylistItem, RemotePlaylist, SavedTrack};
use core_async::sync::Mutex;
use core_async::time::Instant;
use core_library::models::{TrackImport, MY_TRACKS_PLAYLIST_ID};
use core_library::Catalog;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::pager::PageWalker;
use crate::state::{SyncPhase, SyncStateMachine};

// ============================================================================
// Outcome Types
// ============================================================================

/// Counters of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    /// Saved tracks plus playlist entries written.
    pub tracks_imported: u64,
    /// Playlists whose tracks were re-imported.
    pub playlists_imported: u64,
    /// Playlists skipped because their change marker was unchanged.
    pub playlists_skipped: u64,
    /// Local playlists deleted because they are gone remotely.
    pub playlists_deleted: u64,
    /// Stale playlist entries removed during clean-up.
    pub entries_removed: u64,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct SyncFailure {
    pub run_id: String,
    /// Phase the run was in when it failed.
    pub phase: SyncPhase,
    pub error: SyncError,
}

/// Result of [`SyncService::sync_data`]. A failed run is a value, not an
/// error: the caller decides whether to surface or retry it.
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Failed(SyncFailure),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SyncFailure> {
        match self {
            SyncOutcome::Completed(_) => None,
            SyncOutcome::Failed(failure) => Some(failure),
        }
    }

    /// `Ok(report)` for a completed run, the run's error otherwise.
    pub fn into_result(self) -> Result<SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Ok(report),
            SyncOutcome::Failed(failure) => Err(failure.error),
        }
    }
}

// ============================================================================
// Run bookkeeping
// ============================================================================

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// A playlist whose tracks are being re-imported this run.
struct QueuedPlaylist {
    id: String,
    snapshot_id: Option<String>,
}

/// Tracks observed for one playlist during the run.
struct Observed {
    playlist_id: String,
    snapshot_id: Option<String>,
    track_ids: HashSet<String>,
}

// ============================================================================
// Service
// ============================================================================

pub struct SyncService {
    catalog: Catalog,
    client: Arc<dyn CatalogClient>,
    walker: PageWalker,
    event_bus: Option<EventBus>,
    state: Mutex<SyncStateMachine>,
    running: AtomicBool,
}

impl SyncService {
    pub fn new(catalog: Catalog, client: Arc<dyn CatalogClient>, walker: PageWalker) -> Self {
        Self {
            catalog,
            client,
            walker,
            event_bus: None,
            state: Mutex::new(SyncStateMachine::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Publish run progress on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub async fn phase(&self) -> SyncPhase {
        self.state.lock().await.phase()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one full synchronization.
    ///
    /// Never panics on remote or storage faults: the first one ends the run
    /// and is returned as [`SyncOutcome::Failed`]. A call made while another
    /// run is active fails immediately with [`SyncError::SyncInProgress`]
    /// and does not touch the store.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn sync_data(&self) -> SyncOutcome {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Sync requested while another run is active");
            return SyncOutcome::Failed(SyncFailure {
                run_id,
                phase: self.phase().await,
                error: SyncError::SyncInProgress,
            });
        };

        let started = Instant::now();
        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
        });
        info!("Sync started");

        let mut report = SyncReport::new(&run_id);
        match self.run(&run_id, &mut report).await {
            Ok(()) => {
                report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    tracks = report.tracks_imported,
                    imported = report.playlists_imported,
                    skipped = report.playlists_skipped,
                    deleted = report.playlists_deleted,
                    removed = report.entries_removed,
                    duration_ms = report.duration_ms,
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    run_id,
                    tracks_imported: report.tracks_imported,
                    playlists_imported: report.playlists_imported,
                    playlists_skipped: report.playlists_skipped,
                    playlists_deleted: report.playlists_deleted,
                    entries_removed: report.entries_removed,
                    duration_ms: report.duration_ms,
                });
                SyncOutcome::Completed(report)
            }
            Err(error) => {
                let phase = {
                    let mut state = self.state.lock().await;
                    let phase = state.fail();
                    state.reset();
                    phase
                };
                warn!(phase = %phase, error = %error, "Sync failed");
                self.emit(SyncEvent::Failed {
                    run_id: run_id.clone(),
                    phase: phase.as_str().to_string(),
                    message: error.to_string(),
                });
                SyncOutcome::Failed(SyncFailure {
                    run_id,
                    phase,
                    error,
                })
            }
        }
    }

    async fn run(&self, run_id: &str, report: &mut SyncReport) -> Result<()> {
        self.enter(run_id, SyncPhase::SyncingMyTracks).await?;
        let my_tracks = self.sync_my_tracks().await?;
        report.tracks_imported += my_tracks.track_ids.len() as u64;

        self.enter(run_id, SyncPhase::SyncingPlaylists).await?;
        let (queued, listed) = self.sync_my_playlists(run_id, report).await?;

        let total = u32::try_from(queued.len()).unwrap_or(u32::MAX);
        let mut observed = vec![my_tracks];
        for (index, playlist) in queued.into_iter().enumerate() {
            let current = u32::try_from(index + 1).unwrap_or(u32::MAX);
            self.enter(run_id, SyncPhase::SyncingPlaylistTracks { current, total })
                .await?;
            let tracks = self.sync_tracks_by_playlist(&playlist).await?;
            report.tracks_imported += tracks.track_ids.len() as u64;
            report.playlists_imported += 1;
            observed.push(tracks);
        }

        self.enter(run_id, SyncPhase::CleaningUp).await?;
        self.clean_up(&observed, &listed, report).await?;

        self.enter(run_id, SyncPhase::Idle).await
    }

    async fn enter(&self, run_id: &str, phase: SyncPhase) -> Result<()> {
        self.state.lock().await.transition(phase)?;
        if phase == SyncPhase::Idle {
            return Ok(());
        }

        info!(phase = %phase, "Entering sync phase");
        let (current, total) = match phase {
            SyncPhase::SyncingPlaylistTracks { current, total } => (Some(current), Some(total)),
            _ => (None, None),
        };
        self.emit(SyncEvent::PhaseChanged {
            run_id: run_id.to_string(),
            phase: phase.as_str().to_string(),
            current,
            total,
        });
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    /// Import every saved track into the synthetic playlist.
    #[instrument(skip(self))]
    async fn sync_my_tracks(&self) -> Result<Observed> {
        self.catalog.playlists().ensure_my_tracks().await?;

        let client = Arc::clone(&self.client);
        let sequence = self.walker.walk("listing saved tracks", move |offset, limit| {
            let client = Arc::clone(&client);
            async move { client.my_tracks(offset, limit).await }
        });

        let mut track_ids = HashSet::new();
        let mut position = 0u32;
        let mut stream = sequence.stream();
        while let Some(saved) = stream.next().await {
            let saved: SavedTrack = saved?;
            if saved.track.id.is_empty() {
                debug!(position, "Skipping saved track without id");
                position += 1;
                continue;
            }
            self.catalog
                .import_entry(MY_TRACKS_PLAYLIST_ID, position, &TrackImport::from(&saved))
                .await?;
            track_ids.insert(saved.track.id);
            position += 1;
        }

        debug!(count = track_ids.len(), "Imported saved tracks");
        Ok(Observed {
            playlist_id: MY_TRACKS_PLAYLIST_ID.to_string(),
            snapshot_id: None,
            track_ids,
        })
    }

    /// Compare change markers and queue the playlists that changed.
    ///
    /// Returns the queue and the id of every listed playlist.
    #[instrument(skip(self, report))]
    async fn sync_my_playlists(
        &self,
        run_id: &str,
        report: &mut SyncReport,
    ) -> Result<(Vec<QueuedPlaylist>, HashSet<String>)> {
        let client = Arc::clone(&self.client);
        let sequence = self.walker.walk("listing playlists", move |offset, limit| {
            let client = Arc::clone(&client);
            async move { client.my_playlists(offset, limit).await }
        });

        let playlists = self.catalog.playlists();
        let mut queued = Vec::new();
        let mut listed = HashSet::new();
        let mut stream = sequence.stream();
        while let Some(remote) = stream.next().await {
            let remote: RemotePlaylist = remote?;
            if remote.id.is_empty() || !listed.insert(remote.id.clone()) {
                continue;
            }

            let stored = playlists.snapshot_of(&remote.id).await?;
            if remote.snapshot_id.is_some() && stored == remote.snapshot_id {
                debug!(playlist_id = %remote.id, "Change marker unchanged, skipping playlist");
                report.playlists_skipped += 1;
                self.emit(SyncEvent::PlaylistSkipped {
                    run_id: run_id.to_string(),
                    playlist_id: remote.id.clone(),
                    snapshot_id: remote.snapshot_id.clone(),
                });
                continue;
            }

            self.catalog.import_playlist(&remote).await?;
            queued.push(QueuedPlaylist {
                id: remote.id,
                snapshot_id: remote.snapshot_id,
            });
        }

        info!(
            listed = listed.len(),
            queued = queued.len(),
            "Compared playlist change markers"
        );
        Ok((queued, listed))
    }

    /// Import one playlist's tracks with their positions.
    #[instrument(skip(self, playlist), fields(playlist_id = %playlist.id))]
    async fn sync_tracks_by_playlist(&self, playlist: &QueuedPlaylist) -> Result<Observed> {
        let client = Arc::clone(&self.client);
        let playlist_id = playlist.id.clone();
        let sequence = self.walker.walk("listing playlist tracks", move |offset, limit| {
            let client = Arc::clone(&client);
            let playlist_id = playlist_id.clone();
            async move { client.playlist_tracks(&playlist_id, offset, limit).await }
        });

        let mut track_ids = HashSet::new();
        let mut position = 0u32;
        let mut stream = sequence.stream();
        while let Some(item) = stream.next().await {
            let item: PlaylistItem = item?;
            match TrackImport::from_item(&item) {
                Some(entry) if !entry.track.id.is_empty() => {
                    self.catalog
                        .import_entry(&playlist.id, position, &entry)
                        .await?;
                    track_ids.insert(entry.track.id);
                }
                _ => debug!(position, "Skipping unavailable playlist item"),
            }
            position += 1;
        }

        debug!(count = track_ids.len(), "Imported playlist tracks");
        Ok(Observed {
            playlist_id: playlist.id.clone(),
            snapshot_id: playlist.snapshot_id.clone(),
            track_ids,
        })
    }

    /// Drop stale entries and vanished playlists, then store the markers of
    /// the playlists that were fully imported.
    #[instrument(skip_all)]
    async fn clean_up(
        &self,
        observed: &[Observed],
        listed: &HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let entries = self.catalog.playlist_tracks();
        let playlists = self.catalog.playlists();

        for seen in observed {
            let removed = entries.retain(&seen.playlist_id, &seen.track_ids).await?;
            report.entries_removed += removed as u64;
            if removed > 0 {
                debug!(playlist_id = %seen.playlist_id, removed, "Removed stale entries");
            }
        }

        for playlist in playlists.user_playlists().await? {
            if !listed.contains(&playlist.id) && playlists.delete(&playlist.id).await? {
                report.playlists_deleted += 1;
            }
        }

        for seen in observed {
            if let Some(snapshot_id) = &seen.snapshot_id {
                playlists.mark_synced(&seen.playlist_id, snapshot_id).await?;
            }
        }

        Ok(())
    }
}
