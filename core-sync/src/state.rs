//! # Sync Run State Machine
//!
//! Phases of one synchronization run with validated transitions.
//!
//! ```text
//! Idle → SyncingMyTracks → SyncingPlaylists → SyncingPlaylistTracks{1..N} → CleaningUp → Idle
//!   │           │                 │                      │                      │
//!   └───────────┴─────────────────┴──────────→ Failed ←──┴──────────────────────┘
//!                                                │
//!                                                └──→ Idle
//! ```
//!
//! `SyncingPlaylists` goes straight to `CleaningUp` when no playlist needs
//! its tracks re-imported.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum SyncPhase {
    Idle,
    SyncingMyTracks,
    SyncingPlaylists,
    /// Importing the tracks of the `current`-th (1-based) of `total`
    /// changed playlists.
    SyncingPlaylistTracks { current: u32, total: u32 },
    CleaningUp,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::SyncingMyTracks => "SyncingMyTracks",
            SyncPhase::SyncingPlaylists => "SyncingPlaylists",
            SyncPhase::SyncingPlaylistTracks { .. } => "SyncingPlaylistTracks",
            SyncPhase::CleaningUp => "CleaningUp",
            SyncPhase::Failed => "Failed",
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        !matches!(self, SyncPhase::Idle | SyncPhase::Failed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::SyncingPlaylistTracks { current, total } => {
                write!(f, "{} ({}/{})", self.as_str(), current, total)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Current phase plus the transition rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateMachine {
    phase: SyncPhase,
}

impl Default for SyncStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStateMachine {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when `to` does not follow the current phase;
    /// the phase is left unchanged.
    pub fn transition(&mut self, to: SyncPhase) -> Result<()> {
        if !Self::is_valid(self.phase, to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.phase.as_str(),
                    to.as_str()
                ),
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Enter `Failed` from whatever phase the run reached and return that
    /// phase.
    pub fn fail(&mut self) -> SyncPhase {
        let failed_in = self.phase;
        self.phase = SyncPhase::Failed;
        failed_in
    }

    /// Leave `Failed` for `Idle`. No-op when already idle.
    pub fn reset(&mut self) {
        if self.phase == SyncPhase::Failed {
            self.phase = SyncPhase::Idle;
        }
    }

    fn is_valid(from: SyncPhase, to: SyncPhase) -> bool {
        use SyncPhase::*;

        match (from, to) {
            (Idle, SyncingMyTracks) => true,
            (SyncingMyTracks, SyncingPlaylists) => true,
            (SyncingPlaylists, SyncingPlaylistTracks { current, total }) => {
                current == 1 && total >= 1
            }
            (SyncingPlaylists, CleaningUp) => true,
            (
                SyncingPlaylistTracks { current, total },
                SyncingPlaylistTracks {
                    current: next,
                    total: next_total,
                },
            ) => total == next_total && next == current + 1 && next <= total,
            (SyncingPlaylistTracks { current, total }, CleaningUp) => current == total,
            (CleaningUp, Idle) => true,

            (Failed, Idle) => true,
            (_, Failed) => from != Failed,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(machine: &mut SyncStateMachine, phases: &[SyncPhase]) {
        for phase in phases {
            machine.transition(*phase).unwrap();
        }
    }

    #[test]
    fn test_full_run() {
        let mut machine = SyncStateMachine::new();
        walk(
            &mut machine,
            &[
                SyncPhase::SyncingMyTracks,
                SyncPhase::SyncingPlaylists,
                SyncPhase::SyncingPlaylistTracks { current: 1, total: 2 },
                SyncPhase::SyncingPlaylistTracks { current: 2, total: 2 },
                SyncPhase::CleaningUp,
                SyncPhase::Idle,
            ],
        );
        assert_eq!(machine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_run_without_changed_playlists() {
        let mut machine = SyncStateMachine::new();
        walk(
            &mut machine,
            &[
                SyncPhase::SyncingMyTracks,
                SyncPhase::SyncingPlaylists,
                SyncPhase::CleaningUp,
                SyncPhase::Idle,
            ],
        );
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut machine = SyncStateMachine::new();
        let error = machine.transition(SyncPhase::SyncingPlaylists).unwrap_err();
        assert!(matches!(error, SyncError::InvalidStateTransition { .. }));
        assert_eq!(machine.phase(), SyncPhase::Idle);

        walk(&mut machine, &[SyncPhase::SyncingMyTracks, SyncPhase::SyncingPlaylists]);
        machine
            .transition(SyncPhase::SyncingPlaylistTracks { current: 1, total: 3 })
            .unwrap();
        assert!(machine.transition(SyncPhase::CleaningUp).is_err());
        assert!(machine
            .transition(SyncPhase::SyncingPlaylistTracks { current: 3, total: 3 })
            .is_err());
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let mut machine = SyncStateMachine::new();
        walk(&mut machine, &[SyncPhase::SyncingMyTracks, SyncPhase::SyncingPlaylists]);

        assert_eq!(machine.fail(), SyncPhase::SyncingPlaylists);
        assert_eq!(machine.phase(), SyncPhase::Failed);
        assert!(machine.transition(SyncPhase::SyncingMyTracks).is_err());

        machine.reset();
        assert_eq!(machine.phase(), SyncPhase::Idle);
        assert!(machine.transition(SyncPhase::SyncingMyTracks).is_ok());
    }

    #[test]
    fn test_explicit_failed_phase() {
        let mut machine = SyncStateMachine::new();
        machine.transition(SyncPhase::SyncingMyTracks).unwrap();
        machine.transition(SyncPhase::Failed).unwrap();
        assert!(!machine.phase().is_running());
        assert!(machine.transition(SyncPhase::Failed).is_err());
        machine.transition(SyncPhase::Idle).unwrap();
    }

    #[test]
    fn test_display_includes_progress() {
        let phase = SyncPhase::SyncingPlaylistTracks { current: 2, total: 5 };
        assert_eq!(phase.to_string(), "SyncingPlaylistTracks (2/5)");
        assert!(phase.is_running());
    }
}
