use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Remote catalog error while {operation}: {source}")]
    Remote {
        operation: String,
        #[source]
        source: BridgeError,
    },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    pub fn remote(operation: impl Into<String>, source: BridgeError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// Whether the run failed because the remote catalog did.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
