//! Playback device boundary.
//!
//! Playback itself happens on remote devices owned by the music service; the
//! core only mirrors the list of devices the user can hand playback to. The
//! host's player client implements [`DeviceControl`].

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A playback target as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: String,
    pub name: String,
    /// Free-form kind reported by the service ("Computer", "Speaker", ...).
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub is_active: bool,
    /// Restricted devices accept no remote commands.
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub is_private_session: bool,
    #[serde(default)]
    pub volume_percent: Option<u8>,
    #[serde(default)]
    pub supports_volume: bool,
}

impl RemoteDevice {
    /// Whether the device can be targeted by playback commands.
    pub fn is_controllable(&self) -> bool {
        !self.is_restricted
    }
}

#[async_trait::async_trait]
pub trait DeviceControl: Send + Sync {
    /// Devices currently available to the user.
    async fn devices(&self) -> Result<Vec<RemoteDevice>>;
}
