//! Device repository

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use bridge_traits::store::predicate;
use tracing::debug;

use super::{EntityRepository, Tables};
use crate::error::Result;
use crate::models::Device;

/// Transient list of playback targets.
#[derive(Clone)]
pub struct DeviceRepository {
    tables: Arc<Tables>,
}

impl DeviceRepository {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Replace the stored list with `devices`.
    ///
    /// Devices missing from the new list are deleted; the rest are merged.
    pub async fn replace_all(&self, devices: &[Device]) -> Result<Vec<Device>> {
        let current: HashSet<&str> = devices.iter().map(|device| device.id.as_str()).collect();
        for stale in self.tables.devices.all().await? {
            if !current.contains(stale.id.as_str()) {
                self.tables.devices.delete_row(&stale.id).await?;
            }
        }

        let mut stored = Vec::with_capacity(devices.len());
        for device in devices {
            stored.push(self.tables.devices.save(device).await?);
        }
        debug!(count = stored.len(), "Replaced device list");
        Ok(stored)
    }

    /// The device currently playing, if any.
    pub async fn active(&self) -> Result<Option<Device>> {
        Ok(self
            .tables
            .devices
            .find_where(&predicate("is_active", true))
            .await?
            .into_iter()
            .next())
    }
}

impl Deref for DeviceRepository {
    type Target = EntityRepository<Device>;

    fn deref(&self) -> &Self::Target {
        &self.tables.devices
    }
}
