//! # Core Configuration Module
//!
//! Configuration for the catalog mirror.
//!
//! ## Overview
//!
//! A builder assembles a [`CoreConfig`] holding the host-provided
//! capabilities and the tunables of the store and the sync service. `build()`
//! validates everything up front, so a service constructed from a config
//! never discovers a bad setting halfway through a sync.
//!
//! ## Required
//!
//! - A store backend (`embedded`, `in_memory` or `disabled`)
//! - `CatalogClient` - paginated access to the remote catalog
//!
//! ## Optional
//!
//! - `DeviceControl` - device listing for the transient device table
//! - `Clock` - defaults to the system clock
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .embedded("/path/to/catalog.db")
//!     .catalog_client(Arc::new(MyCatalogClient))
//!     .sync_page_size(20)
//!     .build()?;
//! ```
//!
//! Missing capabilities fail with an actionable error:
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .in_memory()
//!     .build()
//!     .expect("Should fail - no catalog client");
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::catalog::CatalogClient;
use bridge_traits::playback::DeviceControl;
use bridge_traits::time::{Clock, SystemClock};

use crate::error::{Error, Result};

/// Default per-operation time box of the embedded store.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest accepted per-operation time box.
pub const MAX_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default window for merging in-memory store releases.
pub const DEFAULT_MEMORY_DEBOUNCE: Duration = Duration::from_millis(25);

/// Largest page the remote catalog serves.
pub const MAX_SYNC_PAGE_SIZE: u32 = 50;

pub const DEFAULT_SYNC_PAGE_SIZE: u32 = MAX_SYNC_PAGE_SIZE;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Where catalog data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite database file.
    Embedded { path: PathBuf },
    /// Process-local tables; lost on exit.
    InMemory,
    /// No persistence: writes are discarded, reads are empty.
    Disabled,
}

/// Validated configuration. Build one with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    pub store: StoreBackend,

    /// Time box of each embedded store operation.
    pub operation_timeout: Duration,

    /// Debounce window of in-memory store releases.
    pub memory_debounce: Duration,

    /// Structure version to initialize. `None` means the version the
    /// library ships with.
    pub store_version: Option<u32>,

    /// Items requested per remote page.
    pub sync_page_size: u32,

    pub event_buffer_size: usize,

    pub catalog_client: Arc<dyn CatalogClient>,

    pub device_control: Option<Arc<dyn DeviceControl>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("store", &self.store)
            .field("operation_timeout", &self.operation_timeout)
            .field("memory_debounce", &self.memory_debounce)
            .field("store_version", &self.store_version)
            .field("sync_page_size", &self.sync_page_size)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("catalog_client", &"CatalogClient { ... }")
            .field(
                "device_control",
                &self.device_control.as_ref().map(|_| "DeviceControl { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Checks:
    /// - an embedded store has a non-empty path
    /// - the operation timeout is within 1..=600 seconds
    /// - the sync page size is within 1..=50
    /// - the store version, when set, is at least 1
    /// - the event buffer holds at least one event
    pub fn validate(&self) -> Result<()> {
        if let StoreBackend::Embedded { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(Error::config("Embedded store path cannot be empty"));
            }
        }

        if self.operation_timeout < Duration::from_secs(1)
            || self.operation_timeout > MAX_OPERATION_TIMEOUT
        {
            return Err(Error::config(format!(
                "Operation timeout must be between 1 and {} seconds, got {:?}",
                MAX_OPERATION_TIMEOUT.as_secs(),
                self.operation_timeout
            )));
        }

        if !(1..=MAX_SYNC_PAGE_SIZE).contains(&self.sync_page_size) {
            return Err(Error::config(format!(
                "Sync page size must be between 1 and {}, got {}",
                MAX_SYNC_PAGE_SIZE, self.sync_page_size
            )));
        }

        if self.store_version == Some(0) {
            return Err(Error::config("Store version must be at least 1"));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::config("Event buffer size must be greater than 0"));
        }

        Ok(())
    }
}

fn catalog_client_missing_error() -> Error {
    Error::capability_missing(
        "CatalogClient",
        "A CatalogClient implementation is required to read the remote catalog. \
         Inject one with .catalog_client() before building.",
    )
}

fn store_backend_missing_error() -> Error {
    Error::config(
        "A store backend is required. Use .embedded(path), .in_memory() or .disabled().",
    )
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    store: Option<StoreBackend>,
    operation_timeout: Option<Duration>,
    memory_debounce: Option<Duration>,
    store_version: Option<u32>,
    sync_page_size: Option<u32>,
    event_buffer_size: Option<usize>,
    catalog_client: Option<Arc<dyn CatalogClient>>,
    device_control: Option<Arc<dyn DeviceControl>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn store_backend(mut self, backend: StoreBackend) -> Self {
        self.store = Some(backend);
        self
    }

    /// Persist to a SQLite database at `path`.
    pub fn embedded<P: Into<PathBuf>>(self, path: P) -> Self {
        self.store_backend(StoreBackend::Embedded { path: path.into() })
    }

    pub fn in_memory(self) -> Self {
        self.store_backend(StoreBackend::InMemory)
    }

    pub fn disabled(self) -> Self {
        self.store_backend(StoreBackend::Disabled)
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn memory_debounce(mut self, debounce: Duration) -> Self {
        self.memory_debounce = Some(debounce);
        self
    }

    pub fn store_version(mut self, version: u32) -> Self {
        self.store_version = Some(version);
        self
    }

    pub fn sync_page_size(mut self, size: u32) -> Self {
        self.sync_page_size = Some(size);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn catalog_client(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.catalog_client = Some(client);
        self
    }

    pub fn device_control(mut self, control: Arc<dyn DeviceControl>) -> Self {
        self.device_control = Some(control);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # Errors
    ///
    /// - `Config` when the store backend is missing or a value is out of range
    /// - `CapabilityMissing` when no catalog client was injected
    pub fn build(self) -> Result<CoreConfig> {
        let store = self.store.ok_or_else(store_backend_missing_error)?;
        let catalog_client = self.catalog_client.ok_or_else(catalog_client_missing_error)?;

        let config = CoreConfig {
            store,
            operation_timeout: self.operation_timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT),
            memory_debounce: self.memory_debounce.unwrap_or(DEFAULT_MEMORY_DEBOUNCE),
            store_version: self.store_version,
            sync_page_size: self.sync_page_size.unwrap_or(DEFAULT_SYNC_PAGE_SIZE),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            catalog_client,
            device_control: self.device_control,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::catalog::{Paging, PlaylistItem, RemotePlaylist, SavedTrack};
    use bridge_traits::error::Result as BridgeResult;

    struct EmptyCatalog;

    #[async_trait]
    impl CatalogClient for EmptyCatalog {
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
            Ok(Paging::new(Vec::new(), offset, limit))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder().catalog_client(Arc::new(EmptyCatalog))
    }

    #[test]
    fn test_defaults() {
        let config = builder().in_memory().build().unwrap();

        assert_eq!(config.store, StoreBackend::InMemory);
        assert_eq!(config.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
        assert_eq!(config.sync_page_size, 50);
        assert_eq!(config.store_version, None);
        assert!(config.device_control.is_none());
    }

    #[test]
    fn test_builder_requires_catalog_client() {
        let result = CoreConfig::builder().in_memory().build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "CatalogClient")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_requires_store_backend() {
        let result = builder().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_embedded_path_must_not_be_empty() {
        assert!(builder().embedded("").build().is_err());
        let config = builder().embedded("/tmp/catalog.db").build().unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Embedded {
                path: PathBuf::from("/tmp/catalog.db")
            }
        );
    }

    #[test]
    fn test_operation_timeout_bounds() {
        assert!(builder()
            .in_memory()
            .operation_timeout(Duration::from_millis(500))
            .build()
            .is_err());
        assert!(builder()
            .in_memory()
            .operation_timeout(Duration::from_secs(601))
            .build()
            .is_err());
        assert!(builder()
            .in_memory()
            .operation_timeout(Duration::from_secs(600))
            .build()
            .is_ok());
    }

    #[test]
    fn test_sync_page_size_bounds() {
        assert!(builder().in_memory().sync_page_size(0).build().is_err());
        assert!(builder().in_memory().sync_page_size(51).build().is_err());
        assert_eq!(
            builder()
                .in_memory()
                .sync_page_size(20)
                .build()
                .unwrap()
                .sync_page_size,
            20
        );
    }

    #[test]
    fn test_store_version_and_buffer() {
        assert!(builder().in_memory().store_version(0).build().is_err());
        assert!(builder().in_memory().event_buffer_size(0).build().is_err());
        assert_eq!(
            builder().disabled().store_version(3).build().unwrap().store_version,
            Some(3)
        );
    }

    #[test]
    fn test_debug_hides_capabilities() {
        let config = builder().in_memory().build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("CatalogClient { ... }"));
        assert!(rendered.contains("InMemory"));
    }
}
