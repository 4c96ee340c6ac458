//! Object store implementations
//!
//! Three interchangeable [`ObjectStore`](bridge_traits::store::ObjectStore)
//! backends:
//!
//! - [`SqliteObjectStore`]: embedded SQLite database (persistent)
//! - [`MemoryObjectStore`]: process-local maps with identical semantics
//! - [`RemoteObjectStore`]: no-op sink for hosts without persistence

pub mod memory;
pub mod remote;
pub mod sqlite_native;

pub use memory::MemoryObjectStore;
pub use remote::RemoteObjectStore;
pub use sqlite_native::SqliteObjectStore;
