//! Pass-through store used when local persistence is disabled.
//!
//! Writes succeed and are discarded, reads see an empty catalog. Lets the
//! rest of the core run unchanged on hosts that render straight from the
//! remote service.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::store::{ObjectStore, Predicate, Record, StoreKind, TableSchema, Visitor};
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteObjectStore;

impl RemoteObjectStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn initialize_structure(&self, _schemas: &[TableSchema], _version: u32) -> Result<()> {
        Ok(())
    }

    async fn create_table(&self, _schema: &TableSchema) -> Result<()> {
        Ok(())
    }

    async fn has_table(&self, _schema: &TableSchema) -> Result<bool> {
        Ok(true)
    }

    async fn create(&self, schema: &TableSchema, record: Record) -> Result<String> {
        trace!(table = %schema.name, "Discarding create");
        Ok(schema.key_of(&record).unwrap_or_default())
    }

    async fn update(&self, schema: &TableSchema, id: &str, mut patch: Record) -> Result<Record> {
        trace!(table = %schema.name, id, "Discarding update");
        patch.insert(schema.key_path.clone(), Value::String(id.to_string()));
        Ok(patch)
    }

    async fn upsert(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        self.update(schema, id, patch).await
    }

    async fn delete(&self, _schema: &TableSchema, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn get_by_id(&self, _schema: &TableSchema, _id: &str) -> Result<Option<Record>> {
        Ok(None)
    }

    async fn each_where(
        &self,
        _schema: &TableSchema,
        _predicate: &Predicate,
        _visitor: &mut Visitor<'_>,
    ) -> Result<usize> {
        Ok(0)
    }

    async fn count(&self, _schema: &TableSchema) -> Result<u64> {
        Ok(0)
    }

    async fn complete(&self) -> Result<()> {
        Ok(())
    }
}
