//! In-Memory Object Store
//!
//! Process-local tables behind an async mutex. Externally it behaves like
//! [`SqliteObjectStore`](super::SqliteObjectStore): same ordering, same
//! conflict and not-found errors, same unique-index rules (nulls never
//! collide). Used by tests and by hosts with no embedded database.
//!
//! `complete()` is debounced: a burst of calls within the debounce window
//! collapses into a single release, observable through
//! [`release_count`](MemoryObjectStore::release_count) and
//! [`when_released`](MemoryObjectStore::when_released).

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::store::{
    compare_values, matches_predicate, merge_record, ObjectStore, Predicate, Record, StoreKind,
    TableSchema, Visitor,
};
use core_async::completion::{completion, Completer, Completion};
use core_async::sync::Mutex;
use core_async::time::{sleep, Duration};
use serde_json::Value;
use tracing::debug;

/// Default window in which repeated `complete()` calls are merged.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(25);

#[derive(Default)]
struct Table {
    schema: Option<TableSchema>,
    rows: BTreeMap<String, Record>,
}

impl Table {
    fn next_auto_id(&self) -> String {
        let max = self
            .rows
            .keys()
            .filter_map(|id| id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }

    /// Fail if another row already holds a unique value of `record`.
    fn check_unique(&self, schema: &TableSchema, id: &str, record: &Record) -> Result<()> {
        for index in schema.unique_indexes() {
            let value = match record.get(&index.field) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            let taken = self.rows.iter().any(|(other_id, other)| {
                other_id != id && compare_values(other.get(&index.field), Some(value)).is_eq()
            });
            if taken {
                return Err(BridgeError::Conflict {
                    table: schema.name.clone(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, schema: &TableSchema, mut record: Record) -> Result<(String, Record)> {
        let id = match schema.key_of(&record) {
            Some(id) => id,
            None if schema.auto_increment => {
                let id = self.next_auto_id();
                record.insert(schema.key_path.clone(), Value::String(id.clone()));
                id
            }
            None => {
                return Err(BridgeError::OperationFailed(format!(
                    "{}: record has no '{}' key",
                    schema.name, schema.key_path
                )))
            }
        };

        if self.rows.contains_key(&id) {
            return Err(BridgeError::Conflict {
                table: schema.name.clone(),
                id,
            });
        }
        self.check_unique(schema, &id, &record)?;
        self.rows.insert(id.clone(), record.clone());
        Ok((id, record))
    }

    fn update(&mut self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        let mut record = self
            .rows
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound {
                table: schema.name.clone(),
                id: id.to_string(),
            })?;

        let key = record
            .get(&schema.key_path)
            .cloned()
            .unwrap_or_else(|| Value::String(id.to_string()));
        merge_record(&mut record, patch);
        record.insert(schema.key_path.clone(), key);

        self.check_unique(schema, id, &record)?;
        self.rows.insert(id.to_string(), record.clone());
        Ok(record)
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    version: Option<u32>,
}

impl State {
    fn table(&self, schema: &TableSchema) -> Result<&Table> {
        self.tables.get(&schema.name).ok_or_else(|| missing_table(schema))
    }

    fn table_mut(&mut self, schema: &TableSchema) -> Result<&mut Table> {
        self.tables
            .get_mut(&schema.name)
            .ok_or_else(|| missing_table(schema))
    }

    fn ensure_table(&mut self, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        let table = self.tables.entry(schema.name.clone()).or_default();
        if table.schema.is_none() {
            table.schema = Some(schema.clone());
        }
        Ok(())
    }
}

fn missing_table(schema: &TableSchema) -> BridgeError {
    BridgeError::DatabaseError(format!("no such table: {}", schema.name))
}

#[derive(Default)]
struct Releases {
    generation: AtomicU64,
    count: AtomicU64,
    waiters: std::sync::Mutex<Vec<Completer<u64>>>,
}

impl Releases {
    fn settle(&self) {
        let released = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let waiters = std::mem::take(
            &mut *self
                .waiters
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for waiter in waiters {
            waiter.complete(released);
        }
        debug!(released, "In-memory store session released");
    }
}

/// Map-backed [`ObjectStore`].
pub struct MemoryObjectStore {
    state: Mutex<State>,
    debounce: Duration,
    releases: Arc<Releases>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            debounce,
            releases: Arc::new(Releases::default()),
        }
    }

    /// Number of debounced releases so far.
    pub fn release_count(&self) -> u64 {
        self.releases.count.load(Ordering::SeqCst)
    }

    /// Resolves with the release count once the next release happens.
    pub fn when_released(&self) -> Completion<u64> {
        let (completer, completion) = completion();
        self.releases
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(completer);
        completion
    }

    /// Structure version recorded by the last `initialize_structure`.
    pub async fn version(&self) -> Option<u32> {
        self.state.lock().await.version
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn initialize_structure(&self, schemas: &[TableSchema], version: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.version == Some(version) {
            debug!(version, "Store structure already initialized");
            return Ok(());
        }
        for schema in schemas {
            state.ensure_table(schema)?;
        }
        state.version = Some(version);
        debug!(version, table_count = schemas.len(), "Store structure initialized");
        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.state.lock().await.ensure_table(schema)
    }

    async fn has_table(&self, schema: &TableSchema) -> Result<bool> {
        Ok(self.state.lock().await.tables.contains_key(&schema.name))
    }

    async fn create(&self, schema: &TableSchema, record: Record) -> Result<String> {
        let mut state = self.state.lock().await;
        let (id, _) = state.table_mut(schema)?.insert(schema, record)?;
        Ok(id)
    }

    async fn update(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        let mut state = self.state.lock().await;
        state.table_mut(schema)?.update(schema, id, patch)
    }

    async fn upsert(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        let mut state = self.state.lock().await;
        let table = state.table_mut(schema)?;
        if table.rows.contains_key(id) {
            table.update(schema, id, patch)
        } else {
            let mut record = patch;
            record.insert(schema.key_path.clone(), Value::String(id.to_string()));
            Ok(table.insert(schema, record)?.1)
        }
    }

    async fn delete(&self, schema: &TableSchema, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.table_mut(schema)?.rows.remove(id).is_some())
    }

    async fn get_by_id(&self, schema: &TableSchema, id: &str) -> Result<Option<Record>> {
        let state = self.state.lock().await;
        Ok(state.table(schema)?.rows.get(id).cloned())
    }

    async fn each_where(
        &self,
        schema: &TableSchema,
        predicate: &Predicate,
        visitor: &mut Visitor<'_>,
    ) -> Result<usize> {
        // Snapshot under the lock; visit without holding it.
        let mut rows: Vec<(String, Record)> = {
            let state = self.state.lock().await;
            state
                .table(schema)?
                .rows
                .iter()
                .filter(|(_, record)| matches_predicate(record, predicate))
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect()
        };
        rows.sort_by(|left, right| {
            schema.compare_rows((left.0.as_str(), &left.1), (right.0.as_str(), &right.1))
        });

        let mut visited = 0;
        for (_, record) in rows {
            let flow = visitor(record, visited);
            visited += 1;
            if let ControlFlow::Break(()) = flow {
                break;
            }
        }
        Ok(visited)
    }

    async fn count(&self, schema: &TableSchema) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.table(schema)?.rows.len() as u64)
    }

    async fn complete(&self) -> Result<()> {
        let generation = self.releases.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let releases = Arc::clone(&self.releases);
        let debounce = self.debounce;
        core_async::task::spawn(async move {
            sleep(debounce).await;
            if releases.generation.load(Ordering::SeqCst) == generation {
                releases.settle();
            }
        });
        Ok(())
    }
}
