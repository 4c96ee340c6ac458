//! Object Store Abstraction
//!
//! A uniform contract over an embedded, index-based object store. Rows are
//! JSON documents keyed by a string id; each table is described by a typed
//! [`TableSchema`] instead of an ad-hoc configuration map.
//!
//! ## Design Philosophy
//!
//! Repositories never see a connection, a SQL statement or a cursor. They
//! hand a schema and a record to an [`ObjectStore`] and get back a `Result`.
//! Every backend must agree on:
//!
//! - **Ordering**: cursor walks follow the schema's default order, absent
//!   values first when ascending, ties broken by id ascending. Values compare
//!   like SQLite compares `json_extract` results (see [`compare_values`]).
//! - **Conflicts**: `create` on an existing id or a duplicate unique index
//!   value fails with [`BridgeError::Conflict`].
//! - **Missing rows**: `update` on an absent id fails with
//!   [`BridgeError::NotFound`]; `delete` reports `false`.
//! - **Early termination**: a visitor returning [`ControlFlow::Break`] stops
//!   the walk; this is not an error.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::store::{ObjectStore, TableSchema};
//!
//! let tracks = TableSchema::new("tracks", "id").index("album_id").order_by_asc("name");
//! store.initialize_structure(&[tracks.clone()], 1).await?;
//! store.upsert(&tracks, "t1", record).await?;
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// A stored document.
pub type Record = serde_json::Map<String, Value>;

/// Equality filter: every `field` must equal its value.
pub type Predicate = BTreeMap<String, Value>;

/// Cursor visitor. Receives each row with its position in the walk.
pub type Visitor<'a> = dyn FnMut(Record, usize) -> ControlFlow<()> + Send + 'a;

// =============================================================================
// Schema descriptors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// A named secondary index over one document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub field: String,
    pub unique: bool,
}

/// Declarative description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSchema {
    /// Physical table name.
    pub name: String,
    /// Document field holding the primary key.
    pub key_path: String,
    /// Assign sequential integer ids to rows created without a key.
    pub auto_increment: bool,
    pub indexes: Vec<IndexSchema>,
    /// Order of cursor walks. Without one, rows are walked by id.
    pub default_order: Option<SortOrder>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            auto_increment: false,
            indexes: Vec::new(),
            default_order: None,
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add a non-unique index named after its field.
    pub fn index(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.named_index(field.clone(), field, false)
    }

    pub fn unique_index(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.named_index(field.clone(), field, true)
    }

    pub fn named_index(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        unique: bool,
    ) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            field: field.into(),
            unique,
        });
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.default_order = Some(order);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(SortOrder::ascending(field))
    }

    /// Reject names the backends cannot embed safely in DDL.
    pub fn validate(&self) -> Result<()> {
        ensure_identifier("table name", &self.name)?;
        ensure_identifier("key path", &self.key_path)?;

        let mut seen = std::collections::BTreeSet::new();
        for index in &self.indexes {
            ensure_identifier("index name", &index.name)?;
            ensure_identifier("index field", &index.field)?;
            if index.field == self.key_path {
                return Err(BridgeError::InvalidSchema(format!(
                    "{}: the key path '{}' is already the primary key",
                    self.name, index.field
                )));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(BridgeError::InvalidSchema(format!(
                    "{}: duplicate index '{}'",
                    self.name, index.name
                )));
            }
        }

        if let Some(order) = &self.default_order {
            ensure_identifier("order field", &order.field)?;
        }

        Ok(())
    }

    pub fn index_for(&self, field: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.field == field)
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.iter().filter(|index| index.unique)
    }

    /// The primary key of `record`, if present and scalar.
    pub fn key_of(&self, record: &Record) -> Option<String> {
        match record.get(&self.key_path)? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Order two rows (given as `(id, record)`) the way a cursor walk does.
    pub fn compare_rows(&self, left: (&str, &Record), right: (&str, &Record)) -> Ordering {
        let primary = match &self.default_order {
            Some(order) => {
                let ordering =
                    compare_values(left.1.get(&order.field), right.1.get(&order.field));
                match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            }
            None => Ordering::Equal,
        };
        primary.then_with(|| left.0.cmp(right.0))
    }
}

fn ensure_identifier(what: &str, value: &str) -> Result<()> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(BridgeError::InvalidSchema(format!(
            "{what} '{value}' must be a non-empty identifier"
        )))
    }
}

/// ASCII letters, digits and `_`, not starting with a digit.
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// =============================================================================
// Value semantics shared by every backend
// =============================================================================

/// Collation class of a stored value, mirroring SQLite's
/// NULL < numeric < text ordering of `json_extract` results.
fn class(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) | Some(Value::Number(_)) => 1,
        Some(_) => 2,
    }
}

fn numeric(value: &Value) -> f64 {
    match value {
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Text form used for comparison; arrays and objects compare as JSON text.
pub fn text_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Compare two (possibly absent) field values.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let (lc, rc) = (class(left), class(right));
    if lc != rc {
        return lc.cmp(&rc);
    }
    match (left, right) {
        (Some(l), Some(r)) if lc == 1 => numeric(l).total_cmp(&numeric(r)),
        (Some(l), Some(r)) if lc == 2 => text_form(l).cmp(&text_form(r)),
        _ => Ordering::Equal,
    }
}

/// Whether `record` satisfies every clause of `predicate`.
///
/// A `null` clause matches both an explicit null and an absent field.
pub fn matches_predicate(record: &Record, predicate: &Predicate) -> bool {
    predicate
        .iter()
        .all(|(field, expected)| compare_values(record.get(field), Some(expected)).is_eq())
}

/// Shallow merge: top-level fields of `patch` replace those of `base`.
pub fn merge_record(base: &mut Record, patch: Record) {
    for (field, value) in patch {
        base.insert(field, value);
    }
}

// =============================================================================
// Store configuration
// =============================================================================

/// Connection settings for an embedded store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path or connection string
    pub database_url: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Maximum time to wait for a connection
    pub acquire_timeout: Duration,

    /// Upper bound for any single store operation
    pub operation_timeout: Duration,
}

impl StoreConfig {
    pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

    /// Configuration for a database file at `path`, created if missing.
    pub fn new(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            operation_timeout: Self::DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            operation_timeout: Self::DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// Store trait
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    /// Persistent embedded database.
    Embedded,
    /// Process-local tables, used in tests.
    Memory,
    /// Pass-through sink for hosts without local persistence.
    Remote,
}

/// Object store contract.
///
/// ## Thread Safety
///
/// Implementations are shared as `Arc<dyn ObjectStore>` across tasks.
///
/// ## Sessions
///
/// [`begin`](ObjectStore::begin) opens a unit of work and
/// [`complete`](ObjectStore::complete) ends it. A backend releases the
/// underlying connection once no unit is open, and reopens lazily on the next
/// call. Calling `complete` more often than `begin` is harmless.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Create every missing table and index, once per `version`.
    async fn initialize_structure(&self, schemas: &[TableSchema], version: u32) -> Result<()>;

    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    async fn has_table(&self, schema: &TableSchema) -> Result<bool>;

    /// Insert a new row and return its id.
    async fn create(&self, schema: &TableSchema, record: Record) -> Result<String>;

    /// Merge `patch` into an existing row and return the merged row.
    async fn update(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record>;

    /// Get-or-create followed by merge.
    ///
    /// The default implementation issues the read and the write separately;
    /// backends that can do better run both in one transaction.
    async fn upsert(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        if self.get_by_id(schema, id).await?.is_some() {
            return self.update(schema, id, patch).await;
        }
        let mut record = patch;
        record.insert(schema.key_path.clone(), Value::String(id.to_string()));
        self.create(schema, record.clone()).await?;
        Ok(record)
    }

    /// Remove a row. Returns whether it existed.
    async fn delete(&self, schema: &TableSchema, id: &str) -> Result<bool>;

    async fn get_by_id(&self, schema: &TableSchema, id: &str) -> Result<Option<Record>>;

    /// Ordered walk over the whole table.
    async fn each(&self, schema: &TableSchema, visitor: &mut Visitor<'_>) -> Result<usize> {
        self.each_where(schema, &Predicate::new(), visitor).await
    }

    /// Ordered walk over the rows matching `predicate`.
    async fn each_where(
        &self,
        schema: &TableSchema,
        predicate: &Predicate,
        visitor: &mut Visitor<'_>,
    ) -> Result<usize>;

    async fn find_where(&self, schema: &TableSchema, predicate: &Predicate) -> Result<Vec<Record>> {
        let mut rows = Vec::new();
        self.each_where(schema, predicate, &mut |record, _| {
            rows.push(record);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(rows)
    }

    async fn count(&self, schema: &TableSchema) -> Result<u64>;

    /// Register a unit of work that will end with
    /// [`complete`](Self::complete).
    fn begin(&self) {}

    /// End a unit of work, releasing the connection when it was the last.
    async fn complete(&self) -> Result<()>;
}

/// Build a single-clause predicate.
pub fn predicate(field: impl Into<String>, value: impl Into<Value>) -> Predicate {
    let mut predicate = Predicate::new();
    predicate.insert(field.into(), value.into());
    predicate
}
