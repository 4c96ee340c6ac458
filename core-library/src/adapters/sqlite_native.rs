//! Native SQLite Object Store
//!
//! Implements [`ObjectStore`] on top of `sqlx` with the native SQLite driver.
//!
//! ## Layout
//!
//! - One physical table per [`TableSchema`]: `id TEXT PRIMARY KEY, body TEXT`
//!   where `body` is the JSON document.
//! - Each named index is an expression index over
//!   `json_extract(body, '$.field')`, `UNIQUE` when declared so.
//! - `__store_meta` records the structure version so
//!   [`initialize_structure`](ObjectStore::initialize_structure) runs once
//!   per version.
//!
//! ## Features
//!
//! - Lazily opened connection pool, closed by the `complete()` that ends the
//!   last open unit of work and reopened on the next operation (in-memory
//!   databases stay open, closing them would drop the data)
//! - WAL mode for file databases
//! - Read-modify-write operations (`update`, `upsert`) run in a single
//!   transaction
//! - Every operation is time-boxed by `StoreConfig::operation_timeout`; the
//!   work runs on its own task so a timeout does not cancel an open
//!   transaction

use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::store::{
    is_identifier, merge_record, ObjectStore, Predicate, Record, SortDirection, StoreConfig,
    StoreKind, TableSchema, Visitor,
};
use core_async::sync::Mutex;
use core_async::time::timeout;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, trace, warn};

/// Rows fetched per round trip during a cursor walk.
const CURSOR_BATCH: i64 = 200;

const META_TABLE: &str = "__store_meta";

/// SQLite-backed [`ObjectStore`].
pub struct SqliteObjectStore {
    config: StoreConfig,
    options: SqliteConnectOptions,
    pool: Mutex<Option<SqlitePool>>,
    /// Units of work begun and not yet completed.
    units: AtomicUsize,
    releases: AtomicU64,
}

impl SqliteObjectStore {
    /// Create a store for `config`. No connection is opened until the first
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL cannot be parsed.
    pub fn new(config: StoreConfig) -> Result<Self> {
        info!(
            database_url = %config.database_url,
            max_connections = config.max_connections,
            operation_timeout_secs = config.operation_timeout.as_secs(),
            "Creating SQLite object store"
        );

        let mut options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        if !config.is_in_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        Ok(Self {
            config,
            options,
            pool: Mutex::new(None),
            units: AtomicUsize::new(0),
            releases: AtomicU64::new(0),
        })
    }

    /// Create a store and open its connection pool right away.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config)?;
        store.pool().await?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether a connection pool is currently open.
    pub async fn is_connected(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Units of work currently holding the pool open.
    pub fn open_units(&self) -> usize {
        self.units.load(Ordering::SeqCst)
    }

    /// How many times `complete()` actually closed a pool.
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    async fn pool(&self) -> Result<SqlitePool> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections.max(1))
            .acquire_timeout(self.config.acquire_timeout);

        if self.config.is_in_memory() {
            // Every new connection to `:memory:` is a fresh, empty database.
            pool_options = pool_options
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(self.options.clone())
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to open SQLite connection pool");
                BridgeError::DatabaseError(format!("Connection pool creation failed: {}", e))
            })?;

        debug!(connections = pool.size(), "SQLite connection pool opened");
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Run `work` on its own task, bounded by the operation timeout.
    async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let limit = self.config.operation_timeout;
        let handle = core_async::task::spawn(work);
        match timeout(limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(BridgeError::OperationFailed(format!(
                "{} task failed: {}",
                operation, join_error
            ))),
            Err(_) => {
                warn!(
                    operation,
                    timeout_secs = limit.as_secs(),
                    "SQLite operation timed out"
                );
                Err(BridgeError::Timeout {
                    operation: operation.to_string(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }
}

// =============================================================================
// SQL helpers
// =============================================================================

fn quoted(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Field expressions must match the index expressions byte for byte, or
/// SQLite will not use the index.
fn field_expr(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field)
}

fn order_clause(schema: &TableSchema) -> String {
    match &schema.default_order {
        Some(order) => {
            let direction = match order.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            format!("{} {}, id ASC", field_expr(&order.field), direction)
        }
        None => "id ASC".to_string(),
    }
}

fn where_clause(predicate: &Predicate) -> Result<(String, Vec<Value>)> {
    if predicate.is_empty() {
        return Ok((String::new(), Vec::new()));
    }

    let mut clauses = Vec::with_capacity(predicate.len());
    let mut params = Vec::new();
    for (field, value) in predicate {
        if !is_identifier(field) {
            return Err(BridgeError::InvalidSchema(format!(
                "predicate field '{}' must be an identifier",
                field
            )));
        }
        if value.is_null() {
            clauses.push(format!("{} IS NULL", field_expr(field)));
        } else {
            clauses.push(format!("{} = ?", field_expr(field)));
            params.push(value.clone());
        }
    }

    Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
}

/// Bind JSON predicate values the way `json_extract` returns them: booleans
/// as integers, arrays and objects as JSON text.
macro_rules! bind_json {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Value::Bool(flag) => query.bind(i64::from(*flag)),
                Value::Number(number) => match number.as_i64() {
                    Some(integer) => query.bind(integer),
                    None => query.bind(number.as_f64().unwrap_or_default()),
                },
                Value::String(text) => query.bind(text.clone()),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

fn encode(record: &Record) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

fn decode(body: &str) -> Result<Record> {
    Ok(serde_json::from_str(body)?)
}

fn db_error(table: &str, id: &str, error: sqlx::Error) -> BridgeError {
    if let sqlx::Error::Database(database_error) = &error {
        if database_error.is_unique_violation() {
            return BridgeError::Conflict {
                table: table.to_string(),
                id: id.to_string(),
            };
        }
    }
    BridgeError::DatabaseError(format!("{}: {}", table, error))
}

async fn create_structure(conn: &mut SqliteConnection, schema: &TableSchema) -> Result<()> {
    schema.validate()?;

    let table = quoted(&schema.name);
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY NOT NULL, body TEXT NOT NULL)",
        table
    ))
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error(&schema.name, "", e))?;

    for index in &schema.indexes {
        let unique = if index.unique { "UNIQUE " } else { "" };
        sqlx::query(&format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique,
            quoted(&format!("{}__{}", schema.name, index.name)),
            table,
            field_expr(&index.field)
        ))
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error(&schema.name, "", e))?;
    }

    debug!(
        table = %schema.name,
        index_count = schema.indexes.len(),
        "Ensured table structure"
    );
    Ok(())
}

async fn select_body(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    id: &str,
) -> Result<Option<Record>> {
    let row: Option<(String,)> = sqlx::query_as(&format!(
        "SELECT body FROM {} WHERE id = ?",
        quoted(&schema.name)
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error(&schema.name, id, e))?;

    row.map(|(body,)| decode(&body)).transpose()
}

async fn insert_row(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    mut record: Record,
) -> Result<(String, Record)> {
    let table = quoted(&schema.name);
    let id = match schema.key_of(&record) {
        Some(id) => id,
        None if schema.auto_increment => {
            let next: i64 = sqlx::query_scalar(&format!(
                "SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) + 1 FROM {}",
                table
            ))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error(&schema.name, "", e))?;
            let id = next.to_string();
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

    if select_body(conn, schema, &id).await?.is_some() {
        return Err(BridgeError::Conflict {
            table: schema.name.clone(),
            id,
        });
    }

    sqlx::query(&format!("INSERT INTO {} (id, body) VALUES (?, ?)", table))
        .bind(&id)
        .bind(encode(&record)?)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error(&schema.name, &id, e))?;

    Ok((id, record))
}

async fn update_row(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    id: &str,
    patch: Record,
) -> Result<Record> {
    let mut record = select_body(conn, schema, id)
        .await?
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

    sqlx::query(&format!(
        "UPDATE {} SET body = ? WHERE id = ?",
        quoted(&schema.name)
    ))
    .bind(encode(&record)?)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error(&schema.name, id, e))?;

    Ok(record)
}

// =============================================================================
// ObjectStore implementation
// =============================================================================

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Embedded
    }

    async fn initialize_structure(&self, schemas: &[TableSchema], version: u32) -> Result<()> {
        let pool = self.pool().await?;
        let schemas = schemas.to_vec();

        self.run("initialize_structure", async move {
            let mut tx = pool.begin().await.map_err(|e| db_error(META_TABLE, "", e))?;

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
                META_TABLE
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(META_TABLE, "", e))?;

            let current: Option<String> = sqlx::query_scalar(&format!(
                "SELECT value FROM {} WHERE key = 'version'",
                META_TABLE
            ))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error(META_TABLE, "version", e))?;

            if current.as_deref() == Some(version.to_string().as_str()) {
                debug!(version, "Store structure already initialized");
                return Ok(());
            }

            for schema in &schemas {
                create_structure(&mut tx, schema).await?;
            }

            sqlx::query(&format!(
                "INSERT INTO {} (key, value) VALUES ('version', ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                META_TABLE
            ))
            .bind(version.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(META_TABLE, "version", e))?;

            tx.commit().await.map_err(|e| db_error(META_TABLE, "", e))?;

            info!(
                version,
                previous = current.as_deref().unwrap_or("none"),
                table_count = schemas.len(),
                "Store structure initialized"
            );
            Ok(())
        })
        .await
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let pool = self.pool().await?;
        let schema = schema.clone();
        self.run("create_table", async move {
            let mut conn = pool
                .acquire()
                .await
                .map_err(|e| db_error(&schema.name, "", e))?;
            create_structure(&mut conn, &schema).await
        })
        .await
    }

    async fn has_table(&self, schema: &TableSchema) -> Result<bool> {
        let pool = self.pool().await?;
        let name = schema.name.clone();
        self.run("has_table", async move {
            let found: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(&name)
            .fetch_optional(&pool)
            .await
            .map_err(|e| db_error(&name, "", e))?;
            Ok(found.is_some())
        })
        .await
    }

    async fn create(&self, schema: &TableSchema, record: Record) -> Result<String> {
        let pool = self.pool().await?;
        let schema = schema.clone();
        self.run("create", async move {
            let mut tx = pool.begin().await.map_err(|e| db_error(&schema.name, "", e))?;
            let (id, _) = insert_row(&mut tx, &schema, record).await?;
            tx.commit().await.map_err(|e| db_error(&schema.name, &id, e))?;
            debug!(table = %schema.name, id = %id, "Created row");
            Ok(id)
        })
        .await
    }

    async fn update(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        let pool = self.pool().await?;
        let schema = schema.clone();
        let id = id.to_string();
        self.run("update", async move {
            let mut tx = pool.begin().await.map_err(|e| db_error(&schema.name, &id, e))?;
            let record = update_row(&mut tx, &schema, &id, patch).await?;
            tx.commit().await.map_err(|e| db_error(&schema.name, &id, e))?;
            debug!(table = %schema.name, id = %id, "Updated row");
            Ok(record)
        })
        .await
    }

    async fn upsert(&self, schema: &TableSchema, id: &str, patch: Record) -> Result<Record> {
        let pool = self.pool().await?;
        let schema = schema.clone();
        let id = id.to_string();
        self.run("upsert", async move {
            let mut tx = pool.begin().await.map_err(|e| db_error(&schema.name, &id, e))?;
            let record = if select_body(&mut tx, &schema, &id).await?.is_some() {
                update_row(&mut tx, &schema, &id, patch).await?
            } else {
                let mut record = patch;
                record.insert(schema.key_path.clone(), Value::String(id.clone()));
                insert_row(&mut tx, &schema, record).await?.1
            };
            tx.commit().await.map_err(|e| db_error(&schema.name, &id, e))?;
            debug!(table = %schema.name, id = %id, "Upserted row");
            Ok(record)
        })
        .await
    }

    async fn delete(&self, schema: &TableSchema, id: &str) -> Result<bool> {
        let pool = self.pool().await?;
        let table = schema.name.clone();
        let id = id.to_string();
        self.run("delete", async move {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", quoted(&table)))
                .bind(&id)
                .execute(&pool)
                .await
                .map_err(|e| db_error(&table, &id, e))?;
            let deleted = result.rows_affected() > 0;
            debug!(table = %table, id = %id, deleted, "Deleted row");
            Ok(deleted)
        })
        .await
    }

    async fn get_by_id(&self, schema: &TableSchema, id: &str) -> Result<Option<Record>> {
        let pool = self.pool().await?;
        let schema = schema.clone();
        let id = id.to_string();
        self.run("get_by_id", async move {
            let mut conn = pool.acquire().await.map_err(|e| db_error(&schema.name, &id, e))?;
            select_body(&mut conn, &schema, &id).await
        })
        .await
    }

    async fn each_where(
        &self,
        schema: &TableSchema,
        predicate: &Predicate,
        visitor: &mut Visitor<'_>,
    ) -> Result<usize> {
        let (clause, params) = where_clause(predicate)?;
        let sql = format!(
            "SELECT body FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            quoted(&schema.name),
            clause,
            order_clause(schema)
        );

        let mut offset: i64 = 0;
        let mut index = 0;
        loop {
            let pool = self.pool().await?;
            let sql = sql.clone();
            let params = params.clone();
            let table = schema.name.clone();
            let batch: Vec<String> = self
                .run("each", async move {
                    bind_json!(sqlx::query_scalar::<_, String>(&sql), &params)
                        .bind(CURSOR_BATCH)
                        .bind(offset)
                        .fetch_all(&pool)
                        .await
                        .map_err(|e| db_error(&table, "", e))
                })
                .await?;

            let fetched = batch.len();
            for body in batch {
                let flow = visitor(decode(&body)?, index);
                index += 1;
                if let ControlFlow::Break(()) = flow {
                    return Ok(index);
                }
            }

            if (fetched as i64) < CURSOR_BATCH {
                return Ok(index);
            }
            offset += fetched as i64;
        }
    }

    async fn find_where(&self, schema: &TableSchema, predicate: &Predicate) -> Result<Vec<Record>> {
        let (clause, params) = where_clause(predicate)?;
        let sql = format!(
            "SELECT body FROM {}{} ORDER BY {}",
            quoted(&schema.name),
            clause,
            order_clause(schema)
        );
        let pool = self.pool().await?;
        let table = schema.name.clone();
        self.run("find_where", async move {
            let rows = bind_json!(sqlx::query_as::<_, (String,)>(&sql), &params)
                .fetch_all(&pool)
                .await
                .map_err(|e| db_error(&table, "", e))?;
            rows.iter().map(|(body,)| decode(body)).collect()
        })
        .await
    }

    async fn count(&self, schema: &TableSchema) -> Result<u64> {
        let pool = self.pool().await?;
        let table = schema.name.clone();
        self.run("count", async move {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quoted(&table)))
                .fetch_one(&pool)
                .await
                .map_err(|e| db_error(&table, "", e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn begin(&self) {
        let open = self.units.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(open_units = open, "SQLite unit of work begun");
    }

    async fn complete(&self) -> Result<()> {
        // Decrement under the pool lock: a unit that cloned the pool has
        // already been counted, so it can never see the pool closed.
        let mut slot = self.pool.lock().await;
        let remaining = match self
            .units
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
        {
            Ok(previous) | Err(previous) => previous.saturating_sub(1),
        };
        if remaining > 0 {
            debug!(open_units = remaining, "SQLite store still in use, pool kept open");
            return Ok(());
        }
        if self.config.is_in_memory() {
            debug!("In-memory SQLite store stays open across sessions");
            return Ok(());
        }

        let pool = slot.take();
        drop(slot);
        if let Some(pool) = pool {
            pool.close().await;
            self.releases.fetch_add(1, Ordering::SeqCst);
            debug!("SQLite connection pool released");
        }
        Ok(())
    }
}
