//! Two-key join tables.
//!
//! ## Overview
//!
//! A [`Relation`] records a many-to-many association between two entity ids.
//! Its physical layout is derived from the two key *names* alone:
//!
//! - table name: the key names sorted and joined with `__`
//!   (`album_id` + `image_url` -> `album_id__image_url`);
//! - row id: the key *values* in sorted-key order, joined with
//!   [`ID_SEPARATOR`].
//!
//! Declaring `("a", "b")` or `("b", "a")` therefore resolves to the same table
//! and the same row for the same pair, and re-creating a pair is a merge into
//! the existing row rather than a duplicate.
//!
//! ## Usage
//!
//! ```ignore
//! let memberships: Relation<PlaylistTrack> =
//!     Relation::new(store, "playlist_id", "track_id").with_order(SortOrder::ascending("position"));
//! memberships.refresh(&PlaylistTrack::new("p1", "t1", 0)).await?;
//! let rows = memberships.where_key("playlist_id", "p1").await?;
//! ```

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

use bridge_traits::store::{predicate, ObjectStore, Record, SortOrder, TableSchema};
use core_async::sequence::LazySequence;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LibraryError, Result};
use crate::schema::{from_record, to_record};

/// Separates the two key values inside a row id.
pub const ID_SEPARATOR: char = '\u{1f}';

/// Key path of every relation table.
const ROW_KEY: &str = "id";

/// Physical shape of a relation, independent of declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationShape {
    first: String,
    second: String,
    order: Option<SortOrder>,
}

impl RelationShape {
    pub fn new(left_key: impl Into<String>, right_key: impl Into<String>) -> Self {
        let (left, right) = (left_key.into(), right_key.into());
        let (first, second) = if left <= right {
            (left, right)
        } else {
            (right, left)
        };
        Self {
            first,
            second,
            order: None,
        }
    }

    pub fn ordered_by(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn table_name(&self) -> String {
        format!("{}__{}", self.first, self.second)
    }

    /// Row id for a pair given as `(key, value)` in any order.
    pub fn row_id(&self, a: (&str, &str), b: (&str, &str)) -> String {
        let (first, second) = if a.0 == self.first { (a.1, b.1) } else { (b.1, a.1) };
        format!("{}{}{}", first, ID_SEPARATOR, second)
    }

    /// Row id of a stored or about-to-be-stored record.
    pub fn record_id(&self, record: &Record) -> Result<String> {
        let value = |key: &str| -> Result<String> {
            match record.get(key) {
                Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
                _ => Err(LibraryError::InvalidInput {
                    field: key.to_string(),
                    message: format!("relation {} needs a non-empty string", self.table_name()),
                }),
            }
        };
        Ok(self.row_id(
            (&self.first, &value(&self.first)?),
            (&self.second, &value(&self.second)?),
        ))
    }

    pub fn schema(&self) -> TableSchema {
        let schema = TableSchema::new(self.table_name(), ROW_KEY)
            .index(self.first.clone())
            .index(self.second.clone());
        match &self.order {
            Some(order) => schema.order_by(order.clone()),
            None => schema,
        }
    }

    fn has_key(&self, key: &str) -> bool {
        key == self.first || key == self.second
    }
}

/// Typed access to one relation table.
pub struct Relation<R> {
    store: Arc<dyn ObjectStore>,
    left_key: String,
    right_key: String,
    shape: RelationShape,
    schema: TableSchema,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for Relation<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            left_key: self.left_key.clone(),
            right_key: self.right_key.clone(),
            shape: self.shape.clone(),
            schema: self.schema.clone(),
            _row: PhantomData,
        }
    }
}

impl<R> Relation<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<dyn ObjectStore>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        let (left_key, right_key) = (left_key.into(), right_key.into());
        let shape = RelationShape::new(left_key.clone(), right_key.clone());
        let schema = shape.schema();
        Self {
            store,
            left_key,
            right_key,
            shape,
            schema,
            _row: PhantomData,
        }
    }

    /// Walk rows in `order` instead of by row id.
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.shape = self.shape.ordered_by(order);
        self.schema = self.shape.schema();
        self
    }

    pub fn shape(&self) -> &RelationShape {
        &self.shape
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    /// Row id of the pair `(left, right)` in declaration order.
    pub fn id_of(&self, left: &str, right: &str) -> String {
        self.shape
            .row_id((&self.left_key, left), (&self.right_key, right))
    }

    fn encode(&self, row: &R) -> Result<(String, Record)> {
        let mut record = to_record(row)?;
        let id = self.shape.record_id(&record)?;
        record.insert(ROW_KEY.to_string(), Value::String(id.clone()));
        Ok((id, record))
    }

    fn ensure_key(&self, key: &str) -> Result<()> {
        if self.shape.has_key(key) {
            Ok(())
        } else {
            Err(LibraryError::InvalidInput {
                field: key.to_string(),
                message: format!("not a key of relation {}", self.schema.name),
            })
        }
    }

    /// Insert a new pair. Fails with a conflict if it already exists.
    pub async fn create(&self, row: &R) -> Result<String> {
        let (_, record) = self.encode(row)?;
        Ok(self.store.create(&self.schema, record).await?)
    }

    /// Overwrite the extra fields of an existing pair.
    pub async fn update(&self, row: &R) -> Result<R> {
        let (id, record) = self.encode(row)?;
        let merged = self
            .store
            .update(&self.schema, &id, record)
            .await
            .map_err(|error| LibraryError::from_store(error, &self.schema.name, &id))?;
        from_record(merged)
    }

    /// Create or merge the pair.
    pub async fn refresh(&self, row: &R) -> Result<R> {
        let (id, record) = self.encode(row)?;
        from_record(self.store.upsert(&self.schema, &id, record).await?)
    }

    pub async fn delete(&self, left: &str, right: &str) -> Result<bool> {
        Ok(self
            .store
            .delete(&self.schema, &self.id_of(left, right))
            .await?)
    }

    pub async fn get(&self, left: &str, right: &str) -> Result<Option<R>> {
        self.store
            .get_by_id(&self.schema, &self.id_of(left, right))
            .await?
            .map(from_record)
            .transpose()
    }

    /// Rows whose `key` side equals `value`.
    pub async fn where_key(&self, key: &str, value: &str) -> Result<Vec<R>> {
        self.ensure_key(key)?;
        self.store
            .find_where(&self.schema, &predicate(key, value))
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// Lazy variant of [`where_key`](Self::where_key).
    pub fn stream_where(&self, key: &str, value: &str) -> Result<LazySequence<R, LibraryError>> {
        self.ensure_key(key)?;
        let store = Arc::clone(&self.store);
        let schema = self.schema.clone();
        let filter = predicate(key, value);
        Ok(LazySequence::new(move |sink| {
            let store = Arc::clone(&store);
            let schema = schema.clone();
            let filter = filter.clone();
            async move {
                let mut failure = None;
                store
                    .each_where(&schema, &filter, &mut |record, _| match from_record(record) {
                        Ok(row) => sink.push(row),
                        Err(error) => {
                            failure = Some(error);
                            ControlFlow::Break(())
                        }
                    })
                    .await?;
                failure.map_or(Ok(()), Err)
            }
        }))
    }

    /// Whether any row has `value` on its `key` side.
    pub async fn exists_for(&self, key: &str, value: &str) -> Result<bool> {
        self.ensure_key(key)?;
        let visited = self
            .store
            .each_where(&self.schema, &predicate(key, value), &mut |_, _| {
                ControlFlow::Break(())
            })
            .await?;
        Ok(visited > 0)
    }

    pub async fn list(&self) -> Result<Vec<R>> {
        self.store
            .find_where(&self.schema, &Default::default())
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.store.count(&self.schema).await?)
    }
}
