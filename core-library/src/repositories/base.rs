//! Typed CRUD over one entity table.

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

use bridge_traits::store::{ObjectStore, Predicate, TableSchema};
use core_async::sequence::LazySequence;
use serde::Serialize;
use tracing::debug;

use super::pagination::{Page, PageRequest};
use crate::error::{LibraryError, Result};
use crate::schema::{from_record, to_record, Entity};

/// Generic repository shared by every entity table.
///
/// The per-entity repositories wrap one of these and add their own
/// lookups and delete rules.
pub struct EntityRepository<E> {
    store: Arc<dyn ObjectStore>,
    schema: TableSchema,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityRepository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            schema: self.schema.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityRepository<E> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            schema: E::schema(),
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Insert a new row; fails with a conflict when the key exists.
    pub async fn create(&self, entity: &E) -> Result<String> {
        let record = to_record(entity)?;
        Ok(self.store.create(&self.schema, record).await?)
    }

    /// Merge `patch` into an existing row.
    pub async fn update<P>(&self, id: &str, patch: &P) -> Result<E>
    where
        P: Serialize + Sync + ?Sized,
    {
        let record = to_record(patch)?;
        let merged = self
            .store
            .update(&self.schema, id, record)
            .await
            .map_err(|error| LibraryError::from_store(error, E::KIND, id))?;
        from_record(merged)
    }

    /// Merge `partial` into the row, creating it when missing.
    pub async fn refresh<P>(&self, id: &str, partial: &P) -> Result<E>
    where
        P: Serialize + Sync + ?Sized,
    {
        let record = to_record(partial)?;
        from_record(self.store.upsert(&self.schema, id, record).await?)
    }

    /// [`refresh`](Self::refresh) with the entity's own key.
    pub async fn save(&self, entity: &E) -> Result<E> {
        self.refresh(entity.key(), entity).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<E>> {
        self.store
            .get_by_id(&self.schema, id)
            .await?
            .map(from_record)
            .transpose()
    }

    /// Like [`get`](Self::get), but a missing row is an error.
    pub async fn require(&self, id: &str) -> Result<E> {
        self.get(id).await?.ok_or_else(|| LibraryError::NotFound {
            entity_type: E::KIND.to_string(),
            id: id.to_string(),
        })
    }

    /// Remove the row itself, with no cascade.
    pub async fn delete_row(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(&self.schema, id).await?;
        if removed {
            debug!(kind = E::KIND, id, "Deleted row");
        }
        Ok(removed)
    }

    /// Visit rows in table order until the visitor breaks.
    pub async fn each<F>(&self, visitor: F) -> Result<usize>
    where
        F: FnMut(E, usize) -> ControlFlow<()> + Send,
    {
        self.each_where(&Predicate::new(), visitor).await
    }

    pub async fn each_where<F>(&self, predicate: &Predicate, mut visitor: F) -> Result<usize>
    where
        F: FnMut(E, usize) -> ControlFlow<()> + Send,
    {
        let mut failure = None;
        let visited = self
            .store
            .each_where(&self.schema, predicate, &mut |record, index| {
                match from_record(record) {
                    Ok(entity) => visitor(entity, index),
                    Err(error) => {
                        failure = Some(error);
                        ControlFlow::Break(())
                    }
                }
            })
            .await?;
        failure.map_or(Ok(visited), Err)
    }

    pub async fn find_where(&self, predicate: &Predicate) -> Result<Vec<E>> {
        self.store
            .find_where(&self.schema, predicate)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    pub async fn exists_where(&self, predicate: &Predicate) -> Result<bool> {
        let visited = self
            .store
            .each_where(&self.schema, predicate, &mut |_, _| ControlFlow::Break(()))
            .await?;
        Ok(visited > 0)
    }

    pub async fn all(&self) -> Result<Vec<E>> {
        self.find_where(&Predicate::new()).await
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.store.count(&self.schema).await?)
    }

    /// One window of the table in table order.
    pub async fn list(&self, request: PageRequest) -> Result<Page<E>> {
        let total = self.count().await?;
        let skip = request.offset as usize;
        let limit = request.limit as usize;
        let mut items = Vec::with_capacity(limit.min(total as usize));

        if limit > 0 && (skip as u64) < total {
            self.each(|entity, index| {
                if index < skip {
                    return ControlFlow::Continue(());
                }
                items.push(entity);
                if items.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        }

        Ok(Page::new(items, total, request))
    }

    /// Lazily walk the whole table.
    pub fn stream(&self) -> LazySequence<E, LibraryError> {
        self.stream_where(Predicate::new())
    }

    /// Lazily walk matching rows. Each collection of the sequence re-reads
    /// the store.
    ///
    /// The store visitor is synchronous, so rows reach the consumer a batch
    /// at a time: the memory store reads every match up front and SQLite one
    /// cursor batch ahead. A consumer that stops ends the walk at the next
    /// batch boundary.
    pub fn stream_where(&self, predicate: Predicate) -> LazySequence<E, LibraryError> {
        let store = Arc::clone(&self.store);
        let schema = self.schema.clone();
        LazySequence::new(move |sink| {
            let store = Arc::clone(&store);
            let schema = schema.clone();
            let predicate = predicate.clone();
            async move {
                let mut failure = None;
                store
                    .each_where(&schema, &predicate, &mut |record, _| match from_record(record) {
                        Ok(entity) => sink.push(entity),
                        Err(error) => {
                            failure = Some(error);
                            ControlFlow::Break(())
                        }
                    })
                    .await?;
                failure.map_or(Ok(()), Err)
            }
        })
    }
}
