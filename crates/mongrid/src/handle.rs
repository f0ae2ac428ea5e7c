//! Handle: the operation surface bound to one pool.
//!
//! Every I/O call gets its own deadline, computed from "now" when the call
//! starts: the read timeout for fetches, counts and aggregations, the write
//! timeout for inserts, updates, deletes and index creation. A deadline that
//! expires surfaces as [`PoolError::Timeout`]; driver errors are returned
//! unchanged inside [`PoolError::Database`].

use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{Document, from_document};
use mongodb::options::{
    AggregateOptions, CountOptions, DeleteOptions, EstimatedDocumentCountOptions, FindOneOptions,
    FindOptions, IndexOptions, InsertManyOptions, TextIndexVersion, UpdateModifications,
    UpdateOptions,
};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::{Client, Collection, IndexModel};
use mongrid_core::PoolKey;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PoolError, PoolResult};
use crate::query::{MembershipGroup, SearchQuery, membership_filter};

/// Handle identities are unique across every registry in the process.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// A ready pool plus the timeouts every operation on it is bounded by.
///
/// Immutable once published; shared between callers through `Arc`.
pub struct Handle<P = Client> {
    id: u64,
    key: PoolKey,
    pool: P,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<P> Handle<P> {
    pub(crate) fn new(key: PoolKey, pool: P, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            key,
            pool,
            read_timeout,
            write_timeout,
        }
    }

    /// Opaque identity, distinct for every pool ever established.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// The underlying pool, for operations this surface does not cover.
    ///
    /// Calls made through it are **not** bounded by the handle's deadlines.
    pub fn pool(&self) -> &P {
        &self.pool
    }
}

impl<P> fmt::Debug for Handle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("key", &self.key.to_string())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct TotalCount {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

impl Handle<Client> {
    fn collection<T: Send + Sync>(&self, db: &str, coll: &str) -> Collection<T> {
        self.pool.database(db).collection::<T>(coll)
    }

    async fn read<F, T>(&self, operation: &'static str, op: F) -> PoolResult<T>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>>,
    {
        bounded(operation, self.read_timeout, op).await
    }

    async fn write<F, T>(&self, operation: &'static str, op: F) -> PoolResult<T>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>>,
    {
        bounded(operation, self.write_timeout, op).await
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Fetch one document; no match is [`PoolError::NotFound`].
    pub async fn find_one<T>(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        options: impl Into<Option<FindOneOptions>>,
    ) -> PoolResult<T>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let found = self
            .read(
                "find_one",
                self.collection::<T>(db, coll).find_one(filter).with_options(options),
            )
            .await?;
        found.ok_or(PoolError::NotFound)
    }

    /// Fetch every matching document. The cursor is drained inside the deadline.
    pub async fn find_many<T>(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> PoolResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        let collection = self.collection::<T>(db, coll);
        let options = options.into();
        self.read("find_many", async move {
            let cursor = collection.find(filter).with_options(options).await?;
            cursor.try_collect().await
        })
        .await
    }

    /// Set-membership fetch: `$in` (or `$nin` with `negate`) per group, OR-combined.
    pub async fn find_where_in<T>(
        &self,
        db: &str,
        coll: &str,
        negate: bool,
        groups: &[MembershipGroup],
    ) -> PoolResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        let filter = membership_filter(negate, groups)?;
        self.find_many(db, coll, filter, None).await
    }

    pub async fn count(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        options: impl Into<Option<CountOptions>>,
    ) -> PoolResult<u64> {
        self.read(
            "count",
            self.collection::<Document>(db, coll)
                .count_documents(filter)
                .with_options(options),
        )
        .await
    }

    pub async fn estimated_count(
        &self,
        db: &str,
        coll: &str,
        options: impl Into<Option<EstimatedDocumentCountOptions>>,
    ) -> PoolResult<u64> {
        self.read(
            "estimated_count",
            self.collection::<Document>(db, coll)
                .estimated_document_count()
                .with_options(options),
        )
        .await
    }

    /// Run an arbitrary aggregation pipeline.
    pub async fn aggregate(
        &self,
        db: &str,
        coll: &str,
        pipeline: Vec<Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> PoolResult<Vec<Document>> {
        let collection = self.collection::<Document>(db, coll);
        let options = options.into();
        self.read("aggregate", async move {
            let cursor = collection.aggregate(pipeline).with_options(options).await?;
            cursor.try_collect().await
        })
        .await
    }

    /// Filtered, sorted, paged search through an aggregation pipeline.
    pub async fn search<T>(&self, db: &str, coll: &str, query: &SearchQuery) -> PoolResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        let collection = self.collection::<Document>(db, coll);
        let pipeline = query.pipeline();
        self.read("search", async move {
            let cursor = collection.aggregate(pipeline).await?;
            cursor.with_type::<T>().try_collect().await
        })
        .await
    }

    /// Number of documents [`search`](Self::search) would match, ignoring sort and paging.
    pub async fn search_count(&self, db: &str, coll: &str, query: &SearchQuery) -> PoolResult<u64> {
        let collection = self.collection::<Document>(db, coll);
        let pipeline = query.count_pipeline();
        let first = self
            .read("search_count", async move {
                let mut cursor = collection.aggregate(pipeline).await?;
                cursor.try_next().await
            })
            .await?;

        // $count emits nothing when the match stage is empty.
        match first {
            Some(document) => from_document::<TotalCount>(document)
                .map(|count| count.total_count)
                .map_err(|e| PoolError::Decode(e.to_string())),
            None => Ok(0),
        }
    }

    // ── Writes ──────────────────────────────────────────────────────

    pub async fn insert_one<T>(&self, db: &str, coll: &str, document: &T) -> PoolResult<InsertOneResult>
    where
        T: Serialize + Send + Sync,
    {
        self.write("insert_one", self.collection::<T>(db, coll).insert_one(document))
            .await
    }

    pub async fn insert_many<T>(
        &self,
        db: &str,
        coll: &str,
        documents: &[T],
        options: impl Into<Option<InsertManyOptions>>,
    ) -> PoolResult<InsertManyResult>
    where
        T: Serialize + Send + Sync,
    {
        self.write(
            "insert_many",
            self.collection::<T>(db, coll)
                .insert_many(documents)
                .with_options(options),
        )
        .await
    }

    pub async fn update_one(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> PoolResult<UpdateResult> {
        self.write(
            "update_one",
            self.collection::<Document>(db, coll)
                .update_one(filter, update)
                .with_options(options),
        )
        .await
    }

    pub async fn update_many(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> PoolResult<UpdateResult> {
        self.write(
            "update_many",
            self.collection::<Document>(db, coll)
                .update_many(filter, update)
                .with_options(options),
        )
        .await
    }

    pub async fn delete_one(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> PoolResult<DeleteResult> {
        self.write(
            "delete_one",
            self.collection::<Document>(db, coll)
                .delete_one(filter)
                .with_options(options),
        )
        .await
    }

    pub async fn delete_many(
        &self,
        db: &str,
        coll: &str,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> PoolResult<DeleteResult> {
        self.write(
            "delete_many",
            self.collection::<Document>(db, coll)
                .delete_many(filter)
                .with_options(options),
        )
        .await
    }

    /// Create an ascending unique index on `field`; returns the index name.
    pub async fn add_unique_index(&self, db: &str, coll: &str, field: &str) -> PoolResult<String> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.write(
            "add_unique_index",
            self.collection::<Document>(db, coll).create_index(model),
        )
        .await
        .map(|created| created.index_name)
    }

    /// Create a version 3 text index on `field`; returns the index name.
    pub async fn add_text_index(&self, db: &str, coll: &str, field: &str) -> PoolResult<String> {
        let mut keys = Document::new();
        keys.insert(field, "text");
        let model = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .text_index_version(TextIndexVersion::V3)
                    .build(),
            )
            .build();
        self.write(
            "add_text_index",
            self.collection::<Document>(db, coll).create_index(model),
        )
        .await
        .map(|created| created.index_name)
    }
}

/// Run `op` under a fresh deadline of `after`.
async fn bounded<F, T>(operation: &'static str, after: Duration, op: F) -> PoolResult<T>
where
    F: IntoFuture<Output = mongodb::error::Result<T>>,
{
    match tokio::time::timeout(after, op.into_future()).await {
        Ok(result) => result.map_err(PoolError::from),
        Err(_) => Err(PoolError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_ids_are_unique() {
        let key = PoolKey::new("db", 27017);
        let a = Handle::new(key.clone(), (), Duration::from_secs(5), Duration::from_secs(5));
        let b = Handle::new(key, (), Duration::from_secs(5), Duration::from_secs(5));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn handle_debug_shows_key() {
        let handle = Handle::new(
            PoolKey::new("db.local", 27017),
            (),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );
        let rendered = format!("{handle:?}");
        assert!(rendered.contains("db.local:27017"));
        assert!(rendered.contains(&format!("id: {}", handle.id())));
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, mongodb::error::Error>(())
        };
        let err = bounded("find_one", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        match err {
            PoolError::Timeout { operation, after } => {
                assert_eq!(operation, "find_one");
                assert_eq!(after, Duration::from_millis(10));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn bounded_passes_value_through() {
        let value = bounded("count", Duration::from_secs(1), async {
            Ok::<_, mongodb::error::Error>(42_u64)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }
}
