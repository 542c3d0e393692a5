//! Physical storage seam
//!
//! A [`DocumentDatabase`] is one live handle to one physical database; a
//! [`DatabaseConnector`] opens such handles. The MongoDB backend and the
//! in-memory backend both implement these traits, so the directory, the
//! connection registry and the migration engine never name a driver.

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::connection::PoolSettings;
use crate::error::Result;

/// Field every tenant partition is indexed on when it is initialized
pub const BASELINE_INDEXES: &[&str] = &["created_at"];

/// Physical identity field, stripped when documents are copied
pub const DOCUMENT_ID_FIELD: &str = "_id";

pub type DocumentStream<'a> = BoxStream<'a, Result<Document>>;

#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Database name on its server
    fn name(&self) -> &str;

    async fn ping(&self) -> Result<()>;

    /// Create an empty partition; `Ok(false)` when it already existed
    async fn create_partition(&self, partition: &str) -> Result<bool>;

    async fn partition_exists(&self, partition: &str) -> Result<bool>;

    async fn list_partitions(&self) -> Result<Vec<String>>;

    async fn create_index(&self, partition: &str, field: &str) -> Result<()>;

    async fn count_documents(&self, partition: &str) -> Result<u64>;

    async fn stream_documents(&self, partition: &str) -> Result<DocumentStream<'_>>;

    /// Unordered bulk insert, returns the number of inserted documents.
    ///
    /// Documents rejected individually are not an error: the count is then
    /// smaller than the batch. `Err` means nothing in the batch can be
    /// assumed inserted.
    async fn insert_many(&self, partition: &str, documents: Vec<Document>) -> Result<u64>;

    /// Server-side rename; fails when `to` already exists
    async fn rename_partition(&self, from: &str, to: &str) -> Result<()>;

    async fn drop_partition(&self, partition: &str) -> Result<()>;

    /// Release the underlying connection pool
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(
        &self,
        uri: &str,
        database_name: &str,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn DocumentDatabase>>;
}

/// Materialize a tenant partition and its baseline indexes.
///
/// Returns whether this call created the partition, so a failed caller only
/// cleans up what it made itself.
pub async fn initialize_partition(database: &dyn DocumentDatabase, partition: &str) -> Result<bool> {
    let created = database.create_partition(partition).await?;
    for field in BASELINE_INDEXES {
        if let Err(e) = database.create_index(partition, field).await {
            if created {
                if let Err(drop_error) = database.drop_partition(partition).await {
                    tracing::warn!(
                        database = database.name(),
                        partition,
                        error = %drop_error,
                        "Failed to drop partition after index failure, left orphaned"
                    );
                }
            }
            return Err(e);
        }
    }

    tracing::debug!(
        database = database.name(),
        partition,
        created,
        "partition_initialized"
    );
    Ok(created)
}
