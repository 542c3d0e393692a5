//! MongoDB backend
//!
//! Partitions are collections. Every operation is bounded by the configured
//! socket timeout, since the driver only exposes connect and server selection
//! timeouts.

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::Utc;
use futures::{Stream, StreamExt};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use orgdb_models::{ConflictField, OrganizationRecord, OrganizationStatus, StorageKind};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::connection::PoolSettings;
use crate::directory::{
    DirectoryStats, OrganizationPatch, TenantDirectory, CREATED_AT_INDEX, EMAIL_UNIQUE_INDEX,
    NAME_UNIQUE_INDEX, ORGANIZATIONS_COLLECTION, STORAGE_KIND_INDEX,
};
use crate::error::{DatabaseError, Result};
use crate::registry::redact_uri;
use crate::store::{DatabaseConnector, DocumentDatabase, DocumentStream};

const NAMESPACE_EXISTS: i32 = 48;
const DUPLICATE_KEY: i32 = 11000;

async fn bounded<T, F>(timeout: Duration, operation: &str, future: F) -> Result<T>
where
    F: IntoFuture<Output = mongodb::error::Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(DatabaseError::from),
        Err(_) => Err(DatabaseError::Timeout(format!(
            "{} exceeded {}ms",
            operation,
            timeout.as_millis()
        ))),
    }
}

/// Bound every advance of a cursor; a stalled advance ends the stream with `Timeout`
fn bounded_stream<'a, S, E>(stream: S, timeout: Duration, operation: String) -> DocumentStream<'a>
where
    S: Stream<Item = std::result::Result<Document, E>> + Send + 'a,
    E: Into<DatabaseError> + Send + 'a,
{
    futures::stream::unfold(Some(Box::pin(stream)), move |state| {
        let operation = operation.clone();
        async move {
            let mut stream = match state {
                Some(stream) => stream,
                None => return None,
            };
            match tokio::time::timeout(timeout, stream.next()).await {
                Ok(Some(item)) => Some((item.map_err(Into::into), Some(stream))),
                Ok(None) => None,
                Err(_) => Some((
                    Err(DatabaseError::Timeout(format!(
                        "{} exceeded {}ms",
                        operation,
                        timeout.as_millis()
                    ))),
                    None,
                )),
            }
        }
    })
    .boxed()
}

fn command_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    }
}

/// Map a duplicate-key violation to the field whose unique index fired
fn map_write_error(err: mongodb::error::Error) -> DatabaseError {
    if command_code(&err) == Some(DUPLICATE_KEY) {
        let field = if err.to_string().contains(EMAIL_UNIQUE_INDEX) {
            ConflictField::Email
        } else {
            ConflictField::Name
        };
        return DatabaseError::Conflict(field);
    }
    DatabaseError::from(err)
}

/// One MongoDB database on one client
#[derive(Debug, Clone)]
pub struct MongoDatabase {
    client: Client,
    database: mongodb::Database,
    socket_timeout: Duration,
}

impl MongoDatabase {
    pub fn database(&self) -> &mongodb::Database {
        &self.database
    }

    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    fn collection(&self, partition: &str) -> Collection<Document> {
        self.database.collection(partition)
    }
}

#[async_trait]
impl DocumentDatabase for MongoDatabase {
    fn name(&self) -> &str {
        self.database.name()
    }

    async fn ping(&self) -> Result<()> {
        bounded(
            self.socket_timeout,
            "ping",
            self.database.run_command(doc! { "ping": 1 }),
        )
        .await?;
        Ok(())
    }

    async fn create_partition(&self, partition: &str) -> Result<bool> {
        match tokio::time::timeout(
            self.socket_timeout,
            self.database.create_collection(partition),
        )
        .await
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) if command_code(&e) == Some(NAMESPACE_EXISTS) => Ok(false),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DatabaseError::Timeout(format!("create collection {}", partition))),
        }
    }

    async fn partition_exists(&self, partition: &str) -> Result<bool> {
        Ok(self.list_partitions().await?.iter().any(|name| name == partition))
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        bounded(
            self.socket_timeout,
            "listCollections",
            self.database.list_collection_names(),
        )
        .await
    }

    async fn create_index(&self, partition: &str, field: &str) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let index = IndexModel::builder().keys(keys).build();
        bounded(
            self.socket_timeout,
            "createIndexes",
            self.collection(partition).create_index(index),
        )
        .await?;
        Ok(())
    }

    async fn count_documents(&self, partition: &str) -> Result<u64> {
        bounded(
            self.socket_timeout,
            "count",
            self.collection(partition).count_documents(doc! {}),
        )
        .await
    }

    async fn stream_documents(&self, partition: &str) -> Result<DocumentStream<'_>> {
        let cursor = bounded(
            self.socket_timeout,
            "find",
            self.collection(partition).find(doc! {}),
        )
        .await?;
        Ok(bounded_stream(
            cursor,
            self.socket_timeout,
            format!("getMore on {}", partition),
        ))
    }

    async fn insert_many(&self, partition: &str, documents: Vec<Document>) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let result = tokio::time::timeout(
            self.socket_timeout,
            self.collection(partition).insert_many(documents).ordered(false),
        )
        .await
        .map_err(|_| DatabaseError::Timeout(format!("insert into {}", partition)))?;

        match result {
            Ok(inserted) => Ok(inserted.inserted_ids.len() as u64),
            // Unordered: documents without a write error still landed
            Err(e) => match e.kind.as_ref() {
                ErrorKind::InsertMany(failure) if failure.write_concern_error.is_none() => {
                    tracing::warn!(
                        partition,
                        inserted = failure.inserted_ids.len(),
                        rejected = failure.write_errors.as_ref().map_or(0, Vec::len),
                        "Insert batch partially rejected"
                    );
                    Ok(failure.inserted_ids.len() as u64)
                }
                _ => Err(DatabaseError::InsertRejected(e.to_string())),
            },
        }
    }

    async fn rename_partition(&self, from: &str, to: &str) -> Result<()> {
        let name = self.database.name();
        let command = doc! {
            "renameCollection": format!("{}.{}", name, from),
            "to": format!("{}.{}", name, to),
            "dropTarget": false,
        };
        bounded(
            self.socket_timeout,
            "renameCollection",
            self.client.database("admin").run_command(command),
        )
        .await?;
        Ok(())
    }

    async fn drop_partition(&self, partition: &str) -> Result<()> {
        bounded(
            self.socket_timeout,
            "drop",
            self.collection(partition).drop(),
        )
        .await
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().immediate(true).await;
        Ok(())
    }
}

/// Opens MongoDB clients with the given pool settings
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }

    /// Connect and ping, so an unreachable server fails here instead of on first use
    pub async fn open(
        &self,
        uri: &str,
        database_name: &str,
        settings: &PoolSettings,
    ) -> Result<MongoDatabase> {
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            DatabaseError::ConnectionFailed(format!("invalid connection string {}: {}", redact_uri(uri), e))
        })?;
        options.max_pool_size = Some(settings.max_pool_size);
        options.min_pool_size = Some(settings.min_pool_size);
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.app_name = Some("orgdb".to_string());

        let client = Client::with_options(options)?;
        let database = MongoDatabase {
            database: client.database(database_name),
            client,
            socket_timeout: settings.socket_timeout,
        };

        database.ping().await.map_err(|e| {
            DatabaseError::ConnectionFailed(format!(
                "{}/{} unreachable: {}",
                redact_uri(uri),
                database_name,
                e
            ))
        })?;

        tracing::debug!(
            uri = %redact_uri(uri),
            db_name = database_name,
            max_pool_size = settings.max_pool_size,
            "MongoDB client connected"
        );
        Ok(database)
    }
}

#[async_trait]
impl DatabaseConnector for MongoConnector {
    async fn connect(
        &self,
        uri: &str,
        database_name: &str,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn DocumentDatabase>> {
        Ok(Arc::new(self.open(uri, database_name, settings).await?))
    }
}

/// Tenant directory stored in the `organizations` collection
#[derive(Debug, Clone)]
pub struct MongoTenantDirectory {
    organizations: Collection<OrganizationRecord>,
    timeout: Duration,
}

impl MongoTenantDirectory {
    pub fn new(master: &MongoDatabase) -> Self {
        Self {
            organizations: master.database().collection(ORGANIZATIONS_COLLECTION),
            timeout: master.socket_timeout(),
        }
    }

    fn active(filter: Document) -> Document {
        let mut filter = filter;
        filter.insert("status", OrganizationStatus::Active.as_str());
        filter
    }

    fn by_id(id: Uuid) -> Document {
        doc! { "id": id.hyphenated().to_string() }
    }

    fn by_kind(kind: StorageKind) -> Document {
        doc! { "storage_location.kind": kind.as_str() }
    }

    /// `$set` body for a patch
    fn set_document(patch: OrganizationPatch) -> Result<Document> {
        let mut set = doc! { "updated_at": bson::to_bson(&Utc::now())? };
        if let Some(name) = patch.name {
            set.insert("name", name);
        }
        if let Some(location) = &patch.storage_location {
            set.insert("storage_location", bson::to_bson(location)?);
        }
        if let Some(email) = patch.admin_email {
            set.insert("admin.email", email);
        }
        if let Some(hash) = patch.admin_password_hash {
            set.insert("admin.password_hash", hash);
        }
        if let Some(status) = patch.status {
            set.insert("status", status.as_str());
        }
        Ok(set)
    }

    async fn count_active(&self, filter: Document) -> Result<u64> {
        bounded(
            self.timeout,
            "count organizations",
            self.organizations.count_documents(Self::active(filter)),
        )
        .await
    }
}

fn index(keys: Document, name: &str, unique: bool) -> IndexModel {
    let options = IndexOptions::builder()
        .name(name.to_string())
        .unique(unique)
        .build();
    IndexModel::builder().keys(keys).options(options).build()
}

#[async_trait]
impl TenantDirectory for MongoTenantDirectory {
    async fn ensure_indexes(&self) -> Result<()> {
        let indexes = vec![
            index(doc! { "name": 1 }, NAME_UNIQUE_INDEX, true),
            index(doc! { "admin.email": 1 }, EMAIL_UNIQUE_INDEX, true),
            index(doc! { "created_at": 1 }, CREATED_AT_INDEX, false),
            index(doc! { "storage_location.kind": 1 }, STORAGE_KIND_INDEX, false),
        ];
        bounded(
            self.timeout,
            "create organization indexes",
            self.organizations.create_indexes(indexes),
        )
        .await?;
        tracing::info!("Organization indexes ensured");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.count_active(doc! { "name": name }).await? > 0)
    }

    async fn get(&self, name: &str) -> Result<OrganizationRecord> {
        bounded(
            self.timeout,
            "find organization",
            self.organizations.find_one(Self::active(doc! { "name": name })),
        )
        .await?
        .ok_or_else(|| DatabaseError::not_found("Organization", name))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<OrganizationRecord>> {
        bounded(
            self.timeout,
            "find organization by email",
            self.organizations
                .find_one(Self::active(doc! { "admin.email": email })),
        )
        .await
    }

    async fn insert(&self, record: &OrganizationRecord) -> Result<Uuid> {
        tokio::time::timeout(self.timeout, self.organizations.insert_one(record))
            .await
            .map_err(|_| DatabaseError::Timeout("insert organization".to_string()))?
            .map_err(map_write_error)?;
        Ok(record.id)
    }

    async fn update(&self, id: Uuid, patch: OrganizationPatch) -> Result<OrganizationRecord> {
        let set = Self::set_document(patch)?;
        let updated = tokio::time::timeout(
            self.timeout,
            self.organizations
                .find_one_and_update(Self::by_id(id), doc! { "$set": set })
                .return_document(ReturnDocument::After),
        )
        .await
        .map_err(|_| DatabaseError::Timeout("update organization".to_string()))?
        .map_err(map_write_error)?;

        updated.ok_or_else(|| DatabaseError::not_found("Organization", &id.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<OrganizationRecord> {
        let removed = bounded(
            self.timeout,
            "delete organization",
            self.organizations
                .find_one_and_delete(Self::active(doc! { "name": name })),
        )
        .await?;

        let mut record = removed.ok_or_else(|| DatabaseError::not_found("Organization", name))?;
        record.status = OrganizationStatus::Deleted;
        Ok(record)
    }

    async fn discard(&self, id: Uuid) -> Result<()> {
        bounded(
            self.timeout,
            "discard organization",
            self.organizations
                .delete_one(Self::by_id(id)),
        )
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let shared = self
            .count_active(Self::by_kind(StorageKind::Shared))
            .await?;
        let dedicated = self
            .count_active(Self::by_kind(StorageKind::Dedicated))
            .await?;

        Ok(DirectoryStats {
            total: shared + dedicated,
            shared,
            dedicated,
        })
    }
}
