//! In-process backend
//!
//! Behaves like the MongoDB backend for everything the tenant core relies on:
//! partitions materialize on first insert, inserted documents get an `_id`,
//! renames refuse to overwrite, and the directory enforces both unique
//! constraints under a single write lock. Used by the test suites and for
//! local runs without a database server. Fault injection hooks let tests make
//! servers unreachable or hang, reject poisoned documents, or refuse renames.

use async_trait::async_trait;
use bson::{oid::ObjectId, Document};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use orgdb_models::{ConflictField, OrganizationRecord, OrganizationStatus, StorageKind};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::connection::PoolSettings;
use crate::directory::{DirectoryStats, OrganizationPatch, TenantDirectory};
use crate::error::{DatabaseError, Result};
use crate::store::{DatabaseConnector, DocumentDatabase, DocumentStream, DOCUMENT_ID_FIELD};

#[derive(Debug, Default)]
struct Partition {
    documents: Vec<Document>,
    indexes: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct StorageState {
    partitions: BTreeMap<String, Partition>,
    rejected_field: Option<String>,
    skipped_field: Option<String>,
    fail_renames: bool,
    fail_indexes: bool,
    fail_drops: bool,
}

/// Contents of one in-memory database, shared by every handle opened on it
#[derive(Debug, Clone, Default)]
struct MemoryStorage(Arc<RwLock<StorageState>>);

/// Handle to an in-memory database
#[derive(Debug)]
pub struct InMemoryDatabase {
    name: String,
    storage: MemoryStorage,
    closed: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self::attach(name, MemoryStorage::default())
    }

    fn attach(name: &str, storage: MemoryStorage) -> Self {
        Self {
            name: name.to_string(),
            storage,
            closed: AtomicBool::new(false),
        }
    }

    /// Another handle onto the same contents
    pub fn reopen(&self) -> Self {
        Self::attach(&self.name, self.storage.clone())
    }

    /// Make every batch containing a document with `field` fail as a whole
    pub async fn reject_documents_with(&self, field: &str) {
        self.storage.0.write().await.rejected_field = Some(field.to_string());
    }

    /// Reject single documents with `field`; the rest of their batch still lands
    pub async fn skip_documents_with(&self, field: &str) {
        self.storage.0.write().await.skipped_field = Some(field.to_string());
    }

    /// Make server-side renames fail, as on deployments without the privilege
    pub async fn fail_renames(&self, fail: bool) {
        self.storage.0.write().await.fail_renames = fail;
    }

    pub async fn fail_indexes(&self, fail: bool) {
        self.storage.0.write().await.fail_indexes = fail;
    }

    pub async fn fail_drops(&self, fail: bool) {
        self.storage.0.write().await.fail_drops = fail;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of a partition's documents in insertion order
    pub async fn documents(&self, partition: &str) -> Vec<Document> {
        self.storage
            .0
            .read()
            .await
            .partitions
            .get(partition)
            .map(|p| p.documents.clone())
            .unwrap_or_default()
    }

    pub async fn indexes(&self, partition: &str) -> Vec<String> {
        self.storage
            .0
            .read()
            .await
            .partitions
            .get(partition)
            .map(|p| p.indexes.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DatabaseError::ConnectionFailed(format!(
                "connection to {} is closed",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentDatabase for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        self.check_open()
    }

    async fn create_partition(&self, partition: &str) -> Result<bool> {
        self.check_open()?;
        let mut state = self.storage.0.write().await;
        if state.partitions.contains_key(partition) {
            return Ok(false);
        }
        state
            .partitions
            .insert(partition.to_string(), Partition::default());
        Ok(true)
    }

    async fn partition_exists(&self, partition: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.storage.0.read().await.partitions.contains_key(partition))
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.storage.0.read().await.partitions.keys().cloned().collect())
    }

    async fn create_index(&self, partition: &str, field: &str) -> Result<()> {
        self.check_open()?;
        let mut state = self.storage.0.write().await;
        if state.fail_indexes {
            return Err(DatabaseError::Internal(format!("createIndexes on {} failed", partition)));
        }
        state
            .partitions
            .entry(partition.to_string())
            .or_default()
            .indexes
            .insert(field.to_string());
        Ok(())
    }

    async fn count_documents(&self, partition: &str) -> Result<u64> {
        self.check_open()?;
        let state = self.storage.0.read().await;
        Ok(state
            .partitions
            .get(partition)
            .map(|p| p.documents.len() as u64)
            .unwrap_or(0))
    }

    async fn stream_documents(&self, partition: &str) -> Result<DocumentStream<'_>> {
        self.check_open()?;
        let documents = self.documents(partition).await;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn insert_many(&self, partition: &str, documents: Vec<Document>) -> Result<u64> {
        self.check_open()?;
        let mut state = self.storage.0.write().await;
        if let Some(field) = &state.rejected_field {
            if documents.iter().any(|d| d.contains_key(field)) {
                return Err(DatabaseError::InsertRejected(format!(
                    "batch of {} contained a rejected document",
                    documents.len()
                )));
            }
        }

        let documents: Vec<Document> = match &state.skipped_field {
            Some(field) => documents.into_iter().filter(|d| !d.contains_key(field)).collect(),
            None => documents,
        };

        let inserted = documents.len() as u64;
        let target = state.partitions.entry(partition.to_string()).or_default();
        for mut document in documents {
            if !document.contains_key(DOCUMENT_ID_FIELD) {
                document.insert(DOCUMENT_ID_FIELD, ObjectId::new());
            }
            target.documents.push(document);
        }
        Ok(inserted)
    }

    async fn rename_partition(&self, from: &str, to: &str) -> Result<()> {
        self.check_open()?;
        let mut state = self.storage.0.write().await;
        if state.fail_renames {
            return Err(DatabaseError::Internal("renameCollection is not permitted".to_string()));
        }
        if state.partitions.contains_key(to) {
            return Err(DatabaseError::PartitionExists(to.to_string()));
        }
        let partition = state
            .partitions
            .remove(from)
            .ok_or_else(|| DatabaseError::not_found("Partition", from))?;
        state.partitions.insert(to.to_string(), partition);
        Ok(())
    }

    async fn drop_partition(&self, partition: &str) -> Result<()> {
        self.check_open()?;
        let mut state = self.storage.0.write().await;
        if state.fail_drops {
            return Err(DatabaseError::Internal(format!("drop of {} failed", partition)));
        }
        state.partitions.remove(partition);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens in-memory databases keyed by `(uri, database_name)`
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    servers: Mutex<HashMap<(String, String), MemoryStorage>>,
    unreachable: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections to `uri` fail immediately
    pub fn mark_unreachable(&self, uri: &str) {
        lock(&self.unreachable).insert(uri.to_string());
    }

    /// Connections to `uri` never complete
    pub fn mark_hanging(&self, uri: &str) {
        lock(&self.hanging).insert(uri.to_string());
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Uncounted handle for inspecting a database's contents
    pub fn database(&self, uri: &str, database_name: &str) -> InMemoryDatabase {
        InMemoryDatabase::attach(database_name, self.storage(uri, database_name))
    }

    fn storage(&self, uri: &str, database_name: &str) -> MemoryStorage {
        lock(&self.servers)
            .entry((uri.to_string(), database_name.to_string()))
            .or_default()
            .clone()
    }
}

#[async_trait]
impl DatabaseConnector for InMemoryConnector {
    async fn connect(
        &self,
        uri: &str,
        database_name: &str,
        _settings: &PoolSettings,
    ) -> Result<Arc<dyn DocumentDatabase>> {
        let hanging = lock(&self.hanging).contains(uri);
        if hanging {
            std::future::pending::<()>().await;
        }
        let unreachable = lock(&self.unreachable).contains(uri);
        if unreachable {
            return Err(DatabaseError::ConnectionFailed(format!(
                "server selection failed for database {}",
                database_name
            )));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.database(uri, database_name)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Directory kept in process memory, enforcing the same unique constraints
/// as the indexed `organizations` collection
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    records: RwLock<Vec<OrganizationRecord>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, including provisioning reservations
    pub async fn all_records(&self) -> Vec<OrganizationRecord> {
        self.records.read().await.clone()
    }

    fn check_unique(
        records: &[OrganizationRecord],
        candidate: &OrganizationRecord,
    ) -> Result<()> {
        for existing in records.iter().filter(|r| r.id != candidate.id) {
            if existing.name == candidate.name {
                return Err(DatabaseError::Conflict(ConflictField::Name));
            }
            if existing.admin.email == candidate.admin.email {
                return Err(DatabaseError::Conflict(ConflictField::Email));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.iter().any(|r| r.name == name && r.is_active()))
    }

    async fn get(&self, name: &str) -> Result<OrganizationRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.name == name && r.is_active())
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Organization", name))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<OrganizationRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.admin.email == email && r.is_active())
            .cloned())
    }

    async fn insert(&self, record: &OrganizationRecord) -> Result<Uuid> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(DatabaseError::Internal(format!("duplicate id {}", record.id)));
        }
        Self::check_unique(&records, record)?;
        records.push(record.clone());
        Ok(record.id)
    }

    async fn update(&self, id: Uuid, patch: OrganizationPatch) -> Result<OrganizationRecord> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| DatabaseError::not_found("Organization", &id.to_string()))?;

        let mut candidate = records[index].clone();
        patch.apply_to(&mut candidate, Utc::now());
        Self::check_unique(&records, &candidate)?;
        records[index] = candidate.clone();
        Ok(candidate)
    }

    async fn delete(&self, name: &str) -> Result<OrganizationRecord> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.name == name && r.is_active())
            .ok_or_else(|| DatabaseError::not_found("Organization", name))?;
        let mut removed = records.remove(index);
        removed.status = OrganizationStatus::Deleted;
        Ok(removed)
    }

    async fn discard(&self, id: Uuid) -> Result<()> {
        self.records.write().await.retain(|r| r.id != id);
        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let records = self.records.read().await;
        let mut stats = DirectoryStats::default();
        for record in records.iter().filter(|r| r.is_active()) {
            stats.total += 1;
            match record.storage_location.kind() {
                StorageKind::Shared => stats.shared += 1,
                StorageKind::Dedicated => stats.dedicated += 1,
            }
        }
        Ok(stats)
    }
}
