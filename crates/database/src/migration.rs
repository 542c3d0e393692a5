//! Migration engine
//!
//! Moves one tenant's documents between storage locations. Small moves inside
//! one database are a server-side rename; everything else is a streamed,
//! batched copy into the target followed by a drop of the source partition.
//!
//! The source partition is dropped after a batched copy even when some
//! batches failed. Callers get the failure counts back in the job and decide
//! how to report them.

use bson::Document;
use futures::StreamExt;
use orgdb_models::{MigrationJob, MigrationStrategy, StorageLocation};
use std::sync::Arc;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::store::{initialize_partition, DocumentDatabase, DOCUMENT_ID_FIELD};

/// Progress callback, invoked with `(migrated_so_far, total_count)`
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Documents per insert batch
    pub batch_size: usize,
    /// Same-database moves below this count try an atomic rename first
    pub atomic_rename_threshold: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            atomic_rename_threshold: 10_000,
        }
    }
}

impl MigrationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("MIGRATION_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.batch_size),
            atomic_rename_threshold: std::env::var("MIGRATION_ATOMIC_RENAME_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.atomic_rename_threshold),
        }
    }
}

pub struct MigrationEngine {
    registry: Arc<ConnectionRegistry>,
    config: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, config: MigrationConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub async fn relocate(
        &self,
        source: &StorageLocation,
        target: &StorageLocation,
        document_count: u64,
    ) -> Result<MigrationJob> {
        self.relocate_with_progress(source, target, document_count, &|_, _| {})
            .await
    }

    /// Move every document of `source` into `target`.
    ///
    /// Only fails when the source cannot be read or the target cannot be
    /// reached; failed batches are counted in the returned job instead.
    pub async fn relocate_with_progress(
        &self,
        source: &StorageLocation,
        target: &StorageLocation,
        document_count: u64,
        progress: &ProgressFn<'_>,
    ) -> Result<MigrationJob> {
        let job = MigrationJob::start(source.clone(), target.clone(), document_count);
        if source == target {
            return Ok(job.renamed());
        }

        let source_db = self.registry.resolve_location(source).await?;

        if source.same_database(target) && document_count < self.config.atomic_rename_threshold {
            match source_db
                .rename_partition(source.partition_name(), target.partition_name())
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        from = source.partition_name(),
                        to = target.partition_name(),
                        documents = document_count,
                        "Partition renamed"
                    );
                    return Ok(job.renamed());
                }
                Err(e) => {
                    tracing::warn!(
                        from = source.partition_name(),
                        to = target.partition_name(),
                        error = %e,
                        "Atomic rename failed, falling back to batched copy"
                    );
                }
            }
        }

        let target_db = self.registry.resolve_location(target).await?;
        self.batched_copy(job, source_db.as_ref(), target_db.as_ref(), progress)
            .await
    }

    async fn batched_copy(
        &self,
        mut job: MigrationJob,
        source_db: &dyn DocumentDatabase,
        target_db: &dyn DocumentDatabase,
        progress: &ProgressFn<'_>,
    ) -> Result<MigrationJob> {
        job.strategy = MigrationStrategy::BatchedCopy;
        let source_partition = job.source_location.partition_name().to_string();
        let target_partition = job.target_location.partition_name().to_string();
        let batch_size = self.config.batch_size.max(1);

        tracing::info!(
            from = %job.source_location,
            to = %job.target_location,
            total = job.total_count,
            batch_size,
            "Starting batched copy"
        );

        initialize_partition(target_db, &target_partition).await?;

        let mut documents = source_db.stream_documents(&source_partition).await?;
        let mut batch = Vec::with_capacity(batch_size);
        let mut batch_number = 0u64;

        while let Some(document) = documents.next().await {
            let mut document = document?;
            document.remove(DOCUMENT_ID_FIELD);
            batch.push(document);

            if batch.len() >= batch_size {
                batch_number += 1;
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                self.insert_batch(&mut job, target_db, &target_partition, full, batch_number, progress)
                    .await;
            }
        }
        if !batch.is_empty() {
            batch_number += 1;
            self.insert_batch(&mut job, target_db, &target_partition, batch, batch_number, progress)
                .await;
        }
        drop(documents);

        if let Err(e) = source_db.drop_partition(&source_partition).await {
            tracing::error!(
                partition = %source_partition,
                error = %e,
                "Failed to drop source partition after copy"
            );
        }

        job.finish();
        tracing::info!(
            from = %job.source_location,
            to = %job.target_location,
            migrated = job.migrated_count,
            failed = job.failed_count,
            status = ?job.status,
            "Batched copy finished"
        );
        Ok(job)
    }

    async fn insert_batch(
        &self,
        job: &mut MigrationJob,
        target_db: &dyn DocumentDatabase,
        partition: &str,
        batch: Vec<Document>,
        batch_number: u64,
        progress: &ProgressFn<'_>,
    ) {
        let size = batch.len() as u64;
        match target_db.insert_many(partition, batch).await {
            Ok(inserted) => {
                job.record_batch_inserted(inserted);
                if inserted < size {
                    job.record_batch_failed(size - inserted);
                }
                tracing::debug!(
                    batch = batch_number,
                    migrated = job.migrated_count,
                    total = job.total_count,
                    "Migration batch inserted"
                );
                progress(job.migrated_count, job.total_count);
            }
            Err(e) => {
                job.record_batch_failed(size);
                tracing::error!(
                    batch = batch_number,
                    failed = size,
                    error = %e,
                    "Migration batch failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPoolConfig;
    use crate::memory::{InMemoryConnector, InMemoryDatabase};
    use bson::doc;
    use orgdb_models::MigrationStatus;
    use std::sync::Mutex;

    const TENANT_URI: &str = "mongodb://tenant-host:27017";

    struct Fixture {
        shared: Arc<InMemoryDatabase>,
        connector: Arc<InMemoryConnector>,
        registry: Arc<ConnectionRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let shared = Arc::new(InMemoryDatabase::new("master_db"));
            let connector = Arc::new(InMemoryConnector::new());
            let registry = Arc::new(ConnectionRegistry::new(
                shared.clone(),
                connector.clone(),
                ConnectionPoolConfig::default(),
            ));
            Self {
                shared,
                connector,
                registry,
            }
        }

        fn engine(&self, config: MigrationConfig) -> MigrationEngine {
            MigrationEngine::new(self.registry.clone(), config)
        }
    }

    fn shared(partition: &str) -> StorageLocation {
        StorageLocation::Shared {
            partition_name: partition.to_string(),
        }
    }

    fn documents(count: usize) -> Vec<Document> {
        (0..count)
            .map(|i| doc! { "seq": i as i64, "payload": format!("doc-{}", i) })
            .collect()
    }

    fn sequence(docs: &[Document]) -> Vec<i64> {
        let mut seqs: Vec<i64> = docs.iter().map(|d| d.get_i64("seq").unwrap()).collect();
        seqs.sort();
        seqs
    }

    #[tokio::test]
    async fn test_small_same_database_move_is_renamed() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_old", documents(500)).await.unwrap();
        let before = fixture.shared.documents("org_old").await;

        let job = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_old"), &shared("org_new"), 500)
            .await
            .unwrap();

        assert_eq!(job.strategy, MigrationStrategy::AtomicRename);
        assert_eq!(job.status, MigrationStatus::Completed);
        assert_eq!(job.migrated_count, 500);
        assert_eq!(job.failed_count, 0);
        assert_eq!(fixture.shared.documents("org_new").await, before);
        assert!(!fixture.shared.partition_exists("org_old").await.unwrap());
    }

    #[tokio::test]
    async fn test_large_same_database_move_is_copied() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_old", documents(12_000)).await.unwrap();

        let job = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_old"), &shared("org_new"), 12_000)
            .await
            .unwrap();

        assert_eq!(job.strategy, MigrationStrategy::BatchedCopy);
        assert_eq!(job.status, MigrationStatus::Completed);
        assert_eq!(job.migrated_count + job.failed_count, 12_000);
        assert_eq!(job.migrated_count, 12_000);
        assert_eq!(fixture.shared.count_documents("org_new").await.unwrap(), 12_000);
        assert!(!fixture.shared.partition_exists("org_old").await.unwrap());
        assert_eq!(fixture.shared.indexes("org_new").await, vec!["created_at"]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_counted_and_source_still_dropped() {
        let fixture = Fixture::new();
        let mut docs = documents(250);
        docs[150].insert("poison", true);
        fixture.shared.insert_many("org_old", docs).await.unwrap();
        fixture.shared.reject_documents_with("poison").await;

        let config = MigrationConfig {
            batch_size: 100,
            atomic_rename_threshold: 0,
        };
        let job = fixture
            .engine(config)
            .relocate(&shared("org_old"), &shared("org_new"), 250)
            .await
            .unwrap();

        assert_eq!(job.status, MigrationStatus::CompletedWithFailures);
        assert_eq!(job.migrated_count, 150);
        assert_eq!(job.failed_count, 100);
        assert_eq!(job.success_rate(), 60.0);
        assert_eq!(fixture.shared.count_documents("org_new").await.unwrap(), 150);
        // The 100 documents of the failed batch are gone with the source.
        assert!(!fixture.shared.partition_exists("org_old").await.unwrap());
    }

    #[tokio::test]
    async fn test_partially_rejected_batch_counts_only_rejected_documents() {
        let fixture = Fixture::new();
        let mut docs = documents(250);
        docs[10].insert("poison", true);
        docs[160].insert("poison", true);
        fixture.shared.insert_many("org_old", docs).await.unwrap();
        fixture.shared.skip_documents_with("poison").await;
        let progress = Mutex::new(Vec::new());

        let config = MigrationConfig {
            batch_size: 100,
            atomic_rename_threshold: 0,
        };
        let job = fixture
            .engine(config)
            .relocate_with_progress(&shared("org_old"), &shared("org_new"), 250, &|done, total| {
                progress.lock().unwrap().push((done, total));
            })
            .await
            .unwrap();

        assert_eq!(job.status, MigrationStatus::CompletedWithFailures);
        assert_eq!(job.migrated_count, 248);
        assert_eq!(job.failed_count, 2);
        assert_eq!(fixture.shared.count_documents("org_new").await.unwrap(), 248);
        assert_eq!(*progress.lock().unwrap(), vec![(99, 250), (198, 250), (248, 250)]);
    }

    #[tokio::test]
    async fn test_rename_failure_falls_back_to_copy() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_old", documents(50)).await.unwrap();
        let original_ids: Vec<_> = fixture
            .shared
            .documents("org_old")
            .await
            .iter()
            .map(|d| d.get_object_id("_id").unwrap())
            .collect();
        fixture.shared.fail_renames(true).await;

        let job = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_old"), &shared("org_new"), 50)
            .await
            .unwrap();

        assert_eq!(job.strategy, MigrationStrategy::BatchedCopy);
        assert_eq!(job.status, MigrationStatus::Completed);
        let copied = fixture.shared.documents("org_new").await;
        assert_eq!(sequence(&copied), (0..50).collect::<Vec<i64>>());
        assert!(copied
            .iter()
            .all(|d| !original_ids.contains(&d.get_object_id("_id").unwrap())));
        assert!(!fixture.shared.partition_exists("org_old").await.unwrap());
    }

    #[tokio::test]
    async fn test_cross_database_move_copies_into_dedicated() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_acme", documents(30)).await.unwrap();
        let target = StorageLocation::for_organization("Acme", Some(TENANT_URI), Some("acme_db"));

        let job = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_acme"), &target, 30)
            .await
            .unwrap();

        assert_eq!(job.strategy, MigrationStrategy::BatchedCopy);
        assert_eq!(job.migrated_count, 30);
        let dedicated = fixture.connector.database(TENANT_URI, "acme_db");
        assert_eq!(sequence(&dedicated.documents("org_acme").await), (0..30).collect::<Vec<i64>>());
        assert!(!fixture.shared.partition_exists("org_acme").await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_reported_after_each_batch() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_acme", documents(250)).await.unwrap();
        let target = StorageLocation::for_organization("Acme", Some(TENANT_URI), Some("acme_db"));
        let calls = Mutex::new(Vec::new());

        let config = MigrationConfig {
            batch_size: 100,
            ..Default::default()
        };
        fixture
            .engine(config)
            .relocate_with_progress(&shared("org_acme"), &target, 250, &|done, total| {
                calls.lock().unwrap().push((done, total));
            })
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![(100, 250), (200, 250), (250, 250)]);
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_and_keeps_source() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_acme", documents(10)).await.unwrap();
        fixture.connector.mark_unreachable(TENANT_URI);
        let target = StorageLocation::for_organization("Acme", Some(TENANT_URI), Some("acme_db"));

        let result = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_acme"), &target, 10)
            .await;

        assert!(result.is_err());
        assert_eq!(fixture.shared.count_documents("org_acme").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_same_location_is_a_no_op() {
        let fixture = Fixture::new();
        fixture.shared.insert_many("org_acme", documents(5)).await.unwrap();

        let job = fixture
            .engine(MigrationConfig::default())
            .relocate(&shared("org_acme"), &shared("org_acme"), 5)
            .await
            .unwrap();

        assert_eq!(job.status, MigrationStatus::Completed);
        assert_eq!(fixture.shared.count_documents("org_acme").await.unwrap(), 5);
    }

    #[test]
    fn test_config_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.atomic_rename_threshold, 10_000);
    }
}
