//! Organization lifecycle
//!
//! Composes the directory, the connection registry and the migration engine
//! into create / rename / retarget / delete / authenticate. The directory's
//! unique indexes are the only concurrency control: racing creates for one
//! name are settled by whichever insert lands first.

use orgdb_auth::CredentialHasher;
use orgdb_database::{
    initialize_partition, redact_uri, ConnectionRegistry, DirectoryStats, MigrationConfig,
    MigrationEngine, OrganizationPatch, TenantDirectory,
};
use orgdb_models::{
    partition_name_for, AuthResult, ConflictField, MigrationJob, NewOrganization,
    OrganizationRecord, StorageLocation, UpdateOrganizationRequest,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, TenantError};

/// Requested changes to an existing organization
#[derive(Clone, Default)]
pub struct UpdateOrganization {
    pub new_name: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub dedicated_uri: Option<String>,
    pub dedicated_db_name: Option<String>,
}

impl From<UpdateOrganizationRequest> for UpdateOrganization {
    fn from(request: UpdateOrganizationRequest) -> Self {
        Self {
            new_name: request.new_organization_name,
            admin_email: request.email,
            admin_password: request.password,
            dedicated_uri: request.db_uri,
            dedicated_db_name: request.db_name,
        }
    }
}

/// Record after a move, with the migration that moved its documents (if any)
#[derive(Debug, Clone)]
pub struct Relocation {
    pub record: OrganizationRecord,
    pub migration: Option<MigrationJob>,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub record: OrganizationRecord,
    pub migrations: Vec<MigrationJob>,
}

impl UpdateOutcome {
    /// Migrations that left documents behind
    pub fn partial_migrations(&self) -> impl Iterator<Item = &MigrationJob> {
        self.migrations.iter().filter(|job| job.has_failures())
    }
}

pub struct TenantLifecycle {
    directory: Arc<dyn TenantDirectory>,
    registry: Arc<ConnectionRegistry>,
    migrations: MigrationEngine,
    hasher: Arc<dyn CredentialHasher>,
}

impl TenantLifecycle {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        registry: Arc<ConnectionRegistry>,
        migration_config: MigrationConfig,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            migrations: MigrationEngine::new(registry.clone(), migration_config),
            directory,
            registry,
            hasher,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.directory.exists(name).await?)
    }

    pub async fn get(&self, name: &str) -> Result<OrganizationRecord> {
        Ok(self.directory.get(name).await?)
    }

    pub async fn stats(&self) -> Result<DirectoryStats> {
        Ok(self.directory.stats().await?)
    }

    /// Shared database liveness
    pub async fn health_check(&self) -> Result<()> {
        Ok(self.registry.shared().ping().await?)
    }

    /// Provision a new organization and its partition.
    ///
    /// The record is reserved as `provisioning` before any partition is
    /// touched, so a create that loses the name or email race has nothing
    /// physical to undo.
    ///
    /// If a failed create cannot discard its reservation either, the
    /// `provisioning` record stays behind and keeps holding the name and
    /// email under the unique indexes while `exists` reports `false`. Nothing
    /// reclaims it automatically; it is logged at `error` with its id and has
    /// to be removed by hand.
    pub async fn create(&self, new: NewOrganization) -> Result<OrganizationRecord> {
        if self.directory.exists(&new.name).await? {
            return Err(TenantError::Conflict(ConflictField::Name));
        }

        let location = new.storage_location();
        self.ensure_reachable(&location).await?;

        let password_hash = self.hasher.hash(&new.admin_password)?;
        let reservation =
            OrganizationRecord::provisioning(&new.name, location, &new.admin_email, password_hash);
        self.directory.insert(&reservation).await?;

        let created = match self.initialize_partition(&reservation.storage_location).await {
            Ok(created) => created,
            Err(e) => {
                self.discard_reservation(reservation.id).await;
                return Err(e);
            }
        };

        match self.directory.activate(reservation.id).await {
            Ok(record) => {
                tracing::info!(
                    org_name = %record.name,
                    location = %record.storage_location,
                    "Organization created"
                );
                Ok(record)
            }
            Err(e) => {
                if created {
                    self.drop_partition(&reservation.storage_location).await;
                }
                self.discard_reservation(reservation.id).await;
                Err(e.into())
            }
        }
    }

    /// Rename an organization, moving its partition to the new name's slug
    pub async fn rename(&self, name: &str, new_name: &str) -> Result<Relocation> {
        let record = self.directory.get(name).await?;
        if new_name == name {
            return Ok(Relocation {
                record,
                migration: None,
            });
        }
        if self.directory.exists(new_name).await? {
            return Err(TenantError::Conflict(ConflictField::Name));
        }

        let target = record
            .storage_location
            .with_partition(partition_name_for(new_name));
        self.relocate(record, target, Some(new_name)).await
    }

    /// Change admin email and/or password; no data moves
    pub async fn update_credentials(
        &self,
        name: &str,
        admin_email: Option<&str>,
        admin_password: Option<&str>,
    ) -> Result<OrganizationRecord> {
        let record = self.directory.get(name).await?;

        let mut patch = OrganizationPatch {
            admin_email: admin_email.map(str::to_string),
            ..Default::default()
        };
        if let Some(password) = admin_password {
            patch.admin_password_hash = Some(self.hasher.hash(password)?);
        }
        if patch.is_empty() {
            return Ok(record);
        }

        let updated = self.directory.update(record.id, patch).await?;
        tracing::info!(org_name = %updated.name, "Organization credentials updated");
        Ok(updated)
    }

    /// Move an organization into a (new) dedicated database, keeping its partition name
    pub async fn update_dedicated_target(
        &self,
        name: &str,
        connection_uri: &str,
        database_name: &str,
    ) -> Result<Relocation> {
        let record = self.directory.get(name).await?;
        let target = StorageLocation::Dedicated {
            partition_name: record.partition_name().to_string(),
            connection_uri: connection_uri.to_string(),
            database_name: database_name.to_string(),
        };
        if target == record.storage_location {
            return Ok(Relocation {
                record,
                migration: None,
            });
        }

        self.ensure_reachable(&target).await?;
        self.relocate(record, target, None).await
    }

    /// Apply credentials, then dedicated target, then rename
    pub async fn update(&self, name: &str, changes: UpdateOrganization) -> Result<UpdateOutcome> {
        let mut record = self.directory.get(name).await?;
        let mut migrations = Vec::new();

        if changes.admin_email.is_some() || changes.admin_password.is_some() {
            record = self
                .update_credentials(
                    &record.name,
                    changes.admin_email.as_deref(),
                    changes.admin_password.as_deref(),
                )
                .await?;
        }

        if let (Some(uri), Some(db_name)) = (&changes.dedicated_uri, &changes.dedicated_db_name) {
            let moved = self.update_dedicated_target(&record.name, uri, db_name).await?;
            record = moved.record;
            migrations.extend(moved.migration);
        }

        if let Some(new_name) = &changes.new_name {
            let moved = self.rename(&record.name, new_name).await?;
            record = moved.record;
            migrations.extend(moved.migration);
        }

        Ok(UpdateOutcome { record, migrations })
    }

    /// Remove the record, then drop the partition best effort.
    ///
    /// A failed drop leaves an orphaned partition behind; the record stays deleted.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let record = match self.directory.delete(name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        self.drop_partition(&record.storage_location).await;
        tracing::info!(org_name = %record.name, "Organization deleted");
        Ok(true)
    }

    /// `None` for an unknown email or a wrong password alike
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<AuthResult>> {
        let Some(record) = self.directory.find_by_email(email).await? else {
            return Ok(None);
        };
        if !self.hasher.verify(password, &record.admin.password_hash)? {
            return Ok(None);
        }
        Ok(Some(AuthResult::from(&record)))
    }

    /// Move the documents, then point the record at the new location.
    ///
    /// If the record update fails the documents are moved back first.
    async fn relocate(
        &self,
        record: OrganizationRecord,
        target: StorageLocation,
        new_name: Option<&str>,
    ) -> Result<Relocation> {
        let name = new_name.unwrap_or(&record.name).to_string();
        let source = record.storage_location.clone();

        if source == target {
            let updated = self
                .directory
                .update(
                    record.id,
                    OrganizationPatch {
                        name: Some(name),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(Relocation {
                record: updated,
                migration: None,
            });
        }

        let count = self.partition_count(&source).await?;
        let job = self.migrations.relocate(&source, &target, count).await?;
        if job.has_failures() {
            tracing::warn!(
                org_name = %record.name,
                migrated = job.migrated_count,
                failed = job.failed_count,
                "Relocation completed with failures"
            );
        }

        match self
            .directory
            .update(record.id, OrganizationPatch::relocated(&name, target.clone()))
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    org_name = %updated.name,
                    from = %source,
                    to = %target,
                    "Organization relocated"
                );
                Ok(Relocation {
                    record: updated,
                    migration: Some(job),
                })
            }
            Err(e) => {
                tracing::warn!(
                    org_name = %record.name,
                    error = %e,
                    "Directory update failed after relocation, moving documents back"
                );
                let moved = self.partition_count(&target).await.unwrap_or(job.migrated_count);
                if let Err(undo) = self.migrations.relocate(&target, &source, moved).await {
                    tracing::error!(
                        org_name = %record.name,
                        error = %undo,
                        "Failed to move documents back"
                    );
                }
                Err(e.into())
            }
        }
    }

    async fn ensure_reachable(&self, location: &StorageLocation) -> Result<()> {
        if let Some((uri, database_name)) = location.dedicated_target() {
            if !self.registry.probe_default(uri, database_name).await {
                return Err(TenantError::ConnectionFailure(format!(
                    "{}/{}",
                    redact_uri(uri),
                    database_name
                )));
            }
        }
        Ok(())
    }

    async fn partition_count(&self, location: &StorageLocation) -> Result<u64> {
        let database = self.registry.resolve_location(location).await?;
        Ok(database.count_documents(location.partition_name()).await?)
    }

    async fn initialize_partition(&self, location: &StorageLocation) -> Result<bool> {
        let database = self.registry.resolve_location(location).await?;
        Ok(initialize_partition(database.as_ref(), location.partition_name()).await?)
    }

    async fn drop_partition(&self, location: &StorageLocation) {
        let result = match self.registry.resolve_location(location).await {
            Ok(database) => database.drop_partition(location.partition_name()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                location = %location,
                error = %e,
                "Failed to drop partition, left orphaned"
            );
        }
    }

    async fn discard_reservation(&self, id: Uuid) {
        if let Err(e) = self.directory.discard(id).await {
            tracing::error!(id = %id, error = %e, "Failed to discard provisioning record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Document};
    use orgdb_auth::AuthError;
    use orgdb_database::{
        ConnectionPoolConfig, DocumentDatabase, InMemoryConnector, InMemoryDatabase,
        InMemoryTenantDirectory,
    };
    use orgdb_models::{MigrationStatus, MigrationStrategy, OrganizationStatus, StorageKind};

    const TENANT_URI: &str = "mongodb://tenant-host:27017";

    /// Reversible stand-in so tests don't pay for argon2
    struct FakeHasher;

    impl CredentialHasher for FakeHasher {
        fn hash(&self, password: &str) -> orgdb_auth::Result<String> {
            Ok(format!("fake${}", password.chars().rev().collect::<String>()))
        }

        fn verify(&self, password: &str, hash: &str) -> orgdb_auth::Result<bool> {
            let stored = hash
                .strip_prefix("fake$")
                .ok_or_else(|| AuthError::PasswordHashError("unknown scheme".to_string()))?;
            Ok(stored.chars().rev().collect::<String>() == password)
        }
    }

    struct Fixture {
        lifecycle: Arc<TenantLifecycle>,
        directory: Arc<InMemoryTenantDirectory>,
        shared: Arc<InMemoryDatabase>,
        connector: Arc<InMemoryConnector>,
    }

    fn fixture() -> Fixture {
        fixture_with(MigrationConfig::default())
    }

    fn fixture_with(config: MigrationConfig) -> Fixture {
        let shared = Arc::new(InMemoryDatabase::new("master_db"));
        let connector = Arc::new(InMemoryConnector::new());
        let directory = Arc::new(InMemoryTenantDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new(
            shared.clone(),
            connector.clone(),
            ConnectionPoolConfig::default(),
        ));
        let lifecycle = Arc::new(TenantLifecycle::new(
            directory.clone(),
            registry,
            config,
            Arc::new(FakeHasher),
        ));

        Fixture {
            lifecycle,
            directory,
            shared,
            connector,
        }
    }

    fn acme() -> NewOrganization {
        NewOrganization::shared("Acme", "admin@acme.io", "Sup3rSecret")
    }

    fn documents(count: usize) -> Vec<Document> {
        (0..count).map(|i| doc! { "seq": i as i64 }).collect()
    }

    #[tokio::test]
    async fn test_exists_follows_lifecycle() {
        let f = fixture();
        assert!(!f.lifecycle.exists("Acme").await.unwrap());

        f.lifecycle.create(acme()).await.unwrap();
        assert!(f.lifecycle.exists("Acme").await.unwrap());

        assert!(f.lifecycle.delete("Acme").await.unwrap());
        assert!(!f.lifecycle.exists("Acme").await.unwrap());
        assert!(!f.lifecycle.delete("Acme").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_round_trip() {
        let f = fixture();
        let created = f.lifecycle.create(acme()).await.unwrap();
        assert_eq!(created.status, OrganizationStatus::Active);

        let fetched = f.lifecycle.get("Acme").await.unwrap();
        assert_eq!(fetched.name, "Acme");
        assert_eq!(fetched.admin.email, "admin@acme.io");
        assert_eq!(
            fetched.storage_location,
            StorageLocation::Shared {
                partition_name: "org_acme".to_string()
            }
        );
        assert_ne!(fetched.admin.password_hash, "Sup3rSecret");
        assert!(f.shared.partition_exists("org_acme").await.unwrap());
        assert_eq!(f.shared.indexes("org_acme").await, vec!["created_at"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_leaves_no_orphan_partition() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        let before = f.shared.list_partitions().await.unwrap();

        let err = f
            .lifecycle
            .create(NewOrganization::shared("Acme", "other@acme.io", "Sup3rSecret"))
            .await
            .unwrap_err();

        assert!(matches!(err, TenantError::Conflict(ConflictField::Name)));
        assert_eq!(f.shared.list_partitions().await.unwrap(), before);
        assert_eq!(f.directory.all_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();

        let err = f
            .lifecycle
            .create(NewOrganization::shared("Globex", "admin@acme.io", "Sup3rSecret"))
            .await
            .unwrap_err();

        assert!(matches!(err, TenantError::Conflict(ConflictField::Email)));
        assert!(!f.shared.partition_exists("org_globex").await.unwrap());
        assert_eq!(f.directory.all_records().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_creates_have_one_winner() {
        let f = fixture();

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let lifecycle = f.lifecycle.clone();
                tokio::spawn(async move {
                    lifecycle
                        .create(NewOrganization::shared(
                            "Acme",
                            &format!("admin{}@acme.io", i),
                            "Sup3rSecret",
                        ))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for attempt in futures::future::join_all(attempts).await {
            match attempt.unwrap() {
                Ok(_) => successes += 1,
                Err(TenantError::Conflict(ConflictField::Name)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(f.shared.list_partitions().await.unwrap(), vec!["org_acme"]);
        assert_eq!(f.directory.all_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_dedicated() {
        let f = fixture();
        let record = f
            .lifecycle
            .create(acme().dedicated(TENANT_URI, "acme_db"))
            .await
            .unwrap();

        assert_eq!(record.storage_location.kind(), StorageKind::Dedicated);
        let dedicated = f.connector.database(TENANT_URI, "acme_db");
        assert!(dedicated.partition_exists("org_acme").await.unwrap());
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_dedicated_target_aborts_before_any_write() {
        let f = fixture();
        f.connector.mark_unreachable(TENANT_URI);

        let err = f
            .lifecycle
            .create(acme().dedicated(TENANT_URI, "acme_db"))
            .await
            .unwrap_err();

        assert!(matches!(err, TenantError::ConnectionFailure(_)));
        assert!(f.directory.all_records().await.is_empty());
        assert!(f.shared.list_partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_small_rename_renames_partition() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(500)).await.unwrap();
        let before = f.shared.documents("org_acme").await;

        let moved = f.lifecycle.rename("Acme", "Acme Labs").await.unwrap();

        let job = moved.migration.unwrap();
        assert_eq!(job.strategy, MigrationStrategy::AtomicRename);
        assert_eq!(job.migrated_count, 500);
        assert_eq!(moved.record.name, "Acme Labs");
        assert_eq!(moved.record.partition_name(), "org_acme_labs");
        assert_eq!(f.shared.documents("org_acme_labs").await, before);
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
        assert!(matches!(
            f.lifecycle.get("Acme").await.unwrap_err(),
            TenantError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_large_rename_uses_batched_copy() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(12_000)).await.unwrap();

        let moved = f.lifecycle.rename("Acme", "Acme Labs").await.unwrap();

        let job = moved.migration.unwrap();
        assert_eq!(job.strategy, MigrationStrategy::BatchedCopy);
        assert_eq!(job.migrated_count + job.failed_count, 12_000);
        assert_eq!(job.status, MigrationStatus::Completed);
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
        assert_eq!(f.shared.count_documents("org_acme_labs").await.unwrap(), 12_000);
    }

    #[tokio::test]
    async fn test_rename_with_failed_batches_still_moves_metadata() {
        let f = fixture_with(MigrationConfig {
            batch_size: 100,
            atomic_rename_threshold: 0,
        });
        f.lifecycle.create(acme()).await.unwrap();
        let mut docs = documents(300);
        docs[42].insert("poison", true);
        f.shared.insert_many("org_acme", docs).await.unwrap();
        f.shared.reject_documents_with("poison").await;

        let moved = f.lifecycle.rename("Acme", "Acme Labs").await.unwrap();

        let job = moved.migration.unwrap();
        assert_eq!(job.status, MigrationStatus::CompletedWithFailures);
        assert_eq!(job.failed_count, 100);
        assert_eq!(moved.record.name, "Acme Labs");
        // Documents of the failed batch are lost with the dropped source.
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
        assert_eq!(f.shared.count_documents("org_acme_labs").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_rename_to_taken_name_conflicts_without_moving_data() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.lifecycle
            .create(NewOrganization::shared("Globex", "admin@globex.io", "Sup3rSecret"))
            .await
            .unwrap();
        f.shared.insert_many("org_acme", documents(10)).await.unwrap();

        let err = f.lifecycle.rename("Acme", "Globex").await.unwrap_err();

        assert!(matches!(err, TenantError::Conflict(ConflictField::Name)));
        assert_eq!(f.shared.count_documents("org_acme").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_rename_edge_cases() {
        let f = fixture();
        f.lifecycle
            .create(NewOrganization::shared("Acme Corp", "admin@acme.io", "Sup3rSecret"))
            .await
            .unwrap();

        let unchanged = f.lifecycle.rename("Acme Corp", "Acme Corp").await.unwrap();
        assert!(unchanged.migration.is_none());

        // Same slug: only the name changes
        let renamed = f.lifecycle.rename("Acme Corp", "acme-corp").await.unwrap();
        assert!(renamed.migration.is_none());
        assert_eq!(renamed.record.name, "acme-corp");
        assert_eq!(renamed.record.partition_name(), "org_acme_corp");

        assert!(matches!(
            f.lifecycle.rename("Missing", "Other").await.unwrap_err(),
            TenantError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_failed_initialization_releases_reservation() {
        let f = fixture();
        f.shared.fail_indexes(true).await;

        assert!(f.lifecycle.create(acme()).await.is_err());
        assert!(f.directory.all_records().await.is_empty());
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());

        f.shared.fail_indexes(false).await;
        let record = f.lifecycle.create(acme()).await.unwrap();
        assert!(record.is_active());
    }

    #[tokio::test]
    async fn test_slug_collisions_share_a_partition() {
        let f = fixture();
        let first = f
            .lifecycle
            .create(NewOrganization::shared("Acme Corp", "a@acme.io", "Sup3rSecret"))
            .await
            .unwrap();
        let second = f
            .lifecycle
            .create(NewOrganization::shared("acme.corp", "b@acme.io", "Sup3rSecret"))
            .await
            .unwrap();

        assert_eq!(first.partition_name(), second.partition_name());
    }

    #[tokio::test]
    async fn test_move_to_dedicated_target() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(25)).await.unwrap();

        let moved = f
            .lifecycle
            .update_dedicated_target("Acme", TENANT_URI, "acme_db")
            .await
            .unwrap();

        assert_eq!(moved.migration.unwrap().strategy, MigrationStrategy::BatchedCopy);
        assert_eq!(
            moved.record.storage_location.dedicated_target(),
            Some((TENANT_URI, "acme_db"))
        );
        let dedicated = f.connector.database(TENANT_URI, "acme_db");
        assert_eq!(dedicated.count_documents("org_acme").await.unwrap(), 25);
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_to_unreachable_target_keeps_data() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(5)).await.unwrap();
        f.connector.mark_unreachable(TENANT_URI);

        let err = f
            .lifecycle
            .update_dedicated_target("Acme", TENANT_URI, "acme_db")
            .await
            .unwrap_err();

        assert!(matches!(err, TenantError::ConnectionFailure(_)));
        assert_eq!(f.shared.count_documents("org_acme").await.unwrap(), 5);
        assert_eq!(
            f.lifecycle.get("Acme").await.unwrap().storage_location.kind(),
            StorageKind::Shared
        );
    }

    #[tokio::test]
    async fn test_authenticate() {
        let f = fixture();
        let record = f.lifecycle.create(acme()).await.unwrap();

        let auth = f
            .lifecycle
            .authenticate("admin@acme.io", "Sup3rSecret")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth.tenant_id, record.id);
        assert_eq!(auth.tenant_name, "Acme");
        assert_eq!(auth.storage_location, record.storage_location);

        assert!(f
            .lifecycle
            .authenticate("admin@acme.io", "WrongPass1")
            .await
            .unwrap()
            .is_none());
        assert!(f
            .lifecycle
            .authenticate("nobody@acme.io", "Sup3rSecret")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_credentials() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();

        f.lifecycle
            .update_credentials("Acme", Some("owner@acme.io"), Some("N3wSecret!"))
            .await
            .unwrap();

        assert!(f
            .lifecycle
            .authenticate("admin@acme.io", "Sup3rSecret")
            .await
            .unwrap()
            .is_none());
        assert!(f
            .lifecycle
            .authenticate("owner@acme.io", "N3wSecret!")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_update_credentials_email_conflict() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.lifecycle
            .create(NewOrganization::shared("Globex", "admin@globex.io", "Sup3rSecret"))
            .await
            .unwrap();

        let err = f
            .lifecycle
            .update_credentials("Acme", Some("admin@globex.io"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Conflict(ConflictField::Email)));
    }

    #[tokio::test]
    async fn test_composite_update_applies_every_change() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(20)).await.unwrap();

        let outcome = f
            .lifecycle
            .update(
                "Acme",
                UpdateOrganization {
                    new_name: Some("Acme Labs".to_string()),
                    admin_password: Some("N3wSecret!".to_string()),
                    dedicated_uri: Some(TENANT_URI.to_string()),
                    dedicated_db_name: Some("acme_db".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.name, "Acme Labs");
        assert_eq!(outcome.migrations.len(), 2);
        assert_eq!(outcome.partial_migrations().count(), 0);
        let dedicated = f.connector.database(TENANT_URI, "acme_db");
        assert_eq!(dedicated.count_documents("org_acme_labs").await.unwrap(), 20);
        assert!(f
            .lifecycle
            .authenticate("admin@acme.io", "N3wSecret!")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_drops_partition() {
        let f = fixture();
        f.lifecycle.create(acme()).await.unwrap();
        f.shared.insert_many("org_acme", documents(3)).await.unwrap();

        assert!(f.lifecycle.delete("Acme").await.unwrap());
        assert!(!f.shared.partition_exists("org_acme").await.unwrap());
        assert_eq!(f.lifecycle.stats().await.unwrap().total, 0);
    }
}
