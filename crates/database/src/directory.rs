//! Tenant directory: the single source of truth for organization metadata
//!
//! Two unique constraints, on `name` and on `admin.email`, are the durable
//! enforcement point for every same-name race. Records that are still
//! `provisioning` hold their name and email but are invisible to readers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orgdb_models::{OrganizationRecord, OrganizationStatus, StorageLocation};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

/// Collection holding organization records in the master database
pub const ORGANIZATIONS_COLLECTION: &str = "organizations";

pub const NAME_UNIQUE_INDEX: &str = "idx_organization_name_unique";
pub const EMAIL_UNIQUE_INDEX: &str = "idx_admin_email_unique";
pub const CREATED_AT_INDEX: &str = "idx_created_at";
pub const STORAGE_KIND_INDEX: &str = "idx_storage_kind";

/// Partial update of an organization record; `None` fields are left alone
#[derive(Debug, Clone, Default)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub storage_location: Option<StorageLocation>,
    pub admin_email: Option<String>,
    pub admin_password_hash: Option<String>,
    pub status: Option<OrganizationStatus>,
}

impl OrganizationPatch {
    pub fn activate() -> Self {
        Self {
            status: Some(OrganizationStatus::Active),
            ..Default::default()
        }
    }

    pub fn relocated(name: &str, storage_location: StorageLocation) -> Self {
        Self {
            name: Some(name.to_string()),
            storage_location: Some(storage_location),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.storage_location.is_none()
            && self.admin_email.is_none()
            && self.admin_password_hash.is_none()
            && self.status.is_none()
    }

    /// Apply the patch to an in-memory copy of a record
    pub fn apply_to(&self, record: &mut OrganizationRecord, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(location) = &self.storage_location {
            record.storage_location = location.clone();
        }
        if let Some(email) = &self.admin_email {
            record.admin.email = email.clone();
        }
        if let Some(hash) = &self.admin_password_hash {
            record.admin.password_hash = hash.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        record.updated_at = now;
    }
}

/// Counts of visible organizations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub total: u64,
    pub shared: u64,
    pub dedicated: u64,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Create the unique and lookup indexes (run at startup)
    async fn ensure_indexes(&self) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Active record by name, `NotFound` otherwise
    async fn get(&self, name: &str) -> Result<OrganizationRecord>;

    async fn find_by_email(&self, email: &str) -> Result<Option<OrganizationRecord>>;

    /// Persist a record atomically; `Conflict(field)` names the colliding field
    async fn insert(&self, record: &OrganizationRecord) -> Result<Uuid>;

    /// Update any record by id (including provisioning ones) and return the result
    async fn update(&self, id: Uuid, patch: OrganizationPatch) -> Result<OrganizationRecord>;

    /// Flip a provisioning reservation to active
    async fn activate(&self, id: Uuid) -> Result<OrganizationRecord> {
        self.update(id, OrganizationPatch::activate()).await
    }

    /// Remove an active record by name and return it
    async fn delete(&self, name: &str) -> Result<OrganizationRecord>;

    /// Drop a record by id regardless of status, used to release a failed reservation
    async fn discard(&self, id: Uuid) -> Result<()>;

    async fn stats(&self) -> Result<DirectoryStats>;
}
