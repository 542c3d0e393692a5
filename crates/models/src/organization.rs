use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::slug::partition_name_for;

/// Organization (tenant) metadata record, one per organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    #[serde(with = "id_as_string")]
    pub id: Uuid,
    pub name: String,
    pub storage_location: StorageLocation,
    pub admin: AdminAccount,
    pub status: OrganizationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record ids are hyphenated strings in every serializer, binary or not
pub mod id_as_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&id.hyphenated())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uuid::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}

impl OrganizationRecord {
    /// Build a record that has not been made visible yet.
    pub fn provisioning(
        name: &str,
        storage_location: StorageLocation,
        admin_email: &str,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            storage_location,
            admin: AdminAccount {
                email: admin_email.to_string(),
                password_hash,
                created_at: now,
            },
            status: OrganizationStatus::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Active
    }

    pub fn partition_name(&self) -> &str {
        self.storage_location.partition_name()
    }
}

/// Organization admin credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAccount")
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Lifecycle status of an organization record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    Provisioning,
    Active,
    Deleted,
}

impl OrganizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

/// Where an organization's documents physically live
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageLocation {
    /// Own partition inside the shared database
    Shared { partition_name: String },
    /// Own partition inside a dedicated database
    Dedicated {
        partition_name: String,
        connection_uri: String,
        database_name: String,
    },
}

impl StorageLocation {
    /// Location for an organization name; dedicated only when both the URI and
    /// the database name are supplied.
    pub fn for_organization(
        name: &str,
        dedicated_uri: Option<&str>,
        dedicated_db_name: Option<&str>,
    ) -> Self {
        let partition_name = partition_name_for(name);
        match (dedicated_uri, dedicated_db_name) {
            (Some(uri), Some(db_name)) => Self::Dedicated {
                partition_name,
                connection_uri: uri.to_string(),
                database_name: db_name.to_string(),
            },
            _ => Self::Shared { partition_name },
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Shared { .. } => StorageKind::Shared,
            Self::Dedicated { .. } => StorageKind::Dedicated,
        }
    }

    pub fn partition_name(&self) -> &str {
        match self {
            Self::Shared { partition_name } | Self::Dedicated { partition_name, .. } => {
                partition_name
            }
        }
    }

    /// `(connection_uri, database_name)` for dedicated locations
    pub fn dedicated_target(&self) -> Option<(&str, &str)> {
        match self {
            Self::Shared { .. } => None,
            Self::Dedicated {
                connection_uri,
                database_name,
                ..
            } => Some((connection_uri, database_name)),
        }
    }

    /// Whether both locations live in the same physical database
    pub fn same_database(&self, other: &StorageLocation) -> bool {
        self.dedicated_target() == other.dedicated_target()
    }

    /// Same database, different partition
    pub fn with_partition(&self, partition_name: String) -> Self {
        match self {
            Self::Shared { .. } => Self::Shared { partition_name },
            Self::Dedicated {
                connection_uri,
                database_name,
                ..
            } => Self::Dedicated {
                partition_name,
                connection_uri: connection_uri.clone(),
                database_name: database_name.clone(),
            },
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared { partition_name } => write!(f, "shared/{}", partition_name),
            Self::Dedicated {
                partition_name,
                database_name,
                ..
            } => write!(f, "dedicated:{}/{}", database_name, partition_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Shared,
    Dedicated,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Dedicated => "dedicated",
        }
    }
}

/// Unique field that collided on insert or update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictField {
    Name,
    Email,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated input for creating an organization
#[derive(Clone)]
pub struct NewOrganization {
    pub name: String,
    pub admin_email: String,
    pub admin_password: String,
    pub dedicated_uri: Option<String>,
    pub dedicated_db_name: Option<String>,
}

impl NewOrganization {
    pub fn shared(name: &str, admin_email: &str, admin_password: &str) -> Self {
        Self {
            name: name.to_string(),
            admin_email: admin_email.to_string(),
            admin_password: admin_password.to_string(),
            dedicated_uri: None,
            dedicated_db_name: None,
        }
    }

    pub fn dedicated(mut self, uri: &str, db_name: &str) -> Self {
        self.dedicated_uri = Some(uri.to_string());
        self.dedicated_db_name = Some(db_name.to_string());
        self
    }

    pub fn storage_location(&self) -> StorageLocation {
        StorageLocation::for_organization(
            &self.name,
            self.dedicated_uri.as_deref(),
            self.dedicated_db_name.as_deref(),
        )
    }
}

impl fmt::Debug for NewOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewOrganization")
            .field("name", &self.name)
            .field("admin_email", &self.admin_email)
            .field("dedicated", &self.dedicated_uri.is_some())
            .finish()
    }
}

/// Successful admin authentication, handed to token issuance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub admin_email: String,
    pub storage_location: StorageLocation,
}

impl From<&OrganizationRecord> for AuthResult {
    fn from(record: &OrganizationRecord) -> Self {
        Self {
            tenant_id: record.id,
            tenant_name: record.name.clone(),
            admin_email: record.admin.email.clone(),
            storage_location: record.storage_location.clone(),
        }
    }
}
