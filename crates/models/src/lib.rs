// Core modules
pub mod organization;
pub mod migration;
pub mod requests;
pub mod slug;

// Re-export commonly used types
pub use organization::{
    AdminAccount, AuthResult, ConflictField, NewOrganization, OrganizationRecord,
    OrganizationStatus, StorageKind, StorageLocation,
};
pub use migration::{MigrationJob, MigrationStatus, MigrationStrategy};
pub use requests::{AdminLoginRequest, CreateOrganizationRequest, UpdateOrganizationRequest};
pub use slug::{partition_name_for, slugify};
