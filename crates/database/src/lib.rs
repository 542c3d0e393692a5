pub mod connection;
pub mod directory;
pub mod error;
pub mod memory;
pub mod migration;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod registry;
pub mod store;

pub use connection::{ConnectionPoolConfig, DatabaseConfig, PoolSettings};
pub use directory::{DirectoryStats, OrganizationPatch, TenantDirectory};
pub use error::{DatabaseError, Result};
pub use memory::{InMemoryConnector, InMemoryDatabase, InMemoryTenantDirectory};
pub use migration::{MigrationConfig, MigrationEngine, ProgressFn};
#[cfg(feature = "mongo")]
pub use mongo::{MongoConnector, MongoDatabase, MongoTenantDirectory};
pub use registry::{redact_uri, ConnectionRegistry, RegistryStats, TenantConnectionKey};
pub use store::{initialize_partition, DatabaseConnector, DocumentDatabase, DocumentStream};
