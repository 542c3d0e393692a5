//! Connection registry
//!
//! Owns the shared database handle and every live connection to dedicated
//! tenant databases. Dedicated connections are cached per `(uri, database)`
//! and reused by all callers until they are evicted or the process shuts down.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ConnectionRegistry                      │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  Shared DB handle (directory + shared partitions)   │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  Dedicated connection cache, (uri, database) keys   │  │
//! │  │  ┌───────────┐  ┌───────────┐  ┌───────────┐       │  │
//! │  │  │ host-a/db1│  │ host-a/db2│  │ host-b/db1│  ...  │  │
//! │  │  └───────────┘  └───────────┘  └───────────┘       │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use moka::future::Cache;
use orgdb_models::{OrganizationRecord, StorageLocation};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{ConnectionPoolConfig, PoolSettings};
use crate::error::{DatabaseError, Result};
use crate::store::{DatabaseConnector, DocumentDatabase};

/// Cache key of a dedicated tenant connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantConnectionKey {
    pub uri: String,
    pub database_name: String,
}

impl TenantConnectionKey {
    pub fn new(uri: &str, database_name: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database_name: database_name.to_string(),
        }
    }
}

impl fmt::Display for TenantConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", redact_uri(&self.uri), self.database_name)
    }
}

/// Strip the userinfo part of a connection string so it can be logged
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|i| i + 3) else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***{}", &uri[..scheme_end], &rest[at..]),
        None => uri.to_string(),
    }
}

/// Registry statistics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegistryStats {
    pub count: usize,
    pub keys: Vec<String>,
}

pub struct ConnectionRegistry {
    /// Master database handle, also home of every shared partition
    shared: Arc<dyn DocumentDatabase>,
    connector: Arc<dyn DatabaseConnector>,
    /// Cached dedicated connections
    connections: Cache<TenantConnectionKey, Arc<dyn DocumentDatabase>>,
    config: ConnectionPoolConfig,
}

impl ConnectionRegistry {
    pub fn new(
        shared: Arc<dyn DocumentDatabase>,
        connector: Arc<dyn DatabaseConnector>,
        config: ConnectionPoolConfig,
    ) -> Self {
        // No capacity or TTL: entries only leave through evict/close_all, so a
        // handle is never dropped while a caller may still be using it.
        let connections = Cache::builder().build();

        Self {
            shared,
            connector,
            connections,
            config,
        }
    }

    pub fn shared(&self) -> Arc<dyn DocumentDatabase> {
        self.shared.clone()
    }

    pub fn config(&self) -> &ConnectionPoolConfig {
        &self.config
    }

    /// Handle for the database holding a tenant's partition
    pub async fn resolve(&self, record: &OrganizationRecord) -> Result<Arc<dyn DocumentDatabase>> {
        self.resolve_location(&record.storage_location).await
    }

    pub async fn resolve_location(
        &self,
        location: &StorageLocation,
    ) -> Result<Arc<dyn DocumentDatabase>> {
        match location.dedicated_target() {
            None => Ok(self.shared.clone()),
            Some((uri, database_name)) => self.dedicated(uri, database_name).await,
        }
    }

    async fn dedicated(&self, uri: &str, database_name: &str) -> Result<Arc<dyn DocumentDatabase>> {
        let key = TenantConnectionKey::new(uri, database_name);
        let label = key.to_string();

        // Concurrent first accesses share one initialization; errors are not cached.
        self.connections
            .try_get_with(key, async {
                let database = self
                    .connector
                    .connect(uri, database_name, &self.config.tenant_pool)
                    .await?;
                tracing::info!(connection = %label, "Opened dedicated tenant connection");
                Ok::<_, DatabaseError>(database)
            })
            .await
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "Failed to connect to tenant database {}: {}",
                    label, e
                ))
            })
    }

    /// Check that a dedicated target is reachable without caching anything.
    ///
    /// Never fails: any connectivity, auth or timeout problem yields `false`.
    pub async fn probe(&self, uri: &str, database_name: &str, timeout: Duration) -> bool {
        let settings = PoolSettings::probe(timeout);
        let attempt = async {
            let database = self.connector.connect(uri, database_name, &settings).await?;
            let result = database.ping().await;
            if let Err(e) = database.close().await {
                tracing::debug!(error = %e, "Failed to close probe connection");
            }
            result
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    uri = %redact_uri(uri),
                    db_name = database_name,
                    error = %e,
                    "Dedicated database probe failed"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    uri = %redact_uri(uri),
                    db_name = database_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Dedicated database probe timed out"
                );
                false
            }
        }
    }

    /// Probe with the configured timeout
    pub async fn probe_default(&self, uri: &str, database_name: &str) -> bool {
        self.probe(uri, database_name, self.config.probe_timeout).await
    }

    /// Close and forget one cached connection; `false` if nothing was cached
    pub async fn evict(&self, uri: &str, database_name: &str) -> bool {
        let key = TenantConnectionKey::new(uri, database_name);
        match self.connections.remove(&key).await {
            Some(database) => {
                if let Err(e) = database.close().await {
                    tracing::warn!(connection = %key, error = %e, "Failed to close evicted connection");
                }
                true
            }
            None => false,
        }
    }

    /// Close every cached connection and clear the cache.
    ///
    /// Must run once, after in-flight requests have drained.
    pub async fn close_all(&self) {
        let entries: Vec<_> = self.connections.iter().collect();
        let mut closed = 0usize;
        for (key, database) in entries {
            match database.close().await {
                Ok(()) => closed += 1,
                Err(e) => {
                    tracing::warn!(connection = %key, error = %e, "Failed to close tenant connection")
                }
            }
        }

        self.connections.invalidate_all();
        self.connections.run_pending_tasks().await;
        tracing::info!(closed, "Closed tenant connections");
    }

    pub async fn stats(&self) -> RegistryStats {
        self.connections.run_pending_tasks().await;
        let mut keys: Vec<String> = self.connections.iter().map(|(key, _)| key.to_string()).collect();
        keys.sort();

        RegistryStats {
            count: keys.len(),
            keys,
        }
    }
}
