use std::time::Duration;

/// Pool and timeout settings applied when opening a database handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub connect_timeout: Duration,
    pub server_selection_timeout: Duration,
    pub socket_timeout: Duration,
}

impl PoolSettings {
    /// Single-connection settings for short-lived liveness checks
    pub fn probe(timeout: Duration) -> Self {
        Self {
            max_pool_size: 1,
            min_pool_size: 0,
            connect_timeout: timeout,
            server_selection_timeout: timeout,
            socket_timeout: timeout,
        }
    }
}

/// Shared (master) database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: String,
    pub master_db_name: String,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            master_db_name: "master_db".to_string(),
            pool: PoolSettings {
                max_pool_size: 10,
                min_pool_size: 1,
                connect_timeout: Duration::from_millis(5000),
                server_selection_timeout: Duration::from_millis(5000),
                socket_timeout: Duration::from_millis(5000),
            },
        }
    }
}

impl DatabaseConfig {
    /// Load configuration from environment variables
    ///
    /// `MONGO_URI` is required; everything else falls back to the defaults.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| "MONGO_URI environment variable is not set".to_string())?;

        Ok(Self {
            uri,
            master_db_name: std::env::var("MASTER_DB_NAME").unwrap_or(defaults.master_db_name),
            pool: PoolSettings {
                max_pool_size: env_or("DATABASE_MAX_POOL_SIZE", defaults.pool.max_pool_size),
                min_pool_size: env_or("DATABASE_MIN_POOL_SIZE", defaults.pool.min_pool_size),
                connect_timeout: env_millis(
                    "DATABASE_CONNECT_TIMEOUT_MS",
                    defaults.pool.connect_timeout,
                ),
                server_selection_timeout: env_millis(
                    "DATABASE_SERVER_SELECTION_TIMEOUT_MS",
                    defaults.pool.server_selection_timeout,
                ),
                socket_timeout: env_millis(
                    "DATABASE_SOCKET_TIMEOUT_MS",
                    defaults.pool.socket_timeout,
                ),
            },
        })
    }
}

/// Configuration for dedicated tenant connections
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Settings for every cached dedicated connection
    pub tenant_pool: PoolSettings,
    /// Upper bound for a `probe` round trip
    pub probe_timeout: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        let timeout = Duration::from_millis(5000);
        Self {
            tenant_pool: PoolSettings {
                max_pool_size: 50,
                min_pool_size: 10,
                connect_timeout: timeout,
                server_selection_timeout: timeout,
                socket_timeout: timeout,
            },
            probe_timeout: timeout,
        }
    }
}

impl ConnectionPoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout = env_millis("TENANT_DB_TIMEOUT_MS", defaults.tenant_pool.connect_timeout);
        Self {
            tenant_pool: PoolSettings {
                max_pool_size: env_or("TENANT_DB_MAX_POOL_SIZE", defaults.tenant_pool.max_pool_size),
                min_pool_size: env_or("TENANT_DB_MIN_POOL_SIZE", defaults.tenant_pool.min_pool_size),
                connect_timeout: timeout,
                server_selection_timeout: timeout,
                socket_timeout: timeout,
            },
            probe_timeout: env_millis("TENANT_DB_PROBE_TIMEOUT_MS", defaults.probe_timeout),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fail_fast() {
        let config = ConnectionPoolConfig::default();
        assert_eq!(config.tenant_pool.max_pool_size, 50);
        assert_eq!(config.tenant_pool.min_pool_size, 10);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(DatabaseConfig::default().pool.max_pool_size, 10);
    }

    #[test]
    fn test_probe_settings_use_single_connection() {
        let settings = PoolSettings::probe(Duration::from_millis(250));
        assert_eq!(settings.max_pool_size, 1);
        assert_eq!(settings.min_pool_size, 0);
        assert_eq!(settings.server_selection_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("ORGDB_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
