use anyhow::{anyhow, Context};
use orgdb_auth::DEFAULT_EXPIRATION_MINUTES;
use orgdb_database::{ConnectionPoolConfig, DatabaseConfig, MigrationConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database: DatabaseConfig,
    pub tenant_pool: ConnectionPoolConfig,
    pub migration: MigrationConfig,
    pub jwt_secret: String,
    pub jwt_expiration_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database: DatabaseConfig::from_env().map_err(|e| anyhow!(e))?,
            tenant_pool: ConnectionPoolConfig::from_env(),
            migration: MigrationConfig::from_env(),
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_expiration_minutes: std::env::var("JWT_EXPIRATION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EXPIRATION_MINUTES),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
