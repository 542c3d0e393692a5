use orgdb_auth::AuthError;
use orgdb_database::DatabaseError;
use orgdb_models::ConflictField;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TenantError>;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Organization {0} already taken")]
    Conflict(ConflictField),

    #[error("Organization not found")]
    NotFound,

    #[error("Dedicated database unreachable: {0}")]
    ConnectionFailure(String),

    #[error("Credential error: {0}")]
    Credential(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for TenantError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(field) => TenantError::Conflict(field),
            DatabaseError::NotFound(_) => TenantError::NotFound,
            DatabaseError::ConnectionFailed(message) => TenantError::ConnectionFailure(message),
            other => TenantError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_map_to_taxonomy() {
        assert!(matches!(
            TenantError::from(DatabaseError::Conflict(ConflictField::Email)),
            TenantError::Conflict(ConflictField::Email)
        ));
        assert!(matches!(
            TenantError::from(DatabaseError::not_found("Organization", "acme")),
            TenantError::NotFound
        ));
        assert!(matches!(
            TenantError::from(DatabaseError::Timeout("ping".to_string())),
            TenantError::Database(_)
        ));
    }

    #[test]
    fn test_conflict_names_the_field() {
        assert_eq!(
            TenantError::Conflict(ConflictField::Name).to_string(),
            "Organization name already taken"
        );
    }
}
