use crate::error::{AuthError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use orgdb_models::AuthResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One week
pub const DEFAULT_EXPIRATION_MINUTES: i64 = 10_080;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,         // Admin email
    pub tenant_id: String,   // Organization ID
    pub tenant_name: String, // Organization name
    pub exp: i64,            // Expiration time
    pub iat: i64,            // Issued at
    pub jti: String,         // JWT ID (unique identifier)
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    expiration_minutes: i64,
}

impl TokenService {
    pub fn new(secret: &str, expiration_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            expiration_minutes,
        }
    }

    pub fn expiration_minutes(&self) -> i64 {
        self.expiration_minutes
    }

    /// Mint an access token for an authenticated organization admin
    pub fn issue(&self, auth: &AuthResult) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.expiration_minutes);

        let claims = Claims {
            sub: auth.admin_email.clone(),
            tenant_id: auth.tenant_id.to_string(),
            tenant_name: auth.tenant_name.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        tracing::debug!(tenant_name = %auth.tenant_name, "Issued admin token");
        Ok(token)
    }

    /// Validate signature and expiry and decode the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(self.algorithm);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgdb_models::StorageLocation;

    const SECRET: &str = "test-secret-key-min-32-characters-long";

    fn auth_result() -> AuthResult {
        AuthResult {
            tenant_id: Uuid::new_v4(),
            tenant_name: "Acme Corp".to_string(),
            admin_email: "admin@acme.io".to_string(),
            storage_location: StorageLocation::for_organization("Acme Corp", None, None),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenService::new(SECRET, 60);
        let auth = auth_result();

        let token = tokens.issue(&auth).expect("Failed to issue token");
        let claims = tokens.verify(&token).expect("Failed to verify token");

        assert_eq!(claims.sub, "admin@acme.io");
        assert_eq!(claims.tenant_id, auth.tenant_id.to_string());
        assert_eq!(claims.tenant_name, "Acme Corp");
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenService::new(SECRET, 60).issue(&auth_result()).unwrap();
        let other = TokenService::new("another-secret-key-min-32-characters", 60);

        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Past the default 60s validation leeway
        let tokens = TokenService::new(SECRET, -5);
        let token = tokens.issue(&auth_result()).unwrap();

        assert!(matches!(tokens.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let tokens = TokenService::new(SECRET, 60);
        assert!(tokens.verify("not.a.token").is_err());
    }
}
