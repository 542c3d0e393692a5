pub mod error;
pub mod jwt;
pub mod password;

pub use error::{AuthError, Result};
pub use jwt::{Claims, TokenService, DEFAULT_EXPIRATION_MINUTES};
pub use password::{Argon2Hasher, CredentialHasher};
