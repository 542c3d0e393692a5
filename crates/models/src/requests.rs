use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::organization::NewOrganization;

const RESERVED_ORGANIZATION_NAMES: &[&str] =
    &["admin", "root", "system", "test", "master", "default"];
const RESERVED_DATABASE_NAMES: &[&str] = &["admin", "local", "config", "test"];
const WEAK_PASSWORDS: &[&str] = &[
    "password",
    "password123",
    "12345678",
    "qwerty123",
    "admin123",
    "welcome123",
    "letmein123",
];

lazy_static::lazy_static! {
    static ref ORGANIZATION_NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\s\-_.]*$").unwrap();
    static ref CONSECUTIVE_SPECIALS_REGEX: regex::Regex = regex::Regex::new(r"[_\-.]{2,}").unwrap();
    static ref DATABASE_NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

/// Create organization request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(
        length(min = 3, max = 100),
        custom(function = "validate_organization_name")
    )]
    pub organization_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128), custom(function = "validate_password_strength"))]
    #[serde(skip_serializing)]
    pub password: String,

    #[validate(custom(function = "validate_database_uri"))]
    pub db_uri: Option<String>,

    #[validate(length(min = 1, max = 64), custom(function = "validate_database_name"))]
    pub db_name: Option<String>,
}

impl From<CreateOrganizationRequest> for NewOrganization {
    fn from(request: CreateOrganizationRequest) -> Self {
        Self {
            name: request.organization_name,
            admin_email: request.email,
            admin_password: request.password,
            dedicated_uri: request.db_uri,
            dedicated_db_name: request.db_name,
        }
    }
}

/// Update organization request
///
/// Every field except `organization_name` is optional; only supplied fields change.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 100))]
    pub organization_name: String,

    #[validate(
        length(min = 3, max = 100),
        custom(function = "validate_organization_name")
    )]
    pub new_organization_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(min = 8, max = 128), custom(function = "validate_password_strength"))]
    #[serde(skip_serializing)]
    pub password: Option<String>,

    #[validate(custom(function = "validate_database_uri"))]
    pub db_uri: Option<String>,

    #[validate(length(min = 1, max = 64), custom(function = "validate_database_name"))]
    pub db_name: Option<String>,
}

/// Admin login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    #[serde(skip_serializing)]
    pub password: String,
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

pub fn validate_organization_name(name: &str) -> Result<(), ValidationError> {
    if name.trim() != name {
        return Err(validation_error(
            "surrounding_whitespace",
            "Organization name cannot have leading or trailing spaces",
        ));
    }
    if !ORGANIZATION_NAME_REGEX.is_match(name) {
        return Err(validation_error(
            "invalid_characters",
            "Organization name must start with an alphanumeric character and contain only letters, numbers, spaces, hyphens, underscores, or dots",
        ));
    }
    if CONSECUTIVE_SPECIALS_REGEX.is_match(name) {
        return Err(validation_error(
            "consecutive_specials",
            "Organization name cannot contain consecutive special characters",
        ));
    }
    if RESERVED_ORGANIZATION_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(validation_error("reserved", "Organization name is reserved"));
    }
    Ok(())
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(validation_error(
            "missing_uppercase",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(validation_error(
            "missing_lowercase",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(validation_error(
            "missing_digit",
            "Password must contain at least one digit",
        ));
    }
    if WEAK_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err(validation_error("weak_password", "Password is too weak"));
    }
    Ok(())
}

pub fn validate_database_uri(uri: &str) -> Result<(), ValidationError> {
    if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
        Ok(())
    } else {
        Err(validation_error(
            "invalid_scheme",
            "Database URI must start with \"mongodb://\" or \"mongodb+srv://\"",
        ))
    }
}

pub fn validate_database_name(name: &str) -> Result<(), ValidationError> {
    if !DATABASE_NAME_REGEX.is_match(name) {
        return Err(validation_error(
            "invalid_characters",
            "Database name must start with a letter or underscore and contain only alphanumeric characters and underscores",
        ));
    }
    if RESERVED_DATABASE_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(validation_error("reserved", "Database name is reserved"));
    }
    Ok(())
}
