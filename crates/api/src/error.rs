use axum::{http::StatusCode, Json};
use orgdb_models::ConflictField;
use orgdb_tenant::TenantError;
use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: StatusCode, error: &str, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(error, message)))
}

pub fn validation_error(errors: ValidationErrors) -> ApiError {
    api_error(
        StatusCode::UNPROCESSABLE_ENTITY,
        "validation_error",
        &errors.to_string(),
    )
}

pub fn invalid_credentials() -> ApiError {
    api_error(
        StatusCode::UNAUTHORIZED,
        "invalid_credentials",
        "Invalid email or password",
    )
}

/// Map lifecycle errors to responses; infrastructure details only go to the log
pub fn tenant_error(err: TenantError) -> ApiError {
    match err {
        TenantError::Conflict(ConflictField::Name) => api_error(
            StatusCode::CONFLICT,
            "organization_name_taken",
            "An organization with this name already exists",
        ),
        TenantError::Conflict(ConflictField::Email) => api_error(
            StatusCode::CONFLICT,
            "admin_email_taken",
            "An organization with this admin email already exists",
        ),
        TenantError::NotFound => api_error(
            StatusCode::NOT_FOUND,
            "organization_not_found",
            "Organization not found",
        ),
        TenantError::ConnectionFailure(target) => {
            tracing::warn!(target = %target, "Dedicated database unreachable");
            api_error(
                StatusCode::BAD_REQUEST,
                "database_unreachable",
                "Could not connect to the dedicated database",
            )
        }
        other => {
            tracing::error!(error = %other, "Organization operation failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred",
            )
        }
    }
}
