use crate::error::{api_error, invalid_credentials, tenant_error, validation_error, ApiResult};
use crate::middleware::AdminContext;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Extension, Json};
use orgdb_database::{DirectoryStats, RegistryStats};
use orgdb_models::AdminLoginRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub organization_id: Uuid,
    pub organization_name: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub organizations: DirectoryStats,
    pub connections: RegistryStats,
}

/// Admin login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdminLoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate().map_err(validation_error)?;

    let auth = state
        .lifecycle
        .authenticate(&request.email, &request.password)
        .await
        .map_err(tenant_error)?
        .ok_or_else(invalid_credentials)?;

    let access_token = state.tokens.issue(&auth).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue admin token");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "token_error",
            "Failed to issue token",
        )
    })?;

    tracing::info!(org_name = %auth.tenant_name, "Admin logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.expiration_minutes() * 60,
        organization_id: auth.tenant_id,
        organization_name: auth.tenant_name,
    }))
}

/// Directory and connection registry statistics
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
) -> ApiResult<Json<StatsResponse>> {
    tracing::debug!(org_id = %admin.tenant_id, admin = %admin.email, "Stats requested");

    let organizations = state.lifecycle.stats().await.map_err(tenant_error)?;
    let connections = state.lifecycle.registry().stats().await;

    Ok(Json(StatsResponse {
        organizations,
        connections,
    }))
}
