use crate::error::{api_error, tenant_error, validation_error, ApiError, ApiResult};
use crate::middleware::AdminContext;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use orgdb_models::{
    CreateOrganizationRequest, MigrationJob, OrganizationRecord, StorageKind,
    UpdateOrganizationRequest,
};
use orgdb_tenant::UpdateOrganization;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Public view of an organization; never carries the connection URI or hash
#[derive(Debug, Serialize, Deserialize)]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub organization_name: String,
    pub partition_name: String,
    pub storage: StorageKind,
    pub database_name: Option<String>,
    pub admin_email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OrganizationRecord> for OrganizationResponse {
    fn from(record: &OrganizationRecord) -> Self {
        Self {
            id: record.id,
            organization_name: record.name.clone(),
            partition_name: record.partition_name().to_string(),
            storage: record.storage_location.kind(),
            database_name: record
                .storage_location
                .dedicated_target()
                .map(|(_, db_name)| db_name.to_string()),
            admin_email: record.admin.email.clone(),
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub total: u64,
    pub migrated: u64,
    pub failed: u64,
}

impl From<&MigrationJob> for MigrationSummary {
    fn from(job: &MigrationJob) -> Self {
        Self {
            total: job.total_count,
            migrated: job.migrated_count,
            failed: job.failed_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateOrganizationResponse {
    pub success: bool,
    pub organization: OrganizationResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteOrganizationResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationQuery {
    pub organization_name: String,
}

/// A dedicated target needs both halves
pub(crate) fn check_dedicated_pair(
    db_uri: &Option<String>,
    db_name: &Option<String>,
) -> Result<(), ApiError> {
    if db_uri.is_some() != db_name.is_some() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "db_uri and db_name must be provided together",
        ));
    }
    Ok(())
}

/// Create a new organization
pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<OrganizationResponse>)> {
    request.validate().map_err(validation_error)?;
    check_dedicated_pair(&request.db_uri, &request.db_name)?;

    let record = state
        .lifecycle
        .create(request.into())
        .await
        .map_err(tenant_error)?;

    Ok((StatusCode::CREATED, Json(OrganizationResponse::from(&record))))
}

/// Get an organization by name
pub async fn get_organization(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrganizationQuery>,
) -> ApiResult<Json<OrganizationResponse>> {
    let record = state
        .lifecycle
        .get(&query.organization_name)
        .await
        .map_err(tenant_error)?;

    Ok(Json(OrganizationResponse::from(&record)))
}

/// Update an organization's name, admin credentials or storage target
pub async fn update_organization(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> ApiResult<Json<UpdateOrganizationResponse>> {
    request.validate().map_err(validation_error)?;
    check_dedicated_pair(&request.db_uri, &request.db_name)?;
    admin.authorize(&request.organization_name)?;

    let name = request.organization_name.clone();
    let outcome = state
        .lifecycle
        .update(&name, UpdateOrganization::from(request))
        .await
        .map_err(tenant_error)?;

    let partial = outcome.partial_migrations().last().map(MigrationSummary::from);
    let warning = partial.as_ref().map(|summary| {
        tracing::warn!(
            org_name = %outcome.record.name,
            migrated = summary.migrated,
            failed = summary.failed,
            "Organization moved with partial migration"
        );
        format!(
            "{} of {} documents could not be migrated",
            summary.failed, summary.total
        )
    });

    Ok(Json(UpdateOrganizationResponse {
        success: true,
        organization: OrganizationResponse::from(&outcome.record),
        warning,
        migration: partial,
    }))
}

/// Delete an organization and its partition
pub async fn delete_organization(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Query(query): Query<OrganizationQuery>,
) -> ApiResult<Json<DeleteOrganizationResponse>> {
    admin.authorize(&query.organization_name)?;
    tracing::info!(org_name = %query.organization_name, admin = %admin.email, "Organization delete requested");

    let deleted = state
        .lifecycle
        .delete(&query.organization_name)
        .await
        .map_err(tenant_error)?;

    if !deleted {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "organization_not_found",
            "Organization not found",
        ));
    }

    Ok(Json(DeleteOrganizationResponse {
        success: true,
        message: format!("Organization {} deleted", query.organization_name),
    }))
}
