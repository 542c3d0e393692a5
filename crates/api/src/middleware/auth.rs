use crate::error::{api_error, ApiError};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use orgdb_auth::Claims;
use std::sync::Arc;

/// Authenticated organization admin
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub tenant_id: String,
    pub tenant_name: String,
    pub email: String,
}

impl From<Claims> for AdminContext {
    fn from(claims: Claims) -> Self {
        Self {
            tenant_id: claims.tenant_id,
            tenant_name: claims.tenant_name,
            email: claims.sub,
        }
    }
}

impl AdminContext {
    /// The credential must belong to the organization being acted on
    pub fn authorize(&self, organization_name: &str) -> Result<(), ApiError> {
        if self.tenant_name != organization_name {
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Token does not grant access to this organization",
            ));
        }
        Ok(())
    }
}

/// Extract the token from an `Authorization: Bearer` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "missing_auth_header",
                "Authorization header is required",
            )
        })?
        .to_str()
        .map_err(|_| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_auth_header",
                "Invalid Authorization header format",
            )
        })?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) => Ok(token.to_string()),
        None => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "invalid_auth_scheme",
            "Authorization header must use Bearer scheme",
        )),
    }
}

/// Middleware to require an admin token
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers)?;
    let claims = state.tokens.verify(&token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        api_error(StatusCode::UNAUTHORIZED, "invalid_token", "Invalid or expired token")
    })?;

    request.extensions_mut().insert(AdminContext::from(claims));
    Ok(next.run(request).await)
}
