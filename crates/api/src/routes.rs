use crate::handlers;
use crate::middleware;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        // Organization provisioning (public)
        .route("/org/create", post(handlers::organization::create_organization))
        .route("/org/get", get(handlers::organization::get_organization))
        // Admin login (public)
        .route("/admin/login", post(handlers::admin::login))
        // Organization admin routes
        .merge(
            Router::new()
                .route("/org/update", put(handlers::organization::update_organization))
                .route("/org/delete", delete(handlers::organization::delete_organization))
                .route("/admin/stats", get(handlers::admin::stats))
                .route_layer(from_fn_with_state(state.clone(), middleware::require_admin)),
        )
        .with_state(state)
}
