pub mod admin;
pub mod backups;
pub mod databases;
pub mod health;
pub mod lookup;
pub mod parameters;

use crate::error::AppError;
use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use dbadmin_core::session::Credentials;
use dbadmin_core::utils::errors::require;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest(
            "/api/databases",
            databases::router()
                .merge(admin::router())
                .merge(parameters::router())
                .merge(lookup::router()),
        )
        .nest("/api/backups", backups::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs blocking core work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

/// Login taken from a request body; both parts are required.
pub(crate) fn credentials(user_name: Option<&str>, password: Option<&str>) -> Result<Credentials, AppError> {
    let user = require("user_name", user_name)?;
    let password = require("password", password)?;
    Ok(Credentials::new(user, password))
}
