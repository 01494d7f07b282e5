use crate::error::AppError;
use crate::routes::{blocking, credentials};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use dbadmin_core::backup::{BackupOrchestrator, BackupRequest};
use dbadmin_core::control::ServerStatus;
use dbadmin_core::report::{BackupReport, Document, Empty};
use dbadmin_core::restore::{RestoreOrchestrator, RestoreOutcome, RestoreRequest};
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{name}/status", get(status))
        .route("/{name}/start", post(start))
        .route("/{name}/stop", post(stop))
        .route("/{name}/backups", post(create_backup))
        .route("/{name}/restore", post(restore))
}

#[derive(Debug, Default, Deserialize)]
pub struct StopBody {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupBody {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub backup_location: Option<String>,
    pub backup_name: Option<String>,
    pub backup_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub backup_location: Option<String>,
    pub backup_id: Option<String>,
    #[serde(default)]
    pub restore_log: bool,
    #[serde(default = "default_keep_transdb")]
    pub keep_transdb: bool,
}

fn default_keep_transdb() -> bool {
    true
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Document<ServerStatus>>, AppError> {
    let status = blocking(move || state.control.status(&name)).await??;
    Ok(Json(Document::Success(status)))
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Document<Empty>>, AppError> {
    blocking(move || state.control.start(&name)).await??;
    Ok(Json(Document::Success(Empty {})))
}

async fn stop(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<StopBody>,
) -> Result<Json<Document<Empty>>, AppError> {
    blocking(move || state.control.stop(&name, body.force)).await??;
    Ok(Json(Document::Success(Empty {})))
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<CreateBackupBody>,
) -> Result<Json<BackupReport>, AppError> {
    let request = BackupRequest {
        database: name,
        credentials: credentials(body.user_name.as_deref(), body.password.as_deref())?,
        name: body.backup_name,
        comment: body.backup_comment,
    };
    let backup = blocking(move || {
        let catalog = state.catalog(body.backup_location.as_deref());
        BackupOrchestrator::new(state.sessions.as_ref(), state.verifier.as_ref(), &catalog)
            .create_backup(&request)
    })
    .await??;
    Ok(Json(backup.into()))
}

async fn restore(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<RestoreBody>,
) -> Result<Json<Document<RestoreOutcome>>, AppError> {
    let request = RestoreRequest {
        database: name,
        credentials: credentials(body.user_name.as_deref(), body.password.as_deref())?,
        backup_id: body.backup_id,
        replay_log: body.restore_log,
        keep_transaction_log: body.keep_transdb,
    };
    let outcome = blocking(move || {
        let catalog = state.catalog(body.backup_location.as_deref());
        RestoreOrchestrator::new(
            state.control.as_ref(),
            state.sessions.as_ref(),
            state.verifier.as_ref(),
            &catalog,
        )
        .restore(&request)
    })
    .await??;
    Ok(Json(Document::Success(outcome)))
}
