use crate::error::AppError;
use crate::routes::blocking;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dbadmin_core::catalog::manifest::Backup;
use dbadmin_core::report::{BackupList, Document, Empty};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups))
        .route("/{id}", get(get_backup).delete(delete_backup))
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Document<BackupList>>, AppError> {
    let entries = blocking(move || state.catalog(query.location.as_deref()).list()).await??;
    Ok(Json(Document::Success(entries.into())))
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Document<Backup>>, AppError> {
    let backup = blocking(move || state.catalog(query.location.as_deref()).read(&id)).await??;
    Ok(Json(Document::Success(backup)))
}

async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Document<Empty>>, AppError> {
    blocking(move || {
        state.catalog(query.location.as_deref()).delete(&id)?;
        info!(backup_id = %id, "Backup deleted");
        Ok::<_, dbadmin_core::AdminError>(())
    })
    .await??;
    Ok(Json(Document::Success(Empty {})))
}
