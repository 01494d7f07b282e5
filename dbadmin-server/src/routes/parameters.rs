use crate::error::AppError;
use crate::routes::blocking;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dbadmin_core::control::parameters::{change_config, get_config, ChangeOutcome, ConfigChange, ConfigParameter};
use dbadmin_core::report::Document;
use dbadmin_core::AdminError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{name}/config", get(read_parameters).put(change_parameters))
}

#[derive(Debug, Default, Deserialize)]
pub struct NamesQuery {
    /// Comma separated; all parameters when absent.
    pub names: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeBody {
    pub config: Option<Vec<ConfigChange>>,
}

#[derive(Debug, Serialize)]
pub struct Parameters {
    pub config: Vec<ConfigParameter>,
}

#[derive(Debug, Serialize)]
pub struct Changes {
    pub config: Vec<ChangeOutcome>,
}

fn split_names(names: Option<&str>) -> Vec<String> {
    names
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}

async fn read_parameters(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<NamesQuery>,
) -> Result<Json<Document<Parameters>>, AppError> {
    let names = split_names(query.names.as_deref());
    let config = blocking(move || get_config(state.control.as_ref(), &name, &names)).await??;
    Ok(Json(Document::Success(Parameters { config })))
}

async fn change_parameters(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<ChangeBody>,
) -> Result<Json<Document<Changes>>, AppError> {
    let changes = body.config.ok_or(AdminError::MissingParameter("config"))?;
    let config = blocking(move || change_config(state.control.as_ref(), &name, &changes)).await??;
    Ok(Json(Document::Success(Changes { config })))
}
