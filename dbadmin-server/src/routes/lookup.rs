use crate::error::AppError;
use crate::routes::{blocking, credentials};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use dbadmin_core::lookup::{run_lookup, Lookup, LookupResult};
use dbadmin_core::report::Document;
use dbadmin_core::AdminError;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{name}/lookup", post(lookup))
}

#[derive(Debug, Deserialize)]
pub struct LookupBody {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub lookup: Option<Lookup>,
}

async fn lookup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<LookupBody>,
) -> Result<Json<Document<LookupResult>>, AppError> {
    let credentials = credentials(body.user_name.as_deref(), body.password.as_deref())?;
    let lookup = body.lookup.ok_or(AdminError::MissingParameter("lookup"))?;
    lookup.validate()?;

    let result = blocking(move || run_lookup(state.sessions.as_ref(), &name, &credentials, &lookup)).await??;
    Ok(Json(Document::Success(result)))
}
