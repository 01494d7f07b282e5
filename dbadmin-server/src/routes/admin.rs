use crate::error::AppError;
use crate::routes::{blocking, credentials};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use dbadmin_core::admin::{execute_admin, AdminStatement};
use dbadmin_core::report::{Document, Empty};
use dbadmin_core::AdminError;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{name}/admin", post(run_statement))
}

#[derive(Debug, Deserialize)]
pub struct AdminBody {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub statement: Option<AdminStatement>,
}

async fn run_statement(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<AdminBody>,
) -> Result<Json<Document<Empty>>, AppError> {
    let credentials = credentials(body.user_name.as_deref(), body.password.as_deref())?;
    let statement = body.statement.ok_or(AdminError::MissingParameter("statement"))?;
    statement.render()?;

    blocking(move || execute_admin(state.sessions.as_ref(), &name, &credentials, &statement)).await??;
    Ok(Json(Document::Success(Empty {})))
}
