use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dbadmin_core::report::{Document, Empty, FailureBody};
use dbadmin_core::restore::RestoreFailure;
use dbadmin_core::AdminError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Restore(#[from] RestoreFailure),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Operation failures are still documents; only input problems, missing
/// backups and internal errors change the HTTP status.
fn status_for(err: &AdminError) -> StatusCode {
    match err {
        AdminError::MissingParameter(_) | AdminError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Admin(e) => (status_for(&e), FailureBody::from(&e)),
            AppError::Restore(f) => (status_for(&f.error), FailureBody::from(f)),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    FailureBody {
                        error_code: -1,
                        error_message: "Internal server error".into(),
                        backup_id: None,
                        stage: None,
                        restored_units: Vec::new(),
                    },
                )
            }
        };
        (status, Json(Document::<Empty>::Failure(body))).into_response()
    }
}
