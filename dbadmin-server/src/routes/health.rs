use axum::Json;
use dbadmin_core::report::Document;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Health {
    pub version: &'static str,
}

pub async fn health() -> Json<Document<Health>> {
    Json(Document::Success(Health {
        version: env!("CARGO_PKG_VERSION"),
    }))
}
