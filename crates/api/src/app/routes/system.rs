use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Which store backend this process was wired with.
pub async fn info(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    let settings = services.payments().settings();
    Json(serde_json::json!({
        "backend": services.backend(),
        "doc_prefix": settings.doc_prefix,
        "docs_enabled": settings.docs_enabled,
    }))
}
