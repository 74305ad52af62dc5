use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto;
use crate::app::services::AppServices;

/// `POST /doc-numbers`: issue the next number for a prefix and day.
pub async fn issue_doc_number(
    Extension(services): Extension<AppServices>,
    body: Option<Json<dto::IssueDocNumberRequest>>,
) -> axum::response::Response {
    let Json(body) = body.unwrap_or_default();
    match services
        .run(move |payments| payments.issue_doc_number(body.prefix.as_deref(), body.date))
        .await
    {
        Ok(doc_number) => (StatusCode::CREATED, Json(dto::DocNumberResponse { doc_number })).into_response(),
        Err(response) => response,
    }
}
