use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto;
use crate::app::services::AppServices;

/// `POST /credits/apply`: spend unapplied customer credit on orders.
pub async fn apply_credit(
    Extension(services): Extension<AppServices>,
    Json(body): Json<dto::ApplyCreditRequest>,
) -> axum::response::Response {
    match services
        .run(move |payments| payments.apply_credit(&body.customer_id, &body.entries))
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(response) => response,
    }
}
