use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use wholesale_payments::SubmitPayment;

use crate::app::services::AppServices;

/// `POST /payments`: issue one document and append it to the ledger.
pub async fn submit_payment(
    Extension(services): Extension<AppServices>,
    Json(body): Json<SubmitPayment>,
) -> axum::response::Response {
    match services.run(move |payments| payments.submit(&body)).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(response) => response,
    }
}
