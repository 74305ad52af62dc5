use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use wholesale_core::Money;

use crate::app::dto;
use crate::app::services::AppServices;

/// `POST /fees/quote`: fee and net amount for a method.
pub async fn quote_fee(
    Extension(services): Extension<AppServices>,
    Json(body): Json<dto::FeeQuoteRequest>,
) -> axum::response::Response {
    if body.amount < Money::ZERO {
        return crate::app::errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "amount must not be negative",
        );
    }
    let quote = services.payments().quote_fee(&body.method, body.amount);
    (StatusCode::OK, Json(quote)).into_response()
}
