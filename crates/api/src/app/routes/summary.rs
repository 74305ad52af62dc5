use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::dto;
use crate::app::services::AppServices;

/// `GET /summary?scope=&so=&customer=&group=`
pub async fn get_summary(
    Extension(services): Extension<AppServices>,
    Query(params): Query<dto::SummaryParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(response) => return response,
    };
    match services.run(move |payments| payments.summary(&query)).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(response) => response,
    }
}
