use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:id/credit", get(get_credit))
        .route("/:id/orders", get(list_orders))
}

pub async fn get_credit(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = id.clone();
    match services.run(move |payments| payments.unapplied_credit(&customer_id)).await {
        Ok(amount) => (
            StatusCode::OK,
            Json(dto::CreditBalanceResponse {
                customer_id: id.trim().to_string(),
                unapplied_credit: amount,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

pub async fn list_orders(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
    Query(params): Query<dto::ListOrdersParams>,
) -> axum::response::Response {
    let limit = params.limit();
    match services.run(move |payments| payments.list_orders(&id, limit)).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(response) => response,
    }
}
