use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/paid", get(paid_to_date))
        .route("/reconcile", post(reconcile))
}

/// `GET /orders/paid?so=A&so=B`: replayed paid-to-date per order.
pub async fn paid_to_date(
    Extension(services): Extension<AppServices>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let orders = dto::order_params(&pairs);
    match services.run(move |payments| payments.paid_to_date(&orders)).await {
        Ok(paid) => (StatusCode::OK, Json(dto::PaidToDateResponse::from(paid))).into_response(),
        Err(response) => response,
    }
}

/// `POST /orders/reconcile`: rewrite drifted order snapshots.
pub async fn reconcile(
    Extension(services): Extension<AppServices>,
    Json(body): Json<dto::ReconcileRequest>,
) -> axum::response::Response {
    match services.run(move |payments| payments.reconcile(&body.orders)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}
