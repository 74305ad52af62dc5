use axum::{routing::post, Router};

pub mod credits;
pub mod customers;
pub mod doc_numbers;
pub mod fees;
pub mod orders;
pub mod payments;
pub mod summary;
pub mod system;

/// Router for all payment-ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/payments", post(payments::submit_payment))
        .route("/summary", axum::routing::get(summary::get_summary))
        .nest("/orders", orders::router())
        .nest("/customers", customers::router())
        .route("/credits/apply", post(credits::apply_credit))
        .route("/doc-numbers", post(doc_numbers::issue_doc_number))
        .route("/fees/quote", post(fees::quote_fee))
}
