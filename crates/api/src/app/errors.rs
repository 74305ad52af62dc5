use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use wholesale_core::DomainError;
use wholesale_infra::ledger_store::StoreError;
use wholesale_infra::service::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Configuration(msg) => {
            tracing::error!(error = %msg, "configuration error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", msg)
        }
        ServiceError::ConcurrencyTimeout(e) => {
            tracing::warn!(error = %e, "lock timeout");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "concurrency_timeout", e.to_string())
        }
        ServiceError::Store(e) => store_error_to_response(e),
        ServiceError::Render(e) => {
            tracing::error!(error = %e, "document rendering failed");
            json_error(StatusCode::BAD_GATEWAY, "render_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::Validation(_) | DomainError::AllocationMismatch { .. } | DomainError::InvalidId(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
    };
    let code = err.code();
    // Validation messages go to operators verbatim, without the error prefix.
    let message = match err {
        DomainError::Validation(msg) => msg,
        other => other.to_string(),
    };
    json_error(status, code, message)
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        StoreError::Duplicate(msg) => json_error(StatusCode::CONFLICT, "duplicate", msg),
        StoreError::Unavailable(msg) => {
            tracing::warn!(error = %msg, "store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        e => {
            tracing::error!(error = %e, "store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
