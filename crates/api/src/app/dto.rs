use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use wholesale_core::Money;
use wholesale_payments::{CreditApplication, OrderAmounts, SummaryQuery, SummaryScope};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// `GET /summary` query string.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub scope: Option<String>,
    pub so: Option<String>,
    pub customer: Option<String>,
    pub group: Option<String>,
}

impl SummaryParams {
    pub fn into_query(self) -> Result<SummaryQuery, axum::response::Response> {
        let scope = match self.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(parse_scope(raw)?),
        };
        Ok(SummaryQuery {
            scope,
            so_number: self.so,
            customer_id: self.customer,
            invoice_group_id: self.group,
        })
    }
}

pub fn parse_scope(raw: &str) -> Result<SummaryScope, axum::response::Response> {
    match raw.to_ascii_lowercase().as_str() {
        "so" | "order" => Ok(SummaryScope::So),
        "customer" => Ok(SummaryScope::Customer),
        "group" | "invoice_group" => Ok(SummaryScope::Group),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_scope",
            "scope must be one of: so, customer, group",
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub orders: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub limit: Option<usize>,
}

impl ListOrdersParams {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyCreditRequest {
    pub customer_id: String,
    pub entries: Vec<CreditApplication>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueDocNumberRequest {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct FeeQuoteRequest {
    #[serde(default)]
    pub method: String,
    pub amount: Money,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct PaidToDateResponse {
    pub orders: OrderAmounts,
    pub total: Money,
}

impl From<OrderAmounts> for PaidToDateResponse {
    fn from(orders: OrderAmounts) -> Self {
        let total = orders.total();
        Self { orders, total }
    }
}

#[derive(Debug, Serialize)]
pub struct CreditBalanceResponse {
    pub customer_id: String,
    pub unapplied_credit: Money,
}

#[derive(Debug, Serialize)]
pub struct DocNumberResponse {
    pub doc_number: String,
}

/// `so` values from a query string, accepting repeated keys and comma lists.
pub fn order_params(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, _)| k == "so" || k == "so[]")
        .flat_map(|(_, v)| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
