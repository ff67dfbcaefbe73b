//! Request and response bodies for the HTTP API.

use crate::model::{Expression, ExprStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CalculateRequest {
    pub expression: String,
}

/// Returned for both accepted (201) and rejected (422) submissions; a
/// rejected expression is persisted too, so the id is always present.
#[derive(Debug, Clone, Serialize)]
pub struct CalculateResponse {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An expression as listed to the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct ExpressionView {
    pub id: i64,
    pub status: ExprStatus,
    pub result: f64,
}

impl From<Expression> for ExpressionView {
    fn from(expr: Expression) -> Self {
        Self {
            id: expr.id.0,
            status: expr.status,
            result: expr.result,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
