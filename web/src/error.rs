//! Error responses for web handlers.
//!
//! [`AppError`] bridges engine errors and HTTP. Every failure is rendered as
//! `{code, message, details}`, where `details` carries the conflict state a
//! client needs to explain the refusal.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use boxoffice_core::error::{BoxOfficeError, ErrorKind};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState<S>>) -> Result<Json<Money>, AppError> {
///     Ok(Json(state.engine.balance(owner).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details_for(err: &BoxOfficeError) -> Option<Value> {
    let details = match err {
        BoxOfficeError::InvalidQuantity { quantity } => {
            json!({ "field": "quantity", "quantity": quantity })
        }
        BoxOfficeError::InvalidAmount { field, .. } | BoxOfficeError::InvalidInput { field, .. } => {
            json!({ "field": field })
        }
        BoxOfficeError::UnknownReferralCode { code } => json!({ "field": "referral_code", "code": code }),
        BoxOfficeError::InsufficientStock {
            ticket_id,
            requested,
            available,
        } => json!({ "ticket_id": ticket_id, "requested": requested, "available": available }),
        BoxOfficeError::InsufficientBalance {
            owner_id,
            required,
            available,
        } => json!({ "owner_id": owner_id, "required": required, "available": available }),
        BoxOfficeError::AlreadyRedeemed {
            purchase_id,
            redeemed_at,
        } => json!({ "purchase_id": purchase_id, "redeemed_at": redeemed_at }),
        BoxOfficeError::CancellationWindowExpired {
            purchase_id,
            purchased_at,
            deadline,
        } => json!({ "purchase_id": purchase_id, "purchased_at": purchased_at, "deadline": deadline }),
        _ => return None,
    };
    Some(details)
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "INVALID_REQUEST", rejection.body_text())
    }
}

impl From<BoxOfficeError> for AppError {
    fn from(err: BoxOfficeError) -> Self {
        let status = status_for(err.kind());
        // Storage messages stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %err, "Engine failure");
            "An internal error occurred".to_string()
        } else {
            err.to_string()
        };
        let details = details_for(&err);
        Self {
            status,
            code: err.code().to_string(),
            message,
            details,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::store::StoreError;
    use boxoffice_core::types::{AccountId, Money, TicketId};

    #[test]
    fn test_error_display() {
        let err = AppError::unauthorized("Missing principal");
        assert_eq!(err.to_string(), "[UNAUTHORIZED] Missing principal");
    }

    #[test]
    fn test_kinds_map_to_statuses() {
        let cases = [
            (BoxOfficeError::InvalidQuantity { quantity: 0 }, StatusCode::UNPROCESSABLE_ENTITY),
            (BoxOfficeError::TokenNotFound, StatusCode::NOT_FOUND),
            (
                BoxOfficeError::BuyerInactive {
                    buyer_id: AccountId::new(1),
                },
                StatusCode::CONFLICT,
            ),
            (
                BoxOfficeError::AdminRequired {
                    requester_id: AccountId::new(2),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                BoxOfficeError::Storage(StoreError::Database("connection reset".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_conflict_carries_details() {
        let err = AppError::from(BoxOfficeError::InsufficientBalance {
            owner_id: AccountId::new(7),
            required: Money::from_units(1000),
            available: Money::from_units(250),
        });
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        let details = err.details.unwrap();
        assert_eq!(details["required"], "1000.00");
        assert_eq!(details["available"], "250.00");
    }

    #[test]
    fn test_storage_message_is_hidden() {
        let err = AppError::from(BoxOfficeError::Storage(StoreError::Database(
            "password authentication failed".into(),
        )));
        assert_eq!(err.message, "An internal error occurred");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_stock_details() {
        let err = AppError::from(BoxOfficeError::InsufficientStock {
            ticket_id: TicketId::new(3),
            requested: 2,
            available: 1,
        });
        assert_eq!(err.details.unwrap()["available"], 1);
    }
}
