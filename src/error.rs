use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::ledger::StoreError;
use crate::metering::MeteringError;

/// Error returned by HTTP handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Detail is logged, never sent to the client.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
    code: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unauthorized(_) => "authentication_error",
            Self::PaymentRequired(_) => "payment_error",
            Self::BadRequest(_) => "invalid_request_error",
            Self::Internal(_) => "server_error",
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Unauthorized(_) => Some("invalid_auth_token"),
            Self::PaymentRequired(_) => Some("insufficient_credit"),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.public_message(),
                r#type: self.error_type().to_string(),
                code: self.error_code().map(String::from),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<MeteringError> for AppError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::UnknownToken => Self::Unauthorized("Invalid authorization token".to_string()),
            MeteringError::InsufficientCredit { .. } => {
                Self::PaymentRequired("Insufficient token balance".to_string())
            }
            MeteringError::InvalidAmount(amount) => {
                Self::BadRequest(format!("Credit amount must be positive, got {amount}"))
            }
            MeteringError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_metering_error_mapping() {
        assert!(matches!(
            AppError::from(MeteringError::UnknownToken),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(MeteringError::InsufficientCredit { balance: 0 }),
            AppError::PaymentRequired(_)
        ));
        assert!(matches!(
            AppError::from(MeteringError::InvalidAmount(-1)),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(MeteringError::Store(StoreError::Overflow { client_id: 1 })),
            AppError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_payment_required_response() {
        let (status, json) = body_json(AppError::PaymentRequired("no credit".into())).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["error"]["type"], "payment_error");
        assert_eq!(json["error"]["code"], "insufficient_credit");
    }

    #[tokio::test]
    async fn test_internal_response_is_opaque() {
        let (status, json) =
            body_json(AppError::Internal("disk I/O error at /var/lib/maas.db".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["message"], "Internal server error");
        assert!(json["error"]["code"].is_null());
    }

    #[test]
    fn test_json_error_is_bad_request() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
    }
}
