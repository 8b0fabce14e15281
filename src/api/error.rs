//! HTTP error mapping.

use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::context::REQUEST_ID_HEADER;
use crate::utils::error::MarktError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    #[must_use]
    pub fn missing_auth() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "MISSING_AUTH",
            "Authorization header required",
        )
    }

    #[must_use]
    pub fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid bearer token")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl From<MarktError> for ApiError {
    fn from(err: MarktError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                error = %err,
                category = ?err.category(),
                severity = ?err.severity(),
                "Request failed"
            );
            return Self::new(status, err.code(), err.user_friendly_message());
        }

        let details = match &err {
            MarktError::InsufficientStock { shortages } => {
                Some(serde_json::json!({ "shortages": shortages }))
            }
            MarktError::TotalsMismatch {
                field,
                submitted,
                computed,
            } => Some(serde_json::json!({
                "field": field,
                "submitted": submitted,
                "computed": computed,
            })),
            _ => None,
        };

        let api_error = Self::new(status, err.code(), err.to_string());
        match details {
            Some(details) => api_error.with_details(details),
            None => api_error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id;
        let mut response = (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
                request_id: request_id.clone(),
                details: self.details,
            }),
        )
            .into_response();

        if let Some(request_id) = request_id {
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::StockShortage;
    use uuid::Uuid;

    #[test]
    fn test_insufficient_stock_carries_shortages() {
        let err = ApiError::from(MarktError::InsufficientStock {
            shortages: vec![StockShortage {
                product_id: Uuid::nil(),
                requested: 2,
                available: 0,
            }],
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        let details = err.details.unwrap();
        assert_eq!(details["shortages"][0]["available"], 0);
    }

    #[test]
    fn test_storage_errors_hide_internals() {
        let err = ApiError::from(MarktError::StorageError {
            message: "disk on fire at /var/lib".to_string(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("/var/lib"));
    }
}
