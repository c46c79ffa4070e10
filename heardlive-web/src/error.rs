//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use heardlive_common::Error;
use serde_json::json;
use thiserror::Error;

/// Detail of a server-side failure, attached to the response so the
/// router can keep it for `/health`
#[derive(Debug, Clone)]
pub struct RecordedError(pub String);

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Error raised by a component or external service
    #[error(transparent)]
    Common(#[from] Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Other(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Something went wrong. Please try again.".to_string(),
            ),
            ApiError::Common(err) => {
                let (status, code) = match err {
                    Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                    Error::InvalidHandle(_) => (StatusCode::BAD_REQUEST, "INVALID_HANDLE"),
                    Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
                    Error::HandleTaken(_) => (StatusCode::CONFLICT, "HANDLE_TAKEN"),
                    Error::Constraint { .. } => (StatusCode::CONFLICT, "CONFLICT"),
                    Error::Service { .. } => (StatusCode::BAD_GATEWAY, "SERVICE_UNAVAILABLE"),
                    Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, code, err.user_message())
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
            response
                .extensions_mut()
                .insert(RecordedError(self.to_string()));
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use heardlive_common::ExternalService;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::NotFound("Profile".into()), StatusCode::NOT_FOUND),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::Unauthenticated, StatusCode::UNAUTHORIZED),
            (Error::HandleTaken("fan".into()), StatusCode::CONFLICT),
            (
                Error::service(ExternalService::Catalog, "timeout"),
                StatusCode::BAD_GATEWAY,
            ),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_service_detail_not_leaked() {
        let err = ApiError::from(Error::service(ExternalService::DataStore, "password=hunter2"));
        let (_, code, message) = err.parts();
        assert_eq!(code, "SERVICE_UNAVAILABLE");
        assert!(!message.contains("hunter2"));
    }
}
