use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::core::DispatchError;

/// Message returned in place of internal error details
const INTERNAL_MESSAGE: &str = "Internal";

/// JSON error body
#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub error: String,
}

/// HTTP error wrapper around dispatch and request-decoding failures
#[derive(Debug)]
pub enum ApiError {
    Dispatch(DispatchError),
    Request { status: StatusCode, message: String },
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        Self::Dispatch(value)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Request {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(DispatchError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Dispatch(DispatchError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Request { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Dispatch(e) => e.to_string(),
            Self::Request { message, .. } => message.clone(),
        };

        error!(code = status.as_u16(), "http error: {}", message);

        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_MESSAGE.to_string()
        } else {
            message
        };

        (status, Json(FailureResponse { error })).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StoreError, ValidationError};

    #[test]
    fn test_status_mapping() {
        let validation = ApiError::from(DispatchError::Validation(ValidationError::Empty));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let persistence = ApiError::from(DispatchError::Persistence(StoreError::InvalidCapacity));
        assert_eq!(persistence.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let too_large = ApiError::Request {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".to_string(),
        };
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let response =
            ApiError::from(DispatchError::Persistence(StoreError::InvalidCapacity)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
