use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dcx_core::InterfaceError;
use serde::Serialize;
use tracing::warn;

/// JSON error envelope returned by the internal and buyer-facing APIs.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, correlation_id) = match self.0 {
            InterfaceError::BadRequest { message, correlation_id } => {
                (StatusCode::BAD_REQUEST, "bad_request", message, correlation_id)
            }
            InterfaceError::NotFound { message, correlation_id } => {
                (StatusCode::NOT_FOUND, "not_found", message, correlation_id)
            }
            error @ InterfaceError::ServiceUnavailable { .. } => {
                let correlation_id = correlation_of(&error);
                warn!(
                    event_name = "api.service_unavailable",
                    correlation_id = %correlation_id,
                    error = %error,
                    "request failed on an unavailable backend"
                );
                let message = error.user_message().to_string();
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message, correlation_id)
            }
            error @ InterfaceError::Internal { .. } => {
                let correlation_id = correlation_of(&error);
                warn!(
                    event_name = "api.internal_error",
                    correlation_id = %correlation_id,
                    error = %error,
                    "request failed with an internal error"
                );
                let message = error.user_message().to_string();
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, correlation_id)
            }
        };

        (status, Json(ErrorBody { error, message, correlation_id })).into_response()
    }
}

fn correlation_of(error: &InterfaceError) -> String {
    match error {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::NotFound { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. }
        | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
    }
}
