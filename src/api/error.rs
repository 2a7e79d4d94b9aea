use crate::error::ServiceError;
use crate::storage::download::UpstreamError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// A failed operation, rendered as the `{operation, status, err_message, err_detail}` envelope
#[derive(Debug)]
pub struct ApiError {
    pub operation: &'static str,
    pub error: ServiceError,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(operation: &'static str, error: impl Into<ServiceError>) -> Self {
        Self {
            operation,
            error: error.into(),
        }
    }

    /// Adapter for `map_err`
    pub fn during(operation: &'static str) -> impl Fn(ServiceError) -> ApiError {
        move |error| ApiError { operation, error }
    }

    /// Request the extractors could not decode; missing or mistyped fields are 422
    pub fn rejected(operation: &'static str, status: StatusCode, detail: String) -> Self {
        let error = if status == StatusCode::UNPROCESSABLE_ENTITY {
            ServiceError::Unprocessable(detail)
        } else {
            ServiceError::BadRequest(detail)
        };
        Self { operation, error }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Storage(_) | ServiceError::JobStore(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Unwrap a JSON body, turning axum's rejection into the failure envelope
pub fn json_body<T>(operation: &'static str, body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::rejected(operation, e.status(), e.body_text()))
}

/// Same as [`json_body`] for query strings
pub fn query_params<T>(operation: &'static str, params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|e| ApiError::rejected(operation, e.status(), e.body_text()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.error.is_server_failure() {
            tracing::error!(operation = self.operation, error = %self.error, "Request failed");
        } else {
            tracing::debug!(operation = self.operation, error = %self.error, "Request rejected");
        }

        let body = Json(json!({
            "operation": self.operation,
            "status": "FAILED",
            "err_message": self.error.summary(),
            "err_detail": self.error.to_string(),
        }));
        (status, body).into_response()
    }
}
