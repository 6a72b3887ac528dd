use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use lodestar_core::models::ErrorResponse;

use crate::store::StoreError;

/// Every handler error ends up here and leaves the server as an error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String, errors: Vec<String> },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The message is logged, never sent to the client.
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: &[&str]) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            errors: fields.iter().map(|f| format!("{f} is required")).collect(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let (message, errors) = match self {
            ApiError::BadRequest { message, errors } => (message.clone(), errors.clone()),
            ApiError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                ("Internal server error".to_string(), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        HttpResponse::build(status).json(ErrorResponse {
            status_code: status.as_u16(),
            message,
            success: false,
            errors,
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => {
                log::warn!("Unique constraint rejected write: {}", detail);
                ApiError::Conflict("User with email or username already exists".to_string())
            }
            StoreError::Database(e) => ApiError::Internal(format!("Database error: {e}")),
        }
    }
}

/// `JsonConfig` error handler: malformed bodies become BadRequest envelopes.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &HttpRequest,
) -> actix_web::Error {
    log::warn!("Rejected JSON payload: {}", err);
    ApiError::bad_request(format!("Invalid JSON body: {err}")).into()
}

/// `MultipartFormConfig` error handler.
pub fn multipart_error_handler(
    err: actix_multipart::MultipartError,
    _req: &HttpRequest,
) -> actix_web::Error {
    log::warn!("Rejected multipart payload: {}", err);
    ApiError::bad_request(format!("Invalid multipart body: {err}")).into()
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiResult<HttpResponse> {
    Err(ApiError::NotFound("Route not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_status_mapping() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::unauthorized("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_error_envelope_shape() {
        let (status, json) = body_json(ApiError::invalid_fields(
            "All fields are required",
            &["email", "password"],
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["statusCode"], 400);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "All fields are required");
        assert_eq!(json["errors"][0], "email is required");
        assert_eq!(json["errors"][1], "password is required");
    }

    #[actix_web::test]
    async fn test_internal_details_are_hidden() {
        let (status, json) = body_json(ApiError::internal("connection refused at 10.0.0.3")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Internal server error");
        assert!(!json.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: ApiError = StoreError::Conflict("accounts.email".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
