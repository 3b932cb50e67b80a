/*!
 * Error Handling
 * One error type for every handler; each variant maps to a status code and a
 * JSON `{ "message": ... }` body.
 */
use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Request,
    },
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Please authenticate.")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique value (such as a username) is already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("File too large. Maximum size is {} MB", .max_bytes / (1024 * 1024))]
    PayloadTooLarge { max_bytes: usize },

    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detail of a 5xx error, carried on the response for `expose_error_detail`.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub detail: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Conflict(_)
            | AppError::InvalidTransition { .. }
            | AppError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidToken | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreUnavailable(_)
            | AppError::DatabaseUnavailable(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show any client.
    fn public_message(&self) -> String {
        match self {
            AppError::StoreUnavailable(_) => "File storage is temporarily unavailable".to_string(),
            AppError::DatabaseUnavailable(_) => "Database is temporarily unavailable".to_string(),
            AppError::Internal(_) => "Something went wrong!".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();

        if !status.is_server_error() {
            return (
                status,
                Json(ErrorResponse {
                    message,
                    error: None,
                }),
            )
                .into_response();
        }

        tracing::error!(status = %status, error = %self, "request failed");
        let mut response = (
            status,
            Json(ErrorResponse {
                message: message.clone(),
                error: None,
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorDetail {
            message,
            detail: self.to_string(),
        });
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => AppError::NotFound(name),
            StoreError::Conflict(detail) => AppError::Conflict(detail),
            StoreError::Unavailable(detail) => AppError::DatabaseUnavailable(detail),
            StoreError::Corrupt(detail) => AppError::Internal(detail),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { max_bytes } => AppError::PayloadTooLarge { max_bytes },
            UploadError::Empty | UploadError::UnsupportedType(_) => {
                AppError::Validation(err.to_string())
            }
            UploadError::Unavailable(detail) => AppError::StoreUnavailable(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Outside production, copy the detail of a 5xx error into the body's `error` field.
pub async fn expose_error_detail(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDetail { message, detail }) = response.extensions_mut().remove::<ErrorDetail>()
    else {
        return response;
    };

    let body = match serde_json::to_vec(&ErrorResponse {
        message,
        error: Some(detail),
    }) {
        Ok(body) => body,
        Err(_) => return response,
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn body_of(response: Response) -> ErrorResponse {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            AppError::validation("title is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PayloadTooLarge { max_bytes: 10 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::NotFound("Product").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::DatabaseUnavailable("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_conflicts_keep_their_kind() {
        let err = AppError::from(StoreError::Conflict("taken".into()));
        assert!(matches!(err, AppError::Conflict(ref m) if m == "taken"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn client_errors_carry_their_message() {
        let response = AppError::NotFound("Product").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_of(response).await;
        assert_eq!(body.message, "Product not found");
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn server_errors_hide_detail_by_default() {
        let response = AppError::DatabaseUnavailable("connection refused".into()).into_response();
        let body = body_of(response).await;
        assert_eq!(body.message, "Database is temporarily unavailable");
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn detail_middleware_exposes_server_error_detail() {
        let app = Router::new()
            .route(
                "/boom",
                get(|| async { AppError::Internal("disk on fire".into()) }),
            )
            .layer(middleware::from_fn(expose_error_detail));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body.message, "Something went wrong!");
        assert_eq!(body.error.as_deref(), Some("Internal error: disk on fire"));
    }
}
