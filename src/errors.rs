use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::responses::ErrorResponse;
use crate::services::identity::IdentityError;
use crate::services::stripe::StripeServiceError;

/// Request-level error taxonomy. Validation, conflict, not-found and webhook
/// signature failures all surface as 400 with the message verbatim; upstream
/// and store failures are logged and mapped to a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadSignature(String),
    #[error("upstream service error: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<StripeServiceError> for ApiError {
    fn from(err: StripeServiceError) -> Self {
        match err {
            StripeServiceError::Webhook(msg) => ApiError::BadSignature(msg),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken(msg) => ApiError::Unauthenticated(msg),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_)
            | ApiError::Conflict(_)
            | ApiError::NotFound(_)
            | ApiError::BadSignature(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Upstream(_) | ApiError::Store(_) => {
                error!(err = %self, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ApiError::Unauthenticated("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("admins only".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Validation("amount out of range".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("already subscribed".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("no billing account".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadSignature("bad signature".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upstream("stripe down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn upstream_errors_hide_detail_from_callers() {
        let resp = ApiError::Upstream("stripe secret leaked".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: crate::responses::ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.error, "Internal server error");
    }

    #[tokio::test]
    async fn validation_errors_surface_message_verbatim() {
        let resp = ApiError::Validation("Amount must be between $30 and $250".into())
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: crate::responses::ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.error, "Amount must be between $30 and $250");
    }
}
