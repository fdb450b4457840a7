use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Error body shape shared by every endpoint: `{"error": "..."}`.
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Success body for message-style endpoints: `{"message": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub struct JsonResponse;

impl JsonResponse {
    pub fn success(msg: &str) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(MessageResponse {
                message: msg.to_string(),
            }),
        )
    }

    pub fn bad_request(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::FORBIDDEN, msg)
    }

    pub fn server_error(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn too_many_requests(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::TOO_MANY_REQUESTS, msg)
    }

    fn error(status: StatusCode, msg: &str) -> (StatusCode, Json<ErrorResponse>) {
        (
            status,
            Json(ErrorResponse {
                error: msg.to_string(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use serde_json::from_slice;

    use super::{ErrorResponse, JsonResponse, MessageResponse};

    #[tokio::test]
    async fn success_response_carries_message() {
        let resp = JsonResponse::success("ok").into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: MessageResponse = from_slice(&body).unwrap();
        assert_eq!(json.message, "ok");
    }

    #[tokio::test]
    async fn error_responses_use_error_field() {
        let resp = JsonResponse::forbidden("Access denied. Admins only.").into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: ErrorResponse = from_slice(&body).unwrap();
        assert_eq!(json.error, "Access denied. Admins only.");
    }
}
