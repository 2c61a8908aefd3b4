use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Client not found!")]
    ClientNotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidAmount(_) | Self::Decode(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::ClientNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Storage(detail) => {
                tracing::error!(error = %detail, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn client_not_found_maps_to_404_with_expected_body() {
        let response = AppError::ClientNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "message": "Client not found!" }));
    }

    #[tokio::test]
    async fn invalid_amount_maps_to_bad_request() {
        let response = AppError::InvalidAmount("ten".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn storage_failure_maps_to_500_without_leaking_detail() {
        let response = AppError::Storage("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("connection refused"));
    }
}
