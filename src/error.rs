// =============================================================================
// HTTP-facing error type
// =============================================================================
//
// Every JSON endpoint returns `Result<_, AppError>`. The response body is
// always `{"error": "<message>"}` with the status picked per variant.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Request parameters failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Symbol is not on the allow-list.
    #[error("Invalid coin symbol")]
    InvalidSymbol,

    /// The conversion-rate API did not answer successfully.
    #[error("{0}")]
    ExternalService(String),

    /// The historical-bars API did not answer successfully.
    #[error("Failed to fetch candlestick data: {0}")]
    Upstream(String),

    /// No valid session accompanied the request.
    #[error("Authentication required")]
    Unauthorized,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidSymbol | Self::ExternalService(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
