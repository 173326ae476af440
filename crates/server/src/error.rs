use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    assistant::AssistantError, model_client::ModelApiError, stats::StatsError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

/// Failures of the non-gateway routes. Gateway routes answer with their own
/// envelopes and never produce one of these.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("assistant is not configured: set ANTHROPIC_API_KEY")]
    AssistantUnavailable,
    #[error("failed to render response: {0}")]
    Render(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Assistant(AssistantError::EmptyInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Assistant(AssistantError::Model(ModelApiError::Busy { .. })) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Assistant(AssistantError::Model(ModelApiError::TimedOut)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Assistant(_) | ApiError::Stats(_) => StatusCode::BAD_GATEWAY,
            ApiError::AssistantUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body: ApiResponse<()> = ApiResponse::error(&self.to_string());
        (status, ResponseJson(body)).into_response()
    }
}
