use axum::{
    Router, extract::State, response::Json as ResponseJson, routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use services::services::{
    assistant::{AnalyticsSummary, PersonalityUpdate, SpamVerdict},
    stats::DashboardStats,
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
pub struct SpamCheckRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityRequest {
    pub current_prompt: String,
    pub instruction: String,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct AnalyticsSummaryRequest {
    /// Falls back to the current dashboard stats when absent.
    #[serde(default)]
    #[ts(type = "unknown")]
    pub data: Option<Value>,
}

/// POST /api/assistant/spam
pub async fn check_spam(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<SpamCheckRequest>,
) -> Result<ResponseJson<ApiResponse<SpamVerdict>>, ApiError> {
    let verdict = state.assistant()?.classify_spam(&payload.text).await?;
    Ok(ResponseJson(ApiResponse::success(verdict)))
}

/// POST /api/assistant/personality
pub async fn update_personality(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<PersonalityRequest>,
) -> Result<ResponseJson<ApiResponse<PersonalityUpdate>>, ApiError> {
    let update = state
        .assistant()?
        .update_personality(&payload.current_prompt, &payload.instruction)
        .await?;
    Ok(ResponseJson(ApiResponse::success(update)))
}

/// POST /api/assistant/analytics-summary
pub async fn summarize_analytics(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<AnalyticsSummaryRequest>,
) -> Result<ResponseJson<ApiResponse<AnalyticsSummary>>, ApiError> {
    let assistant = state.assistant()?;
    let data = match payload.data {
        Some(data) => data,
        None => serde_json::to_value(DashboardStats::collect(state.store().as_ref()).await?)?,
    };
    let summary = assistant.summarize_analytics(&data).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/assistant",
        Router::new()
            .route("/spam", post(check_spam))
            .route("/personality", post(update_personality))
            .route("/analytics-summary", post(summarize_analytics)),
    )
}
