use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use services::services::stats::DashboardStats;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

/// GET /api/stats
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<DashboardStats>>, ApiError> {
    let stats = DashboardStats::collect(state.store().as_ref()).await?;
    Ok(ResponseJson(ApiResponse::success(stats)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}
