use axum::{Router, response::Json as ResponseJson, routing::get};
use utils::response::ApiResponse;

use crate::AppState;

pub async fn health_check() -> ResponseJson<ApiResponse<()>> {
    ResponseJson(ApiResponse::success(()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
