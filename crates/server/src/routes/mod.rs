use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod assistant;
pub mod health;
pub mod records;
pub mod stats;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health::router())
        .merge(stats::router())
        .merge(assistant::router())
        .merge(records::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
