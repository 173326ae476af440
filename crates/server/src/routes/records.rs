//! Listing CRUD for every dashboard resource. Responses carry the gateway
//! envelopes as-is; reads are served from the render cache until a mutation
//! marks their view stale.

use axum::{
    Router,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::get,
};
use db::{models::resource::Resource, store::Row};
use serde::Serialize;
use serde_json::Value;
use services::services::{
    table_gateway::{ListParams, LookupOutcome, Mutation},
    views::{ViewInvalidator, ViewKey, item_view, list_view},
};

use crate::{AppState, error::ApiError};

pub const CACHE_HEADER: &str = "x-cache";

fn rendered(status: StatusCode, body: Value, hit: bool) -> Response {
    let mut response = (status, ResponseJson(body)).into_response();
    response.headers_mut().insert(
        CACHE_HEADER,
        HeaderValue::from_static(if hit { "hit" } else { "miss" }),
    );
    response
}

/// `generation` must be read before the store call the envelope came from.
async fn render_and_cache<T: Serialize>(
    state: &AppState,
    key: ViewKey,
    generation: u64,
    envelope: &T,
) -> Result<Response, ApiError> {
    let body = serde_json::to_value(envelope)?;
    state.views().insert(key, body.clone(), generation).await;
    Ok(rendered(StatusCode::OK, body, false))
}

/// GET /api/{resource}?page&limit&search
pub async fn list_records(
    State(state): State<AppState>,
    Path(resource): Path<Resource>,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let key = ViewKey::new(list_view(resource), raw_query.unwrap_or_default());
    if let Some(body) = state.views().get(&key).await {
        return Ok(rendered(StatusCode::OK, (*body).clone(), true));
    }
    let generation = state.views().generation(&key.path);

    let listing = state.gateway(resource).list(&params).await;
    if !listing.is_ok() {
        return Ok((StatusCode::BAD_GATEWAY, ResponseJson(listing)).into_response());
    }
    render_and_cache(&state, key, generation, &listing).await
}

/// GET /api/{resource}/{id}
pub async fn get_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(Resource, i64)>,
) -> Result<Response, ApiError> {
    let key = ViewKey::new(item_view(resource, id), "");
    if let Some(body) = state.views().get(&key).await {
        return Ok(rendered(StatusCode::OK, (*body).clone(), true));
    }
    let generation = state.views().generation(&key.path);

    let lookup = state.gateway(resource).get(id).await;
    let status = match &lookup.outcome {
        LookupOutcome::Found(_) => return render_and_cache(&state, key, generation, &lookup).await,
        LookupOutcome::NotFound => StatusCode::NOT_FOUND,
        LookupOutcome::Failed(_) => StatusCode::BAD_GATEWAY,
    };
    Ok((status, ResponseJson(lookup)).into_response())
}

async fn finish_mutation(state: &AppState, mutation: Mutation, success: StatusCode) -> Response {
    state.views().invalidate_all(&mutation.affected).await;
    let status = if mutation.is_success() {
        success
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, ResponseJson(mutation)).into_response()
}

/// POST /api/{resource}
pub async fn create_record(
    State(state): State<AppState>,
    Path(resource): Path<Resource>,
    axum::Json(data): axum::Json<Row>,
) -> Response {
    let mutation = state.gateway(resource).create(data).await;
    let location = mutation
        .record()
        .and_then(|record| HeaderValue::from_str(&format!("/api/{}/{}", resource.table(), record.id)).ok());
    let mut response = finish_mutation(&state, mutation, StatusCode::CREATED).await;
    if let Some(location) = location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

/// PATCH /api/{resource}/{id}
pub async fn update_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(Resource, i64)>,
    axum::Json(data): axum::Json<Row>,
) -> Response {
    let mutation = state.gateway(resource).update(id, data).await;
    finish_mutation(&state, mutation, StatusCode::OK).await
}

/// DELETE /api/{resource}/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(Resource, i64)>,
) -> Response {
    let mutation = state.gateway(resource).delete(id).await;
    finish_mutation(&state, mutation, StatusCode::OK).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{resource}", get(list_records).post(create_record))
        .route(
            "/{resource}/{id}",
            get(get_record).patch(update_record).delete(delete_record),
        )
}
