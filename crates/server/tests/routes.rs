use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use db::{
    DBService,
    sqlite_store::SqliteTableStore,
    store::{Filter, Row, Select, Selected, StoreError, TableStore},
};
use serde_json::{Value, json};
use server::{AppState, routes, routes::records::CACHE_HEADER};
use services::services::views::RenderCache;
use tokio::sync::Notify;
use tower::ServiceExt;

async fn app() -> Router {
    let db = DBService::in_memory().await.unwrap();
    let state = AppState::new(
        Arc::new(SqliteTableStore::new(db.pool)),
        RenderCache::new(Duration::from_secs(60)),
        None,
    );
    routes::router(state)
}

/// SQLite store whose selects hold their result for `delay` before
/// returning, announcing on `selected` once the rows have been read.
struct SlowSelects {
    inner: SqliteTableStore,
    delay: Duration,
    selected: Notify,
}

#[async_trait]
impl TableStore for SlowSelects {
    async fn select(&self, table: &str, query: &Select) -> Result<Selected, StoreError> {
        let selected = self.inner.select(table, query).await;
        self.selected.notify_one();
        tokio::time::sleep(self.delay).await;
        selected
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        self.inner.update(table, filters, patch).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        self.inner.delete(table, filters).await
    }
}

struct Reply {
    status: StatusCode,
    cache: Option<String>,
    location: Option<String>,
    body: Value,
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Reply {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers();
    let cache = headers
        .get(CACHE_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let location = headers
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        cache,
        location,
        body,
    }
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let reply = send(&app, "GET", "/api/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], json!(true));
}

#[tokio::test]
async fn test_create_then_list_hotels() {
    let app = app().await;
    let created = send(
        &app,
        "POST",
        "/api/hotels",
        Some(json!({"name": "Hotel Yak & Yeti", "city": "Kathmandu", "stars": 5})),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["success"], json!(true));
    assert_eq!(created.body["hotel"]["name"], json!("Hotel Yak & Yeti"));
    assert_eq!(created.body["hotel"]["city"], json!("Kathmandu"));
    let id = created.body["hotel"]["id"].as_i64().unwrap();
    assert_eq!(created.location, Some(format!("/api/hotels/{id}")));

    let listing = send(&app, "GET", "/api/hotels?page=1&limit=10", None).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body["count"], json!(1));
    assert_eq!(listing.body["totalPages"], json!(1));
    assert_eq!(listing.body["currentPage"], json!(1));
    assert_eq!(listing.body["hotels"][0]["stars"], json!(5));
    assert!(listing.body.get("error").is_none());
}

#[tokio::test]
async fn test_listing_is_cached_until_a_mutation() {
    let app = app().await;
    send(&app, "POST", "/api/places", Some(json!({"name": "Boudhanath"}))).await;

    let first = send(&app, "GET", "/api/places", None).await;
    assert_eq!(first.cache.as_deref(), Some("miss"));
    let second = send(&app, "GET", "/api/places", None).await;
    assert_eq!(second.cache.as_deref(), Some("hit"));
    assert_eq!(second.body, first.body);

    send(&app, "POST", "/api/places", Some(json!({"name": "Swayambhunath"}))).await;

    let third = send(&app, "GET", "/api/places", None).await;
    assert_eq!(third.cache.as_deref(), Some("miss"));
    assert_eq!(third.body["count"], json!(2));
}

#[tokio::test]
async fn test_search_and_paging() {
    let app = app().await;
    for name in ["Pokhara Grande", "Temple Tree Resort", "Fish Tail Lodge", "Grande Kathmandu"] {
        send(&app, "POST", "/api/hotels", Some(json!({"name": name}))).await;
    }

    let search = send(&app, "GET", "/api/hotels?search=grande", None).await;
    assert_eq!(search.body["count"], json!(2));

    let paged = send(&app, "GET", "/api/hotels?page=2&limit=3", None).await;
    assert_eq!(paged.body["count"], json!(4));
    assert_eq!(paged.body["totalPages"], json!(2));
    assert_eq!(paged.body["currentPage"], json!(2));
    assert_eq!(paged.body["hotels"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_update_delete_round() {
    let app = app().await;
    let created = send(&app, "POST", "/api/festivals", Some(json!({"name": "Dashain"}))).await;
    let id = created.body["festival"]["id"].as_i64().unwrap();
    let item = format!("/api/festivals/{id}");

    let found = send(&app, "GET", &item, None).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["festival"]["name"], json!("Dashain"));
    assert_eq!(send(&app, "GET", &item, None).await.cache.as_deref(), Some("hit"));

    let updated = send(&app, "PATCH", &item, Some(json!({"month": "Ashwin"}))).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["success"], json!(true));
    assert_eq!(updated.body["festival"]["month"], json!("Ashwin"));

    let refreshed = send(&app, "GET", &item, None).await;
    assert_eq!(refreshed.cache.as_deref(), Some("miss"));
    assert_eq!(refreshed.body["festival"]["month"], json!("Ashwin"));
    assert_eq!(refreshed.body["festival"]["name"], json!("Dashain"));

    let deleted = send(&app, "DELETE", &item, None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body, json!({"success": true}));

    let gone = send(&app, "GET", &item, None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(
        gone.body,
        json!({"error": format!("festival {id} not found"), "notFound": true})
    );
}

#[tokio::test]
async fn test_missing_hotel_is_not_found() {
    let app = app().await;
    let reply = send(&app, "GET", "/api/hotels/42", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], json!("hotel 42 not found"));
    assert_eq!(reply.body["notFound"], json!(true));
}

#[tokio::test]
async fn test_create_without_name_fails_with_message() {
    let app = app().await;
    let reply = send(&app, "POST", "/api/hotels", Some(json!({"city": "Pokhara"}))).await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.body["success"], json!(false));
    assert!(reply.body["message"].is_string());
}

#[tokio::test]
async fn test_unknown_resource_is_rejected() {
    let app = app().await;
    let reply = send(&app, "GET", "/api/restaurants", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_count_every_table() {
    let app = app().await;
    send(&app, "POST", "/api/hotels", Some(json!({"name": "Dwarika's"}))).await;
    send(&app, "POST", "/api/places", Some(json!({"name": "Patan Durbar Square"}))).await;
    send(&app, "POST", "/api/places", Some(json!({"name": "Rani Pokhari"}))).await;

    let reply = send(&app, "GET", "/api/stats", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body["data"],
        json!({"hotels": 1, "places": 2, "festivals": 0, "total": 3})
    );
}

#[tokio::test]
async fn test_assistant_routes_unavailable_without_key() {
    let app = app().await;
    let reply = send(&app, "POST", "/api/assistant/spam", Some(json!({"text": "Buy now!"}))).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.body["success"], json!(false));
    assert!(
        reply.body["message"]
            .as_str()
            .unwrap()
            .contains("ANTHROPIC_API_KEY")
    );
}

#[tokio::test]
async fn test_listing_read_during_a_create_is_not_cached() {
    let db = DBService::in_memory().await.unwrap();
    let store = Arc::new(SlowSelects {
        inner: SqliteTableStore::new(db.pool),
        delay: Duration::from_millis(300),
        selected: Notify::new(),
    });
    let app = routes::router(AppState::new(
        store.clone(),
        RenderCache::new(Duration::from_secs(60)),
        None,
    ));

    let in_flight = tokio::spawn({
        let app = app.clone();
        async move { send(&app, "GET", "/api/hotels", None).await }
    });
    store.selected.notified().await;

    let created = send(&app, "POST", "/api/hotels", Some(json!({"name": "New"}))).await;
    assert_eq!(created.status, StatusCode::CREATED);

    let before = in_flight.await.unwrap();
    assert_eq!(before.cache.as_deref(), Some("miss"));
    assert_eq!(before.body["count"], json!(0));

    let after = send(&app, "GET", "/api/hotels", None).await;
    assert_eq!(after.cache.as_deref(), Some("miss"));
    assert_eq!(after.body["count"], json!(1));
    assert_eq!(after.body["hotels"][0]["name"], json!("New"));
}

#[tokio::test]
async fn test_naive_created_at_is_listed_as_stored() {
    let app = app().await;
    let created = send(
        &app,
        "POST",
        "/api/hotels",
        Some(json!({"name": "Hotel Barahi", "created_at": "2026-10-18T07:00:00.123456"})),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let listing = send(&app, "GET", "/api/hotels", None).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body["count"], json!(1));
    assert_eq!(
        listing.body["hotels"][0]["created_at"],
        json!("2026-10-18T07:00:00.123456")
    );
}

#[tokio::test]
async fn test_page_past_the_addressable_range_is_empty() {
    let app = app().await;
    send(&app, "POST", "/api/hotels", Some(json!({"name": "Hotel Shanker"}))).await;

    let reply = send(&app, "GET", "/api/hotels?page=1844674407370955161", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["hotels"], json!([]));
    assert_eq!(reply.body["count"], json!(1));
    assert_eq!(reply.body["currentPage"], json!(1_844_674_407_370_955_161_u64));
}
