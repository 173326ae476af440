//! [`TableStore`] over the Supabase / PostgREST REST interface.

use std::time::Duration;

use async_trait::async_trait;
use db::store::{Filter, Row, Select, Selected, StoreError, TableStore, validate_identifier};
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, CONTENT_RANGE},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const NOT_SINGLE_CODE: &str = "PGRST116";

#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub url: Url,
    pub api_key: SecretString,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
    code: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteTableStore {
    http: Client,
    rest_url: Url,
    api_key: SecretString,
}

impl RemoteTableStore {
    pub fn new(config: RemoteStoreConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("batohi-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::remote(e.to_string()))?;
        Ok(Self {
            http,
            rest_url: rest_url(&config.url)?,
            api_key: config.api_key,
        })
    }

    fn table_url(&self, table: &str, pairs: Vec<(String, String)>) -> Result<Url, StoreError> {
        let table = validate_identifier(table)?;
        let mut url = self
            .rest_url
            .join(table)
            .map_err(|e| StoreError::remote(e.to_string()))?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.http
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let res = request.send().await.map_err(transport_error)?;
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(parse_error_body(status, &body))
    }

    async fn rows(res: Response) -> Result<Vec<Row>, StoreError> {
        res.json::<Vec<Row>>().await.map_err(transport_error)
    }
}

/// `https://x.supabase.co` → `https://x.supabase.co/rest/v1/`
fn rest_url(base: &Url) -> Result<Url, StoreError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("rest/v1/")
        .map_err(|e| StoreError::remote(e.to_string()))
}

fn transport_error(e: reqwest::Error) -> StoreError {
    StoreError::remote(e.to_string())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_pair(filter: &Filter) -> Result<(String, String), StoreError> {
    let column = validate_identifier(filter.column())?.to_string();
    Ok(match filter {
        Filter::Eq(_, Value::Null) => (column, "is.null".to_string()),
        Filter::Eq(_, value) => (column, format!("eq.{}", render_value(value))),
        Filter::ILike(_, pattern) => (column, format!("ilike.{pattern}")),
    })
}

fn filter_pairs(filters: &[Filter]) -> Result<Vec<(String, String)>, StoreError> {
    filters.iter().map(filter_pair).collect()
}

/// Query string of a select; the range becomes `offset`/`limit`.
fn select_pairs(query: &Select) -> Result<Vec<(String, String)>, StoreError> {
    let mut pairs = vec![("select".to_string(), query.columns.clone())];
    pairs.extend(filter_pairs(&query.filters)?);
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push((
            "order".to_string(),
            format!("{}.{direction}", validate_identifier(&order.column)?),
        ));
    }
    if let Some((from, to)) = query.range {
        pairs.push(("offset".to_string(), from.to_string()));
        pairs.push((
            "limit".to_string(),
            to.saturating_sub(from).saturating_add(1).to_string(),
        ));
    }
    Ok(pairs)
}

/// Total from a `Content-Range` header such as `0-9/25` or `*/0`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// First number in a PostgREST `details` string, e.g. "The result contains 0 rows".
fn rows_from_details(details: &str) -> Option<u64> {
    details
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())?
        .parse()
        .ok()
}

fn parse_error_body(status: StatusCode, body: &str) -> StoreError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) if err.code.as_deref() == Some(NOT_SINGLE_CODE) => {
            match err.details.as_deref().and_then(rows_from_details) {
                Some(rows) => StoreError::NotSingle { rows },
                None => StoreError::Remote {
                    message: err.message,
                    code: err.code,
                },
            }
        }
        Ok(err) => StoreError::Remote {
            message: err.message,
            code: err.code,
        },
        Err(_) => StoreError::remote(format!("http {}: {}", status.as_u16(), body.trim())),
    }
}

fn require_filters(filters: &[Filter], operation: &str) -> Result<(), StoreError> {
    if filters.is_empty() {
        return Err(StoreError::remote(format!("{operation} requires a filter")));
    }
    Ok(())
}

#[async_trait]
impl TableStore for RemoteTableStore {
    async fn select(&self, table: &str, query: &Select) -> Result<Selected, StoreError> {
        let url = self.table_url(table, select_pairs(query)?)?;
        let mut request = self.request(Method::GET, url);
        if query.count {
            request = request.header("Prefer", "count=exact");
        }
        if query.single {
            request = request.header(ACCEPT, SINGLE_OBJECT);
        }

        let res = self.send(request).await?;
        let count = if query.count {
            res.headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
        } else {
            None
        };
        let rows = if query.single {
            vec![res.json::<Row>().await.map_err(transport_error)?]
        } else {
            Self::rows(res).await?
        };

        debug!(table, rows = rows.len(), count = ?count, "remote select");
        Ok(Selected { rows, count })
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let url = self.table_url(table, vec![("select".to_string(), "*".to_string())])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&[row]);

        let res = self.send(request).await?;
        Self::rows(res)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::remote("insert returned no rows"))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        require_filters(filters, "UPDATE")?;
        let url = self.table_url(table, filter_pairs(filters)?)?;
        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);

        let res = self.send(request).await?;
        Self::rows(res).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        require_filters(filters, "DELETE")?;
        let url = self.table_url(table, filter_pairs(filters)?)?;
        let request = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=representation");

        let res = self.send(request).await?;
        Ok(Self::rows(res).await?.len() as u64)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(filter_pairs(filters)?);
        let url = self.table_url(table, pairs)?;
        let request = self
            .request(Method::HEAD, url)
            .header("Prefer", "count=exact");

        let res = self.send(request).await?;
        res.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| StoreError::remote("count missing from Content-Range"))
    }
}
