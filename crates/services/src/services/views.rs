//! Dashboard view paths and the cache of rendered responses behind them.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use db::models::resource::Resource;
use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};

pub fn list_view(resource: Resource) -> String {
    format!("/dashboard/{}", resource.table())
}

pub fn item_view(resource: Resource, id: i64) -> String {
    format!("/dashboard/{}/{id}", resource.table())
}

/// Marks cached renders of a view path stale.
#[async_trait]
pub trait ViewInvalidator: Send + Sync {
    async fn invalidate(&self, path: &str);

    async fn invalidate_all(&self, paths: &[String]) {
        for path in paths {
            self.invalidate(path).await;
        }
    }
}

/// One cached render: the view path plus whatever distinguishes renders of
/// the same path (query string for listings).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub path: String,
    pub variant: String,
}

impl ViewKey {
    pub fn new(path: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            variant: variant.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedView {
    generation: u64,
    body: Arc<Value>,
}

/// Rendered responses keyed by view. Every path carries a generation that
/// `invalidate` bumps; a render is only served while its generation is the
/// path's current one, so a render built from data read before a mutation
/// can never outlive that mutation's invalidation.
#[derive(Clone)]
pub struct RenderCache {
    cache: Cache<ViewKey, CachedView>,
    generations: Arc<DashMap<String, u64>>,
}

impl RenderCache {
    const MAX_ENTRIES: u64 = 2_000;

    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(Self::MAX_ENTRIES)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            cache,
            generations: Arc::new(DashMap::new()),
        }
    }

    /// Read this before loading the data a render is built from.
    pub fn generation(&self, path: &str) -> u64 {
        self.generations.get(path).map(|g| *g).unwrap_or(0)
    }

    pub async fn get(&self, key: &ViewKey) -> Option<Arc<Value>> {
        let cached = self.cache.get(key).await?;
        (cached.generation == self.generation(&key.path)).then_some(cached.body)
    }

    /// Stores `render` under `key` unless the path was invalidated after
    /// `generation` was read. Returns whether it was stored.
    pub async fn insert(&self, key: ViewKey, render: Value, generation: u64) -> bool {
        if generation != self.generation(&key.path) {
            debug!(path = %key.path, generation, "Dropped render of an invalidated view");
            return false;
        }
        let cached = CachedView {
            generation,
            body: Arc::new(render),
        };
        self.cache.insert(key, cached).await;
        true
    }
}

#[async_trait]
impl ViewInvalidator for RenderCache {
    async fn invalidate(&self, path: &str) {
        *self.generations.entry(path.to_string()).or_insert(0) += 1;
        let target = path.to_string();
        match self
            .cache
            .invalidate_entries_if(move |key, _| key.path == target)
        {
            Ok(_) => debug!(path, "Invalidated cached view"),
            Err(e) => warn!(path, error = %e, "Failed to invalidate cached view"),
        }
    }
}
