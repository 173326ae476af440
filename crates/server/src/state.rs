use std::sync::Arc;

use anyhow::Result;
use db::{DBService, models::resource::Resource, sqlite_store::SqliteTableStore, store::TableStore};
use services::services::{
    assistant::ContentAssistant, model_client::ModelClient, remote_store::RemoteTableStore,
    table_gateway::TableGateway, views::RenderCache,
};
use tracing::info;

use crate::{
    config::{AppConfig, StoreBackend},
    error::ApiError,
};

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TableStore>,
    views: RenderCache,
    assistant: Option<ContentAssistant>,
}

impl AppState {
    pub fn new(store: Arc<dyn TableStore>, views: RenderCache, assistant: Option<ContentAssistant>) -> Self {
        Self {
            store,
            views,
            assistant,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn TableStore> = match &config.store {
            StoreBackend::Remote(remote) => {
                info!(url = %remote.url, "Using remote table store");
                Arc::new(RemoteTableStore::new(remote.clone())?)
            }
            StoreBackend::Local { database_url } => {
                info!(database_url = %database_url, "Using local SQLite table store");
                let db = DBService::connect(database_url).await?;
                Arc::new(SqliteTableStore::new(db.pool))
            }
        };

        let assistant = match &config.model {
            Some(model) => {
                let client = ModelClient::new(model.clone())?;
                info!(model = client.model(), "Content assistant enabled");
                Some(ContentAssistant::new(client))
            }
            None => {
                info!("ANTHROPIC_API_KEY not set, content assistant disabled");
                None
            }
        };

        Ok(Self::new(store, RenderCache::new(config.cache_ttl), assistant))
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub fn views(&self) -> &RenderCache {
        &self.views
    }

    pub fn gateway(&self, resource: Resource) -> TableGateway {
        TableGateway::new(self.store.clone(), resource)
    }

    pub fn assistant(&self) -> Result<&ContentAssistant, ApiError> {
        self.assistant.as_ref().ok_or(ApiError::AssistantUnavailable)
    }
}
