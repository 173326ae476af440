//! Process configuration, read once from the environment at startup.

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use secrecy::SecretString;
use services::services::{model_client::ModelConfig, remote_store::RemoteStoreConfig};
use url::Url;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://batohi.db?mode=rwc";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Where listing rows live.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Remote(RemoteStoreConfig),
    Local { database_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub store: StoreBackend,
    /// `None` leaves the assistant routes answering 503.
    pub model: Option<ModelConfig>,
    pub cache_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind = var("BATOHI_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .context("BATOHI_BIND must be a socket address such as 127.0.0.1:8080")?;

        let store_timeout = Duration::from_secs(parse_secs(
            var("BATOHI_STORE_TIMEOUT_SECS"),
            "BATOHI_STORE_TIMEOUT_SECS",
            DEFAULT_STORE_TIMEOUT_SECS,
        )?);
        let cache_ttl = Duration::from_secs(parse_secs(
            var("BATOHI_CACHE_TTL_SECS"),
            "BATOHI_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )?);

        let store = match (var("SUPABASE_URL"), var("SUPABASE_KEY")) {
            (Some(url), Some(key)) => StoreBackend::Remote(RemoteStoreConfig {
                url: Url::parse(&url).context("SUPABASE_URL is not a valid URL")?,
                api_key: SecretString::from(key),
                timeout: store_timeout,
            }),
            (Some(_), None) => anyhow::bail!("SUPABASE_URL is set but SUPABASE_KEY is missing"),
            (None, Some(_)) => anyhow::bail!("SUPABASE_KEY is set but SUPABASE_URL is missing"),
            (None, None) => StoreBackend::Local {
                database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            },
        };

        let model = match var("ANTHROPIC_API_KEY") {
            Some(key) => Some(
                ModelConfig::new(SecretString::from(key), var("BATOHI_MODEL"))
                    .context("invalid model configuration")?,
            ),
            None => None,
        };

        Ok(Self {
            bind,
            store,
            model,
            cache_ttl,
        })
    }
}

fn parse_secs(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds")),
        None => Ok(default),
    }
}
