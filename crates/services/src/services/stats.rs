//! Row counts for the analytics overview.

use db::{
    models::resource::Resource,
    store::{StoreError, TableStore},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to count {table}: {source}")]
    Count {
        table: &'static str,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[ts(type = "number")]
    pub hotels: u64,
    #[ts(type = "number")]
    pub places: u64,
    #[ts(type = "number")]
    pub festivals: u64,
    #[ts(type = "number")]
    pub total: u64,
}

impl DashboardStats {
    /// Count every listing table, one store call each.
    pub async fn collect(store: &dyn TableStore) -> Result<Self, StatsError> {
        let mut stats = Self::default();
        for resource in Resource::iter() {
            let table = resource.table();
            let count = store
                .count(table, &[])
                .await
                .map_err(|source| StatsError::Count { table, source })?;
            match resource {
                Resource::Hotels => stats.hotels = count,
                Resource::Places => stats.places = count,
                Resource::Festivals => stats.festivals = count,
            }
            stats.total += count;
        }
        info!(total = stats.total, "Collected dashboard stats");
        Ok(stats)
    }
}
