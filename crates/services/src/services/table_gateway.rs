//! Data access for the dashboard listings (hotels, places, festivals).
//!
//! Pages never talk to the table store directly. Every operation here makes
//! exactly one store call, never retries, and never returns an error: remote
//! failures are logged and folded into the envelope the page renders.
//! Mutations also report which dashboard views they made stale; applying
//! that is up to the caller (see [`super::views::ViewInvalidator`]).

use std::sync::Arc;

use db::{
    models::{record::Record, resource::Resource},
    store::{Filter, Row, Select, StoreError, TableStore},
};
use serde::{
    Deserialize, Serialize, Serializer,
    ser::SerializeMap,
};
use tracing::{debug, error, info, warn};

use super::views::{item_view, list_view};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

/// Listing query as sent by a page. Zero values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn new(page: u64, limit: u64, search: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            search: Some(search.into()),
        }
    }

    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> u64 {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Zero-based inclusive row range of the requested page.
    pub fn row_range(&self) -> (u64, u64) {
        let limit = self.limit();
        let from = (self.page() - 1).saturating_mul(limit);
        (from, from.saturating_add(limit - 1))
    }
}

pub fn total_pages(count: Option<u64>, limit: u64) -> u64 {
    match count {
        Some(count) if limit > 0 => count.div_ceil(limit),
        _ => 0,
    }
}

/// One page of a listing, or the reset failure shape when the store call failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub resource: Resource,
    pub rows: Vec<Record>,
    pub count: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub error: Option<String>,
}

impl Listing {
    /// Failure keeps nothing from the request: page 1, zero counts.
    fn failed(resource: Resource, message: String) -> Self {
        Self {
            resource,
            rows: Vec::new(),
            count: 0,
            total_pages: 0,
            current_page: 1,
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Serialize for Listing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.error.is_some() { 5 } else { 4 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(self.resource.table(), &self.rows)?;
        map.serialize_entry("count", &self.count)?;
        map.serialize_entry("totalPages", &self.total_pages)?;
        map.serialize_entry("currentPage", &self.current_page)?;
        if let Some(error) = &self.error {
            map.serialize_entry("error", error)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(Record),
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub resource: Resource,
    pub id: i64,
    pub outcome: LookupOutcome,
}

impl Serialize for Lookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.outcome {
            LookupOutcome::Found(record) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(self.resource.singular(), record)?;
                map.end()
            }
            LookupOutcome::NotFound => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(
                    "error",
                    &format!("{} {} not found", self.resource.singular(), self.id),
                )?;
                map.serialize_entry("notFound", &true)?;
                map.end()
            }
            LookupOutcome::Failed(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", message)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The row as the store returned it, when it returned one.
    Succeeded(Option<Record>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub resource: Resource,
    pub outcome: MutationOutcome,
    /// View paths made stale by this mutation; empty when it failed.
    pub affected: Vec<String>,
}

impl Mutation {
    fn succeeded(resource: Resource, record: Option<Record>, affected: Vec<String>) -> Self {
        Self {
            resource,
            outcome: MutationOutcome::Succeeded(record),
            affected,
        }
    }

    fn failed(resource: Resource, message: String) -> Self {
        Self {
            resource,
            outcome: MutationOutcome::Failed(message),
            affected: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, MutationOutcome::Succeeded(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match &self.outcome {
            MutationOutcome::Succeeded(record) => record.as_ref(),
            MutationOutcome::Failed(_) => None,
        }
    }
}

impl Serialize for Mutation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match &self.outcome {
            MutationOutcome::Succeeded(record) => {
                map.serialize_entry("success", &true)?;
                if let Some(record) = record {
                    map.serialize_entry(self.resource.singular(), record)?;
                }
            }
            MutationOutcome::Failed(message) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("message", message)?;
            }
        }
        map.end()
    }
}

fn into_records(rows: Vec<Row>) -> Result<Vec<Record>, StoreError> {
    rows.into_iter().map(Record::try_from).collect()
}

/// A row that cannot be read as a record is left out of the page and logged,
/// so one odd row never blanks a listing.
fn listing_rows(table: &str, rows: Vec<Row>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| match Record::try_from(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table, error = %e, "Skipping undecodable row");
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct TableGateway {
    store: Arc<dyn TableStore>,
    resource: Resource,
}

impl TableGateway {
    pub fn new(store: Arc<dyn TableStore>, resource: Resource) -> Self {
        Self { store, resource }
    }

    fn table(&self) -> &'static str {
        self.resource.table()
    }

    /// Newest first, one page at a time, optionally narrowed by a name search.
    pub async fn list(&self, params: &ListParams) -> Listing {
        let page = params.page();
        let limit = params.limit();
        let (from, to) = params.row_range();

        let mut query = Select::all()
            .count_exact()
            .order("created_at", false)
            .range(from, to);
        if let Some(search) = params.search() {
            query = query.ilike(self.resource.search_column(), format!("%{search}%"));
        }

        let result = self
            .store
            .select(self.table(), &query)
            .await
            .map(|selected| (listing_rows(self.table(), selected.rows), selected.count));

        match result {
            Ok((rows, count)) => {
                debug!(
                    table = self.table(),
                    page,
                    limit,
                    rows = rows.len(),
                    count = ?count,
                    "Listed records"
                );
                Listing {
                    resource: self.resource,
                    rows,
                    count: count.unwrap_or(0),
                    total_pages: total_pages(count, limit),
                    current_page: page,
                    error: None,
                }
            }
            Err(e) => {
                error!(table = self.table(), error = %e, "Error fetching records");
                Listing::failed(self.resource, e.to_string())
            }
        }
    }

    pub async fn get(&self, id: i64) -> Lookup {
        let query = Select::all().eq("id", id).single();
        let result = self
            .store
            .select(self.table(), &query)
            .await
            .and_then(|selected| {
                selected
                    .rows
                    .into_iter()
                    .next()
                    .map(Record::try_from)
                    .transpose()
            });

        let outcome = match result {
            Ok(Some(record)) => LookupOutcome::Found(record),
            Ok(None) => LookupOutcome::NotFound,
            Err(e) if e.is_no_rows() => {
                debug!(table = self.table(), id, "Record not found");
                LookupOutcome::NotFound
            }
            Err(e) => {
                error!(table = self.table(), id, error = %e, "Error fetching record");
                LookupOutcome::Failed(e.to_string())
            }
        };

        Lookup {
            resource: self.resource,
            id,
            outcome,
        }
    }

    /// Insert a new row. Any `id` in `data` is dropped; the store assigns it.
    pub async fn create(&self, mut data: Row) -> Mutation {
        data.remove("id");

        let result = self
            .store
            .insert(self.table(), data)
            .await
            .and_then(Record::try_from);

        match result {
            Ok(record) => {
                info!(table = self.table(), id = record.id, "Created record");
                Mutation::succeeded(self.resource, Some(record), vec![list_view(self.resource)])
            }
            Err(e) => {
                error!(table = self.table(), error = %e, "Error creating record");
                Mutation::failed(self.resource, e.to_string())
            }
        }
    }

    /// Partial update of the row with `id`. Fields not in `data` are left alone,
    /// and `id` itself cannot be changed.
    pub async fn update(&self, id: i64, mut data: Row) -> Mutation {
        data.remove("id");

        let result = self
            .store
            .update(self.table(), &[Filter::eq("id", id)], data)
            .await
            .and_then(into_records);

        match result {
            Ok(records) => {
                info!(table = self.table(), id, rows = records.len(), "Updated record");
                Mutation::succeeded(
                    self.resource,
                    records.into_iter().next(),
                    vec![list_view(self.resource), item_view(self.resource, id)],
                )
            }
            Err(e) => {
                error!(table = self.table(), id, error = %e, "Error updating record");
                Mutation::failed(self.resource, e.to_string())
            }
        }
    }

    /// Deleting an id that does not exist still succeeds.
    pub async fn delete(&self, id: i64) -> Mutation {
        match self.store.delete(self.table(), &[Filter::eq("id", id)]).await {
            Ok(removed) => {
                info!(table = self.table(), id, removed, "Deleted record");
                Mutation::succeeded(
                    self.resource,
                    None,
                    vec![list_view(self.resource), item_view(self.resource, id)],
                )
            }
            Err(e) => {
                error!(table = self.table(), id, error = %e, "Error deleting record");
                Mutation::failed(self.resource, e.to_string())
            }
        }
    }
}
