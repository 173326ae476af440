//! [`TableStore`] backed by the local SQLite database.
//!
//! Every listing table has the columns `id`, `name`, `attributes` and
//! `created_at`. Fields other than those three are stored inside the
//! `attributes` JSON document and addressed with `json_extract`, so callers
//! see one flat row exactly like the remote store returns it.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::store::{
    Filter, Row, Select, Selected, StoreError, TableStore, validate_identifier,
};

const RETURNING: &str = " RETURNING id, name, attributes, created_at";

#[derive(Debug, FromRow)]
struct StoredRow {
    id: i64,
    name: String,
    attributes: String,
    created_at: String,
}

impl StoredRow {
    fn into_row(self) -> Result<Row, StoreError> {
        let mut row = match serde_json::from_str::<Value>(&self.attributes)? {
            Value::Object(map) => map,
            _ => Row::new(),
        };
        row.insert("id".to_string(), Value::from(self.id));
        row.insert("name".to_string(), Value::from(self.name));
        row.insert("created_at".to_string(), Value::from(self.created_at));
        Ok(row)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTableStore {
    pool: SqlitePool,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// SQL expression for a column: a real column or a field of `attributes`.
fn column_expr(column: &str) -> Result<String, StoreError> {
    let column = validate_identifier(column)?;
    Ok(match column {
        "id" | "name" | "created_at" => column.to_string(),
        other => format!("json_extract(attributes, '$.{other}')"),
    })
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                qb.push_bind(i);
            }
            None => {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        },
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        other => {
            qb.push_bind(other.to_string());
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter]) -> Result<(), StoreError> {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(column, Value::Null) => {
                qb.push(column_expr(column)?).push(" IS NULL");
            }
            Filter::Eq(column, value) => {
                qb.push(column_expr(column)?).push(" = ");
                push_value(qb, value);
            }
            Filter::ILike(column, pattern) => {
                qb.push("lower(")
                    .push(column_expr(column)?)
                    .push(") LIKE lower(")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        }
    }
    Ok(())
}

fn require_filters(filters: &[Filter], operation: &str) -> Result<(), StoreError> {
    if filters.is_empty() {
        return Err(StoreError::remote(format!("{operation} requires a filter")));
    }
    Ok(())
}

fn take_string(row: &mut Row, key: &str) -> Result<Option<String>, StoreError> {
    match row.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(StoreError::remote(format!(
            "column \"{key}\" expects a string, got {other}"
        ))),
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn select(&self, table: &str, query: &Select) -> Result<Selected, StoreError> {
        let table = validate_identifier(table)?;

        let count = if query.count {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
            push_filters(&mut qb, &query.filters)?;
            let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
            Some(count.max(0) as u64)
        } else {
            None
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT id, name, attributes, created_at FROM {table}"
        ));
        push_filters(&mut qb, &query.filters)?;

        if let Some(order) = &query.order {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            qb.push(" ORDER BY ")
                .push(column_expr(&order.column)?)
                .push(format!(" {direction}, id {direction}"));
        }

        // SQLite binds i64; an offset past i64::MAX can only be an empty page.
        let mut past_end = false;
        if let Some((from, to)) = query.range {
            match i64::try_from(from) {
                Ok(offset) => {
                    let limit = i64::try_from(to.saturating_sub(from).saturating_add(1))
                        .unwrap_or(i64::MAX);
                    qb.push(" LIMIT ")
                        .push_bind(limit)
                        .push(" OFFSET ")
                        .push_bind(offset);
                }
                Err(_) => past_end = true,
            }
        }

        let stored: Vec<StoredRow> = if past_end {
            debug!(table, range = ?query.range, "range starts past the last row");
            Vec::new()
        } else {
            qb.build_query_as().fetch_all(&self.pool).await?
        };

        if query.single && stored.len() != 1 {
            return Err(StoreError::NotSingle {
                rows: stored.len() as u64,
            });
        }

        debug!(table, rows = stored.len(), count = ?count, "sqlite select");

        let rows = stored
            .into_iter()
            .map(StoredRow::into_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Selected { rows, count })
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        let table = validate_identifier(table)?;

        let id = row.remove("id").filter(|v| !v.is_null());
        let name = take_string(&mut row, "name")?.ok_or_else(|| {
            StoreError::remote("null value in column \"name\" violates not-null constraint")
        })?;
        let created_at = take_string(&mut row, "created_at")?;
        let attributes = serde_json::to_string(&Value::Object(row))?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {table} (name, attributes"));
        if id.is_some() {
            qb.push(", id");
        }
        if created_at.is_some() {
            qb.push(", created_at");
        }
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            values.push_bind(name);
            values.push_bind(attributes);
            if let Some(id) = &id {
                values.push_bind(id.as_i64().ok_or_else(|| {
                    StoreError::remote(format!("column \"id\" expects an integer, got {id}"))
                })?);
            }
            if let Some(created_at) = created_at {
                values.push_bind(created_at);
            }
        }
        qb.push(")").push(RETURNING);

        let stored: StoredRow = qb.build_query_as().fetch_one(&self.pool).await?;
        debug!(table, id = stored.id, "sqlite insert");
        stored.into_row()
    }

    async fn update(&self, table: &str, filters: &[Filter], mut patch: Row) -> Result<Vec<Row>, StoreError> {
        let table = validate_identifier(table)?;
        require_filters(filters, "UPDATE")?;

        patch.remove("id");
        let name = take_string(&mut patch, "name")?;
        let created_at = take_string(&mut patch, "created_at")?;
        let attributes = serde_json::to_string(&Value::Object(patch))?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE {table} SET attributes = json_patch(attributes, "
        ));
        qb.push_bind(attributes).push(")");
        if let Some(name) = name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(created_at) = created_at {
            qb.push(", created_at = ").push_bind(created_at);
        }
        push_filters(&mut qb, filters)?;
        qb.push(RETURNING);

        let stored: Vec<StoredRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        debug!(table, rows = stored.len(), "sqlite update");
        stored.into_iter().map(StoredRow::into_row).collect()
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let table = validate_identifier(table)?;
        require_filters(filters, "DELETE")?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table}"));
        push_filters(&mut qb, filters)?;
        let result = qb.build().execute(&self.pool).await?;
        debug!(table, rows = result.rows_affected(), "sqlite delete");
        Ok(result.rows_affected())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let table = validate_identifier(table)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_filters(&mut qb, filters)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::DBService;

    async fn store() -> SqliteTableStore {
        let db = DBService::in_memory().await.unwrap();
        SqliteTableStore::new(db.pool)
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_keeps_attributes() {
        let store = store().await;
        let inserted = store
            .insert(
                "hotels",
                row(json!({"name": "Hotel Yak", "city": "Pokhara", "price": 45})),
            )
            .await
            .unwrap();

        assert!(inserted["id"].as_i64().is_some());
        assert_eq!(inserted["name"], "Hotel Yak");
        assert_eq!(inserted["city"], "Pokhara");
        assert_eq!(inserted["price"], 45);
        assert!(inserted["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_insert_without_name_fails() {
        let store = store().await;
        let err = store
            .insert("hotels", row(json!({"city": "Kathmandu"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[tokio::test]
    async fn test_select_range_count_and_search() {
        let store = store().await;
        for i in 0..12 {
            let name = if i % 3 == 0 {
                format!("Lakeside Inn {i}")
            } else {
                format!("Hotel {i}")
            };
            store.insert("hotels", row(json!({"name": name}))).await.unwrap();
        }

        let page = store
            .select(
                "hotels",
                &Select::all().count_exact().order("created_at", false).range(0, 4),
            )
            .await
            .unwrap();
        assert_eq!(page.count, Some(12));
        assert_eq!(page.rows.len(), 5);
        // newest first
        assert_eq!(page.rows[0]["name"], "Hotel 11");

        let found = store
            .select(
                "hotels",
                &Select::all().count_exact().ilike("name", "%LAKESIDE%"),
            )
            .await
            .unwrap();
        assert_eq!(found.count, Some(4));
        assert_eq!(found.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_single_requires_exactly_one_row() {
        let store = store().await;
        let inserted = store
            .insert("hotels", row(json!({"name": "Only"})))
            .await
            .unwrap();
        let id = inserted["id"].as_i64().unwrap();

        let one = store
            .select("hotels", &Select::all().eq("id", id).single())
            .await
            .unwrap();
        assert_eq!(one.rows.len(), 1);

        let err = store
            .select("hotels", &Select::all().eq("id", id + 100).single())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotSingle { rows: 0 });
    }

    #[tokio::test]
    async fn test_update_merges_patch_and_leaves_other_fields() {
        let store = store().await;
        let inserted = store
            .insert(
                "hotels",
                row(json!({"name": "Old", "city": "Lumbini", "stars": 3})),
            )
            .await
            .unwrap();
        let id = inserted["id"].as_i64().unwrap();

        let updated = store
            .update(
                "hotels",
                &[Filter::eq("id", id)],
                row(json!({"name": "New", "stars": 4})),
            )
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["id"], id);
        assert_eq!(updated[0]["name"], "New");
        assert_eq!(updated[0]["stars"], 4);
        assert_eq!(updated[0]["city"], "Lumbini");
        assert_eq!(updated[0]["created_at"], inserted["created_at"]);
    }

    #[tokio::test]
    async fn test_filter_on_attribute_field() {
        let store = store().await;
        store
            .insert("places", row(json!({"name": "Phewa", "district": "Kaski"})))
            .await
            .unwrap();
        store
            .insert("places", row(json!({"name": "Rara", "district": "Mugu"})))
            .await
            .unwrap();

        let kaski = store
            .count("places", &[Filter::eq("district", "Kaski")])
            .await
            .unwrap();
        assert_eq!(kaski, 1);
    }

    #[tokio::test]
    async fn test_delete_reports_rows_removed() {
        let store = store().await;
        let inserted = store
            .insert("festivals", row(json!({"name": "Dashain"})))
            .await
            .unwrap();
        let id = inserted["id"].as_i64().unwrap();

        assert_eq!(store.delete("festivals", &[Filter::eq("id", id)]).await.unwrap(), 1);
        assert_eq!(store.delete("festivals", &[Filter::eq("id", id)]).await.unwrap(), 0);
        assert!(store.delete("festivals", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_table_is_a_store_error() {
        let store = store().await;
        let err = store.select("admins", &Select::all()).await.unwrap_err();
        assert!(matches!(err, StoreError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_range_beyond_i64_is_an_empty_page() {
        let store = store().await;
        for name in ["Hotel Annapurna", "Hotel Shanker", "Hotel Tibet"] {
            store.insert("hotels", row(json!({"name": name}))).await.unwrap();
        }

        let from = 18_446_744_073_709_551_600;
        let selected = store
            .select(
                "hotels",
                &Select::all().count_exact().range(from, from + 9),
            )
            .await
            .unwrap();
        assert!(selected.rows.is_empty());
        assert_eq!(selected.count, Some(3));

        let everything = store
            .select("hotels", &Select::all().range(0, u64::MAX))
            .await
            .unwrap();
        assert_eq!(everything.rows.len(), 3);
    }
}
