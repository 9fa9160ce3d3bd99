//! Record store: the seam between the search engine and the database, plus row decoding and
//! query execution helpers shared with the CRUD service.

use crate::config::ResolvedEntity;
use crate::error::StoreError;
use crate::search::{OrderSpec, PredicateSet};
use crate::sql::{select_count, select_page, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;

/// Storage behind a search. Both calls receive the same predicate set for one search.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count(&self, predicates: &PredicateSet) -> Result<u64, StoreError>;

    async fn page(
        &self,
        predicates: &PredicateSet,
        order: Option<&OrderSpec>,
        start: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError>;
}

/// PostgreSQL store for one entity.
pub struct PgRecordStore<'a> {
    pool: &'a PgPool,
    entity: &'a ResolvedEntity,
}

impl<'a> PgRecordStore<'a> {
    pub fn new(pool: &'a PgPool, entity: &'a ResolvedEntity) -> Self {
        PgRecordStore { pool, entity }
    }
}

#[async_trait]
impl<'a> RecordStore for PgRecordStore<'a> {
    async fn count(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        let q = select_count(self.entity, predicates)?;
        let n = fetch_count(self.pool, &q).await?;
        Ok(n.max(0) as u64)
    }

    async fn page(
        &self,
        predicates: &PredicateSet,
        order: Option<&OrderSpec>,
        start: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let q = select_page(self.entity, predicates, order, start, limit)?;
        Ok(fetch_all(self.pool, &q).await?)
    }
}

fn bound(q: &QueryBuf) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

pub async fn fetch_all<'c, E>(executor: E, q: &QueryBuf) -> Result<Vec<Value>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let rows = bound(q).fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

pub async fn fetch_optional<'c, E>(executor: E, q: &QueryBuf) -> Result<Option<Value>, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let row = bound(q).fetch_optional(executor).await?;
    Ok(row.as_ref().map(row_to_json))
}

/// First column of the first row as a count.
pub async fn fetch_count<'c, E>(executor: E, q: &QueryBuf) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let row = bound(q).fetch_one(executor).await?;
    row.try_get::<i64, _>(0)
}

pub fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    let mut map = serde_json::Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, idx));
    }
    Value::Object(map)
}

/// Decode one cell by trying the supported types in turn. A typed NULL stops the search.
fn cell_to_value(row: &PgRow, idx: usize) -> Value {
    macro_rules! decode_as {
        ($t:ty, $conv:expr) => {
            if let Ok(v) = row.try_get::<Option<$t>, _>(idx) {
                return v.map($conv).unwrap_or(Value::Null);
            }
        };
    }
    decode_as!(i16, Value::from);
    decode_as!(i32, Value::from);
    decode_as!(i64, Value::from);
    decode_as!(f32, |n: f32| Value::from(n as f64));
    decode_as!(f64, Value::from);
    decode_as!(bool, Value::Bool);
    decode_as!(uuid::Uuid, |u: uuid::Uuid| Value::String(u.to_string()));
    decode_as!(chrono::DateTime<chrono::Utc>, |d: chrono::DateTime<chrono::Utc>| {
        Value::String(d.to_rfc3339())
    });
    decode_as!(chrono::NaiveDateTime, |d: chrono::NaiveDateTime| {
        Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    });
    decode_as!(chrono::NaiveDate, |d: chrono::NaiveDate| {
        Value::String(d.format("%Y-%m-%d").to_string())
    });
    decode_as!(chrono::NaiveTime, |t: chrono::NaiveTime| {
        Value::String(t.format("%H:%M:%S%.f").to_string())
    });
    decode_as!(String, Value::String);
    decode_as!(Value, |j| j);
    Value::Null
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| StoreError::Unavailable(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
