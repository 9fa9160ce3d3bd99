//! Generic CRUD and search execution against PostgreSQL.

use crate::config::ResolvedEntity;
use crate::error::{AppError, SearchError};
use crate::search::{self, FieldValue, RawParams, SearchResult};
use crate::service::RequestValidator;
use crate::sql::{delete, insert, select_by_id, select_choices, update, PgBindValue, QueryBuf};
use crate::store::{fetch_all, fetch_optional, PgRecordStore};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};

pub struct CrudService;

impl CrudService {
    /// Run a search over the entity's schema.
    pub async fn search(pool: &PgPool, entity: &ResolvedEntity, raw: &RawParams) -> Result<SearchResult, SearchError> {
        let store = PgRecordStore::new(pool, entity);
        search::search(&entity.search, &store, raw).await
    }

    /// Map a path id onto the primary key's text form. Ids that cannot be a key match nothing.
    pub fn parse_id(entity: &ResolvedEntity, raw: &str) -> Result<String, AppError> {
        let not_found = || AppError::NotFound(format!("{} {}", entity.name, raw));
        let pk = entity.pk().ok_or_else(not_found)?;
        match FieldValue::decode(pk.kind, raw) {
            Ok(Some(v)) => Ok(v.to_sql_text()),
            _ => Err(not_found()),
        }
    }

    /// Fetch one row by primary key. Returns JSON object or None.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: &str) -> Result<Option<Value>, AppError> {
        let q = with_id(select_by_id(entity)?, id);
        fetch_optional(pool, &q).await.map_err(AppError::from_db)
    }

    /// Insert one row and return it as read back in the same transaction.
    pub async fn create(pool: &PgPool, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Value, AppError> {
        RequestValidator::validate_create(entity, body).map_err(AppError::Validation)?;
        let mut tx = pool.begin().await?;
        let q = insert(entity, body)?;
        let key = fetch_optional(&mut *tx, &q)
            .await
            .map_err(AppError::from_db)?
            .and_then(|row| first_cell_text(&row))
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        let row = Self::read_in(&mut tx, entity, &key)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        tx.commit().await?;
        tracing::debug!(entity = %entity.name, id = %key, "created");
        Ok(row)
    }

    /// Update one row by id. `None` when no row has that id.
    pub async fn update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        RequestValidator::validate_update(entity, body).map_err(AppError::Validation)?;
        let mut tx = pool.begin().await?;
        let q = update(entity, id, body)?;
        if fetch_optional(&mut *tx, &q).await.map_err(AppError::from_db)?.is_none() {
            return Ok(None);
        }
        let row = Self::read_in(&mut tx, entity, id).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Delete one row by id. Returns whether a row was removed.
    pub async fn delete(pool: &PgPool, entity: &ResolvedEntity, id: &str) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;
        let q = with_id(delete(entity)?, id);
        let removed = fetch_optional(&mut *tx, &q).await.map_err(AppError::from_db)?.is_some();
        tx.commit().await?;
        Ok(removed)
    }

    /// `(value, label)` pairs for a relation or enum field, led by the empty choice.
    pub async fn choices(pool: &PgPool, entity: &ResolvedEntity, field_name: &str) -> Result<Vec<(String, String)>, AppError> {
        let field = entity
            .field(field_name)
            .filter(|f| f.relation.is_some() || f.values.is_some() || f.kind == search::FieldKind::Enum)
            .ok_or_else(|| AppError::NotFound(format!("choices for {}.{}", entity.name, field_name)))?;
        let mut out = vec![(String::new(), String::new())];
        if let (None, Some(values)) = (&field.relation, &field.values) {
            out.extend(values.iter().map(|v| (v.clone(), v.clone())));
            return Ok(out);
        }
        let q = select_choices(entity, field)?;
        for row in fetch_all(pool, &q).await.map_err(AppError::from_db)? {
            let text = |key: &str| row.get(key).and_then(cell_text).unwrap_or_default();
            out.push((text("value"), text("label")));
        }
        Ok(out)
    }

    async fn read_in(conn: &mut PgConnection, entity: &ResolvedEntity, id: &str) -> Result<Option<Value>, AppError> {
        let q = with_id(select_by_id(entity)?, id);
        fetch_optional(conn, &q).await.map_err(AppError::from_db)
    }
}

fn with_id(mut q: QueryBuf, id: &str) -> QueryBuf {
    q.params.push(PgBindValue::Text(id.to_string()));
    q
}

fn cell_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_cell_text(row: &Value) -> Option<String> {
    row.as_object()?.values().next().and_then(cell_text)
}
