//! Entity handlers: search, form search, schema description, choices, create, read, update, delete.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok, SearchPage};
use crate::search::RawParams;
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

/// Resolve the entity behind a path segment and check the operation is enabled.
fn entity_for<'s>(state: &'s AppState, path_segment: &str, operation: &str) -> Result<&'s ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !entity.allows(operation) {
        return Err(AppError::BadRequest(format!("{} not allowed", operation)));
    }
    Ok(entity)
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

async fn run_search(state: &AppState, entity: &ResolvedEntity, raw: RawParams) -> Result<Json<SearchPage>, AppError> {
    let result = CrudService::search(&state.pool, entity, &raw).await?;
    Ok(Json(SearchPage::new(result, state.settings.search.page_window)))
}

pub async fn search(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "search")?;
    run_search(&state, entity, RawParams::from_pairs(pairs)).await
}

/// Criteria come from the form body only once it was submitted; paging stays in the query string.
pub async fn search_form(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "search")?;
    let mut raw = RawParams::from_pairs(pairs);
    let form = RawParams::from_pairs(form);
    if form.is_submitted() {
        raw.extend(form);
    }
    run_search(&state, entity, raw).await
}

pub async fn search_schema(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "search")?;
    Ok(success_one_ok(entity.search.describe()))
}

pub async fn choices(
    State(state): State<AppState>,
    Path((path_segment, field)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "search")?;
    let pairs = CrudService::choices(&state.pool, entity, &field).await?;
    Ok(success_many(pairs))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "create")?;
    let body = body_to_map(body)?;
    let row = CrudService::create(&state.pool, entity, &body).await?;
    Ok(success_one(row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let id = CrudService::parse_id(entity, &id_str)?;
    let row = CrudService::read(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(success_one_ok(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "update")?;
    let id = CrudService::parse_id(entity, &id_str)?;
    let body = body_to_map(body)?;
    let row = CrudService::update(&state.pool, entity, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(success_one_ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "delete")?;
    let id = CrudService::parse_id(entity, &id_str)?;
    if !CrudService::delete(&state.pool, entity, &id).await? {
        return Err(AppError::NotFound(id_str));
    }
    Ok(StatusCode::NO_CONTENT)
}
