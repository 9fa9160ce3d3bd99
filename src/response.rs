//! Standard response envelope helpers.

use crate::search::{PaginationMeta, SearchResult};
use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

/// One page of search results with the listing columns and page navigation.
#[derive(Serialize)]
pub struct SearchPage {
    pub data: Vec<Value>,
    pub meta: SearchMeta,
}

#[derive(Serialize)]
pub struct SearchMeta {
    pub columns: Vec<String>,
    pub pagination: PaginationMeta,
}

impl SearchPage {
    pub fn new(result: SearchResult, window: i64) -> Self {
        let pagination = result.meta(window);
        SearchPage {
            data: result.rows,
            meta: SearchMeta {
                columns: result.columns,
                pagination,
            },
        }
    }
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<SuccessMany<T>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessMany {
            data,
            meta: MetaCount { count },
        }),
    )
}
