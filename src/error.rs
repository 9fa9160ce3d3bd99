//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} column {column}")]
    InvalidPrimaryKey { entity: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("unsupported field type '{type_name}' for {entity}.{field}")]
    UnsupportedFieldType {
        entity: String,
        field: String,
        type_name: String,
    },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("search schema for {entity}: {source}")]
    Schema {
        entity: String,
        #[source]
        source: SchemaError,
    },
}

/// Misuse of the search schema. Raised while building a schema, or while building
/// criteria from operators that the field does not accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported field kind '{kind}' for field '{field}'")]
    UnsupportedFieldKind { field: String, kind: String },
    #[error("invalid operator '{operator}' for field '{field}'")]
    InvalidOperator { field: String, operator: String },
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("invalid default for '{key}': {message}")]
    InvalidDefault { key: &'static str, message: String },
    #[error("search schema has no fields")]
    NoFields,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid argument: {0}")]
pub struct InvalidArgument(pub &'static str);

/// Per-field validation messages keyed by parameter path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors(BTreeMap::new())
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.insert(path, message);
        errors
    }

    /// Keeps the first message recorded for a path.
    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.entry(path.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Failure of the underlying record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("query: {0}")]
    Query(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("bad request: {0}")]
    BadRequest(ValidationErrors),
    #[error("invalid operator '{operator}' for field '{field}'")]
    InvalidOperator { field: String, operator: String },
    #[error("unsupported field kind '{kind}' for field '{field}'")]
    UnsupportedFieldKind { field: String, kind: String },
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}

impl From<ValidationErrors> for SearchError {
    fn from(errors: ValidationErrors) -> Self {
        SearchError::BadRequest(errors)
    }
}

impl From<SchemaError> for SearchError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::InvalidOperator { field, operator } => SearchError::InvalidOperator { field, operator },
            SchemaError::UnsupportedFieldKind { field, kind } => SearchError::UnsupportedFieldKind { field, kind },
            SchemaError::UnknownField(field) => {
                SearchError::BadRequest(ValidationErrors::single(field, "unknown field"))
            }
            other => SearchError::BadRequest(ValidationErrors::single("schema", other.to_string())),
        }
    }
}

impl SearchError {
    pub fn status(&self) -> StatusCode {
        match self {
            SearchError::BadRequest(_) | SearchError::InvalidOperator { .. } => StatusCode::BAD_REQUEST,
            SearchError::UnsupportedFieldKind { .. }
            | SearchError::InvalidArgument(_)
            | SearchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SearchError::BadRequest(_) => "bad_request",
            SearchError::InvalidOperator { .. } => "invalid_operator",
            SearchError::UnsupportedFieldKind { .. } => "schema_error",
            SearchError::InvalidArgument(_) => "invalid_argument",
            SearchError::Storage(_) => "storage_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(ValidationErrors),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl AppError {
    /// Unique violations become `Conflict`; everything else stays a database error.
    pub fn from_db(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                return AppError::Conflict(db.message().to_string());
            }
        }
        AppError::Db(e)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Search(e) => e.status(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Db(e) => AppError::from_db(e),
            other => AppError::Search(SearchError::Storage(other)),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = match &self {
            AppError::Config(_) => "config_error",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Search(e) => e.code(),
        };
        let details = match &self {
            AppError::Validation(errors) | AppError::Search(SearchError::BadRequest(errors)) => {
                serde_json::to_value(errors).ok()
            }
            AppError::Search(SearchError::InvalidOperator { field, operator }) => {
                let errors = ValidationErrors::single(field.clone(), format!("invalid operator '{}'", operator));
                serde_json::to_value(errors).ok()
            }
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_first_message_per_path() {
        let mut errors = ValidationErrors::new();
        errors.insert("limit", "must be at least 1");
        errors.insert("limit", "must be an integer");
        errors.insert("start", "must be a non-negative integer");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("limit"), Some("must be at least 1"));
        assert_eq!(errors.to_string(), "limit: must be at least 1; start: must be a non-negative integer");
    }

    #[test]
    fn search_errors_map_to_status() {
        let bad = AppError::from(SearchError::BadRequest(ValidationErrors::single("limit", "x")));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let op = AppError::from(SearchError::InvalidOperator {
            field: "name".into(),
            operator: "__eq__".into(),
        });
        assert_eq!(op.status(), StatusCode::BAD_REQUEST);
        let storage = AppError::from(SearchError::Storage(StoreError::Unavailable("down".into())));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let arg = AppError::from(SearchError::from(InvalidArgument("limit")));
        assert_eq!(arg.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn schema_error_converts_into_search_error() {
        let e: SearchError = SchemaError::InvalidOperator {
            field: "name".into(),
            operator: "gt".into(),
        }
        .into();
        assert!(matches!(e, SearchError::InvalidOperator { ref operator, .. } if operator == "gt"));
        let e: SearchError = SchemaError::UnsupportedFieldKind {
            field: "blob".into(),
            kind: "relation_many".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_errors_become_app_errors() {
        let e = AppError::from(StoreError::Db(sqlx::Error::RowNotFound));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        let e = AppError::from(StoreError::Query("unknown field".into()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_is_404() {
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }
}
