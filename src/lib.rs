//! CRUD scaffold: configuration-driven create/read/update/delete and search over PostgreSQL.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod search;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel, Settings};
pub use error::{AppError, ConfigError, SearchError};
pub use response::{success_many, success_one};
pub use routes::{app, common_routes, entity_routes};
pub use search::{search, Paginator, RawParams, SearchResult, SearchSchema};
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_database_exists, PgRecordStore, RecordStore};
