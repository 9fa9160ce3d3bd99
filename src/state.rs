//! Shared application state for all routes.

use crate::config::{ResolvedModel, Settings};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Resolved once at startup; search schemas inside are immutable.
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, model: ResolvedModel, settings: Settings) -> Self {
        AppState {
            pool,
            model: Arc::new(model),
            settings: Arc::new(settings),
        }
    }
}
