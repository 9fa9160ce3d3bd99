//! Entity routes built from the resolved model.
//! Paths are parameterized; handlers resolve the entity by its path segment.

use crate::handlers::entity::{
    choices, create, delete as delete_handler, read, search, search_form, search_schema, update,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(search).post(create))
        .route("/:path_segment/search", post(search_form))
        .route("/:path_segment/search/schema", get(search_schema))
        .route("/:path_segment/choices/:field", get(choices))
        .route(
            "/:path_segment/:id",
            get(read).put(update).patch(update).delete(delete_handler),
        )
        .with_state(state)
}
