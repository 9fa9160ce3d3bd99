//! Route composition: common routes plus entity routes under one body limit.

mod common;
mod entity;

pub use common::common_routes;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// The full application router.
pub fn app(state: AppState) -> Router {
    let body_limit = state.settings.body_limit;
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(entity_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_from_str, resolve, Settings};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const CONFIG: &str = r#"[
        {"name": "User", "table": "users", "primary_key": "id", "operations": ["read", "search"], "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "name", "type": "text", "nullable": false}]},
        {"name": "Post", "table": "posts", "primary_key": "id",
         "search": {"max_limit": 50, "comparators": {"string": {"operators": ["eq", "ilike"], "default": "ilike"}}},
         "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "title", "type": "text", "nullable": false},
            {"name": "author", "type": "integer", "relation": {"target": "User", "column": "author_id", "label": "name"}}]},
        {"name": "Comment", "table": "comments", "primary_key": "id", "operations": ["read"], "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "post", "type": "integer", "relation": {"target": "Post", "column": "post_id", "label": "title"}}]}
    ]"#;

    fn test_app() -> Router {
        let settings = Settings::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/crud_scaffold_test".into()),
            "BODY_LIMIT_BYTES" => Some("256".into()),
            _ => None,
        })
        .unwrap();
        let model = resolve(&load_from_str(CONFIG).unwrap(), &settings.search).unwrap();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&settings.database_url)
            .unwrap();
        app(AppState::new(pool, model, settings))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = test_app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(uri: &str) -> (StatusCode, Value) {
        send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn health_answers_without_database() {
        let (status, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn version_lists_served_entities() {
        let (status, body) = get("/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(body["entities"], serde_json::json!(["users", "posts", "comments"]));
    }

    #[tokio::test]
    async fn choices_need_search_enabled() {
        let (status, body) = get("/comments/choices/post").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "bad request: search not allowed");
    }

    #[tokio::test]
    async fn unknown_entity_is_404() {
        let (status, body) = get("/widgets").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn invalid_operator_is_400() {
        let (status, body) = get("/posts?title=rust&title.comparator=gt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_operator");
        assert_eq!(body["error"]["details"]["title"], "invalid operator 'gt'");
    }

    #[tokio::test]
    async fn out_of_range_controls_are_400() {
        let (status, body) = get("/posts?limit=500&start=-1&direction=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let details = &body["error"]["details"];
        assert_eq!(details["limit"], "must be at most 50");
        assert_eq!(details["start"], "must be a non-negative integer");
        assert_eq!(details["direction"], "must be one of: asc, desc");
    }

    #[tokio::test]
    async fn unknown_search_key_is_400() {
        let (status, body) = get("/posts?colour=red").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["colour"], "unknown parameter");
    }

    #[tokio::test]
    async fn schema_description_lists_comparators() {
        let (status, body) = get("/posts/search/schema").await;
        assert_eq!(status, StatusCode::OK);
        let fields = body["data"]["fields"].as_array().unwrap();
        let title = fields.iter().find(|f| f["name"] == "title").unwrap();
        assert_eq!(title["default_comparator"], "ilike");
        assert_eq!(body["data"]["controls"]["limit"]["max"], 50);
    }

    #[tokio::test]
    async fn disabled_operation_is_rejected() {
        let request = Request::post("/users")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "Ann"}"#))
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unparsable_id_is_404() {
        let (status, _) = get("/posts/not-a-number").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_body_is_422_before_any_query() {
        let request = Request::post("/posts")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title": null, "rating": 5}"#))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["title"], "is required");
        assert_eq!(body["error"]["details"]["rating"], "unknown field");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::post("/posts")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"title": "{}"}}"#, "x".repeat(1024))))
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unsubmitted_form_ignores_body_criteria() {
        let request = Request::post("/posts/search?limit=0")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("title=rust&title.comparator=gt"))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["limit"], "must be at least 1");
        assert!(body["error"]["details"].get("title").is_none());
    }
}
