//! Runs a search: validate, build predicates once, count, fetch one page, paginate.

use crate::error::{SearchError, StoreError};
use crate::search::paginator::{PaginationMeta, Paginator};
use crate::search::params::RawParams;
use crate::search::schema::{SearchRequest, SearchSchema};
use crate::store::RecordStore;
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub rows: Vec<Value>,
    pub columns: Vec<String>,
    pub paginator: Paginator,
}

impl SearchResult {
    pub fn total(&self) -> u64 {
        self.paginator.total()
    }

    pub fn meta(&self, window: i64) -> PaginationMeta {
        self.paginator.meta(window)
    }

    /// Cell of `row` for a listing column; dotted columns reach into embedded relations.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| lookup(r, column))
    }
}

/// Follow a dot path (`owner.name`) through nested JSON objects.
pub fn lookup<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(row, |v, key| v.get(key))
}

pub async fn search<S>(schema: &SearchSchema, store: &S, raw: &RawParams) -> Result<SearchResult, SearchError>
where
    S: RecordStore + ?Sized,
{
    let request = schema.validate(raw)?;
    execute(schema, store, &request).await
}

/// Run an already validated request. Count and page share one predicate set and run in order.
pub async fn execute<S>(schema: &SearchSchema, store: &S, request: &SearchRequest) -> Result<SearchResult, SearchError>
where
    S: RecordStore + ?Sized,
{
    let predicates = request.predicates();
    let order = request.order();
    tracing::debug!(
        criteria = predicates.criteria.len(),
        intersect = predicates.intersect,
        order_by = ?order.as_ref().map(|o| o.field.name.as_str()),
        start = request.start,
        limit = request.limit,
        "search"
    );
    let total = store.count(&predicates).await.map_err(storage_failure)?;
    let rows = store
        .page(&predicates, order.as_ref(), request.start, request.limit)
        .await
        .map_err(storage_failure)?;
    let paginator = Paginator::new(total, request.start, request.limit)?;
    Ok(SearchResult {
        rows,
        columns: schema.columns().to_vec(),
        paginator,
    })
}

fn storage_failure(e: StoreError) -> SearchError {
    tracing::error!(error = %e, "search query failed");
    SearchError::Storage(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::comparator::Operator;
    use crate::search::criterion::{Criterion, PredicateSet};
    use crate::search::field::{FieldDescriptor, FieldKind};
    use crate::search::schema::{Direction, OrderSpec};
    use crate::search::value::FieldValue;
    use async_trait::async_trait;
    use serde_json::json;
    use std::cmp::Ordering;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Count(PredicateSet),
        Page(PredicateSet, Option<OrderSpec>, u64, u64),
    }

    /// Rows kept in insertion order; `fail` makes every query return an error.
    struct MemoryStore {
        rows: Vec<Value>,
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    impl MemoryStore {
        fn new(rows: Vec<Value>) -> Self {
            MemoryStore {
                rows,
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            MemoryStore {
                fail: true,
                ..MemoryStore::new(Vec::new())
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn matching(&self, predicates: &PredicateSet) -> Vec<Value> {
            self.rows
                .iter()
                .filter(|row| {
                    if predicates.is_empty() {
                        return true;
                    }
                    let mut hits = predicates.criteria.iter().map(|c| matches(row, c));
                    if predicates.intersect {
                        hits.all(|h| h)
                    } else {
                        hits.any(|h| h)
                    }
                })
                .cloned()
                .collect()
        }
    }

    fn compare(cell: &Value, value: &FieldValue) -> Option<Ordering> {
        match (cell, value) {
            (Value::Number(n), FieldValue::Int(i)) => n.as_f64()?.partial_cmp(&(*i as f64)),
            (Value::Number(n), FieldValue::Float(f)) => n.as_f64()?.partial_cmp(f),
            (Value::String(s), FieldValue::Date(d)) => Some(s[..10.min(s.len())].cmp(&d.to_string())),
            (Value::String(s), v) => Some(s.as_str().cmp(v.to_sql_text().as_str())),
            _ => None,
        }
    }

    fn matches(row: &Value, c: &Criterion) -> bool {
        let cell = row.get(&c.field.name).unwrap_or(&Value::Null);
        match c.operator {
            Operator::Like | Operator::ILike => {
                let needle = c.value.to_sql_text().to_lowercase();
                cell.as_str().is_some_and(|s| s.to_lowercase().contains(&needle))
            }
            Operator::Eq => compare(cell, &c.value) == Some(Ordering::Equal),
            Operator::Ne => compare(cell, &c.value) != Some(Ordering::Equal),
            Operator::Lt => compare(cell, &c.value) == Some(Ordering::Less),
            Operator::Le => matches!(compare(cell, &c.value), Some(Ordering::Less | Ordering::Equal)),
            Operator::Gt => compare(cell, &c.value) == Some(Ordering::Greater),
            Operator::Ge => matches!(compare(cell, &c.value), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Contains | Operator::NotContains => false,
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn count(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
            self.calls.lock().unwrap().push(Call::Count(predicates.clone()));
            if self.fail {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(self.matching(predicates).len() as u64)
        }

        async fn page(
            &self,
            predicates: &PredicateSet,
            order: Option<&OrderSpec>,
            start: u64,
            limit: u64,
        ) -> Result<Vec<Value>, StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Page(predicates.clone(), order.cloned(), start, limit));
            if self.fail {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            let mut rows = self.matching(predicates);
            if let Some(order) = order {
                let key = |r: &Value| r.get(&order.field.name).map(|v| v.to_string()).unwrap_or_default();
                rows.sort_by_key(key);
                if order.direction == Direction::Desc {
                    rows.reverse();
                }
            }
            Ok(rows.into_iter().skip(start as usize).take(limit as usize).collect())
        }
    }

    fn people() -> Vec<Value> {
        vec![
            json!({"id": 1, "name": "Smith", "age": 40, "created": "2024-01-03T09:00:00"}),
            json!({"id": 2, "name": "Jones", "age": 31, "created": "2024-03-10T12:00:00"}),
            json!({"id": 3, "name": "Smyth", "age": 25, "created": "2024-02-14T18:30:00"}),
            json!({"id": 4, "name": "Brown", "age": 52, "created": "2024-01-03T23:59:00"}),
        ]
    }

    fn schema() -> SearchSchema {
        SearchSchema::builder()
            .field(FieldDescriptor::new("name", FieldKind::String, false))
            .field(FieldDescriptor::new("age", FieldKind::Numeric, true))
            .field(FieldDescriptor::new("created", FieldKind::DateTime, false))
            .natural_order()
            .build()
            .unwrap()
    }

    fn raw(pairs: &[(&str, &str)]) -> RawParams {
        RawParams::from_pairs(pairs.iter().copied())
    }

    fn ids(result: &SearchResult) -> Vec<i64> {
        result.rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn count_and_page_receive_the_same_single_predicate() {
        let store = MemoryStore::new(people());
        let result = search(&schema(), &store, &raw(&[("name.value", "sm"), ("name.comparator", "ilike")]))
            .await
            .unwrap();
        assert_eq!(result.total(), 2);
        assert_eq!(ids(&result), vec![1, 3]);

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        let (Call::Count(counted), Call::Page(paged, order, 0, 25)) = (&calls[0], &calls[1]) else {
            panic!("unexpected calls: {:?}", calls);
        };
        assert_eq!(counted, paged);
        assert_eq!(counted.criteria.len(), 1);
        assert_eq!(counted.criteria[0].field.name, "name");
        assert_eq!(counted.criteria[0].operator, Operator::ILike);
        assert_eq!(counted.criteria[0].value, FieldValue::Text("sm".into()));
        assert_eq!(*order, None);
    }

    #[tokio::test]
    async fn ordering_without_criteria_counts_every_row() {
        let store = MemoryStore::new(people());
        let result = search(&schema(), &store, &raw(&[("order_by", "created"), ("direction", "desc")]))
            .await
            .unwrap();
        assert_eq!(result.total(), 4);
        assert_eq!(ids(&result), vec![2, 3, 4, 1]);
        let calls = store.calls();
        let Call::Page(predicates, Some(order), _, _) = &calls[1] else {
            panic!("page query was not ordered");
        };
        assert!(predicates.is_empty());
        assert_eq!(order.field.name, "created");
        assert_eq!(order.direction, Direction::Desc);
    }

    #[tokio::test]
    async fn invalid_operator_runs_no_query() {
        let store = MemoryStore::new(people());
        let err = search(&schema(), &store, &raw(&[("name.value", "sm"), ("name.comparator", "__eq__")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidOperator { .. }));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn bad_request_runs_no_query() {
        let store = MemoryStore::new(people());
        let err = search(&schema(), &store, &raw(&[("limit", "0")])).await.unwrap_err();
        let SearchError::BadRequest(errors) = err else {
            panic!("expected a bad request");
        };
        assert_eq!(errors.get("limit"), Some("must be at least 1"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_search_returns_the_same_rows() {
        let store = MemoryStore::new(people());
        let params = raw(&[("age.value", "30"), ("age.comparator", "gt"), ("limit", "2")]);
        let first = search(&schema(), &store, &params).await.unwrap();
        let second = search(&schema(), &store, &params).await.unwrap();
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.total(), 3);
        assert_eq!(first.paginator.pages(), 2);
        assert_eq!(first.rows.len(), 2);
    }

    #[tokio::test]
    async fn empty_criterion_matches_the_unfiltered_search() {
        let store = MemoryStore::new(people());
        let filtered = search(&schema(), &store, &raw(&[("age.value", ""), ("age.comparator", "gt")]))
            .await
            .unwrap();
        let plain = search(&schema(), &store, &RawParams::new()).await.unwrap();
        assert_eq!(filtered.rows, plain.rows);
        assert_eq!(filtered.total(), plain.total());
    }

    #[tokio::test]
    async fn date_on_datetime_field_matches_the_whole_day() {
        let store = MemoryStore::new(people());
        let result = search(&schema(), &store, &raw(&[("created", "2024-01-03")])).await.unwrap();
        assert_eq!(ids(&result), vec![1, 4]);
    }

    #[tokio::test]
    async fn union_mode_combines_with_or() {
        let store = MemoryStore::new(people());
        let result = search(
            &schema(),
            &store,
            &raw(&[("name", "jones"), ("age.value", "50"), ("age.comparator", "ge"), ("intersect", "false")]),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec![2, 4]);
    }

    #[tokio::test]
    async fn storage_failure_is_reported() {
        let store = MemoryStore::failing();
        let err = search(&schema(), &store, &RawParams::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::Storage(StoreError::Unavailable(_))));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let store = MemoryStore::new(people());
        let result = search(&schema(), &store, &raw(&[("start", "10"), ("limit", "2")])).await.unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.total(), 4);
        assert_eq!(result.meta(5).last.start, 2);
    }

    #[test]
    fn lookup_follows_dot_paths() {
        let row = json!({"name": "Smith", "owner": {"label": "Acme"}});
        assert_eq!(lookup(&row, "owner.label"), Some(&json!("Acme")));
        assert_eq!(lookup(&row, "name"), Some(&json!("Smith")));
        assert_eq!(lookup(&row, "owner.missing"), None);
    }
}
