//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved entity.
//! Identifiers come from config only; values are always bound parameters.

use crate::config::{FieldInfo, RelationLink, RelationSpec, ResolvedEntity};
use crate::error::StoreError;
use crate::search::{Cardinality, Criterion, FieldKind, FieldValue, Operator, OrderSpec, PredicateSet};
use crate::sql::params::PgBindValue;
use serde_json::{Map, Value};

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

fn main_table(entity: &ResolvedEntity) -> String {
    format!("{} {}", qualified_table(&entity.schema_name, &entity.table_name), MAIN_ALIAS)
}

fn main_column(column: &str) -> String {
    format!("{}.{}", MAIN_ALIAS, quoted(column))
}

fn cast(pg_type: Option<&str>) -> String {
    pg_type.map(|t| format!("::{}", t)).unwrap_or_default()
}

fn is_timestamptz(pg_type: Option<&str>) -> bool {
    pg_type.is_some_and(|t| {
        let t = t.to_lowercase();
        t.starts_with("timestamptz") || t.starts_with("timestamp with time zone")
    })
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

fn pk_of(entity: &ResolvedEntity) -> Result<(&FieldInfo, &str), StoreError> {
    entity
        .pk()
        .and_then(|f| f.column.as_deref().map(|c| (f, c)))
        .ok_or_else(|| StoreError::Query(format!("entity {} has no primary key column", entity.name)))
}

fn field_of<'a>(entity: &'a ResolvedEntity, name: &str) -> Result<&'a FieldInfo, StoreError> {
    entity
        .field(name)
        .ok_or_else(|| StoreError::Query(format!("unknown field {}.{}", entity.name, name)))
}

/// Output expression for a plain column. Numeric and enum types come back as text so rows decode
/// without extra sqlx features.
fn output_column(field: &FieldInfo, column: &str) -> String {
    let pg_type = field.pg_type.as_deref().unwrap_or("").to_lowercase();
    let base = pg_type.split('(').next().unwrap_or("").trim();
    if field.kind == FieldKind::Enum || base.contains('.') || base == "numeric" || base == "decimal" {
        format!("{}::text", main_column(column))
    } else {
        main_column(column)
    }
}

/// Keys of the related rows of a to-many relation, correlated with the main row.
fn related_keys(entity: &ResolvedEntity, rel: &RelationSpec, as_text: bool) -> Result<String, StoreError> {
    let (_, our_pk) = pk_of(entity)?;
    let text = if as_text { "::text" } else { "" };
    match &rel.link {
        RelationLink::ToMany { foreign_key } => Ok(format!(
            "SELECT r.{}{} FROM {} r WHERE r.{} = {}",
            quoted(&rel.target_pk),
            text,
            qualified_table(&rel.target_schema, &rel.target_table),
            quoted(foreign_key),
            main_column(our_pk)
        )),
        RelationLink::Through {
            schema,
            table,
            source_key,
            target_key,
        } => Ok(format!(
            "SELECT j.{}{} FROM {} j WHERE j.{} = {}",
            quoted(target_key),
            text,
            qualified_table(schema, table),
            quoted(source_key),
            main_column(our_pk)
        )),
        RelationLink::ToOne { .. } => Err(StoreError::Query("to-one relation has no key set".into())),
    }
}

/// SELECT list shared by page and single-row reads. To-one relations are embedded as objects,
/// to-many relations as arrays of keys.
fn select_list(entity: &ResolvedEntity) -> Result<String, StoreError> {
    let mut parts = Vec::with_capacity(entity.fields.len());
    for field in &entity.fields {
        let expr = match (&field.relation, &field.column) {
            (Some(rel), Some(column)) => format!(
                "(SELECT row_to_json(r) FROM {} r WHERE r.{} = {})",
                qualified_table(&rel.target_schema, &rel.target_table),
                quoted(&rel.target_pk),
                main_column(column)
            ),
            (Some(rel), None) => format!("to_json(ARRAY({}))", related_keys(entity, rel, false)?),
            (None, Some(column)) => output_column(field, column),
            (None, None) => continue,
        };
        parts.push(format!("{} AS {}", expr, quoted(&field.name)));
    }
    Ok(parts.join(", "))
}

fn sql_operator(op: Operator) -> &'static str {
    match op {
        Operator::Lt => "<",
        Operator::Le => "<=",
        Operator::Eq => "=",
        Operator::Ne => "IS DISTINCT FROM",
        Operator::Ge => ">=",
        Operator::Gt => ">",
        Operator::Like => "LIKE",
        Operator::ILike => "ILIKE",
        Operator::Contains | Operator::NotContains => "",
    }
}

fn like_pattern(v: &FieldValue) -> String {
    let s = v.to_sql_text();
    if s.contains('%') {
        s
    } else {
        format!("%{}%", s)
    }
}

fn predicate(entity: &ResolvedEntity, q: &mut QueryBuf, c: &Criterion) -> Result<String, StoreError> {
    let field = field_of(entity, &c.field.name)?;
    if field.kind == FieldKind::Relation(Cardinality::Many) {
        let rel = field
            .relation
            .as_ref()
            .ok_or_else(|| StoreError::Query(format!("{} is not a relation", field.name)))?;
        let ids = match &c.value {
            FieldValue::List(items) => items.clone(),
            other => vec![other.to_sql_text()],
        };
        let n = q.push_param(PgBindValue::TextArray(ids));
        let keys = format!("ARRAY({})", related_keys(entity, rel, true)?);
        return Ok(match c.operator {
            Operator::Contains => format!("${}::text[] <@ {}", n, keys),
            Operator::NotContains => format!("NOT ({} && ${}::text[])", keys, n),
            Operator::Eq => format!("({k} <@ ${n}::text[] AND {k} @> ${n}::text[])", k = keys, n = n),
            Operator::Ne => format!("NOT ({k} <@ ${n}::text[] AND {k} @> ${n}::text[])", k = keys, n = n),
            op => {
                return Err(StoreError::Query(format!(
                    "operator {} is not defined for {}",
                    op.code(),
                    field.name
                )))
            }
        });
    }

    let column = field
        .column
        .as_deref()
        .ok_or_else(|| StoreError::Query(format!("{} has no column", field.name)))?;
    let lhs = main_column(column);
    match c.operator {
        Operator::Like | Operator::ILike => {
            let n = q.push_param(PgBindValue::Text(like_pattern(&c.value)));
            return Ok(format!("{}::text {} ${}", lhs, sql_operator(c.operator), n));
        }
        Operator::Contains | Operator::NotContains => {
            let n = q.push_param(PgBindValue::Text(c.value.to_sql_text()));
            let cmp = if c.operator == Operator::Contains { ">" } else { "=" };
            return Ok(format!("strpos({}::text, ${}) {} 0", lhs, n, cmp));
        }
        _ => {}
    }

    let n = q.push_param(PgBindValue::from_field_value(&c.value));
    let op = sql_operator(c.operator);
    let pg_type = field.pg_type.as_deref();
    Ok(match (field.kind, &c.value) {
        (FieldKind::Numeric, _) => format!("{} {} ${}::numeric", lhs, op, n),
        (FieldKind::Boolean, _) => format!("{} {} ${}::boolean", lhs, op, n),
        (FieldKind::Date, _) => format!("{} {} ${}::date", lhs, op, n),
        (FieldKind::Time, _) => format!("{} {} ${}::time", lhs, op, n),
        // A bare date against a timestamp compares calendar days.
        (FieldKind::DateTime, FieldValue::Date(_)) => format!("{}::date {} ${}::date", lhs, op, n),
        (FieldKind::DateTime, _) if is_timestamptz(pg_type) => {
            format!("{} {} (${}::timestamp AT TIME ZONE 'UTC')", lhs, op, n)
        }
        (FieldKind::DateTime, _) => format!("{} {} ${}::timestamp", lhs, op, n),
        (FieldKind::String, _) | (FieldKind::Enum, _) | (FieldKind::Relation(_), _) => {
            format!("{}::text {} ${}", lhs, op, n)
        }
    })
}

/// WHERE clause for a predicate set (empty string when there is nothing to filter).
/// Count and page queries both go through here so they always agree.
pub fn where_clause(entity: &ResolvedEntity, q: &mut QueryBuf, predicates: &PredicateSet) -> Result<String, StoreError> {
    if predicates.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(predicates.criteria.len());
    for c in &predicates.criteria {
        parts.push(format!("({})", predicate(entity, q, c)?));
    }
    let joiner = if predicates.intersect { " AND " } else { " OR " };
    Ok(format!(" WHERE {}", parts.join(joiner)))
}

pub fn select_count(entity: &ResolvedEntity, predicates: &PredicateSet) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let filter = where_clause(entity, &mut q, predicates)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", main_table(entity), filter);
    Ok(q)
}

/// One page of rows. `order` of `None` keeps the store's natural order.
pub fn select_page(
    entity: &ResolvedEntity,
    predicates: &PredicateSet,
    order: Option<&OrderSpec>,
    start: u64,
    limit: u64,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let filter = where_clause(entity, &mut q, predicates)?;
    let order_clause = match order {
        None => String::new(),
        Some(order) => {
            let field = field_of(entity, &order.field.name)?;
            let column = field
                .column
                .as_deref()
                .ok_or_else(|| StoreError::Query(format!("cannot order by {}", field.name)))?;
            format!(" ORDER BY {} {}", main_column(column), order.direction.as_sql())
        }
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_list(entity)?,
        main_table(entity),
        filter,
        order_clause,
        limit,
        start
    );
    Ok(q)
}

/// SELECT by primary key. Caller binds the id as the sole parameter.
pub fn select_by_id(entity: &ResolvedEntity) -> Result<QueryBuf, StoreError> {
    let (pk, pk_column) = pk_of(entity)?;
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = $1{}",
        select_list(entity)?,
        main_table(entity),
        main_column(pk_column),
        cast(pk.pg_type.as_deref())
    );
    Ok(q)
}

/// INSERT of the body's writable fields, returning the primary key. Absent fields use the
/// column default.
pub fn insert(entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<QueryBuf, StoreError> {
    let (_, pk_column) = pk_of(entity)?;
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for field in &entity.fields {
        let (Some(column), Some(value)) = (&field.column, body.get(&field.name)) else {
            continue;
        };
        let n = q.push_param(PgBindValue::from_json(value));
        cols.push(quoted(column));
        placeholders.push(format!("${}{}", n, cast(field.pg_type.as_deref())));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, quoted(pk_column))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            quoted(pk_column)
        )
    };
    Ok(q)
}

/// UPDATE by id of the body's writable fields, returning the primary key. With nothing to set
/// this degrades to an existence check.
pub fn update(entity: &ResolvedEntity, id: &str, body: &Map<String, Value>) -> Result<QueryBuf, StoreError> {
    let (pk, pk_column) = pk_of(entity)?;
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for field in &entity.fields {
        if field.is_pk {
            continue;
        }
        let (Some(column), Some(value)) = (&field.column, body.get(&field.name)) else {
            continue;
        };
        let n = q.push_param(PgBindValue::from_json(value));
        sets.push(format!("{} = ${}{}", quoted(column), n, cast(field.pg_type.as_deref())));
    }
    let id_param = q.push_param(PgBindValue::Text(id.to_string()));
    let pk_cast = cast(pk.pg_type.as_deref());
    q.sql = if sets.is_empty() {
        format!(
            "SELECT {pk} FROM {table} WHERE {pk} = ${n}{cast}",
            pk = quoted(pk_column),
            table = table,
            n = id_param,
            cast = pk_cast
        )
    } else {
        format!(
            "UPDATE {table} SET {sets} WHERE {pk} = ${n}{cast} RETURNING {pk}",
            table = table,
            sets = sets.join(", "),
            pk = quoted(pk_column),
            n = id_param,
            cast = pk_cast
        )
    };
    Ok(q)
}

/// DELETE by id. Caller binds the id as the sole parameter.
pub fn delete(entity: &ResolvedEntity) -> Result<QueryBuf, StoreError> {
    let (pk, pk_column) = pk_of(entity)?;
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} WHERE {} = $1{} RETURNING {}",
        qualified_table(&entity.schema_name, &entity.table_name),
        quoted(pk_column),
        cast(pk.pg_type.as_deref()),
        quoted(pk_column)
    );
    Ok(q)
}

/// Distinct `(value, label)` pairs for a relation or enum field, ordered by label.
pub fn select_choices(entity: &ResolvedEntity, field: &FieldInfo) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    q.sql = match (&field.relation, &field.column) {
        (Some(rel), _) => format!(
            "SELECT DISTINCT r.{}::text AS value, r.{}::text AS label FROM {} r ORDER BY label",
            quoted(&rel.target_pk),
            quoted(rel.label_column()),
            qualified_table(&rel.target_schema, &rel.target_table)
        ),
        (None, Some(column)) => format!(
            "SELECT DISTINCT {c}::text AS value, {c}::text AS label FROM {t} WHERE {c} IS NOT NULL ORDER BY label",
            c = main_column(column),
            t = main_table(entity)
        ),
        (None, None) => return Err(StoreError::Query(format!("{} has no choices", field.name))),
    };
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_from_str, resolve, SearchSettings};
    use crate::search::{Direction, FieldDescriptor, FieldValue};
    use chrono::NaiveDate;
    use serde_json::json;

    fn posts() -> ResolvedEntity {
        let config = load_from_str(
            r#"[
            {"name": "User", "table": "users", "primary_key": "id", "fields": [
                {"name": "id", "type": "integer", "has_default": true},
                {"name": "name", "type": "text"}]},
            {"name": "Tag", "table": "tags", "primary_key": "id", "fields": [
                {"name": "id", "type": "integer", "has_default": true}]},
            {"name": "Post", "schema": "blog", "table": "posts", "primary_key": "id", "fields": [
                {"name": "id", "type": "integer", "has_default": true},
                {"name": "title", "type": "text"},
                {"name": "score", "type": "numeric(6,2)"},
                {"name": "created", "type": "timestamptz", "has_default": true},
                {"name": "author", "type": "integer", "relation": {"target": "User", "column": "author_id", "label": "name"}},
                {"name": "tags", "relation": {"target": "Tag", "many": true,
                    "through": {"table": "post_tags", "source_key": "post_id", "target_key": "tag_id"}}}]}
        ]"#,
        )
        .unwrap();
        let model = resolve(&config, &SearchSettings::default()).unwrap();
        model.entity_by_path("posts").unwrap().clone()
    }

    fn criterion(entity: &ResolvedEntity, name: &str, operator: Operator, value: FieldValue) -> Criterion {
        let f = entity.field(name).unwrap();
        Criterion {
            field: FieldDescriptor::new(name, f.kind, f.nullable),
            operator,
            value,
        }
    }

    fn set(criteria: Vec<Criterion>, intersect: bool) -> PredicateSet {
        PredicateSet { criteria, intersect }
    }

    #[test]
    fn count_without_predicates() {
        let q = select_count(&posts(), &set(vec![], true)).unwrap();
        assert_eq!(q.sql, r#"SELECT COUNT(*) FROM "blog"."posts" main"#);
        assert!(q.params.is_empty());
    }

    #[test]
    fn count_and_page_share_the_filter() {
        let e = posts();
        let p = set(vec![criterion(&e, "title", Operator::ILike, FieldValue::Text("sm".into()))], true);
        let count = select_count(&e, &p).unwrap();
        let page = select_page(&e, &p, None, 0, 25).unwrap();
        let filter = r#" WHERE (main."title"::text ILIKE $1)"#;
        assert!(count.sql.ends_with(filter));
        assert!(page.sql.contains(filter));
        assert_eq!(count.params, vec![PgBindValue::Text("%sm%".into())]);
        assert_eq!(count.params, page.params);
        assert!(page.sql.ends_with(" LIMIT 25 OFFSET 0"));
        assert!(!page.sql.contains("ORDER BY"));
    }

    #[test]
    fn page_orders_by_one_column() {
        let e = posts();
        let order = OrderSpec {
            field: FieldDescriptor::new("created", FieldKind::DateTime, true),
            direction: Direction::Desc,
        };
        let q = select_page(&e, &set(vec![], true), Some(&order), 50, 25).unwrap();
        assert!(q.sql.ends_with(r#" ORDER BY main."created" DESC LIMIT 25 OFFSET 50"#));
        assert!(q.sql.contains(r#"main."score"::text AS "score""#));
        assert!(q.sql.contains(
            r#"(SELECT row_to_json(r) FROM "public"."users" r WHERE r."id" = main."author_id") AS "author""#
        ));
        assert!(q.sql.contains(
            r#"to_json(ARRAY(SELECT j."tag_id" FROM "public"."post_tags" j WHERE j."post_id" = main."id")) AS "tags""#
        ));
    }

    #[test]
    fn predicates_cast_by_kind() {
        let e = posts();
        let day = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let p = set(
            vec![
                criterion(&e, "score", Operator::Ge, FieldValue::Float(2.5)),
                criterion(&e, "created", Operator::Eq, day),
                criterion(&e, "author", Operator::Ne, FieldValue::Text("3".into())),
            ],
            false,
        );
        let q = select_count(&e, &p).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT COUNT(*) FROM "blog"."posts" main WHERE (main."score" >= $1::numeric) OR (main."created"::date = $2::date) OR (main."author_id"::text IS DISTINCT FROM $3)"#
        );
        assert_eq!(q.params[1], PgBindValue::Text("2024-01-05".into()));
    }

    #[test]
    fn collection_predicates_use_array_containment() {
        let e = posts();
        let ids = FieldValue::List(vec!["1".into(), "2".into()]);
        let q = select_count(&e, &set(vec![criterion(&e, "tags", Operator::Contains, ids.clone())], true)).unwrap();
        assert!(q.sql.ends_with(
            r#"WHERE ($1::text[] <@ ARRAY(SELECT j."tag_id"::text FROM "public"."post_tags" j WHERE j."post_id" = main."id"))"#
        ));
        assert_eq!(q.params, vec![PgBindValue::TextArray(vec!["1".into(), "2".into()])]);

        let q = select_count(&e, &set(vec![criterion(&e, "tags", Operator::NotContains, ids)], true)).unwrap();
        assert!(q.sql.contains("NOT (ARRAY("));
        assert!(q.sql.ends_with(r#" && $1::text[]))"#));
    }

    #[test]
    fn unknown_field_is_a_query_error() {
        let e = posts();
        let c = Criterion {
            field: FieldDescriptor::new("ghost", FieldKind::String, true),
            operator: Operator::ILike,
            value: FieldValue::Text("x".into()),
        };
        assert!(matches!(select_count(&e, &set(vec![c], true)), Err(StoreError::Query(_))));
    }

    #[test]
    fn insert_and_update_bind_only_given_fields() {
        let e = posts();
        let body = json!({"title": "Hello", "author": 3}).as_object().unwrap().clone();
        let q = insert(&e, &body).unwrap();
        assert_eq!(
            q.sql,
            r#"INSERT INTO "blog"."posts" ("title", "author_id") VALUES ($1::text, $2::integer) RETURNING "id""#
        );
        assert_eq!(q.params, vec![PgBindValue::Text("Hello".into()), PgBindValue::Text("3".into())]);

        let q = update(&e, "7", &body).unwrap();
        assert_eq!(
            q.sql,
            r#"UPDATE "blog"."posts" SET "title" = $1::text, "author_id" = $2::integer WHERE "id" = $3::integer RETURNING "id""#
        );
        let q = update(&e, "7", &Map::new()).unwrap();
        assert_eq!(q.sql, r#"SELECT "id" FROM "blog"."posts" WHERE "id" = $1::integer"#);

        let q = insert(&e, &Map::new()).unwrap();
        assert_eq!(q.sql, r#"INSERT INTO "blog"."posts" DEFAULT VALUES RETURNING "id""#);
    }

    #[test]
    fn read_and_delete_by_id() {
        let e = posts();
        assert!(select_by_id(&e).unwrap().sql.ends_with(r#"WHERE main."id" = $1::integer"#));
        assert_eq!(
            delete(&e).unwrap().sql,
            r#"DELETE FROM "blog"."posts" WHERE "id" = $1::integer RETURNING "id""#
        );
    }

    #[test]
    fn relation_choices_use_the_label() {
        let e = posts();
        let q = select_choices(&e, e.field("author").unwrap()).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT DISTINCT r."id"::text AS value, r."name"::text AS label FROM "public"."users" r ORDER BY label"#
        );
    }
}
