//! Load entity config from JSON and resolve it into the runtime model.

use crate::config::resolved::{FieldInfo, RelationLink, RelationSpec, ResolvedEntity, ResolvedModel};
use crate::config::settings::SearchSettings;
use crate::config::types::*;
use crate::config::{field_kind, validate};
use crate::error::ConfigError;
use crate::search::{ComparatorTable, Direction, FieldDescriptor, SearchSchema, UnknownKeys};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub const ENTITIES_FILE: &str = "entities.json";

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    List(Vec<EntityConfig>),
    Wrapped { entities: Vec<EntityConfig> },
}

/// Parse a config document: either an array of entities or `{"entities": [...]}`.
pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    let doc: ConfigDocument = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    let entities = match doc {
        ConfigDocument::List(entities) | ConfigDocument::Wrapped { entities } => entities,
    };
    Ok(FullConfig { entities })
}

/// Load from a JSON file, or from `entities.json` inside a directory.
pub fn load_from_path(path: &Path) -> Result<FullConfig, ConfigError> {
    let file = if path.is_dir() { path.join(ENTITIES_FILE) } else { path.to_path_buf() };
    let json = std::fs::read_to_string(&file)
        .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
    load_from_str(&json)
}

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig, settings: &SearchSettings) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let by_name: HashMap<&str, &EntityConfig> = config.entities.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();
    for entity in &config.entities {
        let resolved = resolve_entity(entity, &by_name, settings)?;
        tracing::debug!(
            entity = %resolved.name,
            path = %resolved.path_segment,
            fields = resolved.fields.len(),
            "resolved entity"
        );
        entity_by_path.insert(resolved.path_segment.clone(), resolved.clone());
        entities.push(resolved);
    }
    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn resolve_entity(
    entity: &EntityConfig,
    by_name: &HashMap<&str, &EntityConfig>,
    settings: &SearchSettings,
) -> Result<ResolvedEntity, ConfigError> {
    let mut fields = Vec::with_capacity(entity.fields.len());
    for f in &entity.fields {
        let kind = field_kind(f).ok_or_else(|| ConfigError::UnsupportedFieldType {
            entity: entity.name.clone(),
            field: f.name.clone(),
            type_name: f.type_.clone().unwrap_or_default(),
        })?;
        let relation = match &f.relation {
            Some(rel) => Some(resolve_relation(f, rel, by_name)?),
            None => None,
        };
        let column = match &relation {
            Some(RelationSpec {
                link: RelationLink::ToOne { column },
                ..
            }) => Some(column.clone()),
            Some(_) => None,
            None => Some(f.name.clone()),
        };
        fields.push(FieldInfo {
            name: f.name.clone(),
            kind,
            column,
            pg_type: f.type_.as_deref().map(cast_type),
            nullable: f.nullable,
            has_default: f.has_default,
            is_pk: f.name == entity.primary_key,
            values: f.values.clone(),
            relation,
        });
    }

    let search = build_search_schema(entity, &fields, settings).map_err(|source| ConfigError::Schema {
        entity: entity.name.clone(),
        source,
    })?;

    Ok(ResolvedEntity {
        name: entity.name.clone(),
        schema_name: entity.schema.clone(),
        table_name: entity.table.clone(),
        path_segment: entity.path_segment(),
        pk_field: entity.primary_key.clone(),
        fields,
        operations: entity.operations.clone(),
        validation: entity.validation.clone(),
        search: Arc::new(search),
    })
}

fn resolve_relation(
    field: &FieldConfig,
    rel: &RelationConfig,
    by_name: &HashMap<&str, &EntityConfig>,
) -> Result<RelationSpec, ConfigError> {
    let target = by_name.get(rel.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
        kind: "entity",
        id: rel.target.clone(),
    })?;
    let target_pk_type = target
        .field(&target.primary_key)
        .and_then(|pk| pk.type_.as_deref())
        .map(cast_type)
        .unwrap_or_else(|| "text".into());
    let link = match (rel.many, &rel.foreign_key, &rel.through) {
        (false, _, _) => RelationLink::ToOne {
            column: rel.column.clone().unwrap_or_else(|| field.name.clone()),
        },
        (true, Some(fk), _) => RelationLink::ToMany { foreign_key: fk.clone() },
        (true, None, Some(t)) => RelationLink::Through {
            schema: t.schema.clone(),
            table: t.table.clone(),
            source_key: t.source_key.clone(),
            target_key: t.target_key.clone(),
        },
        (true, None, None) => {
            return Err(ConfigError::Validation(format!(
                "to-many relation {} has no link",
                field.name
            )))
        }
    };
    Ok(RelationSpec {
        target: target.name.clone(),
        target_schema: target.schema.clone(),
        target_table: target.table.clone(),
        target_pk: target.primary_key.clone(),
        target_pk_type,
        label: rel.label.clone(),
        link,
    })
}

/// Generic type aliases map to PostgreSQL names; anything else is cast as written.
fn cast_type(type_name: &str) -> String {
    match type_name.trim().to_lowercase().as_str() {
        "string" | "enum" | "relation" => "text".into(),
        "datetime" => "timestamp".into(),
        "serial" | "smallserial" => "integer".into(),
        "bigserial" => "bigint".into(),
        _ => type_name.trim().to_string(),
    }
}

fn build_search_schema(
    entity: &EntityConfig,
    fields: &[FieldInfo],
    settings: &SearchSettings,
) -> Result<SearchSchema, crate::error::SchemaError> {
    use crate::error::SchemaError;

    let cfg = &entity.search;
    let mut comparators = ComparatorTable::standard();
    for (kind_key, c) in &cfg.comparators {
        comparators = comparators.override_from_codes(kind_key, &c.operators, c.default.as_deref())?;
    }

    let mut builder = SearchSchema::builder()
        .comparators(comparators)
        .default_limit(cfg.default_limit.unwrap_or(settings.default_limit))
        .max_limit(cfg.max_limit.unwrap_or(settings.max_limit))
        .intersect(cfg.intersect.unwrap_or(true));

    let unknown_keys = match &cfg.unknown_keys {
        Some(s) => s.parse::<UnknownKeys>().map_err(|message| SchemaError::InvalidDefault {
            key: "unknown_keys",
            message,
        })?,
        None => settings.unknown_keys,
    };
    builder = builder.unknown_keys(unknown_keys);

    if let Some(direction) = &cfg.direction {
        let direction = direction
            .parse::<Direction>()
            .map_err(|message| SchemaError::InvalidDefault { key: "direction", message })?;
        builder = builder.direction(direction);
    }

    for (f, info) in entity.fields.iter().zip(fields) {
        if !f.searchable {
            continue;
        }
        builder = builder.field(FieldDescriptor::new(info.name.clone(), info.kind, info.nullable));
        if f.repeatable {
            builder = builder.repeatable(info.name.clone());
        }
        if let Some(values) = &info.values {
            builder = builder.choices(info.name.clone(), values.clone());
        }
    }

    builder = match &cfg.order_by {
        None => builder,
        Some(None) => builder.natural_order(),
        Some(Some(name)) => builder.order_by(name.clone()),
    };

    builder.columns(list_columns(entity, fields)).build()
}

/// Configured listing columns, or every non-collection field with to-one relations shown by label.
fn list_columns(entity: &EntityConfig, fields: &[FieldInfo]) -> Vec<String> {
    if let Some(columns) = &entity.list_columns {
        return columns.clone();
    }
    fields
        .iter()
        .filter(|f| !f.kind.is_collection())
        .map(|f| match f.relation.as_ref().and_then(|r| r.label.as_ref()) {
            Some(label) => format!("{}.{}", f.name, label),
            None => f.name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{Cardinality, FieldKind, RawParams};

    const BLOG: &str = r#"{"entities": [
        {"name": "User", "table": "users", "primary_key": "id", "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "name", "type": "varchar(80)", "nullable": false}]},
        {"name": "Tag", "table": "tags", "primary_key": "id", "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "label", "type": "text"}]},
        {"name": "Post", "table": "posts", "primary_key": "id",
         "search": {"order_by": null, "comparators": {"string": {"operators": ["ilike"]}}},
         "fields": [
            {"name": "id", "type": "integer", "nullable": false, "has_default": true},
            {"name": "title", "type": "text", "nullable": false},
            {"name": "state", "type": "text", "values": ["draft", "published"]},
            {"name": "created", "type": "timestamptz", "has_default": true, "repeatable": true},
            {"name": "body", "type": "text", "searchable": false},
            {"name": "author", "type": "integer",
             "relation": {"target": "User", "column": "author_id", "label": "name"}},
            {"name": "tags", "relation": {"target": "Tag", "many": true, "label": "label",
             "through": {"table": "post_tags", "source_key": "post_id", "target_key": "tag_id"}}}]}
    ]}"#;

    fn model() -> ResolvedModel {
        resolve(&load_from_str(BLOG).unwrap(), &SearchSettings::default()).unwrap()
    }

    #[test]
    fn resolves_entities_by_path() {
        let model = model();
        assert_eq!(model.entities.len(), 3);
        let posts = model.entity_by_path("posts").unwrap();
        assert_eq!(posts.table_name, "posts");
        assert_eq!(posts.schema_name, "public");
        assert_eq!(posts.pk().unwrap().name, "id");
        assert!(posts.allows("search"));
    }

    #[test]
    fn relation_fields_resolve_links() {
        let model = model();
        let posts = model.entity_by_path("posts").unwrap();
        let author = posts.field("author").unwrap();
        assert_eq!(author.kind, FieldKind::Relation(Cardinality::One));
        assert_eq!(author.column.as_deref(), Some("author_id"));
        assert_eq!(author.relation.as_ref().unwrap().target_table, "users");

        let tags = posts.field("tags").unwrap();
        assert_eq!(tags.kind, FieldKind::Relation(Cardinality::Many));
        assert_eq!(tags.column, None);
        assert!(matches!(tags.relation.as_ref().unwrap().link, RelationLink::Through { .. }));
    }

    #[test]
    fn search_schema_follows_entity_config() {
        let model = model();
        let schema = &model.entity_by_path("posts").unwrap().search;
        assert!(schema.field("body").is_none());
        assert!(schema.field("created").unwrap().repeatable);
        assert_eq!(schema.field("state").unwrap().choices.as_ref().unwrap().len(), 2);
        assert_eq!(schema.defaults().order_by, None);
        assert_eq!(schema.columns(), &["id", "title", "state", "created", "body", "author.name"]);
        assert!(schema
            .validate(&RawParams::from_pairs([("title.value", "x"), ("title.comparator", "like")]))
            .is_err());
    }

    #[test]
    fn schema_errors_name_the_entity() {
        let json = BLOG.replace(r#""order_by": null"#, r#""order_by": "tags""#);
        let err = resolve(&load_from_str(&json).unwrap(), &SearchSettings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Schema { ref entity, .. } if entity == "Post"));
    }

    #[test]
    fn loads_entities_file_from_directory() {
        let dir = std::env::temp_dir().join(format!("crud-scaffold-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ENTITIES_FILE), BLOG).unwrap();
        let config = load_from_path(&dir).unwrap();
        assert_eq!(config.entities.len(), 3);
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(load_from_path(&dir), Err(ConfigError::Load(_))));
    }
}
