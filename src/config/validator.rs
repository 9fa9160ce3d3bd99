//! Config validation: referential integrity and API consistency.

use crate::config::{EntityConfig, FieldConfig, FullConfig, OPERATIONS};
use crate::error::ConfigError;
use crate::search::FieldKind;
use regex::Regex;
use std::collections::{HashMap, HashSet};

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Type names are spliced into casts, so only names, spaces, dots and `(p, s)` modifiers pass.
fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '.' | '(' | ')' | ','))
        && s.matches('(').count() == s.matches(')').count()
}

fn check_identifier(what: &str, s: &str) -> Result<(), ConfigError> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("invalid {} '{}'", what, s)))
    }
}

/// Kind of a configured field, or `None` when its type has no search kind.
pub fn field_kind(field: &FieldConfig) -> Option<FieldKind> {
    if let Some(rel) = &field.relation {
        return Some(if rel.many {
            FieldKind::Relation(crate::search::Cardinality::Many)
        } else {
            FieldKind::Relation(crate::search::Cardinality::One)
        });
    }
    let kind = FieldKind::from_type_name(field.type_.as_deref()?)?;
    if kind == FieldKind::String && field.values.is_some() {
        return Some(FieldKind::Enum);
    }
    Some(kind)
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.entities.is_empty() {
        return Err(ConfigError::Validation("at least one entity required".into()));
    }
    let by_name: HashMap<&str, &EntityConfig> = config.entities.iter().map(|e| (e.name.as_str(), e)).collect();
    if by_name.len() != config.entities.len() {
        return Err(ConfigError::Validation("duplicate entity name".into()));
    }

    let mut path_segments = HashSet::new();
    for entity in &config.entities {
        let segment = entity.path_segment();
        if !path_segments.insert(segment.clone()) {
            return Err(ConfigError::DuplicatePathSegment(segment));
        }
        validate_entity(entity, &by_name)?;
    }
    Ok(())
}

fn validate_entity(entity: &EntityConfig, by_name: &HashMap<&str, &EntityConfig>) -> Result<(), ConfigError> {
    check_identifier("schema", &entity.schema)?;
    check_identifier("table", &entity.table)?;
    if entity.path_segment().is_empty() || entity.path_segment().contains('/') {
        return Err(ConfigError::Validation(format!(
            "invalid path segment for {}",
            entity.name
        )));
    }
    for op in &entity.operations {
        if !OPERATIONS.contains(&op.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown operation '{}' for {}",
                op, entity.name
            )));
        }
    }

    let mut names = HashSet::new();
    for field in &entity.fields {
        check_identifier("field", &field.name)?;
        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field {}.{}",
                entity.name, field.name
            )));
        }
        validate_field(entity, field, by_name)?;
    }

    match entity.field(&entity.primary_key) {
        Some(pk) if pk.relation.as_ref().map_or(true, |r| !r.many) && pk.type_.is_some() => {}
        _ => {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: entity.name.clone(),
                column: entity.primary_key.clone(),
            })
        }
    }

    if let Some(columns) = &entity.list_columns {
        for column in columns {
            if !is_list_column(entity, column, by_name) {
                return Err(ConfigError::Validation(format!(
                    "unknown list column '{}' for {}",
                    column, entity.name
                )));
            }
        }
    }

    for (name, rule) in &entity.validation {
        if entity.field(name).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "field",
                id: format!("{}.{}", entity.name, name),
            });
        }
        if let Some(pattern) = &rule.pattern {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("invalid pattern for {}.{}: {}", entity.name, name, e))
            })?;
        }
    }
    Ok(())
}

fn validate_field(
    entity: &EntityConfig,
    field: &FieldConfig,
    by_name: &HashMap<&str, &EntityConfig>,
) -> Result<(), ConfigError> {
    let unsupported = || ConfigError::UnsupportedFieldType {
        entity: entity.name.clone(),
        field: field.name.clone(),
        type_name: field.type_.clone().unwrap_or_default(),
    };
    if let Some(type_name) = &field.type_ {
        if !is_type_name(type_name) {
            return Err(unsupported());
        }
    }
    let kind = field_kind(field).ok_or_else(unsupported)?;
    if field.values.is_some() && kind != FieldKind::Enum {
        return Err(ConfigError::Validation(format!(
            "values given for non-enum field {}.{}",
            entity.name, field.name
        )));
    }

    let Some(rel) = &field.relation else {
        return Ok(());
    };
    let target = by_name.get(rel.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
        kind: "entity",
        id: rel.target.clone(),
    })?;
    if let Some(label) = &rel.label {
        if target.field(label).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "field",
                id: format!("{}.{}", target.name, label),
            });
        }
    }
    if rel.many {
        match (&rel.foreign_key, &rel.through) {
            (Some(fk), None) => check_identifier("foreign key", fk)?,
            (None, Some(through)) => {
                check_identifier("schema", &through.schema)?;
                check_identifier("table", &through.table)?;
                check_identifier("column", &through.source_key)?;
                check_identifier("column", &through.target_key)?;
            }
            _ => {
                return Err(ConfigError::Validation(format!(
                    "to-many relation {}.{} needs exactly one of foreign_key or through",
                    entity.name, field.name
                )))
            }
        }
    } else {
        if field.type_.is_none() {
            return Err(unsupported());
        }
        if let Some(column) = &rel.column {
            check_identifier("column", column)?;
        }
    }
    Ok(())
}

fn is_list_column(entity: &EntityConfig, column: &str, by_name: &HashMap<&str, &EntityConfig>) -> bool {
    match column.split_once('.') {
        None => entity.field(column).is_some(),
        Some((head, tail)) => entity
            .field(head)
            .and_then(|f| f.relation.as_ref())
            .filter(|r| !r.many)
            .and_then(|r| by_name.get(r.target.as_str()))
            .is_some_and(|target| target.field(tail).is_some()),
    }
}
