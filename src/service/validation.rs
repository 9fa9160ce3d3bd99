//! Request body validation from field kinds and config rules.

use crate::config::{FieldInfo, ResolvedEntity, ValidationRule};
use crate::error::ValidationErrors;
use crate::search::FieldValue;
use regex::Regex;
use serde_json::{Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body. Non-nullable fields without a default are required.
    pub fn validate_create(entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<(), ValidationErrors> {
        validate_body(entity, body, false)
    }

    /// Validate only the fields present in body (PUT/PATCH). The primary key cannot change.
    pub fn validate_update(entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<(), ValidationErrors> {
        validate_body(entity, body, true)
    }
}

fn validate_body(entity: &ResolvedEntity, body: &Map<String, Value>, partial: bool) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for key in body.keys() {
        match entity.field(key) {
            None => errors.insert(key, "unknown field"),
            Some(f) if !f.is_writable() => errors.insert(key, "is read-only"),
            Some(f) if partial && f.is_pk => errors.insert(key, "primary key cannot be changed"),
            Some(_) => {}
        }
    }

    let no_rule = ValidationRule::default();
    for field in entity.fields.iter().filter(|f| f.is_writable()) {
        let rule = entity.validation.get(&field.name).unwrap_or(&no_rule);
        let value = body.get(&field.name);
        let required = rule.required == Some(true) || (!field.nullable && !field.has_default);
        match value {
            None | Some(Value::Null) if required && !partial => errors.insert(&field.name, "is required"),
            Some(Value::Null) if !field.nullable => errors.insert(&field.name, "may not be null"),
            Some(v) if !v.is_null() => validate_field(field, v, rule, &mut errors),
            _ => {}
        }
    }
    errors.into_result()
}

fn validate_field(field: &FieldInfo, v: &Value, rule: &ValidationRule, errors: &mut ValidationErrors) {
    let name = field.name.as_str();
    match FieldValue::from_json(field.kind, v) {
        Err(message) => {
            errors.insert(name, message);
            return;
        }
        Ok(Some(FieldValue::Text(s))) => {
            if let Some(values) = &field.values {
                if !values.contains(&s) {
                    errors.insert(name, format!("must be one of: {}", values.join(", ")));
                }
            }
        }
        Ok(_) => {}
    }

    if let Some(format) = &rule.format {
        validate_format(name, v, format, errors);
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                errors.insert(name, format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                errors.insert(name, format!("must be at least {} characters", min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => errors.insert(name, "does not match required pattern"),
                Ok(_) => {}
                Err(_) => errors.insert(name, "has an invalid pattern"),
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let shown: Vec<String> = allowed.iter().take(5).map(|a| a.to_string()).collect();
            errors.insert(name, format!("must be one of: {}", shown.join(", ")));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                errors.insert(name, format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                errors.insert(name, format!("must be at most {}", max));
            }
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(name: &str, v: &Value, format: &str, errors: &mut ValidationErrors) {
    let Some(s) = v.as_str() else { return };
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                errors.insert(name, "must be a valid email");
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                errors.insert(name, "must be a valid UUID");
            }
        }
        _ => {}
    }
}
