//! Raw config types matching the entity JSON documents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SCHEMA: &str = "public";
pub const OPERATIONS: [&str; 5] = ["create", "read", "update", "delete", "search"];

fn default_schema() -> String {
    DEFAULT_SCHEMA.into()
}

fn default_operations() -> Vec<String> {
    OPERATIONS.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    /// URL segment; defaults to the lower-cased name plus `s`.
    #[serde(default)]
    pub path_segment: Option<String>,
    pub primary_key: String,
    pub fields: Vec<FieldConfig>,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    /// Listing columns for search results. Dotted names reach into to-one relations.
    #[serde(default)]
    pub list_columns: Option<Vec<String>>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

impl EntityConfig {
    pub fn path_segment(&self) -> String {
        self.path_segment
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    /// PostgreSQL column type (`integer`, `varchar(80)`, `timestamptz`, `public.gender`, ...).
    /// Omitted for to-many relations, which have no column.
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default)]
    pub repeatable: bool,
    /// Allowed values of an enum column.
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub relation: Option<RelationConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationConfig {
    /// Target entity name.
    pub target: String,
    #[serde(default)]
    pub many: bool,
    /// To-one: foreign key column on this table. Defaults to the field name.
    #[serde(default)]
    pub column: Option<String>,
    /// To-many: column on the target table referencing this entity's primary key.
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// To-many through a link table.
    #[serde(default)]
    pub through: Option<ThroughConfig>,
    /// Target column shown as the choice label.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThroughConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    /// Link column referencing this entity.
    pub source_key: String,
    /// Link column referencing the target entity.
    pub target_key: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default)]
    pub default_limit: Option<u64>,
    #[serde(default)]
    pub max_limit: Option<u64>,
    /// Absent: first declared field. `null`: natural store order.
    #[serde(default, with = "explicit_null")]
    pub order_by: Option<Option<String>>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub intersect: Option<bool>,
    #[serde(default)]
    pub unknown_keys: Option<String>,
    #[serde(default)]
    pub comparators: HashMap<String, ComparatorConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparatorConfig {
    pub operators: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

mod explicit_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.clone().flatten().serialize(serializer)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Every entity document in one struct.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let e: EntityConfig = serde_json::from_str(
            r#"{"name":"Account","table":"account","primary_key":"id",
                "fields":[{"name":"id","type":"integer","nullable":false,"has_default":true}]}"#,
        )
        .unwrap();
        assert_eq!(e.schema, "public");
        assert_eq!(e.path_segment(), "accounts");
        assert_eq!(e.operations.len(), 5);
        assert!(e.fields[0].searchable);
        assert_eq!(e.search.order_by, None);
    }

    #[test]
    fn null_order_by_is_distinct_from_absent() {
        let s: SearchConfig = serde_json::from_str(r#"{"order_by":null}"#).unwrap();
        assert_eq!(s.order_by, Some(None));
        let s: SearchConfig = serde_json::from_str(r#"{"order_by":"name"}"#).unwrap();
        assert_eq!(s.order_by, Some(Some("name".into())));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let r = serde_json::from_str::<FieldConfig>(r#"{"name":"x","type":"text","colour":"red"}"#);
        assert!(r.is_err());
    }
}
