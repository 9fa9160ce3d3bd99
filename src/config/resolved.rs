//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use crate::search::{FieldKind, SearchSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// How a relation field reaches its target rows.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationLink {
    /// Foreign key column on this table.
    ToOne { column: String },
    /// Column on the target table referencing our primary key.
    ToMany { foreign_key: String },
    /// Link table pairing our key with the target key.
    Through {
        schema: String,
        table: String,
        source_key: String,
        target_key: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationSpec {
    pub target: String,
    pub target_schema: String,
    pub target_table: String,
    pub target_pk: String,
    pub target_pk_type: String,
    /// Target column used as the display label; falls back to the target primary key.
    pub label: Option<String>,
    pub link: RelationLink,
}

impl RelationSpec {
    pub fn label_column(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.target_pk)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    /// Name used in requests and responses.
    pub name: String,
    pub kind: FieldKind,
    /// Physical column; `None` for to-many relations.
    pub column: Option<String>,
    /// PostgreSQL type used to cast bound text parameters.
    pub pg_type: Option<String>,
    pub nullable: bool,
    pub has_default: bool,
    pub is_pk: bool,
    pub values: Option<Vec<String>>,
    pub relation: Option<RelationSpec>,
}

impl FieldInfo {
    /// Writable through create/update bodies.
    pub fn is_writable(&self) -> bool {
        self.column.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_field: String,
    pub fields: Vec<FieldInfo>,
    pub operations: Vec<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub search: Arc<SearchSchema>,
}

impl ResolvedEntity {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pk(&self) -> Option<&FieldInfo> {
        self.field(&self.pk_field)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }
}
