//! Field descriptors derived once from the entity config.

use serde::{Deserialize, Serialize, Serializer};

/// Whether a relation points at one record or a collection of records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Boolean,
    Enum,
    String,
    Date,
    DateTime,
    Time,
    Numeric,
    Relation(Cardinality),
}

impl FieldKind {
    pub const ALL: [FieldKind; 9] = [
        FieldKind::Boolean,
        FieldKind::Enum,
        FieldKind::String,
        FieldKind::Date,
        FieldKind::DateTime,
        FieldKind::Time,
        FieldKind::Numeric,
        FieldKind::Relation(Cardinality::One),
        FieldKind::Relation(Cardinality::Many),
    ];

    /// Key used in comparator configuration and schema descriptions.
    pub fn key(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::Enum => "enum",
            FieldKind::String => "string",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Time => "time",
            FieldKind::Numeric => "numeric",
            FieldKind::Relation(Cardinality::One) => "relation",
            FieldKind::Relation(Cardinality::Many) => "relation_many",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        FieldKind::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Map a config column type (generic or PostgreSQL spelling) to a field kind.
    /// Schema-qualified names (e.g. `public.gender`) are custom enum types.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let lower = type_name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        if base.contains('.') {
            return Some(FieldKind::Enum);
        }
        let kind = match base {
            "bool" | "boolean" => FieldKind::Boolean,
            "enum" => FieldKind::Enum,
            "string" | "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "citext" | "uuid" => FieldKind::String,
            "date" => FieldKind::Date,
            "datetime" | "timestamp" | "timestamptz" | "timestamp with time zone"
            | "timestamp without time zone" => FieldKind::DateTime,
            "time" | "timetz" | "time with time zone" | "time without time zone" => FieldKind::Time,
            "numeric" | "decimal" | "int" | "int2" | "int4" | "int8" | "integer" | "smallint"
            | "bigint" | "serial" | "bigserial" | "smallserial" | "real" | "float" | "float4"
            | "float8" | "double precision" => FieldKind::Numeric,
            "relation" => FieldKind::Relation(Cardinality::One),
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, FieldKind::Relation(Cardinality::Many))
    }
}

impl Serialize for FieldKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, nullable: bool) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_map_to_kinds() {
        assert_eq!(FieldKind::from_type_name("varchar(255)"), Some(FieldKind::String));
        assert_eq!(FieldKind::from_type_name("TIMESTAMPTZ"), Some(FieldKind::DateTime));
        assert_eq!(FieldKind::from_type_name("numeric(10, 2)"), Some(FieldKind::Numeric));
        assert_eq!(FieldKind::from_type_name("bigserial"), Some(FieldKind::Numeric));
        assert_eq!(FieldKind::from_type_name("public.gender"), Some(FieldKind::Enum));
        assert_eq!(FieldKind::from_type_name("jsonb"), None);
        assert_eq!(FieldKind::from_type_name("bytea"), None);
    }

    #[test]
    fn keys_round_trip() {
        for kind in FieldKind::ALL {
            assert_eq!(FieldKind::from_key(kind.key()), Some(kind));
        }
        assert!(FieldKind::Relation(Cardinality::Many).is_collection());
        assert!(!FieldKind::Relation(Cardinality::One).is_collection());
    }
}
