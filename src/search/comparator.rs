//! Comparison operators and the per-kind sets that decide which are legal.

use crate::error::SchemaError;
use crate::search::field::{Cardinality, FieldKind};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Closed set of comparison operators. Requests name them by code; there is no other dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Like,
    ILike,
    Contains,
    NotContains,
}

impl Operator {
    pub fn code(self) -> &'static str {
        match self {
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Ge => "ge",
            Operator::Gt => "gt",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::Contains => "contains",
            Operator::NotContains => "not contains",
        }
    }

    /// Accepts the canonical code, the symbolic label, and the dunder spellings older form
    /// clients submit (`__eq__`, `__lte__`, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        let op = match code.trim() {
            "lt" | "<" | "__lt__" => Operator::Lt,
            "le" | "<=" | "__le__" | "__lte__" => Operator::Le,
            "eq" | "==" | "=" | "__eq__" => Operator::Eq,
            "ne" | "!=" | "__ne__" | "__neq__" => Operator::Ne,
            "ge" | ">=" | "__ge__" | "__gte__" => Operator::Ge,
            "gt" | ">" | "__gt__" => Operator::Gt,
            "like" => Operator::Like,
            "ilike" => Operator::ILike,
            "contains" => Operator::Contains,
            "not_contains" | "notcontains" => Operator::NotContains,
            _ => return None,
        };
        Some(op)
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Ordered operators legal for one field kind plus the one used when a request names none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComparatorSet {
    operators: Vec<Operator>,
    default: Operator,
}

impl ComparatorSet {
    pub fn new(operators: Vec<Operator>, default: Operator) -> Option<Self> {
        if !operators.contains(&default) {
            return None;
        }
        Some(ComparatorSet { operators, default })
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn default_operator(&self) -> Operator {
        self.default
    }

    pub fn allows(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }

    /// (code, label) pairs for form widgets, led by the neutral `("", "")` entry.
    pub fn choices(&self) -> Vec<(&'static str, &'static str)> {
        std::iter::once(("", ""))
            .chain(self.operators.iter().map(|op| (op.code(), op.label())))
            .collect()
    }
}

const ORDERING: [Operator; 6] = [
    Operator::Lt,
    Operator::Le,
    Operator::Eq,
    Operator::Ne,
    Operator::Ge,
    Operator::Gt,
];

/// Field kind → comparator set. Kinds missing from the table cannot be searched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComparatorTable {
    sets: HashMap<FieldKind, ComparatorSet>,
}

impl ComparatorTable {
    pub fn empty() -> Self {
        ComparatorTable { sets: HashMap::new() }
    }

    pub fn standard() -> Self {
        let mut sets = HashMap::new();
        let equality = ComparatorSet {
            operators: vec![Operator::Eq, Operator::Ne],
            default: Operator::Eq,
        };
        let ordering = ComparatorSet {
            operators: ORDERING.to_vec(),
            default: Operator::Eq,
        };
        sets.insert(
            FieldKind::String,
            ComparatorSet {
                operators: vec![Operator::ILike, Operator::Like],
                default: Operator::ILike,
            },
        );
        for kind in [FieldKind::Numeric, FieldKind::Date, FieldKind::DateTime, FieldKind::Time] {
            sets.insert(kind, ordering.clone());
        }
        for kind in [FieldKind::Boolean, FieldKind::Enum, FieldKind::Relation(Cardinality::One)] {
            sets.insert(kind, equality.clone());
        }
        sets.insert(
            FieldKind::Relation(Cardinality::Many),
            ComparatorSet {
                operators: vec![Operator::Contains, Operator::NotContains, Operator::Eq, Operator::Ne],
                default: Operator::Contains,
            },
        );
        ComparatorTable { sets }
    }

    pub fn with(mut self, kind: FieldKind, set: ComparatorSet) -> Self {
        self.sets.insert(kind, set);
        self
    }

    pub fn without(mut self, kind: FieldKind) -> Self {
        self.sets.remove(&kind);
        self
    }

    pub fn get(&self, kind: FieldKind) -> Option<&ComparatorSet> {
        self.sets.get(&kind)
    }

    /// Replace the set for `kind_key` from operator codes, as found in entity config.
    pub fn override_from_codes(
        self,
        kind_key: &str,
        codes: &[String],
        default: Option<&str>,
    ) -> Result<Self, SchemaError> {
        let kind = FieldKind::from_key(kind_key).ok_or_else(|| SchemaError::UnsupportedFieldKind {
            field: "*".into(),
            kind: kind_key.to_string(),
        })?;
        let invalid = |code: &str| SchemaError::InvalidOperator {
            field: kind_key.to_string(),
            operator: code.to_string(),
        };
        let mut operators = Vec::with_capacity(codes.len());
        for code in codes {
            operators.push(Operator::from_code(code).ok_or_else(|| invalid(code))?);
        }
        if operators.is_empty() {
            return Ok(self.without(kind));
        }
        let default = match default {
            Some(code) => Operator::from_code(code).ok_or_else(|| invalid(code))?,
            None => operators[0],
        };
        let set = ComparatorSet::new(operators, default).ok_or_else(|| invalid(default.code()))?;
        Ok(self.with(kind, set))
    }
}

impl Default for ComparatorTable {
    fn default() -> Self {
        ComparatorTable::standard()
    }
}
