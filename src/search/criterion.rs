//! Criterion building: operator checks and the empty-value drop rule.

use crate::error::SchemaError;
use crate::search::comparator::{ComparatorTable, Operator};
use crate::search::field::FieldDescriptor;
use crate::search::value::FieldValue;

/// One decoded filter condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Criterion {
    pub field: FieldDescriptor,
    pub operator: Operator,
    pub value: FieldValue,
}

/// All criteria submitted for one field, in submission order.
#[derive(Clone, Debug, PartialEq)]
pub struct CriterionGroup {
    pub field: FieldDescriptor,
    pub criteria: Vec<Criterion>,
}

/// The predicate list handed to the record store, with its combination mode.
#[derive(Clone, Debug, PartialEq)]
pub struct PredicateSet {
    pub criteria: Vec<Criterion>,
    /// AND when true, OR when false.
    pub intersect: bool,
}

impl PredicateSet {
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

pub struct CriterionBuilder<'a> {
    comparators: &'a ComparatorTable,
}

impl<'a> CriterionBuilder<'a> {
    pub fn new(comparators: &'a ComparatorTable) -> Self {
        CriterionBuilder { comparators }
    }

    /// `operator`: `None` selects the kind's default, `Some("")` is the neutral choice and
    /// drops the criterion. A missing value also drops it. The operator is checked first so a
    /// bad code is reported even when the value is empty.
    pub fn build(
        &self,
        field: &FieldDescriptor,
        operator: Option<&str>,
        value: Option<FieldValue>,
    ) -> Result<Option<Criterion>, SchemaError> {
        let set = self
            .comparators
            .get(field.kind)
            .ok_or_else(|| SchemaError::UnsupportedFieldKind {
                field: field.name.clone(),
                kind: field.kind.key().to_string(),
            })?;
        let operator = match operator.map(str::trim) {
            None => set.default_operator(),
            Some("") => return Ok(None),
            Some(code) => Operator::from_code(code)
                .filter(|op| set.allows(*op))
                .ok_or_else(|| SchemaError::InvalidOperator {
                    field: field.name.clone(),
                    operator: code.to_string(),
                })?,
        };
        Ok(value.map(|value| Criterion {
            field: field.clone(),
            operator,
            value,
        }))
    }

    /// Build one criterion per (operator, value) entry, keeping the non-empty ones.
    pub fn build_group<I>(&self, field: &FieldDescriptor, entries: I) -> Result<CriterionGroup, SchemaError>
    where
        I: IntoIterator<Item = (Option<String>, Option<FieldValue>)>,
    {
        let mut criteria = Vec::new();
        for (operator, value) in entries {
            if let Some(c) = self.build(field, operator.as_deref(), value)? {
                criteria.push(c);
            }
        }
        Ok(CriterionGroup {
            field: field.clone(),
            criteria,
        })
    }
}
